//! Plugin trait and hook payloads.
//!
//! Plugins observe (and for mergeable hooks, rewrite) state at fixed points
//! of a query run: context collection, system prompt assembly, query
//! start/end, tool start/end, message appends and usage reports.
//!
//! A plugin implements only the hooks it cares about; every handler has a
//! no-op default. Handlers receive an explicit [`PluginContext`] instead of
//! sharing a mutable receiver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::context::QueryContext;
use crate::error::PluginError;
use crate::message::{Message, Transcript};
use crate::model::Usage;

/// Lifecycle points a plugin can hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    Context,
    SystemPrompt,
    QueryStart,
    QueryEnd,
    ToolStart,
    ToolEnd,
    Message,
    Usage,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::SystemPrompt => "system_prompt",
            Self::QueryStart => "query_start",
            Self::QueryEnd => "query_end",
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::Message => "message",
            Self::Usage => "usage",
        }
    }

    /// Whether handlers of this hook return an updated payload.
    pub fn is_mergeable(&self) -> bool {
        matches!(self, Self::Context | Self::SystemPrompt)
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a hook is dispatched across plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// Every handler sees the same payload; results are discarded.
    Series,
    /// Each handler receives the previous handler's output.
    SeriesMerge,
}

/// Where a plugin sits in the dispatch order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforce {
    Pre,
    #[default]
    Normal,
    Post,
}

/// Explicit per-run state handed to every hook handler.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Identifier of the current run
    pub run_id: String,

    /// Working directory of the run
    pub cwd: PathBuf,

    /// Model name used for generation
    pub model: String,

    /// Directory plugins may write to (session logs, caches)
    pub data_dir: Option<PathBuf>,

    /// The run's tracing span; handlers log inside it
    pub span: tracing::Span,
}

impl PluginContext {
    pub fn new(run_id: impl Into<String>, cwd: PathBuf, model: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cwd,
            model: model.into(),
            data_dir: None,
            span: tracing::Span::none(),
        }
    }

    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStartEvent {
    pub run_id: String,
    pub prompt: Option<String>,
    pub message_count: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEndEvent {
    pub run_id: String,
    pub transcript: Transcript,
    pub answer: String,
    pub rounds: u32,
    pub usage: Usage,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStartEvent {
    pub tool_name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// How a tool dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEndEvent {
    pub tool_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub round: u32,
    pub model: String,
    pub usage: Usage,
}

/// A hook name together with its payload.
#[derive(Debug, Clone)]
pub enum HookEvent {
    Context(QueryContext),
    SystemPrompt(String),
    QueryStart(QueryStartEvent),
    QueryEnd(Box<QueryEndEvent>),
    ToolStart(ToolStartEvent),
    ToolEnd(ToolEndEvent),
    Message(MessageEvent),
    Usage(UsageEvent),
}

impl HookEvent {
    pub fn hook(&self) -> Hook {
        match self {
            Self::Context(_) => Hook::Context,
            Self::SystemPrompt(_) => Hook::SystemPrompt,
            Self::QueryStart(_) => Hook::QueryStart,
            Self::QueryEnd(_) => Hook::QueryEnd,
            Self::ToolStart(_) => Hook::ToolStart,
            Self::ToolEnd(_) => Hook::ToolEnd,
            Self::Message(_) => Hook::Message,
            Self::Usage(_) => Hook::Usage,
        }
    }
}

/// The plugin trait. Override the handlers you need.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin name (used in logs and errors).
    fn name(&self) -> &str;

    /// Dispatch position relative to other plugins.
    fn enforce(&self) -> Enforce {
        Enforce::Normal
    }

    /// Enrich or rewrite the query context.
    async fn context(
        &self,
        _ctx: &PluginContext,
        acc: QueryContext,
    ) -> Result<QueryContext, PluginError> {
        Ok(acc)
    }

    /// Rewrite the assembled system prompt before it is frozen.
    async fn system_prompt(
        &self,
        _ctx: &PluginContext,
        acc: String,
    ) -> Result<String, PluginError> {
        Ok(acc)
    }

    async fn query_start(
        &self,
        _ctx: &PluginContext,
        _event: &QueryStartEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn query_end(
        &self,
        _ctx: &PluginContext,
        _event: &QueryEndEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn tool_start(
        &self,
        _ctx: &PluginContext,
        _event: &ToolStartEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn tool_end(
        &self,
        _ctx: &PluginContext,
        _event: &ToolEndEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn message(
        &self,
        _ctx: &PluginContext,
        _event: &MessageEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    async fn usage(
        &self,
        _ctx: &PluginContext,
        _event: &UsageEvent,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}
