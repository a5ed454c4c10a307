//! JSONL session recorder.
//!
//! Records every hook it observes as one JSON line. Lines are buffered in
//! memory and appended to the session file on `flush` (called at the end of
//! each query) and `close`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use codeloop_core::error::PluginError;
use codeloop_core::plugin::{
    Enforce, MessageEvent, Plugin, PluginContext, QueryEndEvent, QueryStartEvent, ToolEndEvent,
    ToolStartEvent, UsageEvent,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

const PLUGIN_NAME: &str = "session-recorder";

#[derive(Serialize)]
struct SessionRecord<'a, T: Serialize> {
    timestamp: DateTime<Utc>,
    run_id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a T,
}

#[derive(Debug, Default)]
struct SessionState {
    path: Option<PathBuf>,
    pending: Vec<String>,
}

/// Writes one `<timestamp>-<run id>.jsonl` file per session.
///
/// A session starts at the first `query_start` after construction (or after
/// [`close`](Self::close)), so several runs on one recorder share a file.
#[derive(Debug)]
pub struct SessionRecorder {
    dir: PathBuf,
    state: Mutex<SessionState>,
}

impl SessionRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the current session file, if a session is open.
    pub async fn path(&self) -> Option<PathBuf> {
        self.state.lock().await.path.clone()
    }

    /// Open a session file for `run_id` unless one is already open.
    pub async fn init(&self, run_id: &str) -> std::io::Result<PathBuf> {
        let mut state = self.state.lock().await;
        if let Some(path) = &state.path {
            return Ok(path.clone());
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = format!("{}-{run_id}.jsonl", Utc::now().format("%Y%m%dT%H%M%S"));
        let path = self.dir.join(file_name);
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), "Session recording started");
        state.path = Some(path.clone());
        Ok(path)
    }

    /// Append buffered records to the session file.
    pub async fn flush(&self) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        Self::flush_locked(&mut state).await
    }

    /// Flush and end the session. The next `query_start` opens a new file.
    pub async fn close(&self) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        Self::flush_locked(&mut state).await?;
        if let Some(path) = state.path.take() {
            debug!(path = %path.display(), "Session recording closed");
        }
        Ok(())
    }

    async fn flush_locked(state: &mut SessionState) -> std::io::Result<()> {
        let Some(path) = &state.path else {
            return Ok(());
        };
        if state.pending.is_empty() {
            return Ok(());
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut buf = state.pending.join("\n");
        buf.push('\n');
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        state.pending.clear();
        Ok(())
    }

    async fn record<T: Serialize + Sync>(
        &self,
        hook: &str,
        run_id: &str,
        data: &T,
    ) -> Result<(), PluginError> {
        let line = serde_json::to_string(&SessionRecord {
            timestamp: Utc::now(),
            run_id,
            kind: hook,
            data,
        })
        .map_err(|e| PluginError::new(PLUGIN_NAME, hook, e.to_string()))?;
        self.state.lock().await.pending.push(line);
        Ok(())
    }
}

#[async_trait]
impl Plugin for SessionRecorder {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    // Record after every other plugin has had its say.
    fn enforce(&self) -> Enforce {
        Enforce::Post
    }

    async fn query_start(
        &self,
        ctx: &PluginContext,
        event: &QueryStartEvent,
    ) -> Result<(), PluginError> {
        self.init(&ctx.run_id)
            .await
            .map_err(|e| PluginError::new(PLUGIN_NAME, "query_start", e.to_string()))?;
        self.record("query_start", &ctx.run_id, event).await
    }

    async fn query_end(
        &self,
        ctx: &PluginContext,
        event: &QueryEndEvent,
    ) -> Result<(), PluginError> {
        #[derive(Serialize)]
        struct Summary<'a> {
            answer: &'a str,
            rounds: u32,
            usage: codeloop_core::model::Usage,
            messages: usize,
            duration_ms: i64,
        }

        let summary = Summary {
            answer: &event.answer,
            rounds: event.rounds,
            usage: event.usage,
            messages: event.transcript.len(),
            duration_ms: (event.ended_at - event.started_at).num_milliseconds(),
        };
        self.record("query_end", &ctx.run_id, &summary).await?;
        self.flush()
            .await
            .map_err(|e| PluginError::new(PLUGIN_NAME, "query_end", e.to_string()))
    }

    async fn tool_start(
        &self,
        ctx: &PluginContext,
        event: &ToolStartEvent,
    ) -> Result<(), PluginError> {
        self.record("tool_start", &ctx.run_id, event).await
    }

    async fn tool_end(&self, ctx: &PluginContext, event: &ToolEndEvent) -> Result<(), PluginError> {
        self.record("tool_end", &ctx.run_id, event).await
    }

    async fn message(&self, ctx: &PluginContext, event: &MessageEvent) -> Result<(), PluginError> {
        self.record("message", &ctx.run_id, &event.message).await
    }

    async fn usage(&self, ctx: &PluginContext, event: &UsageEvent) -> Result<(), PluginError> {
        self.record("usage", &ctx.run_id, event).await
    }
}
