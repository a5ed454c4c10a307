//! Plugin hook bus.
//!
//! Holds the registered plugins in dispatch order and fans hook events out
//! to them. Dispatch is sequential and fail-fast: the first plugin error
//! aborts the hook and propagates to the caller.
//!
//! Order is fixed at registration: plugins are grouped by
//! [`Enforce`](codeloop_core::plugin::Enforce) (`Pre`, then `Normal`, then
//! `Post`) and keep registration order within a group.

use std::sync::Arc;

use codeloop_core::context::QueryContext;
use codeloop_core::error::PluginError;
use codeloop_core::plugin::{
    HookEvent, HookMode, MessageEvent, Plugin, PluginContext, QueryEndEvent, QueryStartEvent,
    ToolEndEvent, ToolStartEvent, UsageEvent,
};
use tracing::{debug, warn};

/// Ordered collection of plugins with hook dispatch.
#[derive(Default)]
pub struct HookBus {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Stable sort keeps registration order per group.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        debug!(plugin = plugin.name(), enforce = ?plugin.enforce(), "Registered plugin");
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| p.enforce());
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.register(plugin);
        self
    }

    /// Plugin names in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Dispatch `event` to every plugin.
    ///
    /// In [`HookMode::SeriesMerge`] each handler receives the previous
    /// handler's output and the final value is returned; only the context
    /// and system-prompt hooks support this. In [`HookMode::Series`] every
    /// handler sees the original payload, which is returned unchanged.
    pub async fn apply(
        &self,
        ctx: &PluginContext,
        event: HookEvent,
        mode: HookMode,
    ) -> Result<HookEvent, PluginError> {
        let hook = event.hook();
        if mode == HookMode::SeriesMerge && !hook.is_mergeable() {
            return Err(PluginError::new(
                "hook-bus",
                hook.as_str(),
                "hook does not support series-merge dispatch",
            ));
        }
        debug!(hook = %hook, plugins = self.plugins.len(), ?mode, "Dispatching hook");

        let merge = mode == HookMode::SeriesMerge;
        match event {
            HookEvent::Context(mut acc) => {
                for plugin in &self.plugins {
                    let out = plugin
                        .context(ctx, acc.clone())
                        .await
                        .map_err(|e| failed(plugin.as_ref(), e))?;
                    if merge {
                        acc = out;
                    }
                }
                Ok(HookEvent::Context(acc))
            }
            HookEvent::SystemPrompt(mut acc) => {
                for plugin in &self.plugins {
                    let out = plugin
                        .system_prompt(ctx, acc.clone())
                        .await
                        .map_err(|e| failed(plugin.as_ref(), e))?;
                    if merge {
                        acc = out;
                    }
                }
                Ok(HookEvent::SystemPrompt(acc))
            }
            HookEvent::QueryStart(ev) => {
                for plugin in &self.plugins {
                    plugin.query_start(ctx, &ev).await.map_err(|e| failed(plugin.as_ref(), e))?;
                }
                Ok(HookEvent::QueryStart(ev))
            }
            HookEvent::QueryEnd(ev) => {
                for plugin in &self.plugins {
                    plugin.query_end(ctx, &ev).await.map_err(|e| failed(plugin.as_ref(), e))?;
                }
                Ok(HookEvent::QueryEnd(ev))
            }
            HookEvent::ToolStart(ev) => {
                for plugin in &self.plugins {
                    plugin.tool_start(ctx, &ev).await.map_err(|e| failed(plugin.as_ref(), e))?;
                }
                Ok(HookEvent::ToolStart(ev))
            }
            HookEvent::ToolEnd(ev) => {
                for plugin in &self.plugins {
                    plugin.tool_end(ctx, &ev).await.map_err(|e| failed(plugin.as_ref(), e))?;
                }
                Ok(HookEvent::ToolEnd(ev))
            }
            HookEvent::Message(ev) => {
                for plugin in &self.plugins {
                    plugin.message(ctx, &ev).await.map_err(|e| failed(plugin.as_ref(), e))?;
                }
                Ok(HookEvent::Message(ev))
            }
            HookEvent::Usage(ev) => {
                for plugin in &self.plugins {
                    plugin.usage(ctx, &ev).await.map_err(|e| failed(plugin.as_ref(), e))?;
                }
                Ok(HookEvent::Usage(ev))
            }
        }
    }

    // ── Typed wrappers used by the query loop ──

    pub async fn context(
        &self,
        ctx: &PluginContext,
        acc: QueryContext,
    ) -> Result<QueryContext, PluginError> {
        match self.apply(ctx, HookEvent::Context(acc), HookMode::SeriesMerge).await? {
            HookEvent::Context(out) => Ok(out),
            other => Err(unexpected(other)),
        }
    }

    pub async fn system_prompt(
        &self,
        ctx: &PluginContext,
        acc: String,
    ) -> Result<String, PluginError> {
        match self.apply(ctx, HookEvent::SystemPrompt(acc), HookMode::SeriesMerge).await? {
            HookEvent::SystemPrompt(out) => Ok(out),
            other => Err(unexpected(other)),
        }
    }

    pub async fn query_start(
        &self,
        ctx: &PluginContext,
        event: QueryStartEvent,
    ) -> Result<(), PluginError> {
        self.apply(ctx, HookEvent::QueryStart(event), HookMode::Series).await.map(drop)
    }

    pub async fn query_end(
        &self,
        ctx: &PluginContext,
        event: QueryEndEvent,
    ) -> Result<(), PluginError> {
        self.apply(ctx, HookEvent::QueryEnd(Box::new(event)), HookMode::Series)
            .await
            .map(drop)
    }

    pub async fn tool_start(
        &self,
        ctx: &PluginContext,
        event: ToolStartEvent,
    ) -> Result<(), PluginError> {
        self.apply(ctx, HookEvent::ToolStart(event), HookMode::Series).await.map(drop)
    }

    pub async fn tool_end(&self, ctx: &PluginContext, event: ToolEndEvent) -> Result<(), PluginError> {
        self.apply(ctx, HookEvent::ToolEnd(event), HookMode::Series).await.map(drop)
    }

    pub async fn message(&self, ctx: &PluginContext, event: MessageEvent) -> Result<(), PluginError> {
        self.apply(ctx, HookEvent::Message(event), HookMode::Series).await.map(drop)
    }

    pub async fn usage(&self, ctx: &PluginContext, event: UsageEvent) -> Result<(), PluginError> {
        self.apply(ctx, HookEvent::Usage(event), HookMode::Series).await.map(drop)
    }
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookBus").field("plugins", &self.names()).finish()
    }
}

fn failed(plugin: &dyn Plugin, err: PluginError) -> PluginError {
    warn!(plugin = plugin.name(), hook = %err.hook, error = %err.reason, "Plugin hook failed");
    err
}

fn unexpected(event: HookEvent) -> PluginError {
    PluginError::new("hook-bus", event.hook().as_str(), "dispatch returned a different hook")
}
