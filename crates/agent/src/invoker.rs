//! Tool dispatch with timeout and lifecycle hooks.

use std::time::{Duration, Instant};

use chrono::Utc;
use codeloop_core::error::{Error, ToolError};
use codeloop_core::plugin::{PluginContext, ToolEndEvent, ToolOutcome, ToolStartEvent};
use codeloop_core::tool::{ToolInvocationRequest, ToolRegistry, ToolResult};
use tracing::{debug, info, warn};

use crate::hooks::HookBus;

/// Per-call tool timeout used when none is configured.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Resolves and executes one tool invocation.
///
/// `tool_start` fires before execution and `tool_end` after it on every
/// outcome, so observers always see a matched pair once a tool started.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn invoke(
        &self,
        registry: &ToolRegistry,
        request: &ToolInvocationRequest,
        hooks: &HookBus,
        ctx: &PluginContext,
    ) -> Result<ToolResult, Error> {
        let tool = registry.resolve(&request.tool_name)?;

        hooks
            .tool_start(
                ctx,
                ToolStartEvent {
                    tool_name: request.tool_name.clone(),
                    arguments: request.arguments.clone(),
                },
            )
            .await?;

        let start_time = Utc::now();
        let started = Instant::now();
        debug!(tool = %request.tool_name, timeout_ms = self.timeout.as_millis() as u64, "Executing tool");

        let result = match tokio::time::timeout(self.timeout, tool.execute(request.arguments_value())).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool_name: request.tool_name.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => {
                info!(tool = %request.tool_name, duration_ms, "Tool completed");
                ToolOutcome::Success
            }
            Err(ToolError::Timeout { .. }) => {
                warn!(tool = %request.tool_name, duration_ms, "Tool timed out");
                ToolOutcome::TimedOut
            }
            Err(e) => {
                warn!(tool = %request.tool_name, duration_ms, error = %e, "Tool failed");
                ToolOutcome::Failed
            }
        };

        hooks
            .tool_end(
                ctx,
                ToolEndEvent {
                    tool_name: request.tool_name.clone(),
                    start_time,
                    end_time: Utc::now(),
                    outcome,
                },
            )
            .await?;

        result.map_err(Error::from)
    }
}

impl Default for ToolInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use codeloop_core::error::PluginError;
    use codeloop_core::plugin::Plugin;
    use codeloop_core::tool::Tool;
    use serde_json::{Map, Value, json};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echo the text argument" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(ToolResult::Text(text.to_string()))
        }
    }

    struct Hang;

    #[async_trait]
    impl Tool for Hang {
        fn name(&self) -> &str { "hang" }
        fn description(&self) -> &str { "Never finishes" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
            std::future::pending().await
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str { "broken" }
        fn description(&self) -> &str { "Always fails" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed { tool_name: "broken".into(), reason: "disk on fire".into() })
        }
    }

    #[derive(Default)]
    struct Outcomes(Mutex<Vec<String>>);

    #[async_trait]
    impl Plugin for Outcomes {
        fn name(&self) -> &str { "outcomes" }

        async fn tool_start(&self, _ctx: &PluginContext, event: &ToolStartEvent) -> Result<(), PluginError> {
            self.0.lock().unwrap().push(format!("start:{}", event.tool_name));
            Ok(())
        }

        async fn tool_end(&self, _ctx: &PluginContext, event: &ToolEndEvent) -> Result<(), PluginError> {
            assert!(event.end_time >= event.start_time);
            self.0.lock().unwrap().push(format!("end:{}:{:?}", event.tool_name, event.outcome));
            Ok(())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo)).unwrap();
        registry.register(Box::new(Hang)).unwrap();
        registry.register(Box::new(Broken)).unwrap();
        registry
    }

    fn ctx() -> PluginContext {
        PluginContext::new("run", PathBuf::from("."), "m")
    }

    fn request(name: &str, args: Value) -> ToolInvocationRequest {
        let arguments = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolInvocationRequest::new(name, arguments)
    }

    #[tokio::test]
    async fn executes_and_reports_success() {
        let outcomes = Arc::new(Outcomes::default());
        let hooks = HookBus::new().with_plugin(outcomes.clone());
        let result = ToolInvoker::default()
            .invoke(&registry(), &request("echo", json!({"text": "hi"})), &hooks, &ctx())
            .await
            .unwrap();

        assert_eq!(result.to_text(), "hi");
        assert_eq!(*outcomes.0.lock().unwrap(), vec!["start:echo", "end:echo:Success"]);
    }

    #[tokio::test]
    async fn hanging_tool_times_out() {
        let outcomes = Arc::new(Outcomes::default());
        let hooks = HookBus::new().with_plugin(outcomes.clone());
        let invoker = ToolInvoker::new(Duration::from_millis(50));

        let started = Instant::now();
        let err = invoker
            .invoke(&registry(), &request("hang", json!({})), &hooks, &ctx())
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(
            err,
            Error::Tool(ToolError::Timeout { ref tool_name, timeout_ms: 50 }) if tool_name == "hang"
        ));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
        assert_eq!(*outcomes.0.lock().unwrap(), vec!["start:hang", "end:hang:TimedOut"]);
    }

    #[tokio::test]
    async fn failure_still_fires_tool_end() {
        let outcomes = Arc::new(Outcomes::default());
        let hooks = HookBus::new().with_plugin(outcomes.clone());
        let err = ToolInvoker::default()
            .invoke(&registry(), &request("broken", json!({})), &hooks, &ctx())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(*outcomes.0.lock().unwrap(), vec!["start:broken", "end:broken:Failed"]);
    }

    #[tokio::test]
    async fn unknown_tool_fires_no_hooks() {
        let outcomes = Arc::new(Outcomes::default());
        let hooks = HookBus::new().with_plugin(outcomes.clone());
        let err = ToolInvoker::default()
            .invoke(&registry(), &request("nope", json!({})), &hooks, &ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tool(ToolError::NotFound(ref name)) if name == "nope"));
        assert!(outcomes.0.lock().unwrap().is_empty());
    }
}
