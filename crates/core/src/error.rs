//! Error types for the codeloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; [`Error`] is what a
//! query run ultimately fails with.

use thiserror::Error;

/// The top-level error type for all codeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Protocol errors (model output we cannot interpret) ---
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Model adapter errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Plugin errors ---
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    // --- Context collection errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Run preconditions and limits ---
    #[error("A query needs a prompt or at least one message")]
    MissingInput,

    #[error("Query exceeded the maximum of {rounds} model rounds")]
    MaxRoundsExceeded { rounds: u32 },

    #[error("Query was cancelled")]
    Cancelled,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// The model broke the tool-use grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed tool use: {0}")]
    MalformedToolUse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Model adapter not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

impl ToolError {
    /// Whether this error happened while running an executor, as opposed to
    /// resolving or registering a tool.
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ExecutionFailed { .. }
                | Self::InvalidArguments(_)
                | Self::PermissionDenied { .. }
        )
    }
}

/// A plugin handler failed. Plugin errors abort the hook dispatch and the run.
#[derive(Debug, Clone, Error)]
#[error("plugin '{plugin}' failed in hook '{hook}': {reason}")]
pub struct PluginError {
    pub plugin: String,
    pub hook: String,
    pub reason: String,
}

impl PluginError {
    pub fn new(
        plugin: impl Into<String>,
        hook: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to collect context '{name}': {reason}")]
    CollectFailed { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Timeout {
            tool_name: "bash".into(),
            timeout_ms: 50,
        });
        assert!(err.to_string().contains("bash"));
        assert!(err.to_string().contains("50ms"));
    }

    #[test]
    fn execution_errors_are_classified() {
        assert!(ToolError::InvalidArguments("x".into()).is_execution_error());
        assert!(
            ToolError::Timeout {
                tool_name: "t".into(),
                timeout_ms: 1
            }
            .is_execution_error()
        );
        assert!(!ToolError::NotFound("t".into()).is_execution_error());
        assert!(!ToolError::DuplicateName("t".into()).is_execution_error());
    }

    #[test]
    fn plugin_error_names_plugin_and_hook() {
        let err = PluginError::new("session", "query_start", "disk full");
        let text = err.to_string();
        assert!(text.contains("session"));
        assert!(text.contains("query_start"));
        assert!(text.contains("disk full"));
    }
}
