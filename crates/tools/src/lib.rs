//! Built-in tool implementations for codeloop.
//!
//! Tools give the agent the ability to act on a project: read, write and
//! edit files, run shell commands, and search the tree. Every path is
//! resolved through a [`Workspace`], which can confine tools to the
//! project root.

pub mod bash;
pub mod edit;
pub mod glob_tool;
pub mod grep;
pub mod ls;
pub mod read;
pub mod workspace;
pub mod write;

use std::fmt::Display;
use std::path::PathBuf;

use codeloop_config::ToolsConfig;
use codeloop_core::error::ToolError;
use codeloop_core::tool::ToolRegistry;
use serde::de::DeserializeOwned;

pub use bash::BashTool;
pub use edit::EditTool;
pub use glob_tool::GlobTool;
pub use grep::GrepTool;
pub use ls::LsTool;
pub use read::ReadTool;
pub use workspace::{PathError, Workspace};
pub use write::WriteTool;

/// Directories never descended into by search tools.
pub(crate) const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "dist", "build"];

/// Create the built-in tool registry rooted at `root`.
///
/// Registration order is fixed so the prompt catalogue is stable:
/// read, write, edit, bash (unless disabled), grep, glob, ls.
pub fn default_registry(
    config: &ToolsConfig,
    root: impl Into<PathBuf>,
) -> Result<ToolRegistry, ToolError> {
    let workspace = if config.workspace_only {
        Workspace::new(root)
    } else {
        Workspace::unconfined(root)
    };

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadTool::new(workspace.clone())))?;
    registry.register(Box::new(WriteTool::new(workspace.clone())))?;
    registry.register(Box::new(EditTool::new(workspace.clone())))?;
    if config.shell {
        registry.register(Box::new(BashTool::new(
            workspace.clone(),
            config.allowed_commands.clone(),
        )))?;
    }
    registry.register(Box::new(GrepTool::new(workspace.clone())))?;
    registry.register(Box::new(GlobTool::new(workspace.clone())))?;
    registry.register(Box::new(LsTool::new(workspace)))?;
    Ok(registry)
}

/// Deserialize tool arguments into a typed input struct.
pub(crate) fn parse_input<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub(crate) fn execution_failed(tool_name: &str, reason: impl Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: reason.to_string(),
    }
}

/// A NUL byte in the first 8 KiB marks a file as binary.
pub(crate) fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}
