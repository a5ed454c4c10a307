//! Bash tool: execute shell commands in the workspace.
//!
//! Supports command allowlisting. The invoker's timeout bounds execution;
//! the child is killed when the future is dropped.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::workspace::Workspace;
use crate::{execution_failed, parse_input};

const TOOL_NAME: &str = "bash";
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Execute shell commands with the workspace root as working directory.
pub struct BashTool {
    workspace: Workspace,
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
}

impl BashTool {
    pub fn new(workspace: Workspace, allowed_commands: Vec<String>) -> Self {
        Self {
            workspace,
            allowed_commands,
        }
    }

    fn base_command(command: &str) -> &str {
        command.split_whitespace().next().unwrap_or("")
    }

    /// Checks the program of every chained segment against the allowlist.
    ///
    /// Returns the first offending program (or construct) on refusal.
    fn disallowed_command<'a>(&self, command: &'a str) -> Option<&'a str> {
        if self.allowed_commands.is_empty() {
            return None;
        }
        // Substitutions and redirections can run or write anything.
        if let Some(construct) = UNCHECKED_CONSTRUCTS.iter().find(|c| command.contains(*c)) {
            return Some(*construct);
        }
        command
            .split(SEGMENT_SEPARATORS)
            .map(Self::base_command)
            .filter(|base| !base.is_empty())
            .find(|base| !self.allowed_commands.iter().any(|a| a == base))
    }

    #[cfg(test)]
    fn is_command_allowed(&self, command: &str) -> bool {
        self.disallowed_command(command).is_none()
    }
}

/// Characters that start a new command in `sh`: `;`, `&&`, `||`, `|`, `&`, newline.
const SEGMENT_SEPARATORS: [char; 4] = [';', '&', '|', '\n'];

const UNCHECKED_CONSTRUCTS: [&str; 4] = ["`", "$(", ">", "<"];

#[derive(Deserialize)]
struct BashInput {
    command: String,
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a shell command in the project root and return stdout/stderr. \
         Use this for builds, tests, git operations and other programs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: BashInput = parse_input(arguments)?;
        let command = input.command.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidArguments("command must not be empty".into()));
        }

        if let Some(denied) = self.disallowed_command(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: format!("Command '{denied}' not in allowlist"),
            });
        }

        debug!(command = %command, cwd = %self.workspace.root().display(), "Executing shell command");

        let output = Command::new("sh")
            .args(["-c", command])
            .current_dir(self.workspace.root())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| execution_failed(TOOL_NAME, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let text = if output.status.success() {
            if stderr.trim().is_empty() {
                stdout.to_string()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let text = text.trim();
        let text = if text.is_empty() {
            "(no output)".to_string()
        } else {
            truncate_chars(text, MAX_OUTPUT_CHARS)
        };
        Ok(ToolResult::Text(text))
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n... (output truncated)", &text[..cut]),
        None => text.to_string(),
    }
}
