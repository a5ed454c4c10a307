//! Ls tool: list a directory.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::workspace::Workspace;
use crate::{execution_failed, parse_input};

const TOOL_NAME: &str = "ls";

pub struct LsTool {
    workspace: Workspace,
}

impl LsTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize, Default)]
struct LsInput {
    path: Option<String>,
    #[serde(default)]
    all: bool,
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "List the entries of a directory, one per line. Directories end with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the project root (default: root)"
                },
                "all": {
                    "type": "boolean",
                    "description": "Include hidden entries"
                }
            }
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: LsInput = parse_input(arguments)?;
        let requested = input.path.as_deref().unwrap_or(".");
        let dir = self.workspace.check(TOOL_NAME, requested)?;

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| execution_failed(TOOL_NAME, format!("{requested}: {e}")))?;

        let mut names = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| execution_failed(TOOL_NAME, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !input.all && name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            names.push(if is_dir { format!("{name}/") } else { name });
        }
        names.sort();

        if names.is_empty() {
            return Ok(ToolResult::Text("(empty directory)".into()));
        }
        Ok(ToolResult::Text(names.join("\n")))
    }
}
