//! Write tool: create or overwrite a file.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::workspace::Workspace;
use crate::{execution_failed, parse_input};

const TOOL_NAME: &str = "write";

pub struct WriteTool {
    workspace: Workspace,
}

impl WriteTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct WriteInput {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. Overwrites existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "The full file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: WriteInput = parse_input(arguments)?;
        let path = self.workspace.check(TOOL_NAME, &input.path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| execution_failed(TOOL_NAME, format!("{}: {e}", parent.display())))?;
        }

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        tokio::fs::write(&path, &input.content)
            .await
            .map_err(|e| execution_failed(TOOL_NAME, format!("{}: {e}", input.path)))?;

        debug!(path = %path.display(), bytes = input.content.len(), "Wrote file");
        let verb = if existed { "Overwrote" } else { "Created" };
        Ok(ToolResult::Text(format!(
            "{verb} {} ({} bytes)",
            self.workspace.display(&path),
            input.content.len()
        )))
    }
}
