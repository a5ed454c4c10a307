//! Glob tool: find files by path pattern.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::workspace::Workspace;
use crate::{SKIPPED_DIRS, execution_failed, parse_input};

const TOOL_NAME: &str = "glob";
const MAX_RESULTS: usize = 500;

pub struct GlobTool {
    workspace: Workspace,
}

impl GlobTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct GlobInput {
    pattern: String,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern relative to the project root, e.g. \"src/**/*.rs\"."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to the project root"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: GlobInput = parse_input(arguments)?;
        if self.workspace.is_confined()
            && (input.pattern.starts_with('/') || input.pattern.split('/').any(|s| s == ".."))
        {
            return Err(ToolError::PermissionDenied {
                tool_name: TOOL_NAME.into(),
                reason: format!("Pattern '{}' escapes the workspace", input.pattern),
            });
        }

        let workspace = self.workspace.clone();
        let pattern = input.pattern.clone();
        let matched = tokio::task::spawn_blocking(move || collect(&workspace, &pattern))
            .await
            .map_err(|e| execution_failed(TOOL_NAME, e))??;

        if matched.is_empty() {
            return Ok(ToolResult::Text(format!("No files match '{}'", input.pattern)));
        }
        let mut out = matched.join("\n");
        if matched.len() >= MAX_RESULTS {
            out.push_str(&format!("\n... (stopped after {MAX_RESULTS} results)"));
        }
        Ok(ToolResult::Text(out))
    }
}

fn collect(workspace: &Workspace, pattern: &str) -> Result<Vec<String>, ToolError> {
    let full = workspace.root().join(pattern);
    let entries = glob::glob(&full.to_string_lossy())
        .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))?;

    let mut matched = Vec::new();
    for path in entries.flatten() {
        let Ok(relative) = path.strip_prefix(workspace.root()) else {
            continue;
        };
        let skipped = relative.components().any(|c| {
            let part = c.as_os_str().to_string_lossy();
            part.starts_with('.') || SKIPPED_DIRS.contains(&part.as_ref())
        });
        if skipped {
            continue;
        }
        matched.push(relative.display().to_string());
    }
    matched.sort();
    matched.truncate(MAX_RESULTS);
    Ok(matched)
}
