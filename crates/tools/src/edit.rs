//! Edit tool: exact search-and-replace in an existing file.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::workspace::Workspace;
use crate::{execution_failed, parse_input};

const TOOL_NAME: &str = "edit";

/// Replaces `old_string` with `new_string`. The match must be unique unless
/// `replace_all` is set.
pub struct EditTool {
    workspace: Workspace,
}

impl EditTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct EditInput {
    path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Replace exact text in an existing file. old_string must match exactly once \
         (include surrounding lines to disambiguate) unless replace_all is true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to find"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: EditInput = parse_input(arguments)?;
        if input.old_string.is_empty() {
            return Err(ToolError::InvalidArguments("old_string must not be empty".into()));
        }
        if input.old_string == input.new_string {
            return Err(ToolError::InvalidArguments(
                "old_string and new_string are identical".into(),
            ));
        }

        let path = self.workspace.check(TOOL_NAME, &input.path)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| execution_failed(TOOL_NAME, format!("{}: {e}", input.path)))?;

        let count = content.matches(input.old_string.as_str()).count();
        match count {
            0 => {
                return Err(execution_failed(
                    TOOL_NAME,
                    format!("old_string not found in {}", input.path),
                ));
            }
            n if n > 1 && !input.replace_all => {
                return Err(execution_failed(
                    TOOL_NAME,
                    format!(
                        "old_string matches {n} times in {}; add surrounding context or set replace_all",
                        input.path
                    ),
                ));
            }
            _ => {}
        }

        let updated = if input.replace_all {
            content.replace(&input.old_string, &input.new_string)
        } else {
            content.replacen(&input.old_string, &input.new_string, 1)
        };
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| execution_failed(TOOL_NAME, format!("{}: {e}", input.path)))?;

        let plural = if count == 1 { "" } else { "s" };
        Ok(ToolResult::Text(format!(
            "Edited {}: {count} replacement{plural}",
            self.workspace.display(&path)
        )))
    }
}
