//! Read tool: file contents with line numbers.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::workspace::Workspace;
use crate::{execution_failed, is_binary, parse_input};

const TOOL_NAME: &str = "read";
const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

pub struct ReadTool {
    workspace: Workspace,
}

impl ReadTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct ReadInput {
    path: String,
    /// 1-based first line
    offset: Option<usize>,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read a text file. Returns numbered lines. Use offset and limit to page through large files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the project root"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: ReadInput = parse_input(arguments)?;
        let path = self.workspace.check(TOOL_NAME, &input.path)?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| execution_failed(TOOL_NAME, format!("{}: {e}", input.path)))?;
        if metadata.is_dir() {
            return Err(execution_failed(
                TOOL_NAME,
                format!("{} is a directory; use ls instead", input.path),
            ));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| execution_failed(TOOL_NAME, format!("{}: {e}", input.path)))?;
        if is_binary(&bytes) {
            return Err(execution_failed(
                TOOL_NAME,
                format!("{} appears to be a binary file", input.path),
            ));
        }

        let text = String::from_utf8_lossy(&bytes);
        if text.is_empty() {
            return Ok(ToolResult::Text("(empty file)".into()));
        }

        let offset = input.offset.unwrap_or(1).max(1);
        let limit = input.limit.unwrap_or(DEFAULT_LINE_LIMIT).max(1);
        let total = text.lines().count();
        if offset > total {
            return Err(execution_failed(
                TOOL_NAME,
                format!("offset {offset} is past the end of the file ({total} lines)"),
            ));
        }

        let mut out = String::new();
        for (idx, line) in text.lines().enumerate().skip(offset - 1).take(limit) {
            let line = match line.char_indices().nth(MAX_LINE_CHARS) {
                Some((cut, _)) => format!("{}...", &line[..cut]),
                None => line.to_string(),
            };
            out.push_str(&format!("{:>6}\t{line}\n", idx + 1));
        }

        let shown_until = (offset - 1 + limit).min(total);
        if shown_until < total {
            out.push_str(&format!(
                "... ({} more lines; continue with offset {})",
                total - shown_until,
                shown_until + 1
            ));
        }
        Ok(ToolResult::Text(out.trim_end().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(content: &str) -> (tempfile::TempDir, ReadTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), content).unwrap();
        let tool = ReadTool::new(Workspace::new(dir.path()));
        (dir, tool)
    }

    #[test]
    fn tool_definition() {
        let (_dir, tool) = setup("");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], json!(["path"]));
        assert_eq!(tool.to_definition().name, "read");
    }

    #[tokio::test]
    async fn reads_numbered_lines() {
        let (_dir, tool) = setup("alpha\nbeta\n");
        let out = tool.execute(json!({"path": "notes.txt"})).await.unwrap();
        assert_eq!(out.to_text(), "     1\talpha\n     2\tbeta");
    }

    #[tokio::test]
    async fn pages_with_offset_and_limit() {
        let (_dir, tool) = setup("1\n2\n3\n4\n5\n");
        let out = tool
            .execute(json!({"path": "notes.txt", "offset": 2, "limit": 2}))
            .await
            .unwrap()
            .to_text();
        assert!(out.starts_with("     2\t2\n     3\t3\n"));
        assert!(out.ends_with("(2 more lines; continue with offset 4)"));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let (_dir, tool) = setup("");
        let err = tool.execute(json!({"path": "nope.txt"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn escaping_path_is_denied() {
        let (_dir, tool) = setup("");
        let err = tool.execute(json!({"path": "../secret"})).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_argument_is_invalid() {
        let (_dir, tool) = setup("");
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
