//! Grep tool: regex search over workspace files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolResult};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::workspace::Workspace;
use crate::{SKIPPED_DIRS, execution_failed, is_binary, parse_input};

const TOOL_NAME: &str = "grep";
const MAX_MATCHES: usize = 200;
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Search file contents with a regular expression.
///
/// Matches are reported as `path:line:text`, with paths relative to the
/// workspace root. Hidden entries and build directories are skipped.
pub struct GrepTool {
    workspace: Workspace,
}

impl GrepTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct GrepInput {
    pattern: String,
    path: Option<String>,
    include: Option<String>,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Returns matching lines as path:line:text. \
         Narrow the search with a directory path or an include glob such as \"*.rs\"."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search (default: project root)"
                },
                "include": {
                    "type": "string",
                    "description": "Glob applied to file names, e.g. \"*.rs\""
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: GrepInput = parse_input(arguments)?;
        let regex = Regex::new(&input.pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex: {e}")))?;
        let include = input
            .include
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid include glob: {e}")))?;

        let start = self
            .workspace
            .check(TOOL_NAME, input.path.as_deref().unwrap_or("."))?;
        let workspace = self.workspace.clone();

        let lines = tokio::task::spawn_blocking(move || {
            search(&workspace, &start, &regex, include.as_ref())
        })
        .await
        .map_err(|e| execution_failed(TOOL_NAME, e))?;

        if lines.is_empty() {
            return Ok(ToolResult::Text("No matches found".into()));
        }
        let mut out = lines.join("\n");
        if lines.len() >= MAX_MATCHES {
            out.push_str(&format!("\n... (stopped after {MAX_MATCHES} matches)"));
        }
        Ok(ToolResult::Text(out))
    }
}

fn search(
    workspace: &Workspace,
    start: &Path,
    regex: &Regex,
    include: Option<&glob::Pattern>,
) -> Vec<String> {
    let mut matches = Vec::new();
    let mut stack: Vec<PathBuf> = vec![start.to_path_buf()];

    while let Some(path) = stack.pop() {
        if path.is_dir() {
            let Ok(entries) = std::fs::read_dir(&path) else {
                continue;
            };
            let mut children: Vec<PathBuf> = entries
                .flatten()
                .filter(|e| {
                    let name = e.file_name();
                    let name = name.to_string_lossy();
                    !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
                })
                .map(|e| e.path())
                .collect();
            // Reverse so the stack pops in sorted order.
            children.sort();
            stack.extend(children.into_iter().rev());
            continue;
        }

        if let Some(pattern) = include {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if !pattern.matches(&name) {
                continue;
            }
        }
        if std::fs::metadata(&path).map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        if is_binary(&bytes) {
            continue;
        }

        let text = String::from_utf8_lossy(&bytes);
        let display = workspace.display(&path);
        for (idx, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!("{display}:{}:{}", idx + 1, line.trim_end()));
                if matches.len() >= MAX_MATCHES {
                    return matches;
                }
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, GrepTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn run() {}\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "run the tests\n").unwrap();
        std::fs::write(dir.path().join("target/out.rs"), "fn run() {}\n").unwrap();
        let tool = GrepTool::new(Workspace::new(dir.path()));
        (dir, tool)
    }

    #[tokio::test]
    async fn finds_matches_in_sorted_order() {
        let (_dir, tool) = setup();
        let out = tool.execute(json!({"pattern": "run"})).await.unwrap().to_text();
        assert_eq!(
            out,
            "notes.md:1:run the tests\nsrc/lib.rs:1:pub fn run() {}\nsrc/main.rs:2:    run();"
        );
    }

    #[tokio::test]
    async fn include_glob_filters_files() {
        let (_dir, tool) = setup();
        let out = tool
            .execute(json!({"pattern": "run", "include": "*.md"}))
            .await
            .unwrap()
            .to_text();
        assert_eq!(out, "notes.md:1:run the tests");
    }

    #[tokio::test]
    async fn path_narrows_search() {
        let (_dir, tool) = setup();
        let out = tool
            .execute(json!({"pattern": "fn main", "path": "src"}))
            .await
            .unwrap()
            .to_text();
        assert_eq!(out, "src/main.rs:1:fn main() {");
    }

    #[tokio::test]
    async fn no_matches() {
        let (_dir, tool) = setup();
        let out = tool.execute(json!({"pattern": "zzz"})).await.unwrap();
        assert_eq!(out.to_text(), "No matches found");
    }

    #[tokio::test]
    async fn invalid_regex_is_rejected() {
        let (_dir, tool) = setup();
        let err = tool.execute(json!({"pattern": "("})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
