//! Directory listing of the working tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use codeloop_core::context::{ContextProvider, ContextRequest, QueryContext};
use codeloop_core::error::ContextError;

pub const DIRECTORY_BLOCK: &str = "directoryStructure";

/// Collects `directoryStructure`: an indented, sorted tree of the working
/// directory, hidden entries skipped, capped at `max_entries` lines.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    max_entries: usize,
}

impl DirectoryProvider {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }
}

impl Default for DirectoryProvider {
    fn default() -> Self {
        Self::new(200)
    }
}

#[async_trait]
impl ContextProvider for DirectoryProvider {
    fn name(&self) -> &str {
        "directory"
    }

    async fn collect(&self, request: &ContextRequest) -> Result<QueryContext, ContextError> {
        let mut lines = Vec::new();
        let mut truncated = false;

        // Depth-first with an explicit stack; children pushed in reverse so
        // they pop in sorted order.
        let mut stack: Vec<(PathBuf, usize)> = Vec::new();
        for entry in sorted_children(&request.cwd).await?.into_iter().rev() {
            stack.push((entry, 0));
        }

        while let Some((path, depth)) = stack.pop() {
            if lines.len() >= self.max_entries {
                truncated = true;
                break;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let is_dir = tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false);
            let indent = "  ".repeat(depth);

            if is_dir {
                lines.push(format!("{indent}{name}/"));
                // Unreadable subdirectories are listed but not descended.
                if let Ok(children) = sorted_children(&path).await {
                    for child in children.into_iter().rev() {
                        stack.push((child, depth + 1));
                    }
                }
            } else {
                lines.push(format!("{indent}{name}"));
            }
        }

        let mut block = lines.join("\n");
        if truncated {
            block.push_str(&format!("\n... (truncated after {} entries)", self.max_entries));
        }
        if block.is_empty() {
            block.push_str("(empty directory)");
        }

        let mut ctx = QueryContext::new();
        ctx.insert(DIRECTORY_BLOCK, block);
        Ok(ctx)
    }
}

async fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, ContextError> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        children.push(entry.path());
    }
    children.sort();
    Ok(children)
}
