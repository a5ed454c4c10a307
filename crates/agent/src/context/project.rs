//! Well-known project documents found at the working-directory root.

use async_trait::async_trait;
use codeloop_core::context::{ContextProvider, ContextRequest, QueryContext};
use codeloop_core::error::ContextError;

use super::truncate_to;

/// File name to block name.
const PROJECT_FILES: &[(&str, &str)] = &[
    ("README.md", "readme"),
    ("AGENTS.md", "agents"),
    ("CONTRIBUTING.md", "contributing"),
];

/// Collects the contents of README.md, AGENTS.md and CONTRIBUTING.md when
/// present. Missing files are simply absent from the result.
#[derive(Debug, Clone)]
pub struct ProjectFilesProvider {
    max_bytes: usize,
}

impl ProjectFilesProvider {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for ProjectFilesProvider {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

#[async_trait]
impl ContextProvider for ProjectFilesProvider {
    fn name(&self) -> &str {
        "project-files"
    }

    async fn collect(&self, request: &ContextRequest) -> Result<QueryContext, ContextError> {
        let mut ctx = QueryContext::new();
        for (file, block) in PROJECT_FILES {
            let path = request.cwd.join(file);
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            ctx.insert(*block, truncate_to(&content, self.max_bytes));
        }
        Ok(ctx)
    }
}
