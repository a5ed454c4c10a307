//! Git repository snapshot: branch, short status and recent commits.

use std::path::Path;

use async_trait::async_trait;
use codeloop_core::context::{ContextProvider, ContextRequest, QueryContext};
use codeloop_core::error::ContextError;
use tokio::process::Command;

pub const GIT_STATUS_BLOCK: &str = "gitStatus";

/// Collects `gitStatus` by shelling out to `git`.
#[derive(Debug, Clone)]
pub struct GitStatusProvider {
    recent_commits: usize,
    max_status_lines: usize,
}

impl GitStatusProvider {
    pub fn new() -> Self {
        Self {
            recent_commits: 5,
            max_status_lines: 50,
        }
    }

    pub fn with_recent_commits(mut self, n: usize) -> Self {
        self.recent_commits = n;
        self
    }
}

impl Default for GitStatusProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextProvider for GitStatusProvider {
    fn name(&self) -> &str {
        "git"
    }

    async fn collect(&self, request: &ContextRequest) -> Result<QueryContext, ContextError> {
        let cwd = request.cwd.as_path();
        let branch = git(cwd, &["branch", "--show-current"]).await?;
        let status = git(cwd, &["status", "--short"]).await?;
        let count = self.recent_commits.to_string();
        // A fresh repository has no commits; that is not a failure.
        let log = git(cwd, &["log", "--oneline", "-n", &count])
            .await
            .unwrap_or_default();

        let branch = match branch.trim() {
            "" => "(detached HEAD)",
            name => name,
        };
        let mut block = format!("Current branch: {branch}\n\nStatus:\n");
        let lines: Vec<&str> = status.lines().collect();
        if lines.is_empty() {
            block.push_str("(clean)\n");
        } else {
            for line in lines.iter().take(self.max_status_lines) {
                block.push_str(line);
                block.push('\n');
            }
            if lines.len() > self.max_status_lines {
                block.push_str(&format!(
                    "... and {} more\n",
                    lines.len() - self.max_status_lines
                ));
            }
        }

        if !log.trim().is_empty() {
            block.push_str("\nRecent commits:\n");
            block.push_str(log.trim_end());
            block.push('\n');
        }

        let mut ctx = QueryContext::new();
        ctx.insert(GIT_STATUS_BLOCK, block);
        Ok(ctx)
    }
}

async fn git(cwd: &Path, args: &[&str]) -> Result<String, ContextError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;

    if !output.status.success() {
        return Err(ContextError::CollectFailed {
            name: GIT_STATUS_BLOCK.into(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
