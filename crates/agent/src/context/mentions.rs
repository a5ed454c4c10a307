//! Files referenced in the prompt with `@path`.

use std::path::Path;

use async_trait::async_trait;
use codeloop_core::context::{ContextProvider, ContextRequest, QueryContext};
use codeloop_core::error::ContextError;
use tracing::debug;

use super::truncate_to;

/// Adds a `file:<path>` block for every `@path` token in the prompt that
/// names a readable file under the working directory.
#[derive(Debug, Clone)]
pub struct FileMentionProvider {
    max_bytes: usize,
}

impl FileMentionProvider {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for FileMentionProvider {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

/// Extract `@path` tokens, trailing punctuation stripped, duplicates removed.
pub fn mentioned_paths(prompt: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for token in prompt.split_whitespace() {
        let Some(raw) = token.strip_prefix('@') else {
            continue;
        };
        let path = raw.trim_end_matches([',', '.', ';', ':', ')', '!', '?', '\'', '"']);
        if path.is_empty() || paths.iter().any(|p| p == path) {
            continue;
        }
        paths.push(path.to_string());
    }
    paths
}

#[async_trait]
impl ContextProvider for FileMentionProvider {
    fn name(&self) -> &str {
        "file-mentions"
    }

    async fn collect(&self, request: &ContextRequest) -> Result<QueryContext, ContextError> {
        let mut ctx = QueryContext::new();
        let Some(prompt) = request.prompt.as_deref() else {
            return Ok(ctx);
        };

        for path in mentioned_paths(prompt) {
            if Path::new(&path).is_absolute() || path.split('/').any(|part| part == "..") {
                debug!(path = %path, "Ignoring mention outside the working directory");
                continue;
            }
            match tokio::fs::read_to_string(request.cwd.join(&path)).await {
                Ok(content) => {
                    ctx.insert(format!("file:{path}"), truncate_to(&content, self.max_bytes));
                }
                Err(e) => debug!(path = %path, error = %e, "Mentioned file not readable"),
            }
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mentions() {
        assert_eq!(
            mentioned_paths("Look at @src/lib.rs, then @README.md. Also @src/lib.rs and mail@example"),
            vec!["src/lib.rs", "README.md"]
        );
        assert!(mentioned_paths("no mentions @ here").is_empty());
    }

    #[tokio::test]
    async fn reads_mentioned_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "remember the milk").unwrap();

        let request = ContextRequest {
            cwd: dir.path().to_path_buf(),
            prompt: Some("Summarise @notes.txt and @missing.txt".into()),
        };
        let ctx = FileMentionProvider::default().collect(&request).await.unwrap();

        assert_eq!(ctx.get("file:notes.txt"), Some("remember the milk"));
        assert_eq!(ctx.len(), 1);
    }

    #[tokio::test]
    async fn escaping_mentions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let request = ContextRequest {
            cwd: dir.path().to_path_buf(),
            prompt: Some("read @../secret and @/etc/hostname".into()),
        };
        let ctx = FileMentionProvider::default().collect(&request).await.unwrap();
        assert!(ctx.is_empty());
    }
}
