//! Built-in context providers.
//!
//! Each provider contributes named blocks to the run's
//! [`QueryContext`]. [`CompositeContextProvider`] runs a list of them and
//! merges the results; a provider that fails contributes nothing.
//!
//! | Provider | Block names |
//! |----------|-------------|
//! | [`GitStatusProvider`] | `gitStatus` |
//! | [`DirectoryProvider`] | `directoryStructure` |
//! | [`ProjectFilesProvider`] | `readme`, `agents`, `contributing` |
//! | [`FileMentionProvider`] | `file:<path>` per `@path` in the prompt |

pub mod directory;
pub mod git;
pub mod mentions;
pub mod project;

use std::sync::Arc;

use async_trait::async_trait;
use codeloop_core::context::{ContextProvider, ContextRequest, QueryContext};
use codeloop_core::error::ContextError;
use tracing::debug;

pub use directory::DirectoryProvider;
pub use git::GitStatusProvider;
pub use mentions::FileMentionProvider;
pub use project::ProjectFilesProvider;

/// Runs several providers in order and merges their blocks.
#[derive(Default)]
pub struct CompositeContextProvider {
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl CompositeContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn push(&mut self, provider: Arc<dyn ContextProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl ContextProvider for CompositeContextProvider {
    fn name(&self) -> &str {
        "composite"
    }

    async fn collect(&self, request: &ContextRequest) -> Result<QueryContext, ContextError> {
        let mut merged = QueryContext::new();
        for provider in &self.providers {
            match provider.collect(request).await {
                Ok(blocks) => {
                    debug!(provider = provider.name(), blocks = blocks.len(), "Collected context");
                    merged.extend(blocks);
                }
                Err(e) => {
                    debug!(provider = provider.name(), error = %e, "Context provider skipped");
                }
            }
        }
        Ok(merged)
    }
}

/// Cut `text` to at most `max_bytes` on a char boundary, marking the cut.
pub(crate) fn truncate_to(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated)", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, &'static str);

    #[async_trait]
    impl ContextProvider for Fixed {
        fn name(&self) -> &str { self.0 }
        async fn collect(&self, _request: &ContextRequest) -> Result<QueryContext, ContextError> {
            Ok([(self.0, self.1)].into_iter().collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl ContextProvider for Failing {
        fn name(&self) -> &str { "failing" }
        async fn collect(&self, _request: &ContextRequest) -> Result<QueryContext, ContextError> {
            Err(ContextError::CollectFailed { name: "failing".into(), reason: "nope".into() })
        }
    }

    #[tokio::test]
    async fn composite_merges_and_skips_failures() {
        let provider = CompositeContextProvider::new()
            .with_provider(Arc::new(Fixed("a", "1")))
            .with_provider(Arc::new(Failing))
            .with_provider(Arc::new(Fixed("b", "2")));

        let ctx = provider.collect(&ContextRequest::default()).await.unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("a"), Some("1"));
        assert_eq!(ctx.get("b"), Some("2"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_to("short", 10), "short");
        let cut = truncate_to("ééé", 3);
        assert_eq!(cut, "é\n... (truncated)");
    }
}
