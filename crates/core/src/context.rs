//! Query context: named text blocks rendered into the system prompt.
//!
//! Context is collected once per run (git status, directory listing,
//! project docs, referenced files) and is read-only afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ContextError;

/// Mapping of context-block name to block content.
///
/// Backed by a `BTreeMap` so rendering order never depends on collection
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryContext(BTreeMap<String, String>);

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block, replacing any previous block with the same name.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.0.insert(name.into(), content.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Merge another context into this one; `other` wins on name clashes.
    pub fn extend(&mut self, other: QueryContext) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// What a context provider gets to look at.
#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    /// Working directory of the run
    pub cwd: PathBuf,

    /// The prompt that started the run, if any
    pub prompt: Option<String>,
}

/// A source of context blocks (git info, directory listing, file contents).
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Collect this provider's blocks.
    async fn collect(&self, request: &ContextRequest) -> Result<QueryContext, ContextError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_sorted_by_name() {
        let mut ctx = QueryContext::new();
        ctx.insert("readme", "r");
        ctx.insert("gitStatus", "g");
        ctx.insert("directoryStructure", "d");
        let names: Vec<&str> = ctx.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["directoryStructure", "gitStatus", "readme"]);
    }

    #[test]
    fn extend_overrides_existing_blocks() {
        let mut ctx: QueryContext = [("a", "1"), ("b", "2")].into_iter().collect();
        ctx.extend([("b", "3")].into_iter().collect());
        assert_eq!(ctx.get("b"), Some("3"));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn serializes_as_plain_map() {
        let ctx: QueryContext = [("k", "v")].into_iter().collect();
        assert_eq!(serde_json::to_string(&ctx).unwrap(), r#"{"k":"v"}"#);
    }
}
