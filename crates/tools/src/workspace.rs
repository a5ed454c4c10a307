//! Workspace confinement for file tools.
//!
//! Tool paths are resolved relative to the workspace root. When confinement
//! is on, a path must not contain `..` components and must resolve (after
//! following symlinks) to a location under the root.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use codeloop_core::error::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path traversal detected in '{path}'")]
    Traversal { path: String },

    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    ResolveFailed { path: String, reason: String },
}

/// The directory file tools operate in.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    confine: bool,
}

impl Workspace {
    /// A workspace that rejects paths escaping `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            confine: true,
        }
    }

    /// A workspace that only uses `root` to resolve relative paths.
    pub fn unconfined(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            confine: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_confined(&self) -> bool {
        self.confine
    }

    /// Resolve a tool-supplied path.
    ///
    /// The target need not exist (writes create files); the deepest existing
    /// ancestor is canonicalized and the rest appended.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathError> {
        let input = Path::new(path);
        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            self.root.join(input)
        };

        if !self.confine {
            return Ok(joined);
        }

        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathError::Traversal { path: path.into() });
        }

        let root = self.root.canonicalize().map_err(|e| PathError::ResolveFailed {
            path: self.root.display().to_string(),
            reason: e.to_string(),
        })?;
        let resolved = canonicalize_lenient(&joined).map_err(|e| PathError::ResolveFailed {
            path: path.into(),
            reason: e.to_string(),
        })?;

        if !resolved.starts_with(&root) {
            return Err(PathError::OutsideWorkspace { path: path.into() });
        }
        Ok(resolved)
    }

    /// [`resolve`](Self::resolve), reported as a tool permission error.
    pub fn check(&self, tool_name: &str, path: &str) -> Result<PathBuf, ToolError> {
        self.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        })
    }

    /// Render `path` relative to the root when it lies under it.
    pub fn display(&self, path: &Path) -> String {
        let canonical_root = self.root.canonicalize().ok();
        let relative = canonical_root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .or_else(|| path.strip_prefix(&self.root).ok());
        match relative {
            Some(rel) if rel.as_os_str().is_empty() => ".".into(),
            Some(rel) => rel.display().to_string(),
            None => path.display().to_string(),
        }
    }
}

/// Canonicalize the deepest existing ancestor and re-append the remainder.
fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut rest: Vec<OsString> = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut canonical = existing.canonicalize()?;
    for name in rest.iter().rev() {
        canonical.push(name);
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let ws = Workspace::new(dir.path());

        let resolved = ws.resolve("a.txt").unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap().join("a.txt"));
        assert_eq!(ws.display(&resolved), "a.txt");
    }

    #[test]
    fn missing_nested_targets_are_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let resolved = ws.resolve("new/deeper/file.rs").unwrap();
        assert!(resolved.ends_with("new/deeper/file.rs"));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(matches!(ws.resolve("../etc/passwd"), Err(PathError::Traversal { .. })));
        assert!(matches!(ws.resolve("src/../../x"), Err(PathError::Traversal { .. })));
    }

    #[test]
    fn absolute_paths_outside_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let outside = other.path().join("x.txt");
        assert!(matches!(
            ws.resolve(outside.to_str().unwrap()),
            Err(PathError::OutsideWorkspace { .. })
        ));
    }

    #[test]
    fn unconfined_workspace_only_joins() {
        let ws = Workspace::unconfined("/project");
        assert_eq!(ws.resolve("../x").unwrap(), PathBuf::from("/project/../x"));
    }

    #[test]
    fn check_maps_to_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(matches!(
            ws.check("read", "../x"),
            Err(ToolError::PermissionDenied { ref tool_name, .. }) if tool_name == "read"
        ));
    }
}
