//! ToolContext - execution context for tools

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::scripts::ProcessSession;

use super::ToolError;

/// Execution context for tools - scoped to one scripts directory
///
/// All path resolution happens relative to `scripts_dir`, and paths that
/// resolve outside of it are rejected unless the sandbox is disabled.
#[derive(Clone)]
pub struct ToolContext {
    /// Scripts directory - all script paths are constrained here
    pub scripts_dir: PathBuf,

    /// Process session for calls that supersede each other
    pub session: Option<ProcessSession>,

    /// Whether sandbox mode is enabled (default: true)
    pub sandbox_enabled: bool,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(scripts_dir: PathBuf) -> Self {
        debug!(?scripts_dir, "ToolContext::new: called");
        Self {
            scripts_dir,
            session: None,
            sandbox_enabled: true,
        }
    }

    /// Create a context with sandbox disabled (for testing)
    pub fn new_unsandboxed(scripts_dir: PathBuf) -> Self {
        debug!(?scripts_dir, "ToolContext::new_unsandboxed: called");
        Self {
            scripts_dir,
            session: None,
            sandbox_enabled: false,
        }
    }

    /// Attach a process session; runs in the same session supersede each other
    pub fn with_session(mut self, session: ProcessSession) -> Self {
        debug!("ToolContext::with_session: called");
        self.session = Some(session);
        self
    }

    /// Normalize a path relative to the scripts directory
    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.scripts_dir.join(path)
        }
    }

    /// Validate path is within the scripts directory (sandbox enforcement)
    ///
    /// Containment is checked per path component on canonical paths, so a
    /// sibling such as `/scripts-old` never matches `/scripts`.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "ToolContext::validate_path: called");
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            debug!("ToolContext::validate_path: sandbox disabled, returning normalized path");
            return Ok(normalized);
        }

        // Existing paths are canonicalized to resolve symlinks; for new paths
        // only the parent can be resolved
        let canonical = if normalized.exists() {
            debug!("ToolContext::validate_path: path exists, canonicalizing");
            normalized.canonicalize()?
        } else {
            match (normalized.parent(), normalized.file_name()) {
                (Some(parent), Some(file_name)) if parent.exists() => {
                    debug!("ToolContext::validate_path: canonicalizing parent");
                    parent.canonicalize()?.join(file_name)
                }
                _ => {
                    debug!("ToolContext::validate_path: nothing to canonicalize");
                    normalized.clone()
                }
            }
        };

        let root_canonical = self
            .scripts_dir
            .canonicalize()
            .unwrap_or_else(|_| self.scripts_dir.clone());

        if canonical.starts_with(&root_canonical) {
            debug!("ToolContext::validate_path: path is within scripts directory");
            Ok(canonical)
        } else {
            debug!("ToolContext::validate_path: sandbox violation detected");
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                root: self.scripts_dir.clone(),
            })
        }
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("scripts_dir", &self.scripts_dir)
            .field("session", &self.session.is_some())
            .field("sandbox_enabled", &self.sandbox_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_path_within_scripts_dir() {
        let temp = tempdir().unwrap();
        let root = temp.path().to_path_buf();
        fs::write(root.join("foo.sak.py"), "print(1)").unwrap();

        let ctx = ToolContext::new(root);

        // Relative path should work
        let result = ctx.validate_path(Path::new("foo.sak.py"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_path_outside_scripts_dir() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(matches!(result, Err(ToolError::SandboxViolation { .. })));
    }

    #[test]
    fn test_validate_path_rejects_sibling_prefix() {
        let temp = tempdir().unwrap();
        let allowed = temp.path().join("allowed");
        let evil = temp.path().join("allowed-evil");
        fs::create_dir_all(&allowed).unwrap();
        fs::create_dir_all(&evil).unwrap();
        fs::write(evil.join("x.sak.py"), "").unwrap();

        let ctx = ToolContext::new(allowed);

        let result = ctx.validate_path(&evil.join("x.sak.py"));
        assert!(matches!(result, Err(ToolError::SandboxViolation { .. })));
    }

    #[test]
    fn test_validate_path_rejects_parent_traversal() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("scripts");
        fs::create_dir_all(&root).unwrap();
        fs::write(temp.path().join("outside.sak.py"), "").unwrap();

        let ctx = ToolContext::new(root);

        let result = ctx.validate_path(Path::new("../outside.sak.py"));
        assert!(matches!(result, Err(ToolError::SandboxViolation { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_path_rejects_escaping_symlink() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("scripts");
        fs::create_dir_all(&root).unwrap();
        fs::write(temp.path().join("target.sak.py"), "").unwrap();
        std::os::unix::fs::symlink(temp.path().join("target.sak.py"), root.join("link.sak.py")).unwrap();

        let ctx = ToolContext::new(root);

        let result = ctx.validate_path(Path::new("link.sak.py"));
        assert!(matches!(result, Err(ToolError::SandboxViolation { .. })));
    }

    #[test]
    fn test_validate_path_with_sandbox_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(temp.path().to_path_buf());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_new_file_path() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());

        let result = ctx.validate_path(Path::new("new.sak.py"));
        assert!(result.is_ok());
    }
}
