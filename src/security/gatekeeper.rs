//! # Path Gatekeeper
//!
//! Confina ogni accesso ai file entro la root configurata.
//! Il path viene canonicalizzato (symlink risolti) e confrontato per componenti,
//! quindi `/root/foobar` non è mai considerato dentro `/root/foo`.
//! La decisione viene ricalcolata per ogni file, mai messa in cache.

use crate::config::SecurityConfig;
use crate::error::CompressError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a path may be touched at all
#[derive(Debug, Clone)]
pub struct PathGatekeeper {
    security: Arc<SecurityConfig>,
}

impl PathGatekeeper {
    pub fn new(security: Arc<SecurityConfig>) -> Self {
        Self { security }
    }

    /// True only if `path` resolves to the root or somewhere below it.
    /// Any resolution failure is a deny.
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        self.resolve(path).is_ok()
    }

    /// Resolve `path` and return its canonical form if it is confined to the root
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, CompressError> {
        let root = self.security.root_directory();

        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Access denied: path cannot be resolved");
                return Err(CompressError::PathDenied(path.to_path_buf()));
            }
        };

        // Path::starts_with compares whole components
        if canonical.starts_with(root) {
            debug!(path = %canonical.display(), "Path allowed");
            Ok(canonical)
        } else {
            warn!(
                path = %path.display(),
                resolved = %canonical.display(),
                root = %root.display(),
                "Access denied: path escapes the allowed root"
            );
            Err(CompressError::PathDenied(path.to_path_buf()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn gatekeeper_for(root: &Path) -> PathGatekeeper {
        let security = SecurityConfig::new(root, ["image/"], ["png"], 0.0).unwrap();
        PathGatekeeper::new(Arc::new(security))
    }

    #[test]
    fn test_root_and_nested_paths_are_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("photo.png");
        fs::write(&file, b"x").unwrap();

        let gate = gatekeeper_for(temp_dir.path());
        assert!(gate.is_path_allowed(temp_dir.path()));
        assert!(gate.is_path_allowed(&nested));
        assert!(gate.is_path_allowed(&file));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_denied() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        let evil = temp_dir.path().join("root-evil");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&evil).unwrap();
        let file = evil.join("photo.png");
        fs::write(&file, b"x").unwrap();

        let gate = gatekeeper_for(&root);
        assert!(!gate.is_path_allowed(&evil));
        assert!(!gate.is_path_allowed(&file));
    }

    #[test]
    fn test_dot_dot_traversal_is_denied() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(temp_dir.path().join("outside.png"), b"x").unwrap();

        let gate = gatekeeper_for(&root);
        assert!(!gate.is_path_allowed(&root.join("..").join("outside.png")));
    }

    #[test]
    fn test_missing_file_is_denied() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gatekeeper_for(temp_dir.path());
        let err = gate.resolve(&temp_dir.path().join("ghost.png")).unwrap_err();
        assert!(matches!(err, CompressError::PathDenied(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_denied() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let secret = temp_dir.path().join("secret.png");
        fs::write(&secret, b"x").unwrap();

        let link = root.join("innocent.png");
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        let gate = gatekeeper_for(&root);
        assert!(!gate.is_path_allowed(&link));
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_denied() {
        let temp_dir = TempDir::new().unwrap();
        let link = temp_dir.path().join("dangling.png");
        std::os::unix::fs::symlink(temp_dir.path().join("missing.png"), &link).unwrap();

        let gate = gatekeeper_for(temp_dir.path());
        assert!(!gate.is_path_allowed(&link));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_resolves_to_target() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("real.png");
        fs::write(&target, b"x").unwrap();
        let link = temp_dir.path().join("alias.png");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let gate = gatekeeper_for(temp_dir.path());
        assert_eq!(gate.resolve(&link).unwrap(), target.canonicalize().unwrap());
    }
}
