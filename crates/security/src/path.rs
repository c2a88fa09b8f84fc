//! Path validation for admin save/load, and last-used path bookkeeping.
//!
//! Admin commands may name a file to save to or load from. Such paths are
//! untrusted input: they must stay inside the configured data directory,
//! must not traverse upwards, and a save must not clobber a file the object
//! did not write itself.

use std::path::{Component, Path, PathBuf};

use lorebot_core::error::SecurityError;
use parking_lot::Mutex;

/// What the caller intends to do with a validated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathIntent {
    Save,
    Load,
}

/// The directory admin commands are confined to.
#[derive(Debug, Clone)]
pub struct PathScope {
    root: PathBuf,
}

impl PathScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a user-supplied path.
    ///
    /// Checks:
    /// 1. No `..` components
    /// 2. After resolving symlinks of existing ancestors, the path lies under the root
    /// 3. For saves: the target does not exist, or is the object's own file (`own`)
    ///
    /// Returns the resolved path on success.
    pub fn verify(
        &self,
        requested: &str,
        own: Option<&Path>,
        intent: PathIntent,
    ) -> Result<PathBuf, SecurityError> {
        let raw = Path::new(requested);
        if requested.trim().is_empty() {
            return Err(SecurityError::OutsideScope(requested.into()));
        }
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SecurityError::PathTraversal(requested.into()));
        }

        let root = resolve(&self.root);
        let resolved = resolve(raw);
        if !resolved.starts_with(&root) || resolved == root {
            return Err(SecurityError::OutsideScope(requested.into()));
        }

        if intent == PathIntent::Save && resolved.exists() {
            let is_own = own.is_some_and(|own| resolve(own) == resolved);
            if !is_own {
                return Err(SecurityError::ForeignFile(requested.into()));
            }
        }

        Ok(resolved)
    }
}

/// Make `path` absolute and resolve symlinks through its deepest existing
/// ancestor. Missing trailing components are appended unchanged.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// The most recently used persistence path of a saveable object.
///
/// `save(None)` / `load(None)` fall back to this path.
#[derive(Debug, Default)]
pub struct PersistPath {
    current: Mutex<Option<PathBuf>>,
}

impl PersistPath {
    pub fn new(initial: Option<PathBuf>) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.current.lock().clone()
    }

    /// The path to use: `explicit`, or the current path. `None` if neither
    /// exists.
    pub fn resolve(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.current.lock().clone())
    }

    /// Record `path` as current once a save or load through it succeeded.
    pub fn commit(&self, path: &Path) {
        *self.current.lock() = Some(path.to_path_buf());
    }
}

/// Create the parent directory of `path` if needed.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> (tempfile::TempDir, PathScope) {
        let dir = tempfile::tempdir().unwrap();
        let scope = PathScope::new(dir.path());
        (dir, scope)
    }

    #[test]
    fn new_file_inside_scope_is_allowed() {
        let (dir, scope) = scope();
        let target = dir.path().join("sub").join("groups.txt");
        let resolved = scope
            .verify(target.to_str().unwrap(), None, PathIntent::Save)
            .unwrap();
        assert!(resolved.ends_with("sub/groups.txt"));
    }

    #[test]
    fn traversal_is_rejected() {
        let (dir, scope) = scope();
        let target = format!("{}/../escape.txt", dir.path().display());
        let err = scope.verify(&target, None, PathIntent::Save).unwrap_err();
        assert!(matches!(err, SecurityError::PathTraversal(_)));
    }

    #[test]
    fn outside_scope_is_rejected() {
        let (_dir, scope) = scope();
        let other = tempfile::tempdir().unwrap();
        let target = other.path().join("x.txt");
        let err = scope
            .verify(target.to_str().unwrap(), None, PathIntent::Load)
            .unwrap_err();
        assert!(matches!(err, SecurityError::OutsideScope(_)));
    }

    #[test]
    fn scope_root_itself_is_rejected() {
        let (dir, scope) = scope();
        let err = scope
            .verify(dir.path().to_str().unwrap(), None, PathIntent::Save)
            .unwrap_err();
        assert!(matches!(err, SecurityError::OutsideScope(_)));
    }

    #[test]
    fn saving_over_a_foreign_file_is_rejected() {
        let (dir, scope) = scope();
        let existing = dir.path().join("other.txt");
        std::fs::write(&existing, "1\n").unwrap();

        let err = scope
            .verify(existing.to_str().unwrap(), None, PathIntent::Save)
            .unwrap_err();
        assert!(matches!(err, SecurityError::ForeignFile(_)));

        // Its own file may be overwritten, and any existing file may be loaded.
        assert!(scope
            .verify(existing.to_str().unwrap(), Some(&existing), PathIntent::Save)
            .is_ok());
        assert!(scope
            .verify(existing.to_str().unwrap(), None, PathIntent::Load)
            .is_ok());
    }

    #[test]
    fn persist_path_remembers_only_committed_paths() {
        let persist = PersistPath::default();
        assert!(persist.resolve(None).is_none());
        assert_eq!(
            persist.resolve(Some(Path::new("a.txt"))),
            Some(PathBuf::from("a.txt"))
        );
        assert!(persist.resolve(None).is_none());

        persist.commit(Path::new("a.txt"));
        assert_eq!(persist.resolve(None), Some(PathBuf::from("a.txt")));
        assert_eq!(
            persist.resolve(Some(Path::new("b.txt"))),
            Some(PathBuf::from("b.txt"))
        );
        assert_eq!(persist.current(), Some(PathBuf::from("a.txt")));
    }

    #[test]
    fn ensure_parent_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a").join("b").join("c.txt");
        ensure_parent(&file).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }
}
