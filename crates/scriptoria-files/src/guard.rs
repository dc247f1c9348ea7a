//! Path containment for client-supplied paths
//!
//! Every path that reaches the store is resolved here first. Resolution is
//! lexical (no `..`, no absolute paths, no NUL bytes) followed by a walk over
//! the existing prefix of the path on disk, resolving symlinks one component
//! at a time and checking that each resolved target stays under the
//! canonical workspace root. Nothing is cached: callers resolve again right
//! before the syscall that touches the path.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::{error::FileError, fsutil};

/// A client path that passed containment checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePath {
    relative: PathBuf,
    absolute: PathBuf,
    follow_leaf: bool,
}

impl WorkspacePath {
    /// Path relative to the workspace root, after symlink resolution
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Absolute on-disk path
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Whether this is the workspace root itself
    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// Unchecked path of a direct child; pass it through
    /// [`PathGuard::recheck`] before use
    pub(crate) fn child(&self, name: &OsStr) -> WorkspacePath {
        WorkspacePath {
            relative: self.relative.join(name),
            absolute: self.absolute.join(name),
            follow_leaf: true,
        }
    }
}

/// Resolves and validates client paths against a workspace root
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    metadata_dir: OsString,
}

impl PathGuard {
    /// Creates a guard for an existing root directory
    ///
    /// # Arguments
    ///
    /// * `root` - Workspace root; canonicalized once here
    /// * `metadata_dir` - Name of the reserved directory under the root
    pub async fn new(root: &Path, metadata_dir: &str) -> Result<Self, FileError> {
        let root = fs::canonicalize(root).await.map_err(|e| {
            if fsutil::is_missing(&e) {
                FileError::NotFound(root.to_path_buf())
            } else {
                FileError::IoError(e)
            }
        })?;
        if !fs::metadata(&root).await?.is_dir() {
            return Err(FileError::NotADirectory(root));
        }
        let mut components = Path::new(metadata_dir).components();
        let metadata_dir = match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !metadata_dir.contains(['/', '\\']) => {
                name.to_os_string()
            }
            _ => {
                return Err(FileError::InvalidPath(format!(
                    "metadata dir must be a single path component: {:?}",
                    metadata_dir
                )))
            }
        };
        Ok(PathGuard { root, metadata_dir })
    }

    /// Canonical workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the reserved metadata directory
    pub fn metadata_root(&self) -> PathBuf {
        self.root.join(&self.metadata_dir)
    }

    /// Name of the reserved metadata directory
    pub fn metadata_dir(&self) -> &OsStr {
        &self.metadata_dir
    }

    /// The root itself as a resolved path
    pub(crate) fn root_path(&self) -> WorkspacePath {
        WorkspacePath {
            relative: PathBuf::new(),
            absolute: self.root.clone(),
            follow_leaf: true,
        }
    }

    /// Lexically normalizes a client path.
    ///
    /// `.` segments are dropped; `..` segments, absolute paths, drive
    /// prefixes and NUL bytes are rejected. Names shaped like the store's own
    /// temp files are `ReservedPath`. The empty string and `.` both
    /// normalize to the root.
    pub fn normalize(&self, raw: &str) -> Result<PathBuf, FileError> {
        if raw.contains('\0') {
            return Err(FileError::InvalidPath(format!("{:?} contains a NUL byte", raw)));
        }
        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(FileError::escape(raw, "absolute path"));
        }
        // Backslash counts as a separator here so `..\x` is caught on every platform
        if raw.split(&['/', '\\'][..]).any(|segment| segment == "..") {
            return Err(FileError::escape(raw, "parent traversal"));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(raw).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) if fsutil::is_temp_name(part) => {
                    return Err(FileError::ReservedPath(raw.to_string()))
                }
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => return Err(FileError::escape(raw, "parent traversal")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(FileError::escape(raw, "absolute path"))
                }
            }
        }
        Ok(normalized)
    }

    /// Resolves a client path to a location inside the workspace.
    ///
    /// Fails with `PathEscape` on traversal, absolute paths or symlinks
    /// leading outside the root, and with `ReservedPath` for anything inside
    /// the metadata directory.
    pub async fn resolve(&self, raw: &str) -> Result<WorkspacePath, FileError> {
        debug!(path = %raw, "Resolving workspace path");
        let relative = self.normalize(raw)?;
        if self.is_reserved(&relative) {
            return Err(FileError::ReservedPath(raw.to_string()));
        }

        let resolved = self.walk(raw, &relative).await?;
        self.check_reserved(raw, resolved)
    }

    /// Resolves a path without following a symlink in its final component.
    ///
    /// Operations on directory entries themselves (delete, move, stat) use
    /// this so that removing a link never touches what it points to.
    pub async fn resolve_entry(&self, raw: &str) -> Result<WorkspacePath, FileError> {
        debug!(path = %raw, "Resolving workspace entry");
        let relative = self.normalize(raw)?;
        if self.is_reserved(&relative) {
            return Err(FileError::ReservedPath(raw.to_string()));
        }
        self.walk_entry(raw, &relative).await
    }

    /// Re-runs containment checks on an already resolved path.
    ///
    /// Called right before the syscall that touches the path, since a
    /// component may have been swapped for a symlink in the meantime.
    pub async fn recheck(&self, path: &WorkspacePath) -> Result<WorkspacePath, FileError> {
        let raw = path.relative.to_string_lossy();
        if path.follow_leaf {
            let resolved = self.walk(&raw, &path.relative).await?;
            self.check_reserved(&raw, resolved)
        } else {
            self.walk_entry(&raw, &path.relative).await
        }
    }

    /// Resolves a path under the metadata directory for the store's own use
    pub(crate) async fn resolve_internal(&self, relative: &Path) -> Result<WorkspacePath, FileError> {
        let raw = relative.to_string_lossy().into_owned();
        let normalized = self.normalize(&raw)?;
        self.walk(&raw, &normalized).await
    }

    fn check_reserved(
        &self,
        raw: &str,
        resolved: WorkspacePath,
    ) -> Result<WorkspacePath, FileError> {
        if self.is_reserved(&resolved.relative) {
            warn!(path = %raw, "Path resolves into the metadata directory");
            return Err(FileError::ReservedPath(raw.to_string()));
        }
        Ok(resolved)
    }

    async fn walk_entry(&self, raw: &str, relative: &Path) -> Result<WorkspacePath, FileError> {
        let name = match relative.file_name() {
            Some(name) => name,
            None => return self.walk(raw, relative).await,
        };
        let parent = self
            .walk(raw, relative.parent().unwrap_or_else(|| Path::new("")))
            .await?;
        let resolved = WorkspacePath {
            relative: parent.relative.join(name),
            absolute: parent.absolute.join(name),
            follow_leaf: false,
        };
        self.check_reserved(raw, resolved)
    }

    fn is_reserved(&self, relative: &Path) -> bool {
        matches!(
            relative.components().next(),
            Some(Component::Normal(first)) if first == self.metadata_dir.as_os_str()
        )
    }

    async fn walk(&self, raw: &str, relative: &Path) -> Result<WorkspacePath, FileError> {
        let mut current = self.root.clone();
        let mut components = relative.components();

        while let Some(component) = components.next() {
            let candidate = current.join(component);
            match fs::symlink_metadata(&candidate).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    match fs::canonicalize(&candidate).await {
                        Ok(target) => {
                            if !target.starts_with(&self.root) {
                                warn!(path = %raw, target = %target.display(), "Symlink escapes workspace");
                                return Err(FileError::escape(raw, "symlink resolves outside the workspace"));
                            }
                            current = target;
                        }
                        Err(e) if fsutil::is_missing(&e) => {
                            if components.clone().next().is_some() {
                                return Err(FileError::escape(raw, "dangling symlink inside the path"));
                            }
                            // A dangling link at the leaf is itself inside the workspace
                            current = candidate;
                        }
                        Err(e) => return Err(FileError::IoError(e)),
                    }
                }
                Ok(_) => current = candidate,
                Err(e) if fsutil::is_missing(&e) => {
                    // Nothing below a missing component exists, so no symlink can follow
                    current = candidate;
                    current.extend(components);
                    break;
                }
                Err(e) => return Err(FileError::IoError(e)),
            }
        }

        let relative = match current.strip_prefix(&self.root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => return Err(FileError::escape(raw, "resolves outside the workspace")),
        };
        debug!(path = %raw, resolved = %current.display(), "Resolved workspace path");
        Ok(WorkspacePath {
            relative,
            absolute: current,
            follow_leaf: true,
        })
    }
}
