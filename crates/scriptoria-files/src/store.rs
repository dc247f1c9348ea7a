//! File and directory operations inside a guarded workspace
//!
//! Every public operation resolves its paths through [`PathGuard`] first and
//! re-checks them right before the syscall that mutates storage. Writes go
//! through [`SafeWriter`], so a reader never observes a partially written
//! file.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use scriptoria_config::{CrossDevicePolicy, WorkspaceConfig};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::{
    error::FileError,
    fsutil,
    guard::{PathGuard, WorkspacePath},
    hooks::HookSet,
    locks::LockRegistry,
    models::{ConflictResolution, EntryInfo, FileEntry, OperationType, WriteEvent},
    verifier::ContentVerifier,
    writer::SafeWriter,
};

/// CRUD over the files and directories of one workspace
#[derive(Debug)]
pub struct WorkspaceStore {
    guard: PathGuard,
    writer: SafeWriter,
    locks: LockRegistry,
    hooks: HookSet,
    cross_device: CrossDevicePolicy,
}

impl WorkspaceStore {
    /// Creates a store over `guard`'s root
    ///
    /// # Arguments
    ///
    /// * `guard` - Path guard for the workspace root
    /// * `config` - Supplies content limits and the cross-device move policy
    pub fn new(guard: PathGuard, config: &WorkspaceConfig) -> Self {
        WorkspaceStore {
            guard,
            writer: SafeWriter::new(config.limits.max_content_bytes),
            locks: LockRegistry::new(),
            hooks: HookSet::new(),
            cross_device: config.cross_device_moves,
        }
    }

    /// Replaces the post-write hooks
    pub fn with_hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }

    /// The guard every path goes through
    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub(crate) fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub(crate) fn writer(&self) -> &SafeWriter {
        &self.writer
    }

    /// Writes `content` to `path`, replacing any existing file
    ///
    /// Parent directories are created as needed.
    pub async fn write(&self, path: &str, content: &[u8]) -> Result<WriteEvent, FileError> {
        self.write_with(path, content, ConflictResolution::Overwrite)
            .await
    }

    /// Writes `content` to `path` with an explicit conflict strategy
    ///
    /// # Arguments
    ///
    /// * `path` - Workspace-relative file path
    /// * `content` - New file content
    /// * `resolution` - `Skip` fails with `Conflict` when the file exists
    ///
    /// # Returns
    ///
    /// The event that was passed to the write hooks
    pub async fn write_with(
        &self,
        path: &str,
        content: &[u8],
        resolution: ConflictResolution,
    ) -> Result<WriteEvent, FileError> {
        self.writer.validate_content(content)?;
        let resolved = self.resolve_file(path).await?;
        let _lock = self.locks.acquire(resolved.absolute()).await;

        let existed = self.file_exists(&resolved).await?;
        if existed && resolution == ConflictResolution::Skip {
            return Err(FileError::Conflict(resolved.relative().to_path_buf()));
        }
        let operation = if existed {
            OperationType::Update
        } else {
            OperationType::Create
        };
        self.commit(&resolved, content, operation).await
    }

    /// Appends `content` to `path`, creating the file if needed
    pub async fn append(&self, path: &str, content: &[u8]) -> Result<WriteEvent, FileError> {
        self.writer.validate_content(content)?;
        let resolved = self.resolve_file(path).await?;
        let _lock = self.locks.acquire(resolved.absolute()).await;

        let (mut combined, operation) = if self.file_exists(&resolved).await? {
            (self.read_resolved(&resolved).await?, OperationType::Append)
        } else {
            (Vec::new(), OperationType::Create)
        };
        combined.extend_from_slice(content);
        self.commit(&resolved, &combined, operation).await
    }

    /// Reads the full content of a file
    pub async fn read(&self, path: &str) -> Result<Vec<u8>, FileError> {
        let resolved = self.guard.resolve(path).await?;
        self.read_resolved(&resolved).await
    }

    /// Reads a file together with its modification time
    pub async fn read_entry(&self, path: &str) -> Result<FileEntry, FileError> {
        let resolved = self.guard.resolve(path).await?;
        let content = self.read_resolved(&resolved).await?;
        let modified = self
            .metadata(&resolved)
            .await
            .ok()
            .and_then(|meta| modified_time(&meta));
        Ok(FileEntry {
            path: resolved.relative().to_path_buf(),
            content,
            modified,
        })
    }

    /// Metadata of a single entry; symlinks are reported, not followed
    pub async fn stat(&self, path: &str) -> Result<EntryInfo, FileError> {
        let resolved = self.guard.resolve_entry(path).await?;
        let meta = self.metadata(&resolved).await?;
        let name = resolved
            .relative()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(entry_info(name, resolved.relative().to_path_buf(), &meta))
    }

    /// Whether anything exists at `path`
    ///
    /// Paths that fail containment checks are reported as errors, not as
    /// missing.
    pub async fn exists(&self, path: &str) -> Result<bool, FileError> {
        let resolved = self.guard.resolve_entry(path).await?;
        match fs::symlink_metadata(resolved.absolute()).await {
            Ok(_) => Ok(true),
            Err(e) if fsutil::is_missing(&e) => Ok(false),
            Err(e) => Err(FileError::IoError(e)),
        }
    }

    /// Creates a directory and any missing parents
    ///
    /// # Arguments
    ///
    /// * `path` - Directory to create
    /// * `exist_ok` - When false an existing directory fails with `Conflict`
    pub async fn ensure_dir(&self, path: &str, exist_ok: bool) -> Result<(), FileError> {
        let resolved = self.guard.resolve(path).await?;
        match fs::symlink_metadata(resolved.absolute()).await {
            Ok(meta) if meta.is_dir() => {
                if exist_ok {
                    Ok(())
                } else {
                    Err(FileError::Conflict(resolved.relative().to_path_buf()))
                }
            }
            Ok(_) => Err(FileError::NotADirectory(resolved.relative().to_path_buf())),
            Err(e) if fsutil::is_missing(&e) => {
                let target = self.create_dirs(resolved.relative()).await?;
                info!(path = %target.relative().display(), "Created directory");
                Ok(())
            }
            Err(e) => Err(FileError::IoError(e)),
        }
    }

    /// Deletes a file, symlink or directory
    ///
    /// # Arguments
    ///
    /// * `path` - Entry to delete
    /// * `recursive` - Required to delete a directory that has contents
    ///
    /// # Returns
    ///
    /// `NotFound` if nothing is there, `NotEmpty` for a populated directory
    /// without `recursive` (the directory is left as it was)
    pub async fn delete(&self, path: &str, recursive: bool) -> Result<(), FileError> {
        let resolved = self.guard.resolve_entry(path).await?;
        if resolved.is_root() {
            return Err(FileError::InvalidPath(
                "the workspace root cannot be deleted".to_string(),
            ));
        }
        let meta = self.metadata(&resolved).await?;
        let target = self.guard.recheck(&resolved).await?;

        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(target.absolute())
                    .await
                    .map_err(|e| not_found_or_io(e, target.relative()))?;
            } else {
                let mut entries = fs::read_dir(target.absolute())
                    .await
                    .map_err(|e| not_found_or_io(e, target.relative()))?;
                if entries.next_entry().await?.is_some() {
                    return Err(FileError::NotEmpty(target.relative().to_path_buf()));
                }
                fs::remove_dir(target.absolute())
                    .await
                    .map_err(|e| not_found_or_io(e, target.relative()))?;
            }
        } else {
            fs::remove_file(target.absolute())
                .await
                .map_err(|e| not_found_or_io(e, target.relative()))?;
        }
        info!(path = %target.relative().display(), recursive, "Deleted");
        Ok(())
    }

    /// Lists a directory, sorted by name
    ///
    /// The stream is lazy and finite; every call starts a fresh listing.
    /// Entries removed while the listing is in progress are skipped.
    pub fn list(&self, path: &str) -> impl Stream<Item = Result<EntryInfo, FileError>> + '_ {
        self.list_filtered(path.to_string(), None)
    }

    /// Lists the entries of a directory whose names match a glob
    pub fn list_matching(
        &self,
        path: &str,
        pattern: &str,
    ) -> impl Stream<Item = Result<EntryInfo, FileError>> + '_ {
        self.list_filtered(path.to_string(), Some(pattern.to_string()))
    }

    /// Collects a listing into a vector
    pub async fn list_all(&self, path: &str) -> Result<Vec<EntryInfo>, FileError> {
        self.list(path).try_collect().await
    }

    fn list_filtered(
        &self,
        path: String,
        pattern: Option<String>,
    ) -> impl Stream<Item = Result<EntryInfo, FileError>> + '_ {
        try_stream! {
            let matcher = match pattern {
                Some(pattern) => Some(
                    glob::Pattern::new(&pattern).map_err(|e| FileError::Pattern(e.to_string()))?,
                ),
                None => None,
            };
            let (dir, names) = self.entry_names(&path, matcher.as_ref()).await?;

            for name in names {
                let child = dir.absolute().join(&name);
                match fs::symlink_metadata(&child).await {
                    Ok(meta) => {
                        let relative = dir.relative().join(&name);
                        yield entry_info(name.to_string_lossy().into_owned(), relative, &meta);
                    }
                    Err(e) if fsutil::is_missing(&e) => {
                        debug!(path = %child.display(), "Entry vanished during listing");
                    }
                    Err(e) => Err(FileError::IoError(e))?,
                }
            }
        }
    }

    async fn entry_names(
        &self,
        path: &str,
        matcher: Option<&glob::Pattern>,
    ) -> Result<(WorkspacePath, Vec<OsString>), FileError> {
        let dir = self.guard.resolve(path).await?;
        if !self.metadata(&dir).await?.is_dir() {
            return Err(FileError::NotADirectory(dir.relative().to_path_buf()));
        }
        let dir = self.guard.recheck(&dir).await?;

        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir.absolute())
            .await
            .map_err(|e| not_found_or_io(e, dir.relative()))?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if self.is_hidden(&dir, &name) {
                continue;
            }
            if let Some(matcher) = matcher {
                if !matcher.matches(&name.to_string_lossy()) {
                    continue;
                }
            }
            names.push(name);
        }
        names.sort();
        debug!(path = %dir.relative().display(), entries = names.len(), "Listed directory");
        Ok((dir, names))
    }

    fn is_hidden(&self, dir: &WorkspacePath, name: &OsStr) -> bool {
        if dir.is_root() && name == self.guard.metadata_dir() {
            return true;
        }
        fsutil::is_temp_name(name)
    }

    /// Moves a file or directory
    ///
    /// Within one filesystem this is a single atomic rename. Across
    /// filesystems the configured [`CrossDevicePolicy`] decides between a
    /// copy followed by deleting the source (atomic per file only) and
    /// failing with `CrossDeviceMove`.
    ///
    /// # Arguments
    ///
    /// * `src` - Entry to move
    /// * `dst` - New location
    /// * `overwrite` - Replace an existing destination instead of failing
    ///   with `Conflict`
    pub async fn move_path(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileError> {
        let source = self.guard.resolve_entry(src).await?;
        let destination = self.guard.resolve_entry(dst).await?;
        if source.is_root() || destination.is_root() {
            return Err(FileError::InvalidPath(
                "the workspace root cannot be moved or replaced".to_string(),
            ));
        }
        let source_meta = self.metadata(&source).await?;
        if source.absolute() == destination.absolute() {
            return if overwrite {
                Ok(())
            } else {
                Err(FileError::Conflict(destination.relative().to_path_buf()))
            };
        }
        if source_meta.is_dir() && destination.relative().starts_with(source.relative()) {
            return Err(FileError::InvalidPath(format!(
                "cannot move {} into itself",
                source.relative().display()
            )));
        }

        self.prepare_destination(&destination, source_meta.is_dir(), overwrite)
            .await?;

        let source = self.guard.recheck(&source).await?;
        let destination = self.guard.recheck(&destination).await?;
        match fs::rename(source.absolute(), destination.absolute()).await {
            Ok(()) => {}
            Err(e) if fsutil::is_cross_device(&e) => match self.cross_device {
                CrossDevicePolicy::Reject => {
                    return Err(FileError::CrossDeviceMove {
                        from: source.relative().to_path_buf(),
                        to: destination.relative().to_path_buf(),
                    })
                }
                CrossDevicePolicy::CopyThenDelete => {
                    warn!(
                        from = %source.relative().display(),
                        to = %destination.relative().display(),
                        "Move crosses filesystems, falling back to copy and delete"
                    );
                    self.copy_tree(&source, &destination).await?;
                    self.remove_any(&source).await?;
                }
            },
            Err(e) => {
                error!(from = %source.relative().display(), error = %e, "Move failed");
                return Err(not_found_or_io(e, source.relative()));
            }
        }
        info!(
            from = %source.relative().display(),
            to = %destination.relative().display(),
            "Moved"
        );
        Ok(())
    }

    /// Copies a file or directory tree
    ///
    /// Follows the same `NotFound`/`Conflict` rules as [`move_path`]. Each
    /// copied file is written atomically; symlinks are followed and must
    /// stay inside the workspace.
    ///
    /// [`move_path`]: WorkspaceStore::move_path
    pub async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileError> {
        let source = self.guard.resolve(src).await?;
        let destination = self.guard.resolve(dst).await?;
        if source.is_root() || destination.is_root() {
            return Err(FileError::InvalidPath(
                "the workspace root cannot be copied or replaced".to_string(),
            ));
        }
        let source_meta = self.metadata(&source).await?;
        if source.absolute() == destination.absolute() {
            return if overwrite {
                Ok(())
            } else {
                Err(FileError::Conflict(destination.relative().to_path_buf()))
            };
        }
        if source_meta.is_dir() && destination.relative().starts_with(source.relative()) {
            return Err(FileError::InvalidPath(format!(
                "cannot copy {} into itself",
                source.relative().display()
            )));
        }

        self.prepare_destination(&destination, source_meta.is_dir(), overwrite)
            .await?;
        self.copy_tree(&source, &destination).await?;
        info!(
            from = %source.relative().display(),
            to = %destination.relative().display(),
            "Copied"
        );
        Ok(())
    }

    /// Fails with `Conflict` when the destination exists and `overwrite` is
    /// off, otherwise clears whatever a rename could not replace in place
    async fn prepare_destination(
        &self,
        destination: &WorkspacePath,
        source_is_dir: bool,
        overwrite: bool,
    ) -> Result<(), FileError> {
        match fs::symlink_metadata(destination.absolute()).await {
            Ok(meta) => {
                if !overwrite {
                    return Err(FileError::Conflict(destination.relative().to_path_buf()));
                }
                if meta.is_dir() || source_is_dir {
                    let destination = self.guard.recheck(destination).await?;
                    self.remove_any(&destination).await?;
                }
            }
            Err(e) if fsutil::is_missing(&e) => {}
            Err(e) => return Err(FileError::IoError(e)),
        }
        if let Some(parent) = destination.relative().parent() {
            self.create_dirs(parent).await?;
        }
        Ok(())
    }

    /// Creates `dir` and its missing ancestors one level at a time,
    /// re-checking every level right before its `mkdir`
    async fn create_dirs(&self, dir: &Path) -> Result<WorkspacePath, FileError> {
        let mut current = self.guard.root_path();
        for name in dir.iter() {
            current = self.guard.recheck(&current.child(name)).await?;
            match fs::create_dir(current.absolute()).await {
                Ok(()) => debug!(path = %current.relative().display(), "Created directory"),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    error!(path = %current.relative().display(), error = %e, "Failed to create directory");
                    return Err(FileError::IoError(e));
                }
            }
        }
        Ok(current)
    }

    async fn copy_tree(
        &self,
        source: &WorkspacePath,
        destination: &WorkspacePath,
    ) -> Result<(), FileError> {
        let mut pending = vec![(source.clone(), destination.clone())];
        let mut visited = HashSet::new();

        while let Some((from, to)) = pending.pop() {
            let from = self.guard.recheck(&from).await?;
            let meta = fs::metadata(from.absolute())
                .await
                .map_err(|e| not_found_or_io(e, from.relative()))?;

            if meta.is_dir() {
                if !visited.insert(from.absolute().to_path_buf()) {
                    warn!(path = %from.relative().display(), "Skipping directory cycle");
                    continue;
                }
                let to = self.create_dirs(to.relative()).await?;

                let mut entries = fs::read_dir(from.absolute()).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name();
                    if self.is_hidden(&from, &name) {
                        continue;
                    }
                    pending.push((from.child(&name), to.child(&name)));
                }
            } else {
                let content = fs::read(from.absolute())
                    .await
                    .map_err(|e| not_found_or_io(e, from.relative()))?;
                let operation = OperationType::Copy {
                    from: from.relative().to_path_buf(),
                };
                self.commit(&to, &content, operation).await?;
            }
        }
        Ok(())
    }

    async fn remove_any(&self, path: &WorkspacePath) -> Result<(), FileError> {
        let meta = self.metadata(path).await?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(path.absolute()).await
        } else {
            fs::remove_file(path.absolute()).await
        };
        result.map_err(|e| not_found_or_io(e, path.relative()))
    }

    /// Resolves a path that must name a file rather than the root
    pub(crate) async fn resolve_file(&self, path: &str) -> Result<WorkspacePath, FileError> {
        let resolved = self.guard.resolve(path).await?;
        if resolved.is_root() {
            return Err(FileError::InvalidPath(
                "the workspace root is not a file".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Whether a file exists at `path`; a directory there is `NotAFile`
    pub(crate) async fn file_exists(&self, path: &WorkspacePath) -> Result<bool, FileError> {
        match fs::symlink_metadata(path.absolute()).await {
            Ok(meta) if meta.is_dir() => Err(FileError::NotAFile(path.relative().to_path_buf())),
            Ok(_) => Ok(true),
            Err(e) if fsutil::is_missing(&e) => Ok(false),
            Err(e) => Err(FileError::IoError(e)),
        }
    }

    pub(crate) async fn read_resolved(&self, path: &WorkspacePath) -> Result<Vec<u8>, FileError> {
        if self.metadata(path).await?.is_dir() {
            return Err(FileError::NotAFile(path.relative().to_path_buf()));
        }
        let path = self.guard.recheck(path).await?;
        let content = fs::read(path.absolute())
            .await
            .map_err(|e| not_found_or_io(e, path.relative()))?;
        debug!(path = %path.relative().display(), bytes = content.len(), "Read file");
        Ok(content)
    }

    /// Atomically replaces the file at `path` and notifies the hooks
    pub(crate) async fn commit(
        &self,
        path: &WorkspacePath,
        content: &[u8],
        operation: OperationType,
    ) -> Result<WriteEvent, FileError> {
        if let Some(parent) = path.relative().parent() {
            self.create_dirs(parent).await?;
        }
        let path = self.guard.recheck(path).await?;
        let staged = self.writer.stage(path.absolute(), content).await?;
        let target = match self.guard.recheck(&path).await {
            Ok(target) => target,
            Err(e) => {
                staged.discard().await;
                return Err(e);
            }
        };
        staged.commit(target.absolute()).await?;
        info!(path = %target.relative().display(), bytes = content.len(), "Wrote file");

        let event = WriteEvent {
            path: target.relative().to_path_buf(),
            absolute_path: target.absolute().to_path_buf(),
            operation,
            content_hash: ContentVerifier::compute_hash(content),
            timestamp: Utc::now(),
        };
        self.hooks.dispatch(&event);
        Ok(event)
    }

    async fn metadata(&self, path: &WorkspacePath) -> Result<Metadata, FileError> {
        fs::symlink_metadata(path.absolute())
            .await
            .map_err(|e| not_found_or_io(e, path.relative()))
    }
}

fn not_found_or_io(err: std::io::Error, path: &Path) -> FileError {
    if fsutil::is_missing(&err) {
        FileError::NotFound(path.to_path_buf())
    } else {
        FileError::IoError(err)
    }
}

fn modified_time(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn entry_info(name: String, path: PathBuf, meta: &Metadata) -> EntryInfo {
    let is_directory = meta.is_dir();
    EntryInfo {
        name,
        path,
        is_directory,
        size: if is_directory { 0 } else { meta.len() },
        modified: modified_time(meta),
    }
}
