//! Append-only versioned documents
//!
//! Each document keeps its history under
//! `<metadata_dir>/versions/<sha256 of the document path>/`, one JSON
//! [`VersionRecord`] per version. Version numbers start at 1, are
//! contiguous, and are never reused; appends to one document are serialized
//! while different documents proceed independently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    error::FileError,
    guard::WorkspacePath,
    models::{OperationType, VersionInfo, VersionRecord},
    sequence::SequenceDir,
    store::WorkspaceStore,
    verifier::ContentVerifier,
};

const VERSIONS_DIR: &str = "versions";

/// Maintains version histories of workspace documents
#[derive(Debug, Clone)]
pub struct DocVersioner {
    store: Arc<WorkspaceStore>,
    verifier: ContentVerifier,
    materialize: bool,
}

impl DocVersioner {
    /// Creates a versioner storing histories through `store`
    ///
    /// # Arguments
    ///
    /// * `store` - Workspace the documents live in
    /// * `materialize` - Also write each new version to the document's
    ///   workspace path
    pub fn new(store: Arc<WorkspaceStore>, materialize: bool) -> Self {
        DocVersioner {
            store,
            verifier: ContentVerifier::new(),
            materialize,
        }
    }

    /// Appends a new version of the document at `path`
    ///
    /// The version is durable once this returns. With materialization on,
    /// the document file is then replaced atomically; if that step fails
    /// the error is returned but the version stays recorded.
    ///
    /// # Returns
    ///
    /// The assigned version number
    pub async fn append_version(&self, path: &str, content: &[u8]) -> Result<u64, FileError> {
        self.store.writer().validate_content(content)?;
        let document = self.store.resolve_file(path).await?;
        if self.materialize {
            // Fail on a directory before anything is recorded
            self.store.file_exists(&document).await?;
        }

        let history = self.history_dir(&document).await?;
        let _history_lock = self.store.locks().acquire(history.absolute()).await;

        let timestamp = Utc::now();
        let content_hash = ContentVerifier::compute_hash(content);
        let version = SequenceDir::new(history.absolute())
            .append(|version| {
                let record = VersionRecord {
                    path: document.relative().to_path_buf(),
                    version,
                    timestamp,
                    content_hash: content_hash.clone(),
                    content: content.to_vec(),
                };
                Ok(serde_json::to_vec(&record)?)
            })
            .await?;
        info!(path = %document.relative().display(), version, "Appended document version");

        if self.materialize {
            let _document_lock = self.store.locks().acquire(document.absolute()).await;
            self.store
                .commit(&document, content, OperationType::Version { version })
                .await?;
        }
        Ok(version)
    }

    /// Content of one version of a document
    pub async fn get_version(&self, path: &str, version: u64) -> Result<Vec<u8>, FileError> {
        Ok(self.get_record(path, version).await?.content)
    }

    /// Full record of one version, integrity-checked
    pub async fn get_record(&self, path: &str, version: u64) -> Result<VersionRecord, FileError> {
        let document = self.store.resolve_file(path).await?;
        let history = self.history_dir(&document).await?;
        let sequence = SequenceDir::new(history.absolute());

        if version == 0 || sequence.highest().await? == 0 {
            return Err(self.missing(&document, version));
        }
        match sequence.read(version).await? {
            Some(bytes) => self.decode(&document, version, &bytes),
            None => Err(self.missing(&document, version)),
        }
    }

    /// Newest version number and its content
    pub async fn latest(&self, path: &str) -> Result<(u64, Vec<u8>), FileError> {
        let document = self.store.resolve_file(path).await?;
        let history = self.history_dir(&document).await?;
        let sequence = SequenceDir::new(history.absolute());

        let version = sequence.highest().await?;
        if version == 0 {
            return Err(FileError::NotFound(document.relative().to_path_buf()));
        }
        match sequence.read(version).await? {
            Some(bytes) => Ok((version, self.decode(&document, version, &bytes)?.content)),
            None => Err(self.missing(&document, version)),
        }
    }

    /// Metadata of every version, oldest first
    pub async fn history(&self, path: &str) -> Result<Vec<VersionInfo>, FileError> {
        let document = self.store.resolve_file(path).await?;
        let history = self.history_dir(&document).await?;
        let sequence = SequenceDir::new(history.absolute());

        let versions = sequence.numbers().await?;
        if versions.is_empty() {
            return Err(FileError::NotFound(document.relative().to_path_buf()));
        }
        let mut infos = Vec::with_capacity(versions.len());
        for version in versions {
            if let Some(bytes) = sequence.read(version).await? {
                let record = self.decode(&document, version, &bytes)?;
                infos.push(VersionInfo::from(&record));
            }
        }
        debug!(path = %document.relative().display(), versions = infos.len(), "Loaded history");
        Ok(infos)
    }

    async fn history_dir(&self, document: &WorkspacePath) -> Result<WorkspacePath, FileError> {
        let guard = self.store.guard();
        let key = ContentVerifier::compute_hash(document.relative().to_string_lossy().as_bytes());
        let relative: PathBuf = Path::new(guard.metadata_dir())
            .join(VERSIONS_DIR)
            .join(key);
        guard.resolve_internal(&relative).await
    }

    fn decode(
        &self,
        document: &WorkspacePath,
        version: u64,
        bytes: &[u8],
    ) -> Result<VersionRecord, FileError> {
        let record: VersionRecord = serde_json::from_slice(bytes)?;
        if record.version != version || record.path != document.relative() {
            return Err(FileError::Corrupted(format!(
                "record {} of {} describes version {} of {}",
                version,
                document.relative().display(),
                record.version,
                record.path.display()
            )));
        }
        self.verifier.verify_record(&record)?;
        Ok(record)
    }

    fn missing(&self, document: &WorkspacePath, version: u64) -> FileError {
        FileError::VersionNotFound {
            path: document.relative().to_path_buf(),
            version,
        }
    }
}
