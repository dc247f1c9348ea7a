//! Atomic file writing
//!
//! Content is staged in a uniquely named temp file next to the target,
//! flushed to disk, and only then renamed over the target. Readers see the
//! old content or the new content, never a prefix of it.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{error::FileError, fsutil};

/// Stages and commits atomic writes
#[derive(Debug, Clone)]
pub struct SafeWriter {
    max_content_bytes: u64,
}

/// Content written to a temp file that has not replaced its target yet
#[derive(Debug)]
#[must_use = "a staged write must be committed or discarded"]
pub struct StagedWrite {
    temp_path: PathBuf,
}

impl SafeWriter {
    /// Creates a writer that refuses content larger than `max_content_bytes`
    pub fn new(max_content_bytes: u64) -> Self {
        SafeWriter { max_content_bytes }
    }

    /// Validates content before writing
    ///
    /// # Returns
    ///
    /// Ok(()) if valid, `InvalidContent` otherwise
    pub fn validate_content(&self, content: &[u8]) -> Result<(), FileError> {
        if content.len() as u64 > self.max_content_bytes {
            return Err(FileError::InvalidContent(format!(
                "Content is {} bytes, limit is {}",
                content.len(),
                self.max_content_bytes
            )));
        }
        Ok(())
    }

    /// Writes `content` to a fresh temp file beside `target`
    ///
    /// The parent directory of `target` must already exist. The temp file is
    /// created exclusively and synced before this returns.
    ///
    /// # Arguments
    ///
    /// * `target` - Absolute path the content is meant for
    /// * `content` - Bytes to stage
    pub async fn stage(&self, target: &Path, content: &[u8]) -> Result<StagedWrite, FileError> {
        self.validate_content(content)?;
        let temp_path = fsutil::temp_path(target);
        let staged = StagedWrite { temp_path };

        let result = async {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staged.temp_path)
                .await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(temp = %staged.temp_path.display(), bytes = content.len(), "Staged write");
                Ok(staged)
            }
            Err(e) => {
                staged.discard().await;
                Err(FileError::IoError(e))
            }
        }
    }

    /// Stages and commits in one step
    pub async fn write_atomic(&self, target: &Path, content: &[u8]) -> Result<(), FileError> {
        self.stage(target, content).await?.commit(target).await
    }
}

impl StagedWrite {
    /// Path of the temp file holding the staged content
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Atomically renames the staged file over `target`
    ///
    /// On failure the temp file is removed and the target is untouched.
    pub async fn commit(self, target: &Path) -> Result<(), FileError> {
        match fs::rename(&self.temp_path, target).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.discard().await;
                Err(FileError::IoError(e))
            }
        }
    }

    /// Removes the temp file without touching the target
    pub async fn discard(self) {
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if !fsutil::is_missing(&e) {
                warn!(temp = %self.temp_path.display(), error = %e, "Failed to remove temp file");
            }
        }
    }
}
