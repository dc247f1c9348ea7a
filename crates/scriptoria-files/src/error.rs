//! Error types for workspace operations

use std::path::PathBuf;

/// Errors that can occur during workspace operations
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// Path resolves outside the workspace root
    #[error("Path escapes the workspace: {path} ({reason})")]
    PathEscape {
        /// The client-supplied path
        path: String,
        /// Why the path was rejected
        reason: String,
    },

    /// Malformed path (empty segment, NUL byte, workspace root where a file is required)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path points into the store's reserved metadata directory
    #[error("Path is reserved for workspace metadata: {0}")]
    ReservedPath(String),

    /// File or directory not found at the specified path
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// Version does not exist for a versioned document
    #[error("Version {version} of {path:?} not found")]
    VersionNotFound {
        /// Document path
        path: PathBuf,
        /// Requested version
        version: u64,
    },

    /// Destination already exists and overwriting was not requested
    #[error("Conflict detected at {0}: path already exists")]
    Conflict(PathBuf),

    /// Non-recursive delete of a populated directory
    #[error("Directory is not empty: {0}")]
    NotEmpty(PathBuf),

    /// A file was required but the path is something else
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// A directory was required but the path is something else
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Pattern (regex or glob) failed to compile or exceeded its limits
    #[error("Invalid pattern: {0}")]
    Pattern(String),

    /// Invalid content provided
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Message log name is not usable
    #[error("Invalid log name: {0:?}")]
    InvalidLogName(String),

    /// Stored record failed its integrity check
    #[error("Integrity check failed: {0}")]
    Corrupted(String),

    /// Move crosses filesystems and the configured policy rejects copying
    #[error("Move from {from:?} to {to:?} crosses filesystems")]
    CrossDeviceMove {
        /// Source path
        from: PathBuf,
        /// Destination path
        to: PathBuf,
    },

    /// Record (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration rejected when opening a workspace
    #[error("Configuration error: {0}")]
    Config(#[from] scriptoria_config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FileError {
    /// Whether retrying the same call could succeed.
    ///
    /// Only generic I/O failures qualify; every other variant describes the
    /// request or the stored state and fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FileError::IoError(_))
    }

    pub(crate) fn escape(path: &str, reason: impl Into<String>) -> Self {
        FileError::PathEscape {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_io_errors_are_retryable() {
        let io = FileError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(io.is_retryable());
        assert!(!FileError::escape("../x", "parent traversal").is_retryable());
        assert!(!FileError::NotFound(PathBuf::from("a")).is_retryable());
    }

    #[test]
    fn test_escape_message_names_path() {
        let err = FileError::escape("../etc/passwd", "parent traversal");
        assert!(err.to_string().contains("../etc/passwd"));
    }
}
