//! Data models for workspace operations

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change reported to write hooks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OperationType {
    /// A new file was created
    Create,
    /// An existing file was replaced
    Update,
    /// Content was appended to a file
    Append,
    /// A file was produced by copying another
    Copy {
        /// Workspace path the content came from
        from: PathBuf,
    },
    /// A new version of a versioned document was materialized
    Version {
        /// Version number that was written
        version: u64,
    },
}

/// Strategy when the target of a write already exists
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Leave the existing file unchanged and fail with a conflict
    Skip,
    /// Replace the existing file
    #[default]
    Overwrite,
}

/// Notification passed to write hooks after a successful mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteEvent {
    /// Workspace-relative path that changed
    pub path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// What happened
    pub operation: OperationType,
    /// SHA-256 of the file content after the change
    pub content_hash: String,
    /// When the change completed
    pub timestamp: DateTime<Utc>,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryInfo {
    /// File name within the listed directory
    pub name: String,
    /// Workspace-relative path
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_directory: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,
}

/// A file's content together with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Workspace-relative path
    pub path: PathBuf,
    /// Raw content
    pub content: Vec<u8>,
    /// Last modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,
}

/// A single stored version of a versioned document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    /// Workspace-relative document path
    pub path: PathBuf,
    /// Version number, starting at 1
    pub version: u64,
    /// When the version was appended
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of `content`
    pub content_hash: String,
    /// Snapshot of the document
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

/// Version metadata without the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version number
    pub version: u64,
    /// When the version was appended
    pub timestamp: DateTime<Utc>,
    /// Snapshot size in bytes
    pub size: u64,
    /// SHA-256 of the snapshot
    pub content_hash: String,
}

impl From<&VersionRecord> for VersionInfo {
    fn from(record: &VersionRecord) -> Self {
        VersionInfo {
            version: record.version,
            timestamp: record.timestamp,
            size: record.content.len() as u64,
            content_hash: record.content_hash.clone(),
        }
    }
}

/// An inter-agent message stored in a message log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Position in the log, strictly increasing from 1
    pub id: u64,
    /// Name of the log the message belongs to
    pub log: String,
    /// Sending agent
    pub sender: String,
    /// Receiving agent
    pub recipient: String,
    /// Assigned by the store at append time
    pub timestamp: DateTime<Utc>,
    /// Message text
    pub body: String,
}

/// One find/replace step of a pattern edit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternEdit {
    /// Regular expression to match
    pub pattern: String,
    /// Replacement; `$1`/`${name}` expand capture groups unless
    /// [`PatternOptions::literal_replacement`] is set
    pub replacement: String,
}

impl PatternEdit {
    /// Creates a new edit
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        PatternEdit {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Options applied to every edit of a pattern update
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PatternOptions {
    /// Match without regard to case
    pub case_insensitive: bool,
    /// Insert the replacement verbatim instead of expanding `$` references
    pub literal_replacement: bool,
    /// Replace at most this many matches per edit (`None` replaces all)
    pub max_replacements: Option<usize>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
