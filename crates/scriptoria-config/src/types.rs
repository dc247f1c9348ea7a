//! Core configuration types and data structures

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default name of the directory (under the workspace root) that holds
/// version histories and message logs.
pub const DEFAULT_METADATA_DIR: &str = ".scriptoria";

/// Default message log used when a caller does not name one.
pub const DEFAULT_LOG_NAME: &str = "main";

/// Longest accepted message log name.
pub const MAX_LOG_NAME_LEN: usize = 128;

/// Configuration of a single sandboxed workspace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory every client path is sandboxed beneath
    pub root: PathBuf,
    /// Create the root directory when it does not exist yet
    pub create_root: bool,
    /// Name of the reserved metadata directory under the root
    pub metadata_dir: String,
    /// Message log used by `append_message` when no log is named
    pub default_log: String,
    /// Also write the newest version of a versioned document to its
    /// workspace path
    pub materialize_documents: bool,
    /// What `move` does when source and destination sit on different volumes
    pub cross_device_moves: CrossDevicePolicy,
    /// Bounds on pattern edits and content sizes
    pub limits: EditLimits,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Behaviour of `move` across filesystem boundaries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossDevicePolicy {
    /// Copy the source to the destination, then delete the source.
    /// Only atomic per file.
    #[default]
    CopyThenDelete,
    /// Fail the move instead of falling back to a copy
    Reject,
}

/// Limits applied to pattern edits and stored content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditLimits {
    /// Longest accepted pattern source, in bytes
    pub max_pattern_len: usize,
    /// Upper bound on the compiled program size of a pattern, in bytes
    pub regex_size_limit: usize,
    /// Largest file a pattern edit will load, in bytes
    pub max_edit_bytes: u64,
    /// Largest content accepted by a single write, in bytes
    pub max_content_bytes: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Include the module target in each line
    pub with_target: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("scriptoria_workspace"),
            create_root: true,
            metadata_dir: DEFAULT_METADATA_DIR.to_string(),
            default_log: DEFAULT_LOG_NAME.to_string(),
            materialize_documents: true,
            cross_device_moves: CrossDevicePolicy::default(),
            limits: EditLimits::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Create a configuration rooted at `root` with every other value defaulted
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

impl Default for EditLimits {
    fn default() -> Self {
        Self {
            max_pattern_len: 4096,
            regex_size_limit: 1 << 20,
            max_edit_bytes: 16 * 1024 * 1024,
            max_content_bytes: 256 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
        }
    }
}

/// Returns true if `name` can be used as a message log name.
///
/// Log names become directory names under the metadata dir, so they are
/// restricted to ASCII alphanumerics, `-`, `_` and `.`, may not start with a
/// dot and are at most [`MAX_LOG_NAME_LEN`] bytes long.
pub fn is_valid_log_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_LOG_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Returns true if `name` is a single plain path component
pub(crate) fn is_single_component(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Configuration manager trait
pub trait ConfigManager {
    /// Load configuration
    fn load_config(&mut self) -> Result<WorkspaceConfig, crate::error::ConfigError>;
    /// Save configuration
    fn save_config(&self, config: &WorkspaceConfig) -> Result<(), crate::error::ConfigError>;
    /// Validate configuration
    fn validate_config(&self, config: &WorkspaceConfig) -> Result<(), crate::error::ConfigError>;
}
