//! Configuration manager implementation

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::{
        is_single_component, is_valid_log_name, ConfigManager as ConfigManagerTrait,
        WorkspaceConfig,
    },
};

/// Environment variable honoured for the workspace root when
/// `SCRIPTORIA_ROOT` is not set.
const LEGACY_ROOT_VAR: &str = "SCRIPTORIA_WORKSPACE";

/// Configuration manager
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Configuration file path
    config_path: PathBuf,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            env_prefix: "SCRIPTORIA".to_string(),
        }
    }

    /// Create with custom config path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            env_prefix: "SCRIPTORIA".to_string(),
        }
    }

    /// Override the environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Path of the configuration file this manager reads and writes
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Get default config path
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scriptoria")
            .join("config.toml")
    }
}

impl ConfigManagerTrait for ConfigManager {
    fn load_config(&mut self) -> Result<WorkspaceConfig> {
        let mut builder = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var_os(format!("{}_ROOT", self.env_prefix)).is_none() {
            if let Ok(root) = std::env::var(LEGACY_ROOT_VAR) {
                debug!(root = %root, "Using {} as workspace root", LEGACY_ROOT_VAR);
                builder = builder.set_override("root", root)?;
            }
        }

        let config = builder.build()?;
        let workspace_config: WorkspaceConfig = config.try_deserialize()?;
        self.validate_config(&workspace_config)?;
        Ok(workspace_config)
    }

    fn save_config(&self, config: &WorkspaceConfig) -> Result<()> {
        let toml = toml::to_string(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }

    fn validate_config(&self, config: &WorkspaceConfig) -> Result<()> {
        if config.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Workspace root must not be empty".to_string(),
            ));
        }
        if !is_single_component(&config.metadata_dir) {
            return Err(ConfigError::Validation(format!(
                "Metadata dir must be a single path component: {:?}",
                config.metadata_dir
            )));
        }
        if !is_valid_log_name(&config.default_log) {
            return Err(ConfigError::Validation(format!(
                "Invalid default log name: {:?}",
                config.default_log
            )));
        }
        let limits = &config.limits;
        if limits.max_pattern_len == 0
            || limits.regex_size_limit == 0
            || limits.max_edit_bytes == 0
            || limits.max_content_bytes == 0
        {
            return Err(ConfigError::Validation(
                "Limits must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
