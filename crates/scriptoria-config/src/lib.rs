//! Scriptoria Configuration Management
//!
//! Provides the configuration values consumed by the workspace store: the
//! workspace root, storage layout, edit limits and logging. Values are loaded
//! from an optional TOML file layered under `SCRIPTORIA_*` environment
//! variables, then validated before a store is opened.

pub mod error;
pub mod logging;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use logging::init_tracing;
pub use manager::ConfigManager;
pub use types::{
    ConfigManager as ConfigManagerTrait, CrossDevicePolicy, EditLimits, LoggingConfig,
    WorkspaceConfig,
};
