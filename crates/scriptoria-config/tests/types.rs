use scriptoria_config::types::{is_valid_log_name, DEFAULT_METADATA_DIR};
use scriptoria_config::*;

#[test]
fn test_workspace_config_default() {
    let config = WorkspaceConfig::default();
    assert!(config.root.ends_with("scriptoria_workspace"));
    assert!(config.create_root);
    assert_eq!(config.metadata_dir, DEFAULT_METADATA_DIR);
    assert_eq!(config.default_log, "main");
    assert!(config.materialize_documents);
    assert_eq!(config.cross_device_moves, CrossDevicePolicy::CopyThenDelete);
    assert!(is_valid_log_name(&config.default_log));
}

#[test]
fn test_edit_limits_default() {
    let limits = EditLimits::default();
    assert_eq!(limits.max_pattern_len, 4096);
    assert!(limits.regex_size_limit > 0);
    assert!(limits.max_edit_bytes <= limits.max_content_bytes);
}

#[test]
fn test_config_validation() {
    let manager = ConfigManager::new();
    let mut config = WorkspaceConfig::with_root("/tmp/ws");
    assert!(manager.validate_config(&config).is_ok());

    config.metadata_dir = "a/b".to_string();
    assert!(manager.validate_config(&config).is_err());

    config.metadata_dir = ".meta/".to_string();
    assert!(manager.validate_config(&config).is_err());

    config.metadata_dir = DEFAULT_METADATA_DIR.to_string();
    config.default_log = "../escape".to_string();
    assert!(manager.validate_config(&config).is_err());

    config.default_log = "main".to_string();
    config.limits.max_pattern_len = 0;
    assert!(manager.validate_config(&config).is_err());

    config.limits = EditLimits::default();
    config.root = std::path::PathBuf::new();
    assert!(manager.validate_config(&config).is_err());
}
