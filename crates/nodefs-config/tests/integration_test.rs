//! Integration tests for nodefs-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use std::path::PathBuf;
use tempfile::tempdir;

use nodefs_config::{Config, MetadataBackendKind};

/// Test config loading from a real config file
#[test]
fn test_load_config_from_file() {
    let temp = tempdir().unwrap();
    let dir = temp.path().join(".nodefs");
    std::fs::create_dir_all(&dir).unwrap();

    let config_content = r#"
[storage]
root = "/srv/nodefs"
metadata_backend = "sidecar"

[lock]
max_retries = 3
initial_delay_ms = 25

[acl]
max_grants_per_node = 64

[tree]
list_concurrency = 8
"#;
    std::fs::write(dir.join("config.toml"), config_content).unwrap();

    let config = Config::load_file(&dir.join("config.toml")).unwrap();

    assert_eq!(config.storage.root, PathBuf::from("/srv/nodefs"));
    assert_eq!(config.storage.metadata_backend, MetadataBackendKind::Sidecar);
    assert_eq!(config.lock.max_retries, 3);
    assert_eq!(config.lock.initial_delay_ms, 25);
    assert_eq!(config.acl.grant_limit(), Some(64));
    assert_eq!(config.tree.list_concurrency, 8);
}

/// Test config hierarchy: project config overrides global
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();

    let global_dir = temp.path().join("global/.nodefs");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        r#"
[storage]
root = "/global/root"

[acl]
max_grants_per_node = 20
"#,
    )
    .unwrap();

    let project_dir = temp.path().join("project/.nodefs");
    std::fs::create_dir_all(&project_dir).unwrap();
    std::fs::write(
        project_dir.join("config.toml"),
        r#"
[storage]
root = "/project/root"
"#,
    )
    .unwrap();

    let mut config = Config::load_file(&global_dir.join("config.toml")).unwrap();
    let project = Config::load_file(&project_dir.join("config.toml")).unwrap();
    config.merge(project);

    assert_eq!(config.storage.root, PathBuf::from("/project/root"));
    // untouched in the project file, so the global value survives
    assert_eq!(config.acl.max_grants_per_node, 20);
}

/// Partial files fill the remaining sections with defaults
#[test]
fn test_partial_config_uses_defaults() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[lock]\nmax_retries = 1\n").unwrap();

    let config = Config::load_file(&path).unwrap();
    assert_eq!(config.lock.max_retries, 1);
    assert_eq!(config.lock.initial_delay_ms, 10);
    assert_eq!(config.acl.max_grants_per_node, 50);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[storage\nroot = ").unwrap();

    assert!(matches!(
        Config::load_file(&path),
        Err(nodefs_config::ConfigError::Toml(_))
    ));
}

#[test]
fn test_unknown_backend_is_rejected() {
    let result: Result<Config, _> = toml::from_str("[storage]\nmetadata_backend = \"xattrs\"\n");
    assert!(result.is_err());
}
