//! Unit tests for configuration and graceful degradation
//!
//! Tests that manipulate HARVEST_ROOT_FOLDER are marked with #[serial]
//! to ensure they run sequentially, not in parallel.

use harvest_common::config::{
    default_config_path, default_root_folder, load_toml_config, load_toml_config_or_default,
    write_toml_config, RootFolderResolver, TomlConfig, CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, None);
    let root_folder = resolver.resolve();

    assert!(!root_folder.as_os_str().is_empty());
    assert_eq!(root_folder, default_root_folder());
}

#[test]
#[serial]
fn test_resolver_cli_beats_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/harvest-env");

    let resolver = RootFolderResolver::new(
        Some(PathBuf::from("/tmp/harvest-cli")),
        Some(PathBuf::from("/tmp/harvest-toml")),
    );
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/harvest-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/harvest-env");

    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/harvest-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/harvest-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_when_no_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/harvest-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/harvest-toml"));
}

#[test]
#[serial]
fn test_config_path_env_beats_root_folder() {
    env::set_var(CONFIG_PATH_ENV, "/etc/harvest/custom.toml");
    assert_eq!(
        default_config_path(&PathBuf::from("/srv/harvest")),
        PathBuf::from("/etc/harvest/custom.toml")
    );

    env::remove_var(CONFIG_PATH_ENV);
    assert_eq!(
        default_config_path(&PathBuf::from("/srv/harvest")),
        PathBuf::from("/srv/harvest/harvest.toml")
    );
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config_or_default(&temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.harvest.max_parallel_repos, 4);
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("harvest.toml");
    std::fs::write(
        &path,
        r#"
        [directory]
        enabled = false

        [harvest]
        merge_chunk_size = 50
        "#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert!(!config.directory.enabled);
    assert_eq!(config.directory.timeout_ms, 10_000);
    assert_eq!(config.harvest.merge_chunk_size, 50);
    assert_eq!(config.harvest.days_to_update_members, 30);
    assert_eq!(config.store.path, PathBuf::from("harvest.db"));
}

#[test]
fn test_malformed_config_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("harvest.toml");
    std::fs::write(&path, "[harvest\nmerge_chunk_size = ").unwrap();

    assert!(load_toml_config_or_default(&path).is_err());
}

#[test]
fn test_write_then_load_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("harvest.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/srv/harvest"));
    config.sources.corrections = Some(PathBuf::from("corrections.json"));

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_resolve_path_relative_to_root() {
    let root = PathBuf::from("/srv/harvest");
    assert_eq!(
        TomlConfig::resolve_path(&root, &PathBuf::from("harvest.db")),
        PathBuf::from("/srv/harvest/harvest.db")
    );
    assert_eq!(
        TomlConfig::resolve_path(&root, &PathBuf::from("/var/db/h.db")),
        PathBuf::from("/var/db/h.db")
    );
}
