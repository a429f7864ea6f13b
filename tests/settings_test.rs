use qa_coordinator::config::CoordinatorConfig;
use qa_coordinator::settings::{load_settings, save_settings, PersistentSettings};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nonexistent.json");
    let settings = load_settings(&path);
    assert!(settings.results_dir.is_none());
    assert!(settings.database.is_none());
    assert!(settings.file_writer_enabled.is_none());
}

#[test]
fn test_load_invalid_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "not json at all {{{").unwrap();
    let settings = load_settings(&path);
    // Defaults instead of a panic
    assert!(settings.results_dir.is_none());
    assert!(settings.default_lease_ms.is_none());
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    let settings = PersistentSettings {
        results_dir: Some(PathBuf::from("/var/qa/reports")),
        file_writer_enabled: Some(true),
        database: Some(PathBuf::from("/var/qa/results.db")),
        default_lease_ms: Some(5_000),
        default_wait_ms: Some(2_000),
    };

    save_settings(&path, &settings).unwrap();
    let loaded = load_settings(&path);

    assert_eq!(loaded.results_dir, Some(PathBuf::from("/var/qa/reports")));
    assert_eq!(loaded.database, Some(PathBuf::from("/var/qa/results.db")));
    assert_eq!(loaded.default_lease_ms, Some(5_000));
    assert_eq!(loaded.default_wait_ms, Some(2_000));
}

#[test]
fn test_partial_settings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.json");

    std::fs::write(&path, r#"{"database": "qa.db"}"#).unwrap();
    let loaded = load_settings(&path);

    assert_eq!(loaded.database, Some(PathBuf::from("qa.db")));
    assert!(loaded.results_dir.is_none());
    assert!(loaded.file_writer_enabled.is_none());
}

#[test]
fn test_settings_override_config() {
    let mut config = CoordinatorConfig {
        results_dir: Some(PathBuf::from("qa-results")),
        ..CoordinatorConfig::default()
    };

    config.apply_settings(&PersistentSettings {
        file_writer_enabled: Some(false),
        database: Some(PathBuf::from("qa.db")),
        default_wait_ms: Some(250),
        ..PersistentSettings::default()
    });

    assert!(config.results_dir.is_none());
    assert_eq!(config.database, Some(PathBuf::from("qa.db")));
    assert_eq!(config.default_wait.as_millis(), 250);
}

#[test]
fn test_config_survives_settings_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("coordinator.json");

    let mut config = CoordinatorConfig {
        results_dir: None,
        database: Some(PathBuf::from("qa.db")),
        ..CoordinatorConfig::default()
    };
    config.default_wait = std::time::Duration::from_millis(750);
    save_settings(&path, &config.to_settings()).unwrap();

    let mut restored = CoordinatorConfig {
        results_dir: Some(PathBuf::from("elsewhere")),
        ..CoordinatorConfig::default()
    };
    restored.apply_settings(&load_settings(&path));

    assert!(restored.results_dir.is_none());
    assert_eq!(restored.database, Some(PathBuf::from("qa.db")));
    assert_eq!(restored.default_wait.as_millis(), 750);
    assert_eq!(restored.default_lease, config.default_lease);
}

#[test]
fn test_save_into_unwritable_path_fails() {
    let dir = TempDir::new().unwrap();
    // A file where the parent directory should be.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();
    assert!(save_settings(&blocker.join("settings.json"), &PersistentSettings::default()).is_err());
}
