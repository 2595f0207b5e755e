//! Database path resolution and graceful config degradation
//!
//! Tests that touch `JCAT_DATABASE` (or the test-only variable below) are
//! marked `#[serial]` so environment changes never race.

use jcat_common::config::{DatabaseResolver, IntegrityConfig, TomlConfig, DATABASE_FILE_NAME};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TEST_ENV_VAR: &str = "JCAT_TEST_DATABASE";

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(TEST_ENV_VAR, "/tmp/from-env.db");
    let config = write_config("database = \"/tmp/from-config.db\"\n");

    let resolver = DatabaseResolver::new()
        .with_env_var(TEST_ENV_VAR)
        .with_config_file(Some(config.path().to_path_buf()));

    let path = resolver.resolve(Some(Path::new("/tmp/from-cli.db")));
    assert_eq!(path, PathBuf::from("/tmp/from-cli.db"));

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_beats_config_file() {
    env::set_var(TEST_ENV_VAR, "/tmp/from-env.db");
    let config = write_config("database = \"/tmp/from-config.db\"\n");

    let resolver = DatabaseResolver::new()
        .with_env_var(TEST_ENV_VAR)
        .with_config_file(Some(config.path().to_path_buf()));

    assert_eq!(resolver.resolve(None), PathBuf::from("/tmp/from-env.db"));

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_config_file_used_without_env() {
    env::remove_var(TEST_ENV_VAR);
    let config = write_config(
        "database = \"/tmp/from-config.db\"\n\n[integrity]\nconcurrency = 2\nlookup_confidence_threshold = 0.9\n",
    );

    let resolver = DatabaseResolver::new()
        .with_env_var(TEST_ENV_VAR)
        .with_config_file(Some(config.path().to_path_buf()));

    let settings = resolver.settings(None);
    assert_eq!(settings.database, PathBuf::from("/tmp/from-config.db"));
    assert_eq!(settings.integrity.concurrency, 2);
    assert_eq!(settings.integrity.lookup_confidence_threshold, 0.9);
    assert_eq!(settings.integrity.event_capacity, 1000);
}

#[test]
#[serial]
fn test_malformed_config_degrades_to_default() {
    env::remove_var(TEST_ENV_VAR);
    let config = write_config("database = [not toml\n");

    let resolver = DatabaseResolver::new()
        .with_env_var(TEST_ENV_VAR)
        .with_config_file(Some(config.path().to_path_buf()));

    let settings = resolver.settings(None);
    assert_eq!(
        settings.database.file_name().and_then(|n| n.to_str()),
        Some(DATABASE_FILE_NAME)
    );
    assert_eq!(settings.integrity, IntegrityConfig::default());
}

#[test]
fn test_load_reports_parse_errors() {
    let config = write_config("[integrity]\nconcurrency = \"many\"\n");
    assert!(TomlConfig::load(config.path()).is_err());
}
