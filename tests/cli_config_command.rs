//! Integration tests for the CLI config command
//!
//! Verifies the generated template round-trips through the config loader.

use otelmetrics_demo::cli::generate_config_template;
use otelmetrics_demo::config::Config;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_generated_template_creates_valid_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, generate_config_template()).expect("Failed to write template");

    let config =
        Config::from_file(&config_path).expect("Generated template should load as valid Config");
    assert_eq!(config.server.port, 8080);
    assert!(config.exporter.enabled);
    assert_eq!(config.exporter.interval_seconds, 10);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_or_default(temp_dir.path().join("absent.toml"))
        .expect("missing file should use defaults");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.exporter.job, "otel-example");
}

#[test]
fn test_invalid_file_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[exporter]\ninterval_seconds = 0\n").unwrap();

    let err = Config::load_or_default(&config_path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("bad.toml"), "got: {}", message);
    assert!(message.contains("interval_seconds"), "got: {}", message);
}

#[test]
fn test_unreadable_path_is_read_error() {
    let temp_dir = TempDir::new().unwrap();
    // A directory exists but cannot be read as a file
    let err = Config::from_file(temp_dir.path()).unwrap_err();
    assert!(matches!(
        err,
        otelmetrics_demo::error::AppError::ConfigFileRead { .. }
    ));
}
