//! Loads configuration from real files and the process environment.

use std::io::Write;

use apiary_config::{ConfigError, ConfigLoader};
use tempfile::Builder;

#[test]
fn test_toml_file_then_json_file() {
    let mut toml_file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        toml_file,
        r#"
[server]
port = 8080

[openapi]
api_doc = "./api/openapi.yaml"
validate_responses = false

[cors]
allowed_origins = ["https://app.example.com"]
allow_credentials = true
max_age_secs = 600
"#
    )
    .unwrap();

    let mut json_file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(json_file, r#"{{"logging": {{"level": "warn"}}}}"#).unwrap();

    let config = ConfigLoader::new()
        .with_file(toml_file.path())
        .unwrap()
        .with_file(json_file.path())
        .unwrap()
        .load()
        .unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.openapi.api_doc.as_deref(), Some("./api/openapi.yaml"));
    assert!(!config.openapi.validate_responses);
    assert!(config.openapi.validate_requests);
    assert_eq!(config.cors.max_age_secs, Some(600));
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.body.limit_bytes, 100 * 1024);
}

#[test]
fn test_unsupported_extension() {
    let file = Builder::new().suffix(".ini").tempfile().unwrap();
    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_malformed_toml_file() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[server\nport = ").unwrap();

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn test_file_value_fails_validation() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[body]\nlimit_bytes = 0").unwrap();

    let result = ConfigLoader::new().with_file(file.path()).unwrap().load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_env_overrides_file() {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[server]\nport = 8080").unwrap();

    std::env::set_var("APIARY_LAYERED_ENV__SERVER__PORT", "9090");
    std::env::set_var("APIARY_LAYERED_ENV__LOGGING__JSON_FORMAT", "false");

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .with_env_prefix("apiary_layered_env")
        .load()
        .unwrap();

    assert_eq!(config.server.port, 9090);
    assert!(!config.logging.json_format);
}

#[test]
fn test_invalid_env_value() {
    std::env::set_var("APIARY_BAD_ENV__BODY__LIMIT_BYTES", "lots");

    let result = ConfigLoader::new().with_env_prefix("APIARY_BAD_ENV").load();
    assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
}

#[test]
fn test_dotenv_file_feeds_env_overrides() {
    let mut dotenv = Builder::new().suffix(".env").tempfile().unwrap();
    writeln!(dotenv, "APIARY_DOTENV__SERVER__SHUTDOWN_TIMEOUT_SECS=5").unwrap();
    writeln!(dotenv, "APIARY_DOTENV__LOGGING__SERVICE_NAME=users-api").unwrap();

    let config = ConfigLoader::new()
        .with_dotenv_file(dotenv.path())
        .unwrap()
        .with_env_prefix("APIARY_DOTENV")
        .load()
        .unwrap();

    assert_eq!(config.server.shutdown_timeout_secs, 5);
    assert_eq!(config.logging.service_name, "users-api");
}

#[test]
fn test_missing_dotenv_file_is_error() {
    let result = ConfigLoader::new().with_dotenv_file("/nonexistent/.env");
    assert!(matches!(result, Err(ConfigError::Dotenv(_))));
}
