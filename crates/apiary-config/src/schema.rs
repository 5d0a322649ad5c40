//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use apiary_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use apiary_config::ServerConfig;
///
/// let config = ServerConfig {
///     host: "127.0.0.1".to_string(),
///     port: 8080,
///     shutdown_timeout_secs: 10,
/// };
/// assert_eq!(config.bind_addr(), "127.0.0.1:8080");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on. `0` binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long `close` waits for in-flight connections, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// OpenAPI contract settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OpenApiConfig {
    /// Path or URL of the API document. May also be passed to `init` directly.
    #[serde(default)]
    pub api_doc: Option<String>,

    /// Check the document's own structure at startup.
    #[serde(default = "default_true")]
    pub validate_api_doc: bool,

    /// Validate incoming requests against the document.
    #[serde(default = "default_true")]
    pub validate_requests: bool,

    /// Validate handler responses against the document.
    #[serde(default = "default_true")]
    pub validate_responses: bool,
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            api_doc: None,
            validate_api_doc: true,
            validate_requests: true,
            validate_responses: true,
        }
    }
}

/// CORS policy.
///
/// The defaults allow any origin and reflect whatever headers a preflight
/// requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsSection {
    /// Allowed origins. `*` allows any.
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,

    /// Allowed methods, upper-case.
    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers. Empty reflects the preflight's request.
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Headers exposed to browser scripts.
    #[serde(default)]
    pub expose_headers: Vec<String>,

    /// Send `Access-Control-Allow-Credentials: true`.
    #[serde(default)]
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds.
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            allowed_origins: default_origins(),
            allowed_methods: default_methods(),
            allowed_headers: Vec::new(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Body parser settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BodyConfig {
    /// Content types parsed as JSON.
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,

    /// Largest accepted body in bytes.
    #[serde(default = "default_limit_bytes")]
    pub limit_bytes: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            content_types: default_content_types(),
            limit_bytes: default_limit_bytes(),
        }
    }
}

fn default_content_types() -> Vec<String> {
    vec!["application/vnd.api+json".to_string()]
}

fn default_limit_bytes() -> usize {
    100 * 1024
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g. "info" or "apiary_server=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON output when true, pretty output otherwise.
    #[serde(default = "default_true")]
    pub json_format: bool,

    /// Service name reported in logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            json_format: true,
            service_name: default_service_name(),
        }
    }
}

impl LoggingConfig {
    /// Converts this section into the telemetry crate's [`LogConfig`].
    ///
    /// Pretty output picks up the development extras (file/line, span events).
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        let base = if self.json_format {
            LogConfig::production()
        } else {
            LogConfig::development()
        };

        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.json_format,
            service_name: self.service_name.clone(),
            ..base
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "apiary".to_string()
}

fn default_true() -> bool {
    true
}
