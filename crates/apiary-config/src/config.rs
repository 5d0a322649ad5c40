//! Main configuration type.
//!
//! This module provides the top-level [`ApiaryConfig`] struct, its presets and
//! its validation rules.

use serde::{Deserialize, Serialize};

use crate::{BodyConfig, ConfigError, CorsSection, LoggingConfig, OpenApiConfig, ServerConfig};

/// Complete Apiary service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use apiary_config::ApiaryConfig;
///
/// let config = ApiaryConfig::default();
/// assert_eq!(config.server.port, 3000);
/// assert_eq!(config.body.content_types, vec!["application/vnd.api+json"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ApiaryConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// API document and validation toggles.
    #[serde(default)]
    pub openapi: OpenApiConfig,

    /// CORS policy.
    #[serde(default)]
    pub cors: CorsSection,

    /// Body parser settings.
    #[serde(default)]
    pub body: BodyConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ApiaryConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] or [`ConfigError::ValidationError`]
    /// naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }

        if let Some(api_doc) = &self.openapi.api_doc {
            if api_doc.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "openapi.api_doc",
                    "must not be empty when set",
                ));
            }
        }

        if self.body.limit_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "body.limit_bytes",
                "must be greater than zero",
            ));
        }

        if let Some(bad) = self
            .body
            .content_types
            .iter()
            .find(|ct| !ct.contains('/'))
        {
            return Err(ConfigError::invalid_value(
                "body.content_types",
                format!("not a media type: {bad}"),
            ));
        }

        if let Some(bad) = self
            .cors
            .allowed_methods
            .iter()
            .find(|m| m.is_empty() || !m.bytes().all(|b| b.is_ascii_uppercase()))
        {
            return Err(ConfigError::invalid_value(
                "cors.allowed_methods",
                format!("not an HTTP method: {bad}"),
            ));
        }

        // Browsers reject a wildcard origin on credentialed requests.
        if self.cors.allow_credentials && self.cors.allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::validation_error(
                "cors.allow_credentials cannot be combined with a '*' origin",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug logs, and responses are not validated.
    ///
    /// # Example
    ///
    /// ```
    /// use apiary_config::ApiaryConfig;
    ///
    /// let config = ApiaryConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(!config.openapi.validate_responses);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.json_format = false;
        config.server.host = "127.0.0.1".to_string();
        config.openapi.validate_responses = false;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs at info level with every validation switched on.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.json_format = true;
        config.openapi.validate_api_doc = true;
        config.openapi.validate_requests = true;
        config.openapi.validate_responses = true;

        config
    }
}
