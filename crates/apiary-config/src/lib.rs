//! Typed configuration for Apiary services.
//!
//! - TOML and JSON configuration files
//! - `.env` files and environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! [`ApiaryConfig`] holds one section per concern:
//!
//! - [`ServerConfig`] - listener host, port and shutdown timeout
//! - [`OpenApiConfig`] - API document and validation toggles
//! - [`CorsSection`] - CORS policy
//! - [`BodyConfig`] - parsed content types and the body size limit
//! - [`LoggingConfig`] - log level and format
//!
//! # Example
//!
//! ```no_run
//! use apiary_config::ConfigLoader;
//!
//! # fn main() -> Result<(), apiary_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("apiary.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("APIARY")
//!     .load()?;
//!
//! println!("listening on {}", config.server.bind_addr());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! shutdown_timeout_secs = 30
//!
//! [openapi]
//! api_doc = "./api/openapi.yaml"
//! validate_api_doc = true
//! validate_requests = true
//! validate_responses = true
//!
//! [cors]
//! allowed_origins = ["*"]
//!
//! [body]
//! content_types = ["application/vnd.api+json"]
//! limit_bytes = 102400
//!
//! [logging]
//! level = "info"
//! json_format = true
//! service_name = "users-api"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values are overridden with `PREFIX__SECTION__KEY`:
//!
//! - `APIARY__SERVER__PORT=8080`
//! - `APIARY__OPENAPI__VALIDATE_RESPONSES=false`
//! - `APIARY__BODY__CONTENT_TYPES=application/json,application/vnd.api+json`

#![doc(html_root_url = "https://docs.rs/apiary-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::ApiaryConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{BodyConfig, CorsSection, LoggingConfig, OpenApiConfig, ServerConfig};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
