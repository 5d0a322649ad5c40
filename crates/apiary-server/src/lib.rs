//! # Apiary Server
//!
//! HTTP listener, handler registry and service lifecycle for Apiary.
//!
//! This crate ties the other Apiary crates together:
//!
//! - [`App`] maps `operationId`s to async handlers
//! - [`Dispatcher`] runs the handler for the resolved operation and checks
//!   its reply against the contract
//! - [`Server`] and [`Listener`] serve HTTP/1.1 over hyper with graceful
//!   shutdown
//! - [`ApiService`] owns the `init`/`close` lifecycle
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use apiary_config::ConfigLoader;
//! use apiary_core::{ApiError, ErrorOptions};
//! use apiary_server::{ApiService, ApiServiceInit, App};
//! use apiary_telemetry::TracingLogger;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct NewUser {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("apiary.toml")?
//!         .with_env_prefix("APIARY")
//!         .load()?;
//!
//!     let app = App::new().json("createUser", http::StatusCode::CREATED, |_req, user: NewUser| async move {
//!         if user.name == "root" {
//!             let detail = format!("'{}' is reserved", user.name);
//!             return Err(anyhow::Error::from(ApiError::conflict(ErrorOptions::new().detail(detail))));
//!         }
//!         Ok(User { id: 1, name: user.name })
//!     });
//!
//!     let init = ApiServiceInit::from_config(app, Arc::new(TracingLogger::new()), config)?;
//!     ApiService::run(init).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/apiary-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod error;
mod server;
mod service;
pub mod shutdown;

pub use app::{App, Dispatcher, HandlerFuture, HandlerRequest, Reply, DEFAULT_REPLY_CONTENT_TYPE};
pub use error::{InitError, ServerError, ServiceError, ServiceResult};
pub use server::{Listener, Server, DEFAULT_SHUTDOWN_TIMEOUT};
pub use service::{ApiService, ApiServiceInit, LifecycleState};
