//! # Apiary OpenAPI
//!
//! The API document collaborator used by the Apiary request pipeline.
//!
//! ## Overview
//!
//! - [`DocumentLoader`] loads a document from a file, a URL or memory
//! - [`validate_document`] checks it at startup
//! - [`ApiContract`] compiles it: resolves references, compiles schemas
//!   and registers routes
//! - [`ContractOperation`] validates requests and responses, raising
//!   [`HttpError`] on violations
//!
//! ## Example
//!
//! ```
//! use apiary_openapi::{validate_document, ApiContract, DocumentFormat, DocumentLoader};
//! use http::Method;
//!
//! let yaml = r"
//! openapi: 3.0.3
//! info: { title: Users, version: 1.0.0 }
//! paths:
//!   /users:
//!     get:
//!       operationId: listUsers
//!       responses:
//!         '200': { description: ok }
//! ";
//!
//! let document = DocumentLoader::parse(yaml, DocumentFormat::Yaml).unwrap();
//! validate_document(&document).unwrap();
//!
//! let contract = ApiContract::compile(&document).unwrap();
//! let route = contract.resolve(&Method::GET, "/users").unwrap();
//! assert_eq!(route.operation_id, "listUsers");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod contract;
mod document;
mod error;
mod loader;
mod resolver;
mod schema;

pub use contract::{
    is_json_media_type, media_type_essence, ApiContract, ContractBody, ContractContent,
    ContractOperation, ContractParameter, RequestParts,
};
pub use document::{
    Components, Info, MediaType, OpenApiDocument, Operation, Parameter, ParameterIn, PathItem,
    ReferenceOr, RequestBody, Response, Server,
};
pub use error::{HttpError, HttpErrorKind, OpenApiError, OpenApiResult, ValidationIssue};
pub use loader::{validate_document, ApiDocSource, DocumentFormat, DocumentLoader};
pub use resolver::{RouteMatch, RouteResolver};
pub use schema::{coerce_parameter, coerce_query, CompiledSchema};
