//! OpenAPI routing and request validation.
//!
//! Resolves the request to an operation of the compiled [`ApiContract`],
//! records the operation and its path parameters in the context, and
//! validates parameters and body before handing over to the handler.
//! Violations are raised as [`apiary_openapi::HttpError`].

use std::sync::Arc;

use apiary_openapi::{ApiContract, RequestParts};
use tracing::debug;

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, StageResult};

/// Router stage backed by a compiled API contract.
#[derive(Debug, Clone)]
pub struct OpenApiMiddleware {
    contract: Arc<ApiContract>,
    validate_requests: bool,
}

impl OpenApiMiddleware {
    /// Creates the stage. Request validation is on.
    #[must_use]
    pub fn new(contract: Arc<ApiContract>) -> Self {
        Self {
            contract,
            validate_requests: true,
        }
    }

    /// Turns request validation on or off. Routing always runs.
    #[must_use]
    pub const fn validate_requests(mut self, enabled: bool) -> Self {
        self.validate_requests = enabled;
        self
    }

    /// Returns the contract.
    #[must_use]
    pub fn contract(&self) -> &Arc<ApiContract> {
        &self.contract
    }
}

impl Middleware for OpenApiMiddleware {
    fn name(&self) -> &'static str {
        "openapi"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult> {
        Box::pin(async move {
            let route = self
                .contract
                .resolve(request.method(), request.uri().path())?;

            debug!(
                request_id = %ctx.request_id(),
                operation_id = %route.operation_id,
                path = %route.path_template,
                "operation resolved"
            );

            if self.validate_requests {
                if let Some(operation) = self.contract.operation(&route.operation_id) {
                    operation.validate_request(&RequestParts {
                        path_params: &route.path_params,
                        query: request.uri().query(),
                        headers: request.headers(),
                        body: ctx.body(),
                        has_body: ctx.has_body(),
                    })?;
                }
            }

            ctx.set_operation_id(route.operation_id);
            ctx.set_path_params(route.path_params);
            next.run(ctx, request).await
        })
    }
}
