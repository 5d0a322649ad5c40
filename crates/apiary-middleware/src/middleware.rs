//! Core middleware traits and types.
//!
//! Two kinds of stages make up a pipeline:
//!
//! - [`Middleware`] runs on the request path. It receives the request and a
//!   [`Next`] callback, and returns a response or raises an error.
//! - [`ErrorStage`] runs on the error path only. It receives a raised error
//!   and forwards a (possibly reshaped) error. It never produces a response.
//!
//! # Example
//!
//! ```
//! use apiary_middleware::{BoxFuture, Middleware, Next, Request, StageResult};
//! use apiary_middleware::context::MiddlewareContext;
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, StageResult> {
//!         Box::pin(async move {
//!             let result = next.run(ctx, request).await;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "request handled");
//!             result
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, StageResult};
use std::future::Future;
use std::pin::Pin;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request-path stage.
///
/// A middleware either calls `next.run()` exactly once, or short-circuits
/// with its own response or error.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, StageResult>;
}

/// An error-path stage.
///
/// `handle` is total: whatever it receives, it returns an error to pass on.
pub trait ErrorStage: Send + Sync + 'static {
    /// Returns the unique name of this stage.
    fn name(&self) -> &'static str;

    /// Reshapes or forwards a raised error.
    fn handle(&self, ctx: &MiddlewareContext, error: anyhow::Error) -> anyhow::Error;
}

/// The terminal handler of a middleware chain.
pub type Handler<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, StageResult> + Send + 'a>;

/// Callback to invoke the next middleware in the chain.
///
/// Consumed on use, so it can only be called once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Handler<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, StageResult> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> StageResult {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// An error stage built from a function.
///
/// # Example
///
/// ```
/// use apiary_middleware::{ErrorStage, FnErrorStage};
/// use apiary_middleware::context::MiddlewareContext;
///
/// let stage = FnErrorStage::new("context", |_ctx: &MiddlewareContext, err: anyhow::Error| {
///     err.context("request failed")
/// });
///
/// let err = stage.handle(&MiddlewareContext::new(), anyhow::anyhow!("boom"));
/// assert_eq!(err.to_string(), "request failed");
/// ```
pub struct FnErrorStage<F> {
    name: &'static str,
    func: F,
}

impl<F> FnErrorStage<F> {
    /// Creates a function-based error stage.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> ErrorStage for FnErrorStage<F>
where
    F: Fn(&MiddlewareContext, anyhow::Error) -> anyhow::Error + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&self, ctx: &MiddlewareContext, error: anyhow::Error) -> anyhow::Error {
        (self.func)(ctx, error)
    }
}
