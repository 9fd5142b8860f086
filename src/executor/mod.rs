//! Origin executors.
//!
//! # Data Flow
//! ```text
//! RequestContext (wire request, headers already pushed)
//!     → Executor::execute (one HTTP round trip)
//!     → RequestContext.response populated
//! ```
//!
//! # Design Decisions
//! - One operation only, so tests can swap in a fake origin
//! - Executors own connection handling and deadlines; callers apply none
//! - Cancellation is whatever dropping the future does, nothing is inspected here

pub mod direct;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::pipeline::RequestContext;

pub use direct::DirectExecutor;

/// Boxed error source from an underlying client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from a single origin round trip.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Neither the URI nor the Host header names a host.
    #[error("request has no host")]
    MissingHost,

    /// The request target cannot be turned into an origin URI.
    #[error("invalid request target: {0}")]
    InvalidTarget(String),

    /// The outbound request could not be built.
    #[error("failed to build origin request: {0}")]
    Request(#[from] axum::http::Error),

    /// Connection or protocol failure talking to the origin.
    #[error("origin request failed: {0}")]
    Upstream(#[source] BoxError),

    /// The origin did not answer before the deadline.
    #[error("origin did not respond within {0:?}")]
    Timeout(Duration),
}

impl ExecutorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutorError::Timeout(_))
    }
}

/// Performs one HTTP round trip for a request context.
#[async_trait]
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Send `ctx.request` to its origin and store the answer in `ctx.response`.
    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ExecutorError>;
}
