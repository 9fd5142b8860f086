//! Layer hooks and the per-stage outcome channel.

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::executor::ExecutorError;
use crate::layers::direct_access::{DirectAccessError, DirectAccessStage};
use crate::pipeline::context::RequestContext;
use crate::pipeline::headers::HeaderSyncError;
use crate::routing::Decision;

/// Failure raised by a layer or by the pipeline's own forwarding step.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Direct access failed at a tagged stage.
    #[error(transparent)]
    DirectAccess(#[from] DirectAccessError),

    /// Structured request headers could not be written to the wire.
    #[error("cannot sync request headers: {0}")]
    RequestHeaders(#[source] HeaderSyncError),

    /// Wire response headers could not be read back.
    #[error("cannot read response headers: {0}")]
    ResponseHeaders(#[source] HeaderSyncError),

    /// The pipeline's executor failed.
    #[error("cannot execute request: {0}")]
    Executor(#[from] ExecutorError),

    /// A layer asked for direct access but none handled it on the way back.
    #[error("direct access requested but not handled by any layer")]
    UnhandledDirectAccess,
}

impl LayerError {
    /// Stage tag when the error comes from a direct access attempt.
    pub fn direct_access_stage(&self) -> Option<DirectAccessStage> {
        match self {
            LayerError::DirectAccess(e) => Some(e.stage),
            _ => None,
        }
    }

    /// Failures that happen after the origin answered. The origin's response
    /// is still delivered.
    pub fn is_soft(&self) -> bool {
        matches!(self, LayerError::ResponseHeaders(_))
            || self.direct_access_stage() == Some(DirectAccessStage::PullResponseHeaders)
    }

    /// Status used when the error has to be turned into a response.
    pub fn status(&self) -> StatusCode {
        match self {
            LayerError::DirectAccess(e) => match e.stage {
                DirectAccessStage::PushRequestHeaders => StatusCode::INTERNAL_SERVER_ERROR,
                DirectAccessStage::Execute if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
                DirectAccessStage::Execute | DirectAccessStage::PullResponseHeaders => StatusCode::BAD_GATEWAY,
            },
            LayerError::RequestHeaders(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LayerError::ResponseHeaders(_) => StatusCode::BAD_GATEWAY,
            LayerError::Executor(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            LayerError::Executor(_) => StatusCode::BAD_GATEWAY,
            LayerError::UnhandledDirectAccess => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text for the error response.
    pub fn reason(&self) -> &'static str {
        match self {
            LayerError::UnhandledDirectAccess => "Direct access not handled",
            LayerError::RequestHeaders(_) => "Cannot sync request headers",
            LayerError::DirectAccess(e) if e.stage == DirectAccessStage::PushRequestHeaders => {
                "Cannot sync request headers"
            }
            e if e.is_soft() => crate::pipeline::MALFORMED_RESPONSE_HEADERS,
            e if e.status() == StatusCode::GATEWAY_TIMEOUT => "Upstream request timed out",
            _ => "Upstream request failed",
        }
    }
}

/// Result threaded through `on_response` hooks, innermost layer first.
#[derive(Debug)]
pub enum Outcome {
    /// A response is available (normal forwarding or completed direct access).
    Forwarded,
    /// A layer classified the request for direct access; not yet executed.
    DirectAccess,
    /// Processing failed.
    Failed(LayerError),
}

/// A pipeline stage.
#[async_trait]
pub trait Layer: Send + Sync + std::fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called before forwarding, in layer order.
    ///
    /// Returning `Decision::DirectAccess` or an error stops the forward pass;
    /// later layers are skipped and the pipeline does not forward.
    fn on_request(&self, ctx: &mut RequestContext) -> Result<Decision, LayerError>;

    /// Called after forwarding or after a short circuit, in reverse order,
    /// for every layer whose `on_request` ran.
    async fn on_response(&self, ctx: &mut RequestContext, outcome: Outcome) -> Outcome;
}
