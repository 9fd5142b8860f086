//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound Request
//!     → context.rs (RequestContext, request headers pulled)
//!     → layer.rs on_request hooks, in order
//!         Continue      → next layer
//!         DirectAccess  → stop, skip forwarding
//!         Err           → stop, skip forwarding
//!     → forwarding (only if every layer continued):
//!         push request headers → executor → pull response headers
//!     → layer.rs on_response hooks, reverse order, Outcome threaded through
//!     → Outcome mapped to a Response
//! ```
//!
//! # Design Decisions
//! - The pipeline owns the context; layers borrow it for one hook call
//! - Direct access travels as `Outcome::DirectAccess`, never as an error
//! - Only layers whose `on_request` ran see `on_response`
//! - Response-header read failures follow `MalformedHeaderPolicy` on both paths

pub mod context;
pub mod headers;
pub mod layer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{MalformedHeaderPolicy, ProxyConfig};
use crate::executor::{DirectExecutor, Executor};
use crate::layers::{DirectAccessLayer, ForwardedHeadersLayer};
use crate::observability::metrics;
use crate::routing::{Decision, RuleError};

pub use context::RequestContext;
pub use headers::{Header, HeaderSet, HeaderSyncError};
pub use layer::{Layer, LayerError, Outcome};

/// Header carrying the request ID (set by the HTTP middleware).
pub const X_REQUEST_ID: &str = "x-request-id";

/// Pipeline construction failure.
#[derive(Debug, Error)]
pub enum PipelineBuildError {
    #[error("cannot compile direct access rules: {0}")]
    Rules(#[from] RuleError),
}

/// Body of the response replacing one with unreadable headers.
pub const MALFORMED_RESPONSE_HEADERS: &str = "Malformed response headers";

/// Plain-text response with a fixed status.
pub fn simple_response(status: StatusCode, body: &'static str) -> Response<Body> {
    (status, body).into_response()
}

impl MalformedHeaderPolicy {
    /// Act on a response whose headers could not be pulled.
    pub fn apply(self, ctx: &mut RequestContext) {
        if self == MalformedHeaderPolicy::Reject {
            ctx.replace_response(simple_response(StatusCode::BAD_REQUEST, MALFORMED_RESPONSE_HEADERS));
        }
    }
}

/// Ordered layers plus the executor used for normal forwarding.
#[derive(Debug)]
pub struct Pipeline {
    layers: Vec<Box<dyn Layer>>,
    executor: Arc<dyn Executor>,
    malformed_headers: MalformedHeaderPolicy,
}

impl Pipeline {
    /// Create an empty pipeline forwarding through `executor`.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            layers: Vec::new(),
            executor,
            malformed_headers: MalformedHeaderPolicy::default(),
        }
    }

    /// Policy for forwarded responses with unreadable headers.
    pub fn with_malformed_header_policy(mut self, policy: MalformedHeaderPolicy) -> Self {
        self.malformed_headers = policy;
        self
    }

    /// Append a layer. Layers run `on_request` in the order they are added.
    pub fn with_layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Build the standard chain: direct access first, then forwarding headers.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, PipelineBuildError> {
        let executor = Arc::new(DirectExecutor::from_config(&config.timeouts));

        let direct_access = DirectAccessLayer::from_config(&config.direct_access, &config.timeouts)?
            .with_executor(executor.clone());

        tracing::info!(
            include_rules = direct_access.rules().include_rules().len(),
            exclude_rules = direct_access.rules().exclude_rules().len(),
            "Direct access rules compiled"
        );

        Ok(Self::new(executor)
            .with_malformed_header_policy(config.direct_access.malformed_response_headers)
            .with_layer(direct_access)
            .with_layer(ForwardedHeadersLayer::from_config(&config.forwarding)))
    }

    /// Layer names in execution order.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Run a request through the pipeline and produce the client response.
    pub async fn handle(&self, request: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let start_time = Instant::now();
        let method = request.method().to_string();
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut ctx = match RequestContext::new(request_id, client_addr, request) {
            Ok(ctx) => ctx,
            Err((request, e)) => {
                tracing::warn!(uri = %request.uri(), error = %e, "Rejecting request with malformed headers");
                metrics::record_request(&method, StatusCode::BAD_REQUEST.as_u16(), start_time);
                return simple_response(StatusCode::BAD_REQUEST, "Malformed request headers");
            }
        };

        let outcome = self.process(&mut ctx).await;
        let response = Self::finish(&mut ctx, outcome);

        tracing::debug!(parent: ctx.span(), status = %response.status(), "Request finished");
        metrics::record_request(&method, response.status().as_u16(), start_time);
        response
    }

    /// Run the layer hooks and, unless short-circuited, the forwarding step.
    pub async fn process(&self, ctx: &mut RequestContext) -> Outcome {
        let mut outcome = Outcome::Forwarded;
        let mut ran = 0;

        for layer in &self.layers {
            ran += 1;
            match layer.on_request(ctx) {
                Ok(Decision::Continue) => {}
                Ok(Decision::DirectAccess) => {
                    tracing::debug!(parent: ctx.span(), layer = layer.name(), "Direct access requested");
                    outcome = Outcome::DirectAccess;
                    break;
                }
                Err(e) => {
                    tracing::debug!(parent: ctx.span(), layer = layer.name(), error = %e, "Layer failed");
                    outcome = Outcome::Failed(e);
                    break;
                }
            }
        }

        if matches!(outcome, Outcome::Forwarded) {
            outcome = self.forward(ctx).await;
        }

        for layer in self.layers[..ran].iter().rev() {
            outcome = layer.on_response(ctx, outcome).await;
        }

        match outcome {
            Outcome::DirectAccess => Outcome::Failed(LayerError::UnhandledDirectAccess),
            other => other,
        }
    }

    async fn forward(&self, ctx: &mut RequestContext) -> Outcome {
        if let Err(e) = ctx.push_request_headers() {
            return Outcome::Failed(LayerError::RequestHeaders(e));
        }
        if let Err(e) = self.executor.execute(ctx).await {
            return Outcome::Failed(e.into());
        }
        if let Err(e) = ctx.pull_response_headers() {
            self.malformed_headers.apply(ctx);
            return Outcome::Failed(LayerError::ResponseHeaders(e));
        }
        Outcome::Forwarded
    }

    /// Turn the final outcome into the response sent to the client.
    fn finish(ctx: &mut RequestContext, outcome: Outcome) -> Response<Body> {
        let err = match outcome {
            Outcome::Forwarded => {
                if let Err(e) = ctx.push_response_headers() {
                    tracing::warn!(parent: ctx.span(), error = %e, "Cannot sync response headers, sending as received");
                }
                return match ctx.take_response() {
                    Some(response) => response,
                    None => simple_response(StatusCode::BAD_GATEWAY, "Upstream returned no response"),
                };
            }
            Outcome::DirectAccess => LayerError::UnhandledDirectAccess,
            Outcome::Failed(err) => err,
        };

        if err.is_soft() {
            if let Some(response) = ctx.take_response() {
                tracing::warn!(parent: ctx.span(), error = %err, "Delivering response with unreadable headers");
                return response;
            }
        }

        tracing::error!(parent: ctx.span(), error = %err, status = %err.status(), "Request failed");
        simple_response(err.status(), err.reason())
    }
}
