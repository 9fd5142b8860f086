//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with a single fallback handler
//! - Wire up middleware (tracing, limits, request ID)
//! - Bind server to listener
//! - Hand every request to the current pipeline
//! - Swap in a rebuilt pipeline when the configuration changes

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::request::{propagate_request_id, set_request_id};
use crate::pipeline::{simple_response, Pipeline, PipelineBuildError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ArcSwap<Pipeline>>,
    /// Bounds in-flight requests (backpressure).
    pub in_flight: Arc<Semaphore>,
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    router: Router,
    pipeline: Arc<ArcSwap<Pipeline>>,
    in_flight: Arc<Semaphore>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails if the direct access rules do not compile.
    pub fn new(config: ProxyConfig) -> Result<Self, PipelineBuildError> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create a server around an already built pipeline.
    pub fn with_pipeline(config: ProxyConfig, pipeline: Pipeline) -> Self {
        let pipeline = Arc::new(ArcSwap::from_pointee(pipeline));
        let in_flight = Arc::new(Semaphore::new(
            config.listener.max_connections.min(Semaphore::MAX_PERMITS),
        ));
        let state = AppState {
            pipeline: pipeline.clone(),
            in_flight: in_flight.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            pipeline,
            in_flight,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let deadline = Duration::from_secs(
            config
                .timeouts
                .connect_secs
                .saturating_add(config.timeouts.request_secs),
        );

        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
                    .layer(TimeoutLayer::new(deadline)),
            )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` rebuild the pipeline; a
    /// configuration whose rules fail to compile is logged and dropped.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            layers = ?self.pipeline.load().layer_names(),
            "HTTP server starting"
        );

        let pipeline = self.pipeline.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match Pipeline::from_config(&config) {
                    Ok(new_pipeline) => {
                        pipeline.store(Arc::new(new_pipeline));
                        tracing::info!("Pipeline reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected reloaded configuration, keeping current pipeline");
                    }
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let in_flight = self.in_flight;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                // Requests still waiting for a slot are refused.
                in_flight.close();
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Runs the request through the current pipeline.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    if request.method() == Method::CONNECT {
        tracing::debug!(client = %addr, target = %request.uri(), "Refusing CONNECT");
        return simple_response(StatusCode::NOT_IMPLEMENTED, "CONNECT is not supported");
    }

    // Waits for a slot once max_connections requests are in flight.
    let _permit = match state.in_flight.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return simple_response(StatusCode::SERVICE_UNAVAILABLE, "Proxy is shutting down"),
    };

    let pipeline = state.pipeline.load_full();
    pipeline.handle(request, Some(addr)).await
}
