//! Direct origin connections.
//!
//! # Responsibilities
//! - Resolve the origin from the request (authority, else Host header)
//! - Dial the origin with the base connector, never through another proxy
//! - Strip hop-by-hop headers in both directions
//! - Enforce connect and response deadlines

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TimeoutConfig;
use crate::executor::{Executor, ExecutorError};
use crate::pipeline::RequestContext;

/// Headers that only apply to a single connection.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("proxy-connection"),
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// Executor that talks to the origin over a plain, pooled TCP client.
#[derive(Debug, Clone)]
pub struct DirectExecutor {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl DirectExecutor {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            request_timeout,
        }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(
            Duration::from_secs(config.connect_secs),
            Duration::from_secs(config.request_secs),
        )
    }
}

impl Default for DirectExecutor {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

#[async_trait]
impl Executor for DirectExecutor {
    async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ExecutorError> {
        let uri = origin_uri(&ctx.request)?;
        let body = std::mem::take(ctx.request.body_mut());

        let mut outbound = Request::builder()
            .method(ctx.request.method().clone())
            .uri(uri)
            .body(body)?;
        *outbound.headers_mut() = ctx.request.headers().clone();
        strip_hop_by_hop(outbound.headers_mut());

        tracing::debug!(
            parent: ctx.span(),
            uri = %outbound.uri(),
            "Dialing origin"
        );

        let response: Response<Incoming> = match tokio::time::timeout(self.request_timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ExecutorError::Upstream(Box::new(e))),
            Err(_) => return Err(ExecutorError::Timeout(self.request_timeout)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        ctx.response = Some(Response::from_parts(parts, Body::new(body)));
        Ok(())
    }
}

/// Absolute origin URI for a request received in absolute or origin form.
pub fn origin_uri<B>(req: &Request<B>) -> Result<Uri, ExecutorError> {
    let uri = req.uri();

    let scheme = uri.scheme().cloned().unwrap_or(Scheme::HTTP);
    if scheme != Scheme::HTTP {
        return Err(ExecutorError::InvalidTarget(format!("unsupported scheme {}", scheme)));
    }

    let authority = match uri.authority() {
        Some(authority) => authority.clone(),
        None => {
            let host = req
                .headers()
                .get(header::HOST)
                .ok_or(ExecutorError::MissingHost)?
                .to_str()
                .map_err(|_| ExecutorError::InvalidTarget("non-ascii host".to_string()))?;
            Authority::from_str(host).map_err(|e| ExecutorError::InvalidTarget(e.to_string()))?
        }
    };

    let path_and_query = uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    Ok(Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()?)
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    // Framing is re-done by the connection that carries the message.
    headers.remove(header::TRANSFER_ENCODING);
}
