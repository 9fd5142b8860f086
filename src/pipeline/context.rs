//! Per-request state handed to layers.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use tracing::Span;

use crate::pipeline::headers::{HeaderSet, HeaderSyncError};
use crate::routing::RoutingSubject;

/// Per-request state owned by the pipeline.
///
/// Layers receive `&mut RequestContext` for the duration of a single hook
/// call. Nothing outlives the request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    client_addr: Option<SocketAddr>,
    span: Span,

    /// Wire-level request as received (body is taken by the executor).
    pub request: Request<Body>,
    /// Wire-level response, set by whichever executor ran.
    pub response: Option<Response<Body>>,

    /// Structured view of the request headers.
    pub request_headers: HeaderSet,
    /// Structured view of the response headers.
    pub response_headers: HeaderSet,
    /// Whether `response_headers` mirrors the current wire response.
    response_view_synced: bool,
}

impl RequestContext {
    /// Build a context around an inbound request.
    ///
    /// The request header view is pulled from the wire immediately.
    pub fn new(
        request_id: impl Into<String>,
        client_addr: Option<SocketAddr>,
        request: Request<Body>,
    ) -> Result<Self, (Request<Body>, HeaderSyncError)> {
        let request_id = request_id.into();
        let span = tracing::debug_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        );

        let mut request_headers = HeaderSet::new();
        if let Err(e) = request_headers.pull(request.headers()) {
            return Err((request, e));
        }

        Ok(Self {
            request_id,
            client_addr,
            span,
            request,
            response: None,
            request_headers,
            response_headers: HeaderSet::new(),
            response_view_synced: false,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Logger handle bound to this request.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Host ++ request-target of the wire request.
    pub fn routing_subject(&self) -> RoutingSubject {
        RoutingSubject::from_request(&self.request)
    }

    /// Copy the structured request headers onto the wire request.
    pub fn push_request_headers(&mut self) -> Result<(), HeaderSyncError> {
        self.request_headers.push(self.request.headers_mut())
    }

    /// Copy the wire response headers into the structured view.
    ///
    /// A context without a response yields an empty view.
    pub fn pull_response_headers(&mut self) -> Result<(), HeaderSyncError> {
        let result = match &self.response {
            Some(response) => self.response_headers.pull(response.headers()),
            None => {
                self.response_headers = HeaderSet::new();
                Ok(())
            }
        };
        self.response_view_synced = result.is_ok();
        result
    }

    /// Copy the structured response headers onto the wire response.
    ///
    /// Does nothing unless the view was pulled from this response, so a
    /// failed pull never wipes the origin's headers.
    pub fn push_response_headers(&mut self) -> Result<(), HeaderSyncError> {
        match &mut self.response {
            Some(response) if self.response_view_synced => {
                self.response_headers.push(response.headers_mut())
            }
            _ => Ok(()),
        }
    }

    /// Install a locally built response in place of the current one and
    /// pull its headers.
    pub fn replace_response(&mut self, response: Response<Body>) {
        self.response = Some(response);
        if let Err(e) = self.pull_response_headers() {
            tracing::warn!(parent: &self.span, error = %e, "Replacement response has unreadable headers");
        }
    }

    /// Take the response out of the context.
    pub fn take_response(&mut self) -> Option<Response<Body>> {
        self.response.take()
    }
}
