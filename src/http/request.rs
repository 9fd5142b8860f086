//! Request ID middleware.
//!
//! # Responsibilities
//! - Assign a UUID v4 request ID to requests that carry none
//! - Echo the ID back on the response
//!
//! # Design Decisions
//! - Request ID added as early as possible so the pipeline span carries it
//! - A client-supplied `x-request-id` is kept as is

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Layer setting `x-request-id` on inbound requests.
pub fn set_request_id() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer copying `x-request-id` from the request to the response.
pub fn propagate_request_id() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
