//! Forwarding headers added on the normal proxy path.
//!
//! # Responsibilities
//! - Append this proxy to `Via` on requests and responses
//! - Append the client address to `X-Forwarded-For`
//!
//! Direct-access requests never reach this layer, so origins contacted
//! directly see the client's headers untouched.

use async_trait::async_trait;

use crate::config::ForwardingConfig;
use crate::pipeline::{Layer, LayerError, Outcome, RequestContext};
use crate::pipeline::headers::HeaderSet;
use crate::routing::Decision;

const VIA: &str = "via";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Adds `Via` and `X-Forwarded-For`.
#[derive(Debug, Clone)]
pub struct ForwardedHeadersLayer {
    via: String,
    add_forwarded_for: bool,
}

impl ForwardedHeadersLayer {
    pub fn new(via_name: impl Into<String>, add_forwarded_for: bool) -> Self {
        Self {
            via: format!("1.1 {}", via_name.into()),
            add_forwarded_for,
        }
    }

    pub fn from_config(config: &ForwardingConfig) -> Self {
        Self::new(config.via_name.clone(), config.add_forwarded_for)
    }
}

/// Append `value` to a comma separated list header.
fn append_list(headers: &mut HeaderSet, name: &str, value: &str) {
    let mut joined = headers.get_all(name).collect::<Vec<_>>().join(&b", "[..]);
    if !joined.is_empty() {
        joined.extend_from_slice(b", ");
    }
    joined.extend_from_slice(value.as_bytes());
    headers.set(name, joined);
}

#[async_trait]
impl Layer for ForwardedHeadersLayer {
    fn name(&self) -> &'static str {
        "forwarded_headers"
    }

    fn on_request(&self, ctx: &mut RequestContext) -> Result<Decision, LayerError> {
        append_list(&mut ctx.request_headers, VIA, &self.via);
        if self.add_forwarded_for {
            if let Some(addr) = ctx.client_addr() {
                append_list(&mut ctx.request_headers, X_FORWARDED_FOR, &addr.ip().to_string());
            }
        }
        Ok(Decision::Continue)
    }

    async fn on_response(&self, ctx: &mut RequestContext, outcome: Outcome) -> Outcome {
        if matches!(outcome, Outcome::Forwarded) {
            append_list(&mut ctx.response_headers, VIA, &self.via);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn ctx(req: Request<Body>) -> RequestContext {
        RequestContext::new("test", Some("10.0.0.7:5555".parse().unwrap()), req).unwrap()
    }

    #[test]
    fn test_adds_via_and_forwarded_for() {
        let layer = ForwardedHeadersLayer::new("proxy", true);
        let mut ctx = ctx(Request::builder()
            .uri("http://example.com/")
            .header("X-Forwarded-For", "192.0.2.1")
            .body(Body::empty())
            .unwrap());

        assert_eq!(layer.on_request(&mut ctx).unwrap(), Decision::Continue);
        assert_eq!(ctx.request_headers.get_str("via"), Some("1.1 proxy"));
        assert_eq!(ctx.request_headers.get_str("x-forwarded-for"), Some("192.0.2.1, 10.0.0.7"));
    }

    #[test]
    fn test_forwarded_for_disabled() {
        let layer = ForwardedHeadersLayer::new("proxy", false);
        let mut ctx = ctx(Request::builder()
            .uri("http://example.com/")
            .header("Via", "1.0 upstream")
            .body(Body::empty())
            .unwrap());

        layer.on_request(&mut ctx).unwrap();
        assert_eq!(ctx.request_headers.get_str("via"), Some("1.0 upstream, 1.1 proxy"));
        assert!(!ctx.request_headers.contains("x-forwarded-for"));
    }

    #[test]
    fn test_keeps_non_ascii_list_entries() {
        let layer = ForwardedHeadersLayer::new("proxy", false);
        let mut ctx = ctx(Request::builder()
            .uri("http://example.com/")
            .header("Via", axum::http::HeaderValue::from_bytes(b"1.0 caf\xe9").unwrap())
            .body(Body::empty())
            .unwrap());

        layer.on_request(&mut ctx).unwrap();
        assert_eq!(ctx.request_headers.get("via"), Some(&b"1.0 caf\xe9, 1.1 proxy"[..]));
    }

    #[tokio::test]
    async fn test_response_via_only_when_forwarded() {
        let layer = ForwardedHeadersLayer::new("proxy", true);
        let mut ctx = ctx(Request::builder().uri("http://example.com/").body(Body::empty()).unwrap());

        let outcome = layer
            .on_response(&mut ctx, Outcome::Failed(LayerError::UnhandledDirectAccess))
            .await;
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(ctx.response_headers.is_empty());

        let outcome = layer.on_response(&mut ctx, Outcome::Forwarded).await;
        assert!(matches!(outcome, Outcome::Forwarded));
        assert_eq!(ctx.response_headers.get_str("via"), Some("1.1 proxy"));
    }
}
