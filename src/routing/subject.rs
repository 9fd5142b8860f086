//! Routing subject extraction.

use axum::http::{header, Request};

/// Host and request-target of a request, concatenated byte for byte.
///
/// Built per request and dropped once the decision is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSubject(Vec<u8>);

impl RoutingSubject {
    /// Build the subject from a request.
    ///
    /// The host comes from the URI authority (absolute-form, as sent to a
    /// forward proxy) and falls back to the `Host` header. The target is the
    /// path plus query string, `/` when the URI carries neither. Userinfo
    /// is not part of the host.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let uri = req.uri();
        let host: &[u8] = match uri.authority() {
            Some(authority) => host_port(authority.as_str()).as_bytes(),
            None => req
                .headers()
                .get(header::HOST)
                .map(|h| h.as_bytes())
                .unwrap_or_default(),
        };
        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let mut hostpath = Vec::with_capacity(host.len() + target.len());
        hostpath.extend_from_slice(host);
        hostpath.extend_from_slice(target.as_bytes());
        Self(hostpath)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// `host[:port]` part of an authority.
fn host_port(authority: &str) -> &str {
    authority.rsplit_once('@').map_or(authority, |(_, host)| host)
}

impl AsRef<[u8]> for RoutingSubject {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_absolute_form() {
        let req = Request::builder()
            .uri("http://example.com/path?x=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RoutingSubject::from_request(&req).as_bytes(), b"example.com/path?x=1");
    }

    #[test]
    fn test_port_is_kept() {
        let req = Request::builder()
            .uri("http://example.com:8080/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RoutingSubject::from_request(&req).as_bytes(), b"example.com:8080/");
    }

    #[test]
    fn test_userinfo_is_not_host() {
        let req = Request::builder()
            .uri("http://user:pw@example.com/a")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RoutingSubject::from_request(&req).as_bytes(), b"example.com/a");

        let req = Request::builder()
            .uri("http://user@example.com:8080/a")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RoutingSubject::from_request(&req).as_bytes(), b"example.com:8080/a");
    }

    #[test]
    fn test_origin_form_uses_host_header() {
        let req = Request::builder()
            .uri("/images/a.png")
            .header("Host", "Static.Example.com")
            .body(Body::empty())
            .unwrap();
        // No case normalization
        assert_eq!(
            RoutingSubject::from_request(&req).as_bytes(),
            b"Static.Example.com/images/a.png"
        );
    }

    #[test]
    fn test_missing_host() {
        let req = Request::builder().uri("/only/path").body(Body::empty()).unwrap();
        assert_eq!(RoutingSubject::from_request(&req).as_bytes(), b"/only/path");
    }

    #[test]
    fn test_authority_without_path() {
        let req = Request::builder()
            .uri("http://example.com")
            .body(Body::empty())
            .unwrap();
        assert_eq!(RoutingSubject::from_request(&req).as_bytes(), b"example.com/");
    }
}
