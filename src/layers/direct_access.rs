//! Direct access layer.
//!
//! # Responsibilities
//! - Classify each request against the include/exclude rules (request hook)
//! - For `DirectAccess`, run the origin call itself (response hook):
//!   push request headers → execute → pull response headers
//! - Tag every failure with the stage it happened at
//!
//! # Design Decisions
//! - Classification is an explicit `Decision`, not an error value
//! - The layer must be first in the chain so every later transformation is skipped
//! - Once request headers are pushed there is no fallback to normal forwarding
//! - A response-header pull failure never discards the origin's response
//!   unless `MalformedHeaderPolicy::Reject` is configured

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DirectAccessConfig, MalformedHeaderPolicy, TimeoutConfig};
use crate::executor::{BoxError, DirectExecutor, Executor, ExecutorError};
use crate::observability::metrics;
use crate::pipeline::{Layer, LayerError, Outcome, RequestContext};
use crate::routing::{Decision, RuleError, RuleMatcher};

/// Step of the direct access sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectAccessStage {
    PushRequestHeaders,
    Execute,
    PullResponseHeaders,
}

impl DirectAccessStage {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectAccessStage::PushRequestHeaders => "push_request_headers",
            DirectAccessStage::Execute => "execute",
            DirectAccessStage::PullResponseHeaders => "pull_response_headers",
        }
    }
}

impl std::fmt::Display for DirectAccessStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectAccessStage::PushRequestHeaders => write!(f, "cannot sync request headers"),
            DirectAccessStage::Execute => write!(f, "cannot execute a direct request"),
            DirectAccessStage::PullResponseHeaders => write!(f, "cannot read response headers"),
        }
    }
}

/// Stage-tagged direct access failure.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct DirectAccessError {
    pub stage: DirectAccessStage,
    #[source]
    pub source: BoxError,
}

impl DirectAccessError {
    pub fn new(stage: DirectAccessStage, source: impl Into<BoxError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// True when the origin call ran out of time.
    pub fn is_timeout(&self) -> bool {
        self.source
            .downcast_ref::<ExecutorError>()
            .is_some_and(ExecutorError::is_timeout)
    }
}

/// Layer that sends matching requests straight to the origin.
#[derive(Debug)]
pub struct DirectAccessLayer {
    rules: RuleMatcher,
    executor: Arc<dyn Executor>,
    malformed_headers: MalformedHeaderPolicy,
}

impl DirectAccessLayer {
    /// Build the layer from `regexps` (include) and `notregexps` (exclude).
    ///
    /// Uses a [`DirectExecutor`] with default timeouts.
    pub fn new<I, E, S, T>(regexps: I, notregexps: E) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        E: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Ok(Self {
            rules: RuleMatcher::new(regexps, notregexps)?,
            executor: Arc::new(DirectExecutor::default()),
            malformed_headers: MalformedHeaderPolicy::default(),
        })
    }

    pub fn from_config(config: &DirectAccessConfig, timeouts: &TimeoutConfig) -> Result<Self, RuleError> {
        Ok(Self::new(&config.regexps, &config.notregexps)?
            .with_executor(Arc::new(DirectExecutor::from_config(timeouts)))
            .with_malformed_header_policy(config.malformed_response_headers))
    }

    /// Replace the executor used for origin calls.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_malformed_header_policy(mut self, policy: MalformedHeaderPolicy) -> Self {
        self.malformed_headers = policy;
        self
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    /// Classify the request held by `ctx`.
    pub fn classify(&self, ctx: &RequestContext) -> Decision {
        let subject = ctx.routing_subject();
        self.rules.classify_with_span(ctx.span(), subject.as_bytes())
    }

    /// Run the direct access sequence for `ctx`.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<(), DirectAccessError> {
        ctx.push_request_headers()
            .map_err(|e| DirectAccessError::new(DirectAccessStage::PushRequestHeaders, e))?;

        self.executor
            .execute(ctx)
            .await
            .map_err(|e| DirectAccessError::new(DirectAccessStage::Execute, e))?;

        if let Err(e) = ctx.pull_response_headers() {
            self.malformed_headers.apply(ctx);
            return Err(DirectAccessError::new(DirectAccessStage::PullResponseHeaders, e));
        }

        Ok(())
    }
}

#[async_trait]
impl Layer for DirectAccessLayer {
    fn name(&self) -> &'static str {
        "direct_access"
    }

    fn on_request(&self, ctx: &mut RequestContext) -> Result<Decision, LayerError> {
        let decision = self.classify(ctx);
        metrics::record_decision(decision);
        Ok(decision)
    }

    async fn on_response(&self, ctx: &mut RequestContext, outcome: Outcome) -> Outcome {
        if !matches!(outcome, Outcome::DirectAccess) {
            return outcome;
        }

        match self.execute(ctx).await {
            Ok(()) => {
                tracing::debug!(parent: ctx.span(), "Direct access completed");
                metrics::record_direct_access("completed");
                Outcome::Forwarded
            }
            Err(e) => {
                tracing::warn!(
                    parent: ctx.span(),
                    stage = e.stage.as_str(),
                    error = %e,
                    "Direct access failed"
                );
                metrics::record_direct_access(e.stage.as_str());
                Outcome::Failed(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{HeaderValue, Request, Response, StatusCode};

    /// Origin stand-in recording each call.
    #[derive(Debug, Default)]
    struct FakeOrigin {
        calls: AtomicUsize,
        fail: Option<fn() -> ExecutorError>,
        malformed: bool,
        seen_header: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl Executor for FakeOrigin {
        async fn execute(&self, ctx: &mut RequestContext) -> Result<(), ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_header.lock().unwrap() = ctx
                .request
                .headers()
                .get("x-layer")
                .and_then(|v| v.to_str().ok())
                .map(String::from);

            if let Some(fail) = self.fail {
                return Err(fail());
            }

            let mut response = Response::builder()
                .status(StatusCode::CREATED)
                .header("x-origin", "yes")
                .body(Body::from("from origin"))
                .unwrap();
            if self.malformed {
                let headers = response.headers_mut();
                headers.append("content-length", HeaderValue::from_static("11"));
                headers.append("content-length", HeaderValue::from_static("12"));
            }
            ctx.response = Some(response);
            Ok(())
        }
    }

    fn layer(origin: Arc<FakeOrigin>) -> DirectAccessLayer {
        DirectAccessLayer::new([r"^example\.com/"], [r"^example\.com/admin"])
            .unwrap()
            .with_executor(origin)
    }

    fn ctx(uri: &str) -> RequestContext {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        RequestContext::new("test", None, req).unwrap()
    }

    #[test]
    fn test_classify() {
        let layer = layer(Arc::new(FakeOrigin::default()));
        assert_eq!(layer.classify(&ctx("http://example.com/path?x=1")), Decision::DirectAccess);
        assert_eq!(layer.classify(&ctx("http://example.com/admin/x")), Decision::Continue);
        assert_eq!(layer.classify(&ctx("http://other.com/")), Decision::Continue);
    }

    #[test]
    fn test_malformed_rule_fails_construction() {
        assert!(DirectAccessLayer::new([r"(unclosed"], [r"ok"]).is_err());
    }

    #[tokio::test]
    async fn test_execute_success_syncs_headers() {
        let origin = Arc::new(FakeOrigin::default());
        let layer = layer(origin.clone());
        let mut ctx = ctx("http://example.com/");
        ctx.request_headers.set("X-Layer", "pushed");

        let outcome = layer.on_response(&mut ctx, Outcome::DirectAccess).await;

        assert!(matches!(outcome, Outcome::Forwarded));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
        assert_eq!(origin.seen_header.lock().unwrap().as_deref(), Some("pushed"));
        assert_eq!(ctx.response_headers.get_str("x-origin"), Some("yes"));
        assert_eq!(ctx.response.as_ref().unwrap().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_push_failure_skips_origin() {
        let origin = Arc::new(FakeOrigin::default());
        let layer = layer(origin.clone());
        let mut ctx = ctx("http://example.com/");
        ctx.request_headers.set("bad name", "v");

        let err = layer.execute(&mut ctx).await.unwrap_err();

        assert_eq!(err.stage, DirectAccessStage::PushRequestHeaders);
        assert!(err.to_string().starts_with("cannot sync request headers"));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 0);
        assert!(ctx.response.is_none());
    }

    #[tokio::test]
    async fn test_origin_failure_skips_pull() {
        let origin = Arc::new(FakeOrigin {
            fail: Some(|| ExecutorError::Timeout(Duration::from_secs(3))),
            ..Default::default()
        });
        let layer = layer(origin.clone());
        let mut ctx = ctx("http://example.com/");
        ctx.response_headers.set("untouched", "1");

        let outcome = layer.on_response(&mut ctx, Outcome::DirectAccess).await;

        let Outcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.direct_access_stage(), Some(DirectAccessStage::Execute));
        assert!(err.to_string().starts_with("cannot execute a direct request"));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.response_headers.get_str("untouched"), Some("1"));
    }

    #[tokio::test]
    async fn test_pull_failure_preserves_response() {
        let origin = Arc::new(FakeOrigin {
            malformed: true,
            ..Default::default()
        });
        let layer = layer(origin);
        let mut ctx = ctx("http://example.com/");

        let err = layer.execute(&mut ctx).await.unwrap_err();

        assert_eq!(err.stage, DirectAccessStage::PullResponseHeaders);
        assert!(err.to_string().starts_with("cannot read response headers"));
        assert_eq!(ctx.response.as_ref().unwrap().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_pull_failure_reject_policy() {
        let origin = Arc::new(FakeOrigin {
            malformed: true,
            ..Default::default()
        });
        let layer = layer(origin).with_malformed_header_policy(MalformedHeaderPolicy::Reject);
        let mut ctx = ctx("http://example.com/");

        let err = layer.execute(&mut ctx).await.unwrap_err();

        assert_eq!(err.stage, DirectAccessStage::PullResponseHeaders);
        assert_eq!(ctx.response.as_ref().unwrap().status(), StatusCode::BAD_REQUEST);
        assert!(ctx.response_headers.get("x-origin").is_none());
    }

    #[tokio::test]
    async fn test_other_outcomes_pass_through() {
        let origin = Arc::new(FakeOrigin::default());
        let layer = layer(origin.clone());
        let mut ctx = ctx("http://example.com/");

        let outcome = layer.on_response(&mut ctx, Outcome::Forwarded).await;
        assert!(matches!(outcome, Outcome::Forwarded));

        let outcome = layer
            .on_response(&mut ctx, Outcome::Failed(LayerError::UnhandledDirectAccess))
            .await;
        assert!(matches!(outcome, Outcome::Failed(LayerError::UnhandledDirectAccess)));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 0);
    }
}
