//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Direct access rules.
    pub direct_access: DirectAccessConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Headers added on the normal forwarding path.
    pub forwarding: ForwardingConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3128").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3128".to_string(),
            max_connections: 10_000,
        }
    }
}

/// What to do when a directly fetched response has unreadable headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedHeaderPolicy {
    /// Deliver the origin's response unchanged and log the failure.
    #[default]
    Preserve,
    /// Replace the response with `400 Malformed response headers`.
    Reject,
}

/// Rules selecting requests that bypass the pipeline.
///
/// Patterns are regular expressions matched against host + request-target,
/// e.g. `example.com/path?x=1`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectAccessConfig {
    /// Include rules: a match sends the request directly to the origin.
    pub regexps: Vec<String>,

    /// Exclude rules: a match keeps the request in the pipeline, whatever
    /// the include rules say.
    pub notregexps: Vec<String>,

    /// Handling of malformed response headers on direct access.
    pub malformed_response_headers: MalformedHeaderPolicy,
}

/// Timeout configuration for origin calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the origin to answer, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Forwarding header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Pseudonym used in the `Via` header.
    pub via_name: String,

    /// Append the client IP to `X-Forwarded-For`.
    pub add_forwarded_for: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            via_name: "direct-access-proxy".to_string(),
            add_forwarded_for: true,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
