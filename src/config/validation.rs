//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every direct access pattern so a bad rule fails at load time
//! - Validate value ranges (timeouts within a day, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use regex::bytes::Regex;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::schema::ProxyConfig;
use crate::routing::RuleKind;

/// Upper bound for each timeout.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("forwarding.via_name must not be empty")]
    EmptyViaName,

    #[error("invalid {kind} pattern #{index} `{pattern}`: {message}")]
    InvalidPattern {
        kind: RuleKind,
        index: usize,
        pattern: String,
        message: String,
    },
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroValue("listener.max_connections"));
    }
    if config.listener.max_connections > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::TooLarge {
            field: "listener.max_connections",
            max: Semaphore::MAX_PERMITS as u64,
        });
    }

    let rule_lists = [
        (RuleKind::Include, &config.direct_access.regexps),
        (RuleKind::Exclude, &config.direct_access.notregexps),
    ];
    for (kind, patterns) in rule_lists {
        for (index, pattern) in patterns.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::InvalidPattern {
                    kind,
                    index,
                    pattern: pattern.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    let timeouts = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, secs) in timeouts {
        if secs == 0 {
            errors.push(ValidationError::ZeroValue(field));
        } else if secs > MAX_TIMEOUT_SECS {
            errors.push(ValidationError::TooLarge {
                field,
                max: MAX_TIMEOUT_SECS,
            });
        }
    }

    if config.forwarding.via_name.trim().is_empty() {
        errors.push(ValidationError::EmptyViaName);
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::ZeroValue("limits.max_body_size"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
