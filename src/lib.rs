//! Forward proxy with regex-driven direct access.
//!
//! Requests whose host + request-target match an include rule (and no
//! exclude rule) skip the transformation pipeline and are sent straight to
//! the origin; everything else goes through the normal layers.

pub mod config;
pub mod executor;
pub mod http;
pub mod layers;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use layers::DirectAccessLayer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
pub use routing::{Decision, RuleMatcher};
