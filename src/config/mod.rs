//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, rule compilation)
//!     → ProxyConfig (validated, immutable)
//!     → Pipeline::from_config (rules compiled into layers)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds the pipeline and swaps it atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A bad reload is logged and ignored, the running config stays

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::DirectAccessConfig;
pub use schema::ForwardingConfig;
pub use schema::LimitsConfig;
pub use schema::ListenerConfig;
pub use schema::MalformedHeaderPolicy;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use schema::TimeoutConfig;
