//! Direct-access routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (authority or Host header, path and query)
//!     → subject.rs (host ++ request-target bytes)
//!     → matcher.rs (exclude rules, then include rules)
//!     → Return: Decision::Continue or Decision::DirectAccess
//!
//! Rule Compilation (at startup or reload):
//!     regexps / notregexps
//!     → Compile in configured order
//!     → Freeze as immutable RuleMatcher
//! ```
//!
//! # Design Decisions
//! - Rules compiled once, immutable at runtime
//! - A malformed pattern fails construction, never a request
//! - Deterministic: same subject always yields the same decision

pub mod matcher;
pub mod subject;

pub use matcher::{Decision, PatternSet, RuleError, RuleKind, RuleMatcher};
pub use subject::RoutingSubject;
