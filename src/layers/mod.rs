//! Pipeline layers.
//!
//! # Data Flow
//! ```text
//! on_request (in order):
//!     direct_access.rs  → Continue, or DirectAccess (stops the pass)
//!     forwarded.rs      → Via / X-Forwarded-For
//!
//! on_response (reverse order, only layers whose on_request ran):
//!     forwarded.rs      → Via on the response
//!     direct_access.rs  → runs the origin call when it requested it
//! ```

pub mod direct_access;
pub mod forwarded;

pub use direct_access::{DirectAccessError, DirectAccessLayer, DirectAccessStage};
pub use forwarded::ForwardedHeadersLayer;
