//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, concurrency/body/time limits)
//!     → request.rs (request ID assigned and echoed back)
//!     → pipeline (direct access decision, forwarding, response)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{propagate_request_id, set_request_id};
pub use server::HttpServer;
