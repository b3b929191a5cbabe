//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → exchange.rs (request + response + request facts)
//!     → routing::dispatcher (match, plugin chain)
//!     → response.rs (gateway messages, error mapping)
//!     → Send to client
//! ```

pub mod exchange;
pub mod request;
pub mod response;
pub mod server;

pub use exchange::Exchange;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::HttpMsg;
pub use server::HttpServer;
