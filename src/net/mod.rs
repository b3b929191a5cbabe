//! Client address resolution.
//!
//! # Data Flow
//! ```text
//! Exchange (socket peer + X-Forwarded-For)
//!     → resolver.rs (pick the client address)
//!     → subnet.rs (CIDR membership)
//!     → RemoteAddr / XForwardedRemoteAddr predicates
//! ```
//!
//! # Design Decisions
//! - The socket peer is the default; forwarded headers are trusted only up to
//!   a configured number of proxy hops
//! - An ambiguous forwarded header (repeated or empty) falls back to the peer

pub mod resolver;
pub mod subnet;

pub use resolver::{RemoteAddressResolver, SocketAddressResolver, XForwardedRemoteAddressResolver};
pub use subnet::SubnetRule;
