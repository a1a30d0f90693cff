//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → wrapper.rs (allow/deny, SSLRequest detection)
//!     → connection.rs (replay peeked bytes, answer SSLRequest on first read)
//!     → Hand off to the TLS layer
//! ```
//!
//! # Design Decisions
//! - Detection happens inside accept, before TLS sees a byte
//! - No byte read during detection is ever lost
//! - Wrappers compose: every wrapper is itself a `Listener`

pub mod connection;
pub mod listener;
pub mod ssl_request;
pub mod wrapper;

pub use connection::SslRequestConn;
pub use listener::{BoundedListener, Listener, PeerAddr};
pub use wrapper::{Accepted, Detection, SslRequestListener, DEFAULT_PEEK_TIMEOUT};
