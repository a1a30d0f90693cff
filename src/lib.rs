//! PostgreSQL SSLRequest listener wrapper.
//!
//! PostgreSQL clients do not open with a TLS ClientHello. They first send an
//! 8-byte SSLRequest and wait for a one-byte `S` before starting TLS. This
//! crate wraps a listener so that such connections are recognised at accept
//! time and answered on first read, letting an ordinary TLS acceptor
//! terminate them. Anything else passes through with every byte intact.
//!
//! ```no_run
//! # async fn run() -> std::io::Result<()> {
//! use pg_ssl_listener::{AddressFilter, SslRequestListener, DEFAULT_PEEK_TIMEOUT};
//!
//! let tcp = tokio::net::TcpListener::bind("0.0.0.0:5432").await?;
//! let listener = SslRequestListener::new(tcp, AddressFilter::default(), DEFAULT_PEEK_TIMEOUT);
//! loop {
//!     let conn = listener.accept().await?;
//!     // hand `conn` to a TLS acceptor
//! #   drop(conn);
//! }
//! # }
//! ```

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod server;

pub use config::AppConfig;
pub use lifecycle::Shutdown;
pub use net::{Accepted, Listener, PeerAddr, SslRequestConn, SslRequestListener, DEFAULT_PEEK_TIMEOUT};
pub use security::AddressFilter;
pub use server::Server;
