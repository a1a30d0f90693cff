//! Listener abstractions and a connection-limited listener.
//!
//! # Responsibilities
//! - Describe "something that accepts streams" independently of TCP
//! - Expose the remote endpoint of an accepted stream
//! - Enforce max_connections limit via semaphore
//! - Graceful handling of accept errors

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

/// A source of accepted byte streams.
///
/// Implemented for [`TcpListener`] and for every wrapper in this crate, so
/// wrappers can be stacked.
pub trait Listener: Send + Sync {
    /// Stream type yielded by `accept`.
    type Io: AsyncRead + AsyncWrite + PeerAddr + Send + Unpin + 'static;

    /// Wait for the next connection.
    fn accept(&self) -> impl Future<Output = io::Result<Self::Io>> + Send;

    /// Address this listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Streams that know the address of their peer.
pub trait PeerAddr {
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl Listener for TcpListener {
    type Io = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        async move {
            let (stream, _) = TcpListener::accept(self).await?;
            Ok(stream)
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

impl PeerAddr for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),
    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),
    /// The connection limit was torn down.
    #[error("connection limit closed")]
    LimitClosed,
}

/// Bind a plain TCP listener to the configured address.
pub async fn bind_tcp(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|e| ListenerError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

/// A listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// `accept` waits until a slot becomes available before pulling the next
/// connection off the inner listener.
pub struct BoundedListener<L> {
    inner: L,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl<L: Listener> BoundedListener<L> {
    /// Limit `inner` to `max_connections` concurrently held permits.
    pub fn new(inner: L, max_connections: usize) -> Self {
        Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(L::Io, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::LimitClosed)?;

        let stream = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get the configured connection limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get a reference to the wrapped listener.
    pub fn get_ref(&self) -> &L {
        &self.inner
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool, even if
/// the connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn tcp_listener_yields_streams_with_peer_addr() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = Listener::local_addr(&listener).unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let stream = Listener::accept(&listener).await.unwrap();
        let client = client.await.unwrap();

        assert_eq!(
            PeerAddr::peer_addr(&stream).unwrap(),
            client.local_addr().unwrap()
        );
    }

    #[tokio::test]
    async fn bounded_listener_waits_for_free_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = Listener::local_addr(&listener).unwrap();
        let bounded = BoundedListener::new(listener, 1);

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();

        let (_s1, permit) = bounded.accept().await.unwrap();
        assert_eq!(bounded.available_permits(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(100), bounded.accept()).await;
        assert!(blocked.is_err(), "second accept must wait for a permit");

        drop(permit);
        let (_s2, _permit) = tokio::time::timeout(Duration::from_secs(5), bounded.accept())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bounded.max_connections(), 1);
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let config = ListenerConfig {
            bind_address: "not-an-address".to_string(),
            ..ListenerConfig::default()
        };
        assert!(matches!(bind_tcp(&config).await, Err(ListenerError::Bind(_))));
    }
}
