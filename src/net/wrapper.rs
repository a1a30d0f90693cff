//! Listener decorator that detects PostgreSQL SSLRequests.
//!
//! # Responsibilities
//! - Run the address filter before touching any bytes
//! - Read up to one SSLRequest worth of bytes, bounded by the peek timeout
//! - Hand back a stream that replays what was read, or the raw stream when
//!   the filter declines the connection
//!
//! # Design Decisions
//! - Detection failures (timeout, EOF, I/O errors) never fail `accept`; the
//!   connection is treated as "not an SSLRequest"
//! - The timeout wraps only the detection read, so it cannot affect reads
//!   made by whoever consumes the stream afterwards
//! - Declined connections are returned untouched so another wrapper further
//!   down the chain can still claim them

use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

use crate::config::PostgresSslConfig;
use crate::net::connection::SslRequestConn;
use crate::net::listener::{Listener, PeerAddr};
use crate::net::ssl_request::{is_ssl_request, SSL_REQUEST};
use crate::observability::metrics;
use crate::security::access_control::{peer_host, AddressFilter, FilterDecision};

/// How long detection waits for the client when nothing is configured.
pub const DEFAULT_PEEK_TIMEOUT: Duration = Duration::from_millis(300);

/// Detection reads into a buffer of this size so that a client which sends
/// its first flight in one segment is pulled in with a single read.
const PEEK_BUFFER_SIZE: usize = 4096;

/// Result of looking at the first bytes of a connection.
#[derive(Debug)]
pub enum Detection {
    /// The connection starts with an SSLRequest.
    SslRequest,
    /// The first 8 bytes are something else.
    Other,
    /// Fewer than 8 bytes could be read.
    Inconclusive(io::Error),
}

impl Detection {
    /// Only a full signature match counts; inconclusive reads do not.
    pub fn is_ssl_request(&self) -> bool {
        matches!(self, Detection::SslRequest)
    }

    fn outcome(&self) -> &'static str {
        match self {
            Detection::SslRequest => "ssl_request",
            Detection::Other => "other",
            Detection::Inconclusive(_) => "inconclusive",
        }
    }
}

/// Read from `stream` into `buf` until it holds at least an SSLRequest's
/// worth of bytes, then check for the signature.
///
/// Every byte read stays in `buf`, whatever the outcome.
pub async fn detect<S>(stream: &mut S, buf: &mut BytesMut, limit: Option<Duration>) -> Detection
where
    S: AsyncRead + Unpin,
{
    let wanted = SSL_REQUEST.len();
    let read = fill_to(stream, buf, wanted);
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no SSLRequest within {:?}", limit),
            )),
        },
        None => read.await,
    };

    match result {
        Ok(()) if is_ssl_request(&buf[..wanted]) => Detection::SslRequest,
        Ok(()) => Detection::Other,
        Err(e) => Detection::Inconclusive(e),
    }
}

async fn fill_to<S>(stream: &mut S, buf: &mut BytesMut, wanted: usize) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    while buf.len() < wanted {
        if stream.read_buf(buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("peer closed after {} of {} bytes", buf.len(), wanted),
            ));
        }
    }
    Ok(())
}

/// A connection handed out by [`SslRequestListener`].
#[derive(Debug)]
pub enum Accepted<S> {
    /// The address filter declined the connection; no bytes were read.
    Declined(S),
    /// Detection ran; reads replay anything it consumed.
    Wrapped(SslRequestConn<S>),
}

impl<S> Accepted<S> {
    /// True if the filter declined the connection.
    pub fn is_declined(&self) -> bool {
        matches!(self, Accepted::Declined(_))
    }

    /// True if the client sent an SSLRequest and will get the reply.
    pub fn is_ssl_request(&self) -> bool {
        match self {
            Accepted::Declined(_) => false,
            Accepted::Wrapped(conn) => conn.is_ssl_request(),
        }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        match self {
            Accepted::Declined(stream) => stream,
            Accepted::Wrapped(conn) => conn.get_ref(),
        }
    }
}

impl<S> AsyncRead for Accepted<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Accepted::Declined(stream) => Pin::new(stream).poll_read(cx, buf),
            Accepted::Wrapped(conn) => Pin::new(conn).poll_read(cx, buf),
        }
    }
}

impl<S> AsyncWrite for Accepted<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Accepted::Declined(stream) => Pin::new(stream).poll_write(cx, buf),
            Accepted::Wrapped(conn) => Pin::new(conn).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Accepted::Declined(stream) => Pin::new(stream).poll_write_vectored(cx, bufs),
            Accepted::Wrapped(conn) => Pin::new(conn).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Accepted::Declined(stream) => stream.is_write_vectored(),
            Accepted::Wrapped(conn) => conn.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Accepted::Declined(stream) => Pin::new(stream).poll_flush(cx),
            Accepted::Wrapped(conn) => Pin::new(conn).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Accepted::Declined(stream) => Pin::new(stream).poll_shutdown(cx),
            Accepted::Wrapped(conn) => Pin::new(conn).poll_shutdown(cx),
        }
    }
}

impl<S: PeerAddr> PeerAddr for Accepted<S> {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().peer_addr()
    }
}

/// Wraps a listener so that PostgreSQL clients asking for SSL get their
/// `S` reply before the TLS layer sees the stream.
///
/// The filter and timeout are fixed at construction and shared read-only by
/// every accept.
#[derive(Debug)]
pub struct SslRequestListener<L> {
    inner: L,
    filter: AddressFilter,
    peek_timeout: Option<Duration>,
}

impl<L: Listener> SslRequestListener<L> {
    /// A zero timeout disables the bound on detection.
    pub fn new(inner: L, filter: AddressFilter, peek_timeout: Duration) -> Self {
        Self {
            inner,
            filter,
            peek_timeout: (!peek_timeout.is_zero()).then_some(peek_timeout),
        }
    }

    /// Build from the `[postgres_ssl]` config section.
    pub fn from_config(inner: L, config: &PostgresSslConfig) -> Self {
        Self::new(
            inner,
            AddressFilter::new(config.allow.clone(), config.deny.clone()),
            config.peek_timeout(),
        )
    }

    /// Accept the next connection.
    ///
    /// Errors from the inner listener are returned unchanged. Everything that
    /// happens after the inner accept succeeds yields a connection.
    pub async fn accept(&self) -> io::Result<Accepted<L::Io>> {
        let mut stream = match self.inner.accept().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Error accepting connection");
                metrics::record_accept_error();
                return Err(e);
            }
        };

        let peer = peer_host(&stream);
        match self.filter.evaluate(peer.as_deref()) {
            FilterDecision::Deny => {
                tracing::debug!(peer = ?peer, "Connection on deny list, passing through");
                metrics::record_classification("denied");
                return Ok(Accepted::Declined(stream));
            }
            FilterDecision::NotAllowed => {
                tracing::debug!(peer = ?peer, "Connection not on allow list, passing through");
                metrics::record_classification("not_allowed");
                return Ok(Accepted::Declined(stream));
            }
            FilterDecision::Proceed => {}
        }

        let mut buffered = BytesMut::with_capacity(PEEK_BUFFER_SIZE);
        let detection = detect(&mut stream, &mut buffered, self.peek_timeout).await;

        match &detection {
            Detection::Inconclusive(e) if is_expected_peek_error(e) => {
                tracing::debug!(peer = ?peer, error = %e, buffered = buffered.len(), "SSLRequest detection inconclusive");
            }
            Detection::Inconclusive(e) => {
                tracing::warn!(peer = ?peer, error = %e, buffered = buffered.len(), "Error detecting SSLRequest");
            }
            _ => {
                tracing::debug!(peer = ?peer, ssl_request = detection.is_ssl_request(), "SSLRequest detection finished");
            }
        }
        metrics::record_classification(detection.outcome());

        Ok(Accepted::Wrapped(SslRequestConn::new(
            stream,
            buffered,
            detection.is_ssl_request(),
        )))
    }

    /// Get the address filter applied before detection.
    pub fn filter(&self) -> &AddressFilter {
        &self.filter
    }

    /// `None` when detection may wait forever.
    pub fn peek_timeout(&self) -> Option<Duration> {
        self.peek_timeout
    }

    /// Get a reference to the wrapped listener.
    pub fn get_ref(&self) -> &L {
        &self.inner
    }
}

fn is_expected_peek_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof
    )
}

impl<L: Listener> Listener for SslRequestListener<L> {
    type Io = Accepted<L::Io>;

    fn accept(&self) -> impl std::future::Future<Output = io::Result<Self::Io>> + Send {
        SslRequestListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
