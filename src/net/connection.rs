//! Connection decorator that answers a buffered SSLRequest.
//!
//! # Responsibilities
//! - Replay bytes pulled off the socket while classifying the connection
//! - On the first read of an SSLRequest connection, drop the 8 request bytes
//!   and write the `S` reply before returning anything to the caller
//! - Stay a plain passthrough for everything else
//!
//! Exclusive access (`Pin<&mut Self>`) serializes readers, so the reply can
//! only be produced by one caller. Sharing a connection between tasks goes
//! through whatever lock the caller wraps it in (`tokio::io::split`, a
//! `Mutex`), which keeps the splice single-shot.

use std::cmp;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::listener::PeerAddr;
use crate::net::ssl_request::{SSL_ACCEPT, SSL_REQUEST};

/// Progress of the one-time SSLRequest splice. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splice {
    /// Not an SSLRequest connection.
    NotNeeded,
    /// Request bytes still at the front of the buffer.
    Discard,
    /// Request dropped, reply not written yet.
    Acknowledge,
    /// Reply written, flush pending.
    Flush,
    Done,
}

/// A stream that went through SSLRequest detection.
///
/// Bytes read during detection sit in front of the socket and are returned
/// by reads before any new socket data. When detection found an SSLRequest
/// those 8 bytes are never returned; the first read replaces them with a
/// single `S` written back to the peer.
///
/// Any read performs the reply, including one with a zero-length buffer.
#[derive(Debug)]
pub struct SslRequestConn<S> {
    inner: S,
    buffered: BytesMut,
    splice: Splice,
}

impl<S> SslRequestConn<S> {
    /// `buffered` must hold every byte already consumed from `inner`. When
    /// `ssl_request` is set it must start with the SSLRequest message.
    pub fn new(inner: S, buffered: BytesMut, ssl_request: bool) -> Self {
        let splice = if ssl_request {
            Splice::Discard
        } else {
            Splice::NotNeeded
        };
        Self {
            inner,
            buffered,
            splice,
        }
    }

    /// Whether detection classified this connection as an SSLRequest.
    pub fn is_ssl_request(&self) -> bool {
        self.splice != Splice::NotNeeded
    }

    /// Whether the `S` reply has been written and flushed.
    pub fn is_acknowledged(&self) -> bool {
        self.splice == Splice::Done
    }

    /// Bytes read from the socket that no reader has seen yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffered
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Reading from the inner stream directly skips the buffered bytes and
    /// the SSLRequest reply.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Take the stream apart without losing buffered bytes.
    pub fn into_parts(self) -> (S, BytesMut) {
        (self.inner, self.buffered)
    }
}

impl<S: AsyncWrite + Unpin> SslRequestConn<S> {
    fn poll_splice(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match self.splice {
                Splice::NotNeeded | Splice::Done => return Poll::Ready(Ok(())),
                Splice::Discard => {
                    if self.buffered.len() < SSL_REQUEST.len() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "SSLRequest is no longer buffered",
                        )));
                    }
                    self.buffered.advance(SSL_REQUEST.len());
                    self.splice = Splice::Acknowledge;
                }
                Splice::Acknowledge => {
                    let written = ready!(Pin::new(&mut self.inner).poll_write(cx, &[SSL_ACCEPT]))?;
                    if written == 0 {
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    self.splice = Splice::Flush;
                }
                Splice::Flush => {
                    ready!(Pin::new(&mut self.inner).poll_flush(cx))?;
                    self.splice = Splice::Done;
                    tracing::trace!("SSLRequest acknowledged");
                }
            }
        }
    }
}

impl<S> AsyncRead for SslRequestConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_splice(cx))?;

        if !this.buffered.is_empty() {
            let n = cmp::min(this.buffered.len(), buf.remaining());
            buf.put_slice(&this.buffered[..n]);
            this.buffered.advance(n);
            if this.buffered.is_empty() {
                // Give the detection buffer back once it is drained.
                this.buffered = BytesMut::new();
            }
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for SslRequestConn<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S: PeerAddr> PeerAddr for SslRequestConn<S> {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}
