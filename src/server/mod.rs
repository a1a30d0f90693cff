//! Accept loop that puts the SSLRequest wrapper in front of TLS.
//!
//! # Data Flow
//! ```text
//! TcpListener
//!     → BoundedListener (connection permit, taken before accepting)
//!     → SslRequestListener (filter, detect; reply sent on first read)
//!     → per-connection task: TLS termination (optional) → echo
//! ```
//!
//! The echo stands in for whatever would consume the decrypted stream; it
//! lets a client such as `psql "sslmode=require"` be pointed at the
//! listener to verify the negotiation end to end.

pub mod tls;
pub mod tracker;

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::net::listener::{BoundedListener, Listener, ListenerError};
use crate::net::wrapper::{Accepted, SslRequestListener};

pub use tls::{load_tls_acceptor, TlsError};
pub use tracker::{ConnectionGuard, ConnectionId, ConnectionTracker};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not
/// spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// How long shutdown waits for open connections.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Server {
    config: AppConfig,
    tls: Option<TlsAcceptor>,
    tracker: ConnectionTracker,
}

impl Server {
    /// Fails when the configured certificate or key cannot be loaded.
    pub fn new(config: AppConfig) -> Result<Self, TlsError> {
        let tls = config.tls.as_ref().map(load_tls_acceptor).transpose()?;
        Ok(Self {
            config,
            tls,
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Wrap `listener` according to the configuration and serve it until
    /// `shutdown` fires.
    pub async fn run<L: Listener>(
        self,
        listener: L,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let wrapped = SslRequestListener::from_config(listener, &self.config.postgres_ssl);
        let listener = BoundedListener::new(wrapped, self.config.listener.max_connections);

        tracing::info!(
            address = %local_addr,
            tls = self.tls.is_some(),
            peek_timeout = ?listener.get_ref().peek_timeout(),
            allow = listener.get_ref().filter().allow().len(),
            deny = listener.get_ref().filter().deny().len(),
            "Server accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((conn, permit)) => {
                        let guard = self.tracker.track();
                        let span = tracing::info_span!("connection", id = %guard.id());
                        let tls = self.tls.clone();
                        tokio::spawn(
                            async move {
                                if let Err(e) = serve_connection(conn, tls).await {
                                    tracing::debug!(error = %e, "Connection ended with error");
                                }
                                drop(permit);
                                drop(guard);
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Accept(_)) => {
                        // already logged by the wrapper
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
            }
        }

        let open = self.tracker.active_count();
        if open > 0 {
            tracing::info!(open, "Waiting for connections to finish");
            if !self.tracker.drain(DRAIN_TIMEOUT).await {
                tracing::warn!(
                    open = self.tracker.active_count(),
                    "Drain timed out, dropping remaining connections"
                );
            }
        }
        Ok(())
    }
}

/// Terminate TLS when configured, then echo.
async fn serve_connection<S>(conn: Accepted<S>, tls: Option<TlsAcceptor>) -> io::Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!(
        ssl_request = conn.is_ssl_request(),
        declined = conn.is_declined(),
        "Serving connection"
    );
    match tls {
        Some(acceptor) => {
            let stream = acceptor.accept(conn).await?;
            let (_, session) = stream.get_ref();
            tracing::debug!(
                sni = session.server_name().unwrap_or("-"),
                version = ?session.protocol_version(),
                "TLS established"
            );
            echo(stream).await
        }
        None => echo(conn).await,
    }
}

async fn echo<S>(stream: S) -> io::Result<u64>
where
    S: AsyncRead + AsyncWrite,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    tokio::io::copy(&mut reader, &mut writer).await
}
