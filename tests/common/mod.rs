//! Shared helpers for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use pg_ssl_listener::{AddressFilter, SslRequestListener};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// Upper bound for anything a test waits on, so a bug fails instead of hanging.
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

/// Bind a wrapped listener on an ephemeral loopback port.
#[allow(dead_code)]
pub async fn wrapped_listener(
    filter: AddressFilter,
    peek_timeout: Duration,
) -> (SslRequestListener<TcpListener>, SocketAddr) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    (SslRequestListener::new(tcp, filter, peek_timeout), addr)
}

#[allow(dead_code)]
pub fn list(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

/// Read until EOF, failing the test if it takes longer than [`TEST_DEADLINE`].
#[allow(dead_code)]
pub async fn read_all<R: AsyncReadExt + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(TEST_DEADLINE, reader.read_to_end(&mut out))
        .await
        .expect("read_to_end timed out")
        .unwrap();
    out
}

/// True if nothing arrives on `stream` within `wait`.
#[allow(dead_code)]
pub async fn stays_silent(stream: &mut TcpStream, wait: Duration) -> bool {
    let mut byte = [0u8; 1];
    tokio::time::timeout(wait, stream.read(&mut byte)).await.is_err()
}
