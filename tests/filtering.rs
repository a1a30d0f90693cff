//! Allow/deny handling, chained wrappers and accept error propagation.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use pg_ssl_listener::net::ssl_request::{SSL_ACCEPT, SSL_REQUEST};
use pg_ssl_listener::{Accepted, AddressFilter, Listener, PeerAddr, SslRequestListener};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

mod common;
use common::{connect, list, read_all, wrapped_listener};

/// Send an SSLRequest followed by `tail`, then close the write side.
async fn send_request(addr: SocketAddr, tail: &[u8]) -> TcpStream {
    let mut client = connect(addr).await;
    client.write_all(&SSL_REQUEST).await.unwrap();
    client.write_all(tail).await.unwrap();
    client.shutdown().await.unwrap();
    client
}

#[tokio::test]
async fn denied_peer_gets_raw_stream() {
    let filter = AddressFilter::new(vec![], list(&["127.0.0.1"]));
    let (listener, addr) = wrapped_listener(filter, Duration::from_secs(1)).await;

    let mut client = send_request(addr, b"tail").await;
    let mut conn = listener.accept().await.unwrap();
    assert!(matches!(conn, Accepted::Declined(_)));

    let mut expected = SSL_REQUEST.to_vec();
    expected.extend_from_slice(b"tail");
    assert_eq!(read_all(&mut conn).await, expected);
    drop(conn);
    assert!(read_all(&mut client).await.is_empty());
}

#[tokio::test]
async fn peer_outside_allow_list_is_declined() {
    let filter = AddressFilter::new(list(&["10.9.9.9"]), vec![]);
    let (listener, addr) = wrapped_listener(filter, Duration::from_secs(1)).await;

    let _client = send_request(addr, b"").await;
    let conn = listener.accept().await.unwrap();
    assert!(conn.is_declined());
    assert!(!conn.is_ssl_request());
}

#[tokio::test]
async fn peer_on_allow_list_is_inspected() {
    let filter = AddressFilter::new(list(&["10.9.9.9", "127.0.0.1"]), vec![]);
    let (listener, addr) = wrapped_listener(filter, Duration::from_secs(1)).await;

    let mut client = send_request(addr, b"").await;
    let mut conn = listener.accept().await.unwrap();
    assert!(conn.is_ssl_request());

    assert!(read_all(&mut conn).await.is_empty());
    drop(conn);
    assert_eq!(read_all(&mut client).await, vec![SSL_ACCEPT]);
}

#[tokio::test]
async fn deny_beats_allow() {
    let filter = AddressFilter::new(list(&["127.0.0.1"]), list(&["127.0.0.1"]));
    let (listener, addr) = wrapped_listener(filter, Duration::from_secs(1)).await;

    let _client = send_request(addr, b"").await;
    let conn = listener.accept().await.unwrap();
    assert!(conn.is_declined());
}

#[tokio::test]
async fn declined_connection_is_claimed_by_next_wrapper() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let inner = SslRequestListener::new(
        tcp,
        AddressFilter::new(vec![], list(&["127.0.0.1"])),
        Duration::from_secs(1),
    );
    let outer = SslRequestListener::new(inner, AddressFilter::default(), Duration::from_secs(1));
    assert_eq!(Listener::local_addr(&outer).unwrap(), addr);

    let mut client = send_request(addr, b"hello").await;
    let mut conn = outer.accept().await.unwrap();

    match &conn {
        Accepted::Wrapped(wrapped) => {
            assert!(wrapped.is_ssl_request());
            assert!(wrapped.get_ref().is_declined());
        }
        Accepted::Declined(_) => panic!("outer wrapper should inspect the connection"),
    }

    assert_eq!(read_all(&mut conn).await, b"hello");
    drop(conn);
    assert_eq!(read_all(&mut client).await, vec![SSL_ACCEPT]);
}

/// Listener whose accept always fails.
struct Broken;

impl Listener for Broken {
    type Io = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        async { Err(io::Error::new(io::ErrorKind::ConnectionAborted, "accept failed")) }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

#[tokio::test]
async fn inner_accept_errors_are_returned_unchanged() {
    let listener = SslRequestListener::new(Broken, AddressFilter::default(), Duration::from_secs(1));

    let err = listener.accept().await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    assert_eq!(err.to_string(), "accept failed");
}

#[tokio::test]
async fn open_filter_inspects_every_peer() {
    let (listener, addr) = wrapped_listener(AddressFilter::default(), Duration::from_millis(200)).await;

    for _ in 0..3 {
        let mut client = connect(addr).await;
        client.write_all(b"PING1234").await.unwrap();
        let conn = listener.accept().await.unwrap();
        assert!(!conn.is_declined());

        let mut conn = conn;
        let mut buf = [0u8; 8];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING1234");
    }
}

#[tokio::test]
async fn ipv4_peer_on_dual_stack_socket_matches_plain_entry() {
    // Hosts without IPv6 or with v6only sockets have nothing to check here.
    let Ok(tcp) = TcpListener::bind("[::]:0").await else {
        return;
    };
    let port = tcp.local_addr().unwrap().port();
    let listener = SslRequestListener::new(
        tcp,
        AddressFilter::new(vec![], list(&["127.0.0.1"])),
        Duration::from_secs(1),
    );

    let Ok(mut client) = TcpStream::connect(SocketAddr::from(([127, 0, 0, 1], port))).await else {
        return;
    };
    client.write_all(&SSL_REQUEST).await.unwrap();

    let conn = listener.accept().await.unwrap();
    assert!(conn.peer_addr().unwrap().is_ipv6(), "socket should be dual-stack");
    assert!(matches!(conn, Accepted::Declined(_)));
}
