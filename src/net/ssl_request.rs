//! PostgreSQL SSLRequest signature.
//!
//! A client that wants TLS sends an 8-byte SSLRequest before anything else:
//! an int32 length (always 8) followed by the int32 request code 80877103.
//! The server answers with a single `S` byte when it is willing to speak TLS,
//! after which the client starts an ordinary TLS handshake.

/// SSL request code carried in the second half of the SSLRequest message.
pub const SSL_REQUEST_CODE: u32 = 80877103;

/// The full SSLRequest message as it appears on the wire.
pub const SSL_REQUEST: [u8; 8] = [0, 0, 0, 8, 4, 210, 22, 47];

/// Reply byte meaning "SSL supported, go ahead with the handshake".
pub const SSL_ACCEPT: u8 = b'S';

/// Returns true when `bytes` is exactly the SSLRequest message.
pub fn is_ssl_request(bytes: &[u8]) -> bool {
    bytes == SSL_REQUEST
}
