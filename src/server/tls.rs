//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("certificate file {path:?}: {reason}")]
    Certificate { path: PathBuf, reason: String },
    #[error("private key file {path:?}: {reason}")]
    PrivateKey { path: PathBuf, reason: String },
    #[error("invalid TLS configuration: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),
}

/// Build a TLS acceptor from PEM certificate and key files.
pub fn load_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certificates(Path::new(&config.cert_path))?;
    let key = load_private_key(Path::new(&config.key_path))?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let cert_err = |reason: String| TlsError::Certificate {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| cert_err(e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cert_err(e.to_string()))?;

    if certs.is_empty() {
        return Err(cert_err("no certificates found".to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let key_err = |reason: String| TlsError::PrivateKey {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| key_err(e.to_string()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| key_err(e.to_string()))?
        .ok_or_else(|| key_err("no private key found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_certificate_is_reported_with_path() {
        let config = TlsConfig {
            cert_path: "/nonexistent/server.crt".into(),
            key_path: "/nonexistent/server.key".into(),
        };
        match load_tls_acceptor(&config) {
            Err(TlsError::Certificate { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/server.crt"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn file_without_pem_blocks_has_no_certificates() {
        let cert = temp_file("empty.crt", "not a certificate\n");
        let config = TlsConfig {
            cert_path: cert.to_string_lossy().into_owned(),
            key_path: "/nonexistent/server.key".into(),
        };
        let err = load_tls_acceptor(&config).err().unwrap();
        assert!(err.to_string().contains("no certificates found"));
        std::fs::remove_file(cert).unwrap();
    }
}
