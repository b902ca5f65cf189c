//! TLS material: the bundled localhost certificate, the process-wide default
//! pair and rustls configuration builders.
//!
//! The bundled certificate is self-signed for `localhost`, `example.com`,
//! `127.0.0.1` and `::1`, and expires in 2086. It is not a CA certificate, so
//! a client can trust it directly as its only root.

use std::io::BufReader;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwap;
use bytes::Bytes;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::error::TlsError;

/// PEM certificate served by TLS servers when nothing else is configured.
pub const LOCALHOST_CERT: &[u8] = include_bytes!("../certs/localhost.crt");

/// PKCS#8 PEM private key for [`LOCALHOST_CERT`].
pub const LOCALHOST_KEY: &[u8] = include_bytes!("../certs/localhost.key");

/// A PEM certificate chain and its private key.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificatePair {
    pub cert_pem: Bytes,
    pub key_pem: Bytes,
}

impl CertificatePair {
    /// The bundled localhost pair.
    pub fn localhost() -> Self {
        Self {
            cert_pem: Bytes::from_static(LOCALHOST_CERT),
            key_pem: Bytes::from_static(LOCALHOST_KEY),
        }
    }
}

impl std::fmt::Debug for CertificatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePair")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

static DEFAULT_CERTIFICATE: LazyLock<ArcSwap<CertificatePair>> =
    LazyLock::new(|| ArcSwap::from_pointee(CertificatePair::localhost()));

/// Replace the certificate pair used by TLS servers started without one.
///
/// `None` (or an empty buffer) restores that half to the bundled localhost
/// value. The pair is swapped atomically, so a concurrent start sees either
/// the old pair or the new one, never a mix. Which of the two it sees is
/// still a race: tests that change the default must serialise themselves
/// against the servers that rely on it.
pub fn set_default_tls_certificate(cert_pem: Option<Bytes>, key_pem: Option<Bytes>) {
    let localhost = CertificatePair::localhost();
    let pair = CertificatePair {
        cert_pem: cert_pem.filter(|b| !b.is_empty()).unwrap_or(localhost.cert_pem),
        key_pem: key_pem.filter(|b| !b.is_empty()).unwrap_or(localhost.key_pem),
    };
    DEFAULT_CERTIFICATE.store(Arc::new(pair));
}

/// The pair TLS servers currently fall back to.
pub fn default_tls_certificate() -> Arc<CertificatePair> {
    DEFAULT_CERTIFICATE.load_full()
}

/// The crypto provider used on both sides of every connection.
///
/// Picked explicitly so nothing depends on which rustls backends happen to
/// be compiled in.
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

/// Parse every certificate in a PEM buffer.
///
/// # Errors
///
/// Returns [`TlsError::Pem`] on malformed framing and
/// [`TlsError::NoCertificate`] when the buffer holds none.
pub fn parse_certificates(cert_pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate);
    }
    Ok(certs)
}

fn parse_private_key(key_pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)
}

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// ALPN offers `h2` and `http/1.1`.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = parse_certificates(cert_pem)?;
    let key = parse_private_key(key_pem)?;

    let mut config = ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_cert_pem() {
        assert!(matches!(build_server_config(b"", b""), Err(TlsError::NoCertificate)));
    }

    #[test]
    fn rejects_garbage_pem() {
        let result = build_server_config(b"not a pem", b"also not a pem");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_key() {
        let result = build_server_config(LOCALHOST_CERT, b"");
        assert!(matches!(result, Err(TlsError::NoPrivateKey)));
    }

    #[test]
    fn bundled_pair_builds() {
        let config = build_server_config(LOCALHOST_CERT, LOCALHOST_KEY).unwrap();
        assert!(config.alpn_protocols.contains(&b"http/1.1".to_vec()));
    }

    #[test]
    fn bundled_cert_has_one_certificate() {
        assert_eq!(parse_certificates(LOCALHOST_CERT).unwrap().len(), 1);
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", CertificatePair::localhost());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
