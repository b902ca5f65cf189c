//! Start-up configuration for a [`TestServer`](crate::TestServer).
//!
//! The configuration is a plain value owned by the caller. Certificate
//! material supplied here always wins over the process-wide default in
//! [`crate::tls`].

use bytes::Bytes;

use crate::error::StartError;
use crate::tls::{self, CertificatePair};

/// Host used when the address omits one (or is empty).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// How to bring a [`TestServer`](crate::TestServer) up.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// `host:port` to bind. Empty means an ephemeral port on [`DEFAULT_HOST`].
    pub address: String,

    /// Serve HTTPS instead of plain HTTP.
    pub tls: bool,

    /// PEM-encoded certificate chain. Falls back to the process-wide default.
    pub tls_cert: Option<Bytes>,

    /// PEM-encoded private key matching `tls_cert`.
    pub tls_key: Option<Bytes>,
}

impl ServerConfig {
    /// Plain HTTP on an ephemeral loopback port.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Serve HTTPS with the given PEM certificate chain and key.
    pub fn with_certificate(mut self, cert_pem: impl Into<Bytes>, key_pem: impl Into<Bytes>) -> Self {
        self.tls = true;
        self.tls_cert = Some(cert_pem.into());
        self.tls_key = Some(key_pem.into());
        self
    }

    /// The address actually handed to the resolver.
    ///
    /// Fills in [`DEFAULT_HOST`] for a missing host and `0` for a missing
    /// port, so `""`, `":"` and `"localhost:"` all mean "any free port".
    pub fn bind_address(&self) -> String {
        let addr = self.address.trim();
        if addr.is_empty() {
            return format!("{DEFAULT_HOST}:0");
        }

        let mut addr = match addr.strip_prefix(':') {
            Some(port) => format!("{DEFAULT_HOST}:{port}"),
            None => addr.to_owned(),
        };
        if addr.ends_with(':') {
            addr.push('0');
        }
        addr
    }

    /// Pick the certificate pair this server will present.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::IncompleteCertificate`] when exactly one of
    /// `tls_cert` / `tls_key` is set.
    pub fn certificate_pair(&self) -> Result<CertificatePair, StartError> {
        let cert = self.tls_cert.clone().filter(|b| !b.is_empty());
        let key = self.tls_key.clone().filter(|b| !b.is_empty());
        match (cert, key) {
            (Some(cert_pem), Some(key_pem)) => Ok(CertificatePair { cert_pem, key_pem }),
            (None, None) => Ok(CertificatePair::clone(&tls::default_tls_certificate())),
            _ => Err(StartError::IncompleteCertificate),
        }
    }
}
