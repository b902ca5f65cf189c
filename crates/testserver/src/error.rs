//! Error types for starting, running and talking to a test server.

use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

/// Failure to bring a [`TestServer`](crate::TestServer) up.
///
/// Every variant leaves nothing behind: no listener is bound and no
/// temporary credential file is left on disk.
#[derive(Debug, Error)]
pub enum StartError {
    /// The address is in use, unresolvable, or otherwise unbindable.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A temporary certificate or key file could not be created or written.
    #[error("failed to write TLS credential file {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Only one half of a certificate/key pair was supplied.
    #[error("TLS certificate and key must be supplied together")]
    IncompleteCertificate,

    /// The certificate material could not be turned into a TLS listener.
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Errors while loading PEM material into rustls.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A credential file could not be read back from disk.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The PEM framing itself was malformed.
    #[error("failed to parse PEM data: {0}")]
    Pem(#[source] io::Error),

    #[error("no certificate found in PEM data")]
    NoCertificate,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    /// rustls rejected the certificate, key, or protocol configuration.
    #[error("rustls rejected the configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Failures inside the detached accept loop.
///
/// These never reach the caller of a start function. They are logged and,
/// when a receiver was taken with
/// [`TestServer::background_errors`](crate::TestServer::background_errors),
/// forwarded to it.
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("TLS handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connection from {peer} failed: {source}")]
    Connection {
        peer: SocketAddr,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
