//! HTTP(S) client helpers for talking to a [`TestServer`](crate::TestServer).
//!
//! The process-wide default client trusts the bundled localhost certificate.
//! [`skip_insecure_tls_verification`] swaps it for one that trusts anything,
//! which is only acceptable inside tests.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;
use axum::body::Body;
use hyper::{body::Incoming, Response, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

use crate::error::TlsError;
use crate::tls::{self, LOCALHOST_CERT};

/// Client type returned by every constructor in this module.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Errors from the convenience request helpers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid URL: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] axum::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

static DEFAULT_CLIENT: LazyLock<ArcSwapOption<HttpClient>> = LazyLock::new(ArcSwapOption::empty);

/// A client that trusts exactly the certificates in `cert_pem`.
///
/// Plain `http://` URLs work too.
///
/// # Errors
///
/// Returns an error if `cert_pem` holds no usable certificate.
pub fn trusting_client(cert_pem: &[u8]) -> Result<HttpClient, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in tls::parse_certificates(cert_pem)? {
        roots.add(cert)?;
    }

    let config = ClientConfig::builder_with_provider(tls::crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(build(config))
}

/// A client that accepts any server certificate. Test use only.
///
/// # Errors
///
/// Returns an error if rustls rejects the protocol configuration.
pub fn insecure_client() -> Result<HttpClient, TlsError> {
    let provider = tls::crypto_provider();
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(build(config))
}

fn build(config: ClientConfig) -> HttpClient {
    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new()).build(connector)
}

/// The shared client, built on first use to trust the bundled certificate.
///
/// # Errors
///
/// Returns an error if the first-use client cannot be built.
pub fn default_client() -> Result<HttpClient, TlsError> {
    if let Some(client) = DEFAULT_CLIENT.load_full() {
        return Ok(HttpClient::clone(&client));
    }
    let client = trusting_client(LOCALHOST_CERT)?;
    // Keep whichever client got there first, e.g. an insecure one.
    let previous = DEFAULT_CLIENT.compare_and_swap(&None::<Arc<HttpClient>>, Some(Arc::new(client.clone())));
    Ok(match &*previous {
        Some(existing) => HttpClient::clone(existing),
        None => client,
    })
}

/// Make the shared client skip certificate verification entirely.
///
/// Affects every later [`default_client`] and [`get`] in the process. Never
/// call this outside tests.
///
/// # Errors
///
/// Returns an error if rustls rejects the protocol configuration.
pub fn skip_insecure_tls_verification() -> Result<(), TlsError> {
    DEFAULT_CLIENT.store(Some(Arc::new(insecure_client()?)));
    Ok(())
}

/// `GET url` through the shared client.
///
/// # Errors
///
/// Returns an error if the URL does not parse or the request fails.
pub async fn get(url: &str) -> Result<Response<Incoming>, ClientError> {
    let uri: Uri = url.parse()?;
    Ok(default_client()?.get(uri).await?)
}

/// Collect a response body into a `String`, replacing invalid UTF-8.
///
/// # Errors
///
/// Returns an error if the body stream fails.
pub async fn read_text(response: Response<Incoming>) -> Result<String, ClientError> {
    let bytes = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Verifier that trusts every certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusting_client_rejects_empty_pem() {
        assert!(matches!(trusting_client(b""), Err(TlsError::NoCertificate)));
    }

    #[test]
    fn trusting_client_accepts_bundled_cert() {
        assert!(trusting_client(LOCALHOST_CERT).is_ok());
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let err = get("not a url").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUri(_)));
    }
}
