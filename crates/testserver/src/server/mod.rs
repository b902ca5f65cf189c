//! [`TestServer`]: a real HTTP(S) listener with a background accept loop.
//!
//! # Lifecycle
//!
//! Unstarted → Listening → Stopped, one way only.
//!
//! 1. A start function binds the listener synchronously (from the caller's
//!    point of view) and resolves the port and base URL before returning.
//! 2. The accept loop runs on its own tokio task; its failures are logged
//!    and never reach the caller.
//! 3. [`TestServer::stop`] cancels the loop, gives in-flight requests
//!    [`SHUTDOWN_GRACE_PERIOD`] to finish, then deletes any temporary TLS
//!    credential files. A stopped server cannot be restarted.

mod router;
mod serve;

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{handler::Handler, routing::MethodRouter, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::credentials::CredentialFiles;
use crate::error::{BackgroundError, StartError, TlsError};
use crate::tls;
use crate::url;

use router::SharedRouter;
use serve::AcceptLoop;

/// How long in-flight requests may keep running once [`TestServer::stop`] is called.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(5);

/// Extra time `stop` waits for the loop task beyond the grace period.
const STOP_SLACK: Duration = Duration::from_millis(250);

/// Capacity of the background-error observation channel.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// A running (or stopped) ephemeral HTTP(S) server.
///
/// Routes are registered by delegation to the embedded axum router, before or
/// after the server starts accepting:
///
/// ```no_run
/// # async fn demo() {
/// use axum::routing::get;
///
/// let server = testserver::TestServer::start().await.expect("bind");
/// server.route("/ping", get(|| async { "pong" }));
/// println!("GET {}", server.absolute_url("ping"));
/// # }
/// ```
///
/// Dropping a server without calling [`stop`](Self::stop) still cancels the
/// accept loop and removes its credential files, but does not wait for the
/// loop to exit.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    tls: bool,
    routes: Arc<SharedRouter>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
    credentials: Option<CredentialFiles>,
    errors: Option<mpsc::Receiver<BackgroundError>>,
}

impl TestServer {
    /// Plain HTTP on an ephemeral loopback port.
    ///
    /// A bind failure is logged and `None` is returned; use
    /// [`start_at`](Self::start_at) to see the error.
    pub async fn start() -> Option<Self> {
        Self::start_with_config(ServerConfig::new())
            .await
            .map_err(|e| error!(error = %e, "failed to start test server"))
            .ok()
    }

    /// Plain HTTP at `addr`, e.g. `"127.0.0.1:8080"` or `"localhost:"`.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::Bind`] if the address cannot be bound.
    pub async fn start_at(addr: &str) -> Result<Self, StartError> {
        Self::start_with_config(ServerConfig::new().with_address(addr)).await
    }

    /// HTTPS on an ephemeral loopback port with the default certificate.
    ///
    /// Failures are logged and `None` is returned.
    pub async fn start_tls() -> Option<Self> {
        Self::start_with_config(ServerConfig::new().with_tls(true))
            .await
            .map_err(|e| error!(error = %e, "failed to start TLS test server"))
            .ok()
    }

    /// HTTPS at `addr` with the default certificate.
    ///
    /// # Errors
    ///
    /// See [`start_with_config`](Self::start_with_config).
    pub async fn start_tls_at(addr: &str) -> Result<Self, StartError> {
        Self::start_with_config(ServerConfig::new().with_address(addr).with_tls(true)).await
    }

    /// Bind, start the accept loop and return once the address is known.
    ///
    /// For TLS the credential files are written before anything is bound, so
    /// a write failure leaves no listener behind.
    ///
    /// # Errors
    ///
    /// - [`StartError::IncompleteCertificate`] if only a cert or only a key was given.
    /// - [`StartError::FileWrite`] if the temp credential files cannot be written.
    /// - [`StartError::Tls`] if the credentials do not form a usable TLS config.
    /// - [`StartError::Bind`] if the address cannot be bound.
    pub async fn start_with_config(config: ServerConfig) -> Result<Self, StartError> {
        let (credentials, acceptor) = if config.tls {
            let pair = config.certificate_pair()?;
            let files = CredentialFiles::write(&pair)?;
            let acceptor = load_acceptor(&files).await?;
            (Some(files), Some(acceptor))
        } else {
            if config.tls_cert.is_some() || config.tls_key.is_some() {
                warn!("TLS certificate supplied but TLS is disabled; ignoring it");
            }
            (None, None)
        };

        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| StartError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| StartError::Bind {
            addr: bind_addr,
            source,
        })?;

        let tls = acceptor.is_some();
        let scheme = if tls { "https" } else { "http" };
        let base_url = url::base_url(scheme, addr);

        let routes = SharedRouter::new();
        let shutdown = CancellationToken::new();
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        let task = tokio::spawn(
            AcceptLoop {
                listener,
                acceptor,
                service: routes.service(),
                shutdown: shutdown.clone(),
                grace: SHUTDOWN_GRACE_PERIOD,
                errors: errors_tx,
            }
            .run(),
        );
        info!(url = %base_url, "test server listening");

        Ok(Self {
            addr,
            base_url,
            tls,
            routes,
            shutdown,
            task: Some(task),
            credentials,
            errors: Some(errors_rx),
        })
    }

    /// The port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The resolved socket address returned by the bind.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Scheme, host and port, e.g. `http://127.0.0.1:61241`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Paths of the temporary certificate and key files, while they exist.
    pub fn credential_paths(&self) -> Option<(&Path, &Path)> {
        self.credentials
            .as_ref()
            .map(|files| (files.cert_path(), files.key_path()))
    }

    /// Build an absolute URL for `path`, e.g. `"/my/path"` →
    /// `http://127.0.0.1:53262/my/path`.
    pub fn absolute_url(&self, path: &str) -> String {
        url::absolute_url(&self.base_url, path)
    }

    /// Register `method_router` at `path`.
    ///
    /// # Panics
    ///
    /// Panics like [`Router::route`] on an invalid or conflicting path.
    pub fn route(&self, path: &str, method_router: MethodRouter) -> &Self {
        self.routes.update(|router| router.route(path, method_router));
        self
    }

    /// Merge a whole router, e.g. one built with its own state.
    pub fn merge(&self, other: Router) -> &Self {
        self.routes.update(|router| router.merge(other));
        self
    }

    /// Handler for requests that match no route.
    pub fn fallback<H, T>(&self, handler: H) -> &Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.routes.update(|router| router.fallback(handler));
        self
    }

    /// Take the receiver of accept-loop failures.
    ///
    /// Returns `None` after the first call. Errors raised while nobody holds
    /// the receiver, or while it is full, are only logged.
    pub fn background_errors(&mut self) -> Option<mpsc::Receiver<BackgroundError>> {
        self.errors.take()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop accepting, drain in-flight requests briefly, and delete the
    /// credential files.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD + STOP_SLACK, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "test server accept loop ended abnormally"),
                Err(_) => {
                    warn!(url = %self.base_url, "test server did not stop in time; aborting");
                    task.abort();
                }
            }
        }

        // Dropping the files deletes them.
        drop(self.credentials.take());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Display for TestServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url)
    }
}

/// Load the TLS acceptor from the on-disk credential files.
async fn load_acceptor(files: &CredentialFiles) -> Result<TlsAcceptor, TlsError> {
    let cert_pem = read_file(files.cert_path()).await?;
    let key_pem = read_file(files.key_path()).await?;
    let config = tls::build_server_config(&cert_pem, &key_pem)?;
    Ok(TlsAcceptor::from(config))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_owned(),
        source,
    })
}
