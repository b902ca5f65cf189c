//! Detached accept loop and per-connection serving.
//!
//! For each accepted TCP connection the loop spawns one task that:
//! 1. Performs the TLS handshake, when the server has an acceptor.
//! 2. Serves HTTP/1.1 or h2 through `hyper_util`'s auto connection builder.
//! 3. On shutdown, asks the connection to finish gracefully and drops it
//!    once the grace period is over.
//!
//! Nothing here returns errors to the caller; failures go to
//! [`report`], which logs them and forwards them to the observation channel.

use std::net::SocketAddr;
use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::router::RouterService;
use crate::error::BackgroundError;

/// Everything the loop needs, moved into its task.
pub(crate) struct AcceptLoop {
    pub listener: TcpListener,
    pub acceptor: Option<TlsAcceptor>,
    pub service: RouterService,
    pub shutdown: CancellationToken,
    pub grace: Duration,
    pub errors: mpsc::Sender<BackgroundError>,
}

impl AcceptLoop {
    /// Accept until `shutdown` fires, then drain connections for at most `grace`.
    pub(crate) async fn run(self) {
        let AcceptLoop {
            listener,
            acceptor,
            service,
            shutdown,
            grace,
            errors,
        } = self;
        let local_addr = listener.local_addr().ok();
        let tracker = TaskTracker::new();

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        report(&errors, BackgroundError::Accept(e));
                        continue;
                    }
                },
            };
            debug!(%peer, "accepted connection");

            let conn = Connection {
                peer,
                service: service.clone(),
                shutdown: shutdown.clone(),
                grace,
                errors: errors.clone(),
            };
            let acceptor = acceptor.clone();
            tracker.spawn(async move {
                match acceptor {
                    Some(acceptor) => conn.serve_tls(acceptor, stream).await,
                    None => conn.serve(stream).await,
                }
            });
        }

        // Release the port before draining.
        drop(listener);
        tracker.close();
        tracker.wait().await;
        info!(addr = ?local_addr, "test server stopped");
    }
}

struct Connection {
    peer: SocketAddr,
    service: RouterService,
    shutdown: CancellationToken,
    grace: Duration,
    errors: mpsc::Sender<BackgroundError>,
}

impl Connection {
    async fn serve_tls(self, acceptor: TlsAcceptor, stream: tokio::net::TcpStream) {
        let handshake = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            res = acceptor.accept(stream) => res,
        };
        match handshake {
            Ok(tls) => self.serve(tls).await,
            Err(source) => report(
                &self.errors,
                BackgroundError::Handshake {
                    peer: self.peer,
                    source,
                },
            ),
        }
    }

    async fn serve<I>(self, io: I)
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let builder = auto::Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), self.service.clone());
        tokio::pin!(conn);

        let result = tokio::select! {
            res = conn.as_mut() => res,
            _ = self.shutdown.cancelled() => {
                conn.as_mut().graceful_shutdown();
                match tokio::time::timeout(self.grace, conn.as_mut()).await {
                    Ok(res) => res,
                    Err(_) => {
                        debug!(peer = %self.peer, "connection still busy after grace period; dropping");
                        Ok(())
                    }
                }
            }
        };

        if let Err(source) = result {
            report(
                &self.errors,
                BackgroundError::Connection {
                    peer: self.peer,
                    source,
                },
            );
        }
    }
}

/// Log a background failure and offer it to the observation channel.
///
/// A full or unobserved channel drops the error; the log line remains.
fn report(errors: &mpsc::Sender<BackgroundError>, err: BackgroundError) {
    warn!(error = %err, "test server background error");
    let _ = errors.try_send(err);
}
