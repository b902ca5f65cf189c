//! Ephemeral HTTP(S) servers for exercising client code in tests.
//!
//! A [`TestServer`] binds a real listener (port `0` by default, so the OS
//! picks a free port), serves an embedded axum [`Router`](axum::Router) on a
//! background tokio task and hands back its resolved port and base URL before
//! any request is made.
//!
//! ```no_run
//! use axum::{extract::Query, routing::get};
//! use std::collections::HashMap;
//! use testserver::TestServer;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = TestServer::start_at("127.0.0.1:0").await?;
//! server.route(
//!     "/hello",
//!     get(|Query(q): Query<HashMap<String, String>>| async move {
//!         format!("hello {}", q.get("name").map(String::as_str).unwrap_or(""))
//!     }),
//! );
//!
//! let resp = testserver::client::get(&server.absolute_url("/hello?name=world")).await?;
//! assert_eq!(testserver::client::read_text(resp).await?, "hello world");
//! server.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! TLS servers use a bundled self-signed `localhost` certificate unless the
//! caller supplies one, either per server through [`ServerConfig`] or
//! process-wide through [`tls::set_default_tls_certificate`].

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod server;
pub mod tls;
pub mod url;

pub use config::ServerConfig;
pub use error::{BackgroundError, StartError, TlsError};
pub use server::{TestServer, SHUTDOWN_GRACE_PERIOD};
pub use tls::{set_default_tls_certificate, CertificatePair};
