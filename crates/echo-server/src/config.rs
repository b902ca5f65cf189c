//! Configuration loading and validation for the echo server.
//!
//! All values are read from environment variables at startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use testserver::ServerConfig;

/// Validated echo-server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `host:port` to listen on; port `0` picks a free one.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Serve HTTPS.
    #[serde(default)]
    pub tls_enabled: bool,

    /// PEM certificate chain. Omit (together with the key) to use the bundled
    /// localhost certificate.
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    /// PEM private key for `tls_cert_path`.
    #[serde(default)]
    pub tls_key_path: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:0".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the combination is invalid.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build echo-server configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise echo-server configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together")
            }
            (Some(_), Some(_)) if !self.tls_enabled => {
                anyhow::bail!("TLS_CERT_PATH is set but TLS_ENABLED is false")
            }
            _ => Ok(()),
        }
    }

    /// Turn this into a [`ServerConfig`], reading any certificate files.
    ///
    /// # Errors
    ///
    /// Returns an error if a certificate file cannot be read.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut server = ServerConfig::new()
            .with_address(self.listen_addr.clone())
            .with_tls(self.tls_enabled);

        if let (Some(cert_path), Some(key_path)) = (&self.tls_cert_path, &self.tls_key_path) {
            let cert = std::fs::read(cert_path)
                .with_context(|| format!("failed to read TLS certificate {cert_path}"))?;
            let key = std::fs::read(key_path)
                .with_context(|| format!("failed to read TLS key {key_path}"))?;
            server = server.with_certificate(cert, key);
        }
        Ok(server)
    }
}
