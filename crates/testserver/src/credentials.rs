//! Temporary on-disk copies of a server's certificate and key.
//!
//! The TLS listener is loaded from file paths, so the PEM bytes are written
//! to the OS temp directory for the lifetime of the server. Both files are
//! created together and removed together; a [`CredentialFiles`] never holds
//! only one of them.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StartError;
use crate::tls::CertificatePair;

const CERT_PREFIX: &str = "testserver-tls-cert_";
const KEY_PREFIX: &str = "testserver-tls-key_";

/// A certificate file and a key file owned by one server.
///
/// Dropping the value deletes both files. Deletion is best-effort: failures
/// are logged and otherwise ignored.
#[derive(Debug)]
pub struct CredentialFiles {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CredentialFiles {
    /// Write `pair` to two freshly created, uniquely named temp files.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::FileWrite`] if either file cannot be created or
    /// written. Anything already written is removed before returning.
    pub fn write(pair: &CertificatePair) -> Result<Self, StartError> {
        Self::write_in(&std::env::temp_dir(), pair)
    }

    pub(crate) fn write_in(dir: &Path, pair: &CertificatePair) -> Result<Self, StartError> {
        let id = Uuid::new_v4();
        let cert_path = dir.join(format!("{CERT_PREFIX}{id}"));
        let key_path = dir.join(format!("{KEY_PREFIX}{id}"));

        write_new(&cert_path, &pair.cert_pem, 0o644)?;
        if let Err(e) = write_new(&key_path, &pair.key_pem, 0o600) {
            remove_logged(&cert_path);
            return Err(e);
        }

        debug!(cert = %cert_path.display(), key = %key_path.display(), "wrote TLS credential files");
        Ok(Self { cert_path, key_path })
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

impl Drop for CredentialFiles {
    fn drop(&mut self) {
        remove_logged(&self.cert_path);
        remove_logged(&self.key_path);
    }
}

fn write_new(path: &Path, contents: &[u8], mode: u32) -> Result<(), StartError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let result = options.open(path).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    result.map_err(|source| {
        // AlreadyExists means the file is not ours to delete.
        if source.kind() != io::ErrorKind::AlreadyExists {
            let _ = fs::remove_file(path);
        }
        StartError::FileWrite {
            path: path.to_owned(),
            source,
        }
    })
}

fn remove_logged(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed TLS credential file"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove TLS credential file"),
    }
}
