use std::{io, path::PathBuf};

use snafu::Snafu;
use tracing::{debug, error};
use zeroize::Zeroizing;

use super::{FileRole, TrustStorePaths};
use crate::fs::{write_public_file, write_secret_file};

/// All material handed to a [`ConfigRenderer`], serialized as PEM.
#[derive(Clone, Debug)]
pub struct MaterialBundle {
    pub ca_certificate_pem: String,
    pub server_certificate_pem: String,
    pub server_private_key_pem: Zeroizing<String>,
    pub client_certificate_pem: String,
    pub client_private_key_pem: Zeroizing<String>,
    pub dh_params_pem: Option<String>,
    pub auth_key_pem: Option<Zeroizing<String>>,

    pub server_port: String,
    pub client_host: String,

    /// Whether the configs embed the material inline or reference the files
    /// in [`Self::paths`].
    pub embed_keys: bool,
    pub paths: TrustStorePaths,
}

/// The server and client configuration documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedConfigs {
    pub server: String,
    pub client: String,
}

/// Turns a [`MaterialBundle`] into the server and client configuration
/// documents.
pub trait ConfigRenderer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn render(&self, bundle: &MaterialBundle) -> Result<RenderedConfigs, Self::Error>;
}

/// A single artifact could not be written.
#[derive(Debug, Snafu)]
#[snafu(display("failed to write {role} to {path:?}"))]
pub struct PersistenceError {
    pub role: FileRole,
    pub path: PathBuf,
    pub source: io::Error,
}

/// The outcome of writing all artifacts.
///
/// Writes are independent of each other, one failure never prevents the
/// remaining writes.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<PersistenceError>,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Writes `contents` to the path of `role` and records the outcome.
    pub(crate) fn write(&mut self, paths: &TrustStorePaths, role: FileRole, contents: &[u8]) {
        let path = paths.path(role);
        let result = if role.is_secret() {
            write_secret_file(&path, contents)
        } else {
            write_public_file(&path, contents)
        };

        match result {
            Ok(()) => {
                debug!(%role, path = %path.display(), "wrote artifact");
                self.written.push(path);
            }
            Err(source) => {
                let failure = PersistenceError { role, path, source };
                error!(error = &failure as &dyn std::error::Error, "failed to persist artifact");
                self.failures.push(failure);
            }
        }
    }
}
