//! Auxiliary key material which is not part of the certificate chain:
//! Diffie-Hellman parameters and the pre-shared tls-auth key.
//!
//! Both are produced by a [`MaterialGenerator`] exactly once and cached at a
//! fixed path. Later calls only read the cached file.
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::ExitStatus,
};

use snafu::{ResultExt, Snafu};
use tracing::{debug, info, instrument, warn};

use crate::fs::{write_public_file, write_secret_file};

mod command;
mod static_key;
pub use command::*;
pub use static_key::*;

/// Generating DH parameters is attempted this many times. Some versions of
/// the external tool fail spuriously.
pub const DH_PARAMS_ATTEMPTS: usize = 2;

/// Generating the auth key is never retried.
pub const AUTH_KEY_ATTEMPTS: usize = 1;

#[derive(Debug, Snafu)]
pub enum ExternalToolError {
    #[snafu(display("failed to run {program:?}"))]
    Spawn { source: io::Error, program: String },

    #[snafu(display("{program:?} exited with {status}: {stderr}"))]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[snafu(display("{program:?} produced no output"))]
    EmptyOutput { program: String },
}

/// Produces one piece of auxiliary material.
///
/// The default implementations spawn an external program, tests inject
/// doubles.
pub trait MaterialGenerator {
    fn generate(&self) -> Result<Vec<u8>, ExternalToolError>;
}

/// The kinds of auxiliary material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Artifact {
    #[strum(serialize = "DH parameters")]
    DhParams,

    #[strum(serialize = "tls-auth key")]
    AuthKey,
}

impl Artifact {
    const fn attempts(self) -> usize {
        match self {
            Self::DhParams => DH_PARAMS_ATTEMPTS,
            Self::AuthKey => AUTH_KEY_ATTEMPTS,
        }
    }

    fn write(self, path: &Path, contents: &[u8]) -> io::Result<()> {
        match self {
            Self::DhParams => write_public_file(path, contents),
            Self::AuthKey => write_secret_file(path, contents),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to generate {artifact} after {attempts} attempt(s)"))]
    Generate {
        source: ExternalToolError,
        artifact: Artifact,
        attempts: usize,
    },

    #[snafu(display("failed to check whether {artifact} exist at {path:?}"))]
    CheckExists {
        source: io::Error,
        artifact: Artifact,
        path: PathBuf,
    },

    #[snafu(display("failed to write {artifact} to {path:?}"))]
    Write {
        source: io::Error,
        artifact: Artifact,
        path: PathBuf,
    },

    #[snafu(display("failed to read {artifact} from {path:?}"))]
    Read {
        source: io::Error,
        artifact: Artifact,
        path: PathBuf,
    },
}

/// Returns the DH parameters cached at `path`, generating them first if the
/// file does not exist yet.
pub fn dh_params(path: &Path, generator: &dyn MaterialGenerator) -> Result<Vec<u8>, Error> {
    fetch_or_generate(Artifact::DhParams, path, generator)
}

/// Returns the tls-auth key cached at `path`, generating it first if the file
/// does not exist yet.
pub fn auth_key(path: &Path, generator: &dyn MaterialGenerator) -> Result<Vec<u8>, Error> {
    fetch_or_generate(Artifact::AuthKey, path, generator)
}

#[instrument(skip(generator), fields(path = %path.display()))]
fn fetch_or_generate(
    artifact: Artifact,
    path: &Path,
    generator: &dyn MaterialGenerator,
) -> Result<Vec<u8>, Error> {
    let exists = path
        .try_exists()
        .context(CheckExistsSnafu { artifact, path })?;

    if exists {
        debug!("reusing cached {artifact}");
    } else {
        let material = generate(artifact, generator)?;
        artifact
            .write(path, &material)
            .context(WriteSnafu { artifact, path })?;
        info!("generated {artifact}");
    }

    fs::read(path).context(ReadSnafu { artifact, path })
}

fn generate(artifact: Artifact, generator: &dyn MaterialGenerator) -> Result<Vec<u8>, Error> {
    let attempts = artifact.attempts();
    let mut attempt = 1;

    loop {
        match generator.generate() {
            Ok(material) => return Ok(material),
            Err(error) if attempt < attempts => {
                warn!(
                    error = &error as &dyn std::error::Error,
                    attempt,
                    "failed to generate {artifact}, retrying"
                );
                attempt += 1;
            }
            Err(error) => {
                return Err(error).context(GenerateSnafu { artifact, attempts });
            }
        }
    }
}
