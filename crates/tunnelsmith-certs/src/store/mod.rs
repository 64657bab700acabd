//! The on-disk trust store.
//!
//! A [`TrustStore`] decides which material is loaded and which is generated,
//! then writes everything back to the fixed layout described by
//! [`TrustStorePaths`]. A single run walks through these steps:
//!
//! 1. Load the CA if both of its files exist, create it if neither does.
//! 2. Load the server certificate under the same rule. It is reissued when
//!    the CA was just created or when it was not signed by the current CA.
//! 3. Always issue a fresh client certificate.
//! 4. Fetch or generate the DH parameters and, if requested, the tls-auth key.
//! 5. Render the configs and write all artifacts.
//!
//! A CA or server with only one of its two files present is never repaired.
//! The run fails instead.
use std::{
    fs, io,
    path::{Path, PathBuf},
    string::FromUtf8Error,
};

use snafu::{ResultExt, Snafu};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    CertificatePairError,
    auxiliary::{self, MaterialGenerator},
    ca::{CertificateAuthority, CreateCertificateAuthorityError},
    leaf::{CreateLeafCertificateError, LeafCertificate, LeafRole},
};

mod config;
mod materialize;
pub use config::*;
pub use materialize::*;

/// The host used by clients when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// The port used by server and clients when none is configured.
pub const DEFAULT_PORT: &str = "443";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid run name"))]
    InvalidRunName { source: InvalidRunNameError },

    #[snafu(display("failed to create trust store directory {path:?}"))]
    CreateDirectory { source: io::Error, path: PathBuf },

    #[snafu(display("failed to check whether {path:?} exists"))]
    CheckExists { source: io::Error, path: PathBuf },

    #[snafu(display(
        "the certificate authority is inconsistent, {present:?} exists but {missing:?} is missing"
    ))]
    InconsistentAuthority { present: PathBuf, missing: PathBuf },

    #[snafu(display(
        "the server certificate is inconsistent, {present:?} exists but {missing:?} is missing"
    ))]
    InconsistentServer { present: PathBuf, missing: PathBuf },

    #[snafu(display("failed to load certificate authority"))]
    LoadAuthority { source: CertificatePairError },

    #[snafu(display("failed to create certificate authority"))]
    CreateAuthority {
        source: CreateCertificateAuthorityError,
    },

    #[snafu(display("failed to load server certificate"))]
    LoadServer { source: CertificatePairError },

    #[snafu(display("failed to issue {role} certificate"))]
    IssueLeaf {
        source: CreateLeafCertificateError,
        role: LeafRole,
    },

    #[snafu(display("failed to resolve auxiliary material"))]
    ResolveAuxiliary { source: auxiliary::Error },

    #[snafu(display("{role} is not valid UTF-8"))]
    DecodeAuxiliary {
        source: FromUtf8Error,
        role: FileRole,
    },

    #[snafu(display("failed to serialize material as PEM"))]
    SerializeMaterial { source: CertificatePairError },

    #[snafu(display("failed to render configs"))]
    Render {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// The outcome of resolving a certificate and its private key.
#[derive(Debug)]
pub enum Resolved<T> {
    /// Both files existed and were loaded.
    Loaded(T),

    /// The material was freshly generated.
    Created(T),

    /// Only one of the two files exists.
    Inconsistent { present: PathBuf, missing: PathBuf },
}

impl<T> Resolved<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Connection parameters taken from the template metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Embed material inline in the configs instead of referencing files.
    pub embed_keys: bool,

    /// Generate and use a pre-shared tls-auth key.
    pub tls_auth: bool,

    pub host: String,
    pub port: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            embed_keys: true,
            tls_auth: true,
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT.to_owned(),
        }
    }
}

/// The generators used when auxiliary material is not cached yet.
#[derive(Clone, Copy)]
pub struct AuxiliaryGenerators<'a> {
    pub dh_params: &'a dyn MaterialGenerator,
    pub auth_key: &'a dyn MaterialGenerator,
}

#[derive(Debug)]
pub struct AuxiliaryMaterial {
    pub dh_params: Vec<u8>,
    pub auth_key: Option<Zeroizing<Vec<u8>>>,
}

/// Everything resolved during a run, ready to be materialized.
#[derive(Debug)]
pub struct IssuedMaterial {
    pub authority: CertificateAuthority,
    pub server: LeafCertificate,
    pub client: LeafCertificate,
    pub auxiliary: AuxiliaryMaterial,
}

enum PairState {
    Both,
    Neither,
    Partial { present: PathBuf, missing: PathBuf },
}

#[derive(Debug)]
pub struct TrustStore {
    config: TrustStoreConfig,
    paths: TrustStorePaths,
}

impl TrustStore {
    pub fn new(config: TrustStoreConfig) -> Result<Self, Error> {
        let paths = TrustStorePaths::new(config.directory.clone(), config.name.clone())
            .context(InvalidRunNameSnafu)?;

        Ok(Self { config, paths })
    }

    pub fn paths(&self) -> &TrustStorePaths {
        &self.paths
    }

    /// Loads the CA if both of its files exist and creates a new one if
    /// neither does.
    #[instrument(skip(self))]
    pub fn resolve_authority(&self) -> Result<Resolved<CertificateAuthority>, Error> {
        let state = self.pair_state(FileRole::CaCertificate, FileRole::CaPrivateKey)?;

        match state {
            PairState::Both => {
                let ca = CertificateAuthority::from_pem_files(
                    self.paths.path(FileRole::CaCertificate),
                    self.paths.path(FileRole::CaPrivateKey),
                )
                .context(LoadAuthoritySnafu)?;
                info!(ca.subject = %ca.subject(), "loaded certificate authority");

                Ok(Resolved::Loaded(ca))
            }
            PairState::Neither => {
                let ca = CertificateAuthority::builder()
                    .maybe_common_name(self.config.ca_common_name.as_deref())
                    .key_size(self.config.key_size)
                    .validity(self.config.ca_validity)
                    .build()
                    .context(CreateAuthoritySnafu)?;
                info!(ca.subject = %ca.subject(), "created certificate authority");

                Ok(Resolved::Created(ca))
            }
            PairState::Partial { present, missing } => {
                Ok(Resolved::Inconsistent { present, missing })
            }
        }
    }

    /// Loads the server certificate if both of its files exist and it was
    /// signed by `ca`. Otherwise a new one is issued.
    #[instrument(skip(self, ca))]
    pub fn resolve_server(
        &self,
        ca: &CertificateAuthority,
        authority_created: bool,
    ) -> Result<Resolved<LeafCertificate>, Error> {
        if authority_created {
            return self.issue(ca, LeafRole::Server).map(Resolved::Created);
        }

        let state = self.pair_state(FileRole::ServerCertificate, FileRole::ServerPrivateKey)?;
        match state {
            PairState::Both => {
                let server = LeafCertificate::from_pem_files(
                    LeafRole::Server,
                    self.paths.path(FileRole::ServerCertificate),
                    self.paths.path(FileRole::ServerPrivateKey),
                )
                .context(LoadServerSnafu)?;

                match server.verify_signed_by(ca) {
                    Ok(()) => {
                        info!("loaded server certificate");
                        Ok(Resolved::Loaded(server))
                    }
                    Err(error) => {
                        warn!(
                            error = &error as &dyn std::error::Error,
                            "server certificate was not signed by the certificate authority, reissuing"
                        );
                        self.issue(ca, LeafRole::Server).map(Resolved::Created)
                    }
                }
            }
            PairState::Neither => self.issue(ca, LeafRole::Server).map(Resolved::Created),
            PairState::Partial { present, missing } => {
                Ok(Resolved::Inconsistent { present, missing })
            }
        }
    }

    /// Issues a fresh client certificate. Existing client files are never
    /// reused.
    #[instrument(skip(self, ca))]
    pub fn issue_client(&self, ca: &CertificateAuthority) -> Result<LeafCertificate, Error> {
        self.issue(ca, LeafRole::Client)
    }

    /// Fetches or generates the DH parameters and, if `tls_auth` is set, the
    /// auth key.
    #[instrument(skip(self, generators))]
    pub fn resolve_auxiliary(
        &self,
        options: &ConnectionOptions,
        generators: AuxiliaryGenerators<'_>,
    ) -> Result<AuxiliaryMaterial, Error> {
        let dh_params = auxiliary::dh_params(
            &self.paths.path(FileRole::DhParams),
            generators.dh_params,
        )
        .context(ResolveAuxiliarySnafu)?;

        let auth_key = if options.tls_auth {
            let auth_key =
                auxiliary::auth_key(&self.paths.path(FileRole::AuthKey), generators.auth_key)
                    .context(ResolveAuxiliarySnafu)?;
            Some(Zeroizing::new(auth_key))
        } else {
            None
        };

        Ok(AuxiliaryMaterial {
            dh_params,
            auth_key,
        })
    }

    /// Serializes `material` into the bundle handed to a [`ConfigRenderer`].
    pub fn bundle(
        &self,
        material: &IssuedMaterial,
        options: &ConnectionOptions,
    ) -> Result<MaterialBundle, Error> {
        let dh_params_pem = String::from_utf8(material.auxiliary.dh_params.clone()).context(
            DecodeAuxiliarySnafu {
                role: FileRole::DhParams,
            },
        )?;
        let auth_key_pem = material
            .auxiliary
            .auth_key
            .as_ref()
            .map(|auth_key| String::from_utf8(auth_key.to_vec()).map(Zeroizing::new))
            .transpose()
            .context(DecodeAuxiliarySnafu {
                role: FileRole::AuthKey,
            })?;

        let server = material.server.certificate_pair();
        let client = material.client.certificate_pair();

        Ok(MaterialBundle {
            ca_certificate_pem: material
                .authority
                .certificate_pair()
                .certificate_pem()
                .context(SerializeMaterialSnafu)?,
            server_certificate_pem: server.certificate_pem().context(SerializeMaterialSnafu)?,
            server_private_key_pem: server.private_key_pem().context(SerializeMaterialSnafu)?,
            client_certificate_pem: client.certificate_pem().context(SerializeMaterialSnafu)?,
            client_private_key_pem: client.private_key_pem().context(SerializeMaterialSnafu)?,
            dh_params_pem: Some(dh_params_pem),
            auth_key_pem,
            server_port: options.port.clone(),
            client_host: options.host.clone(),
            embed_keys: options.embed_keys,
            paths: self.paths.clone(),
        })
    }

    /// Renders the configs and writes every artifact.
    ///
    /// Rendering failures are fatal. Write failures are collected in the
    /// returned [`MaterializeReport`].
    #[instrument(skip_all, fields(directory = %self.paths.directory().display()))]
    pub fn materialize<R: ConfigRenderer>(
        &self,
        material: &IssuedMaterial,
        options: &ConnectionOptions,
        renderer: &R,
    ) -> Result<MaterializeReport, Error> {
        let bundle = self.bundle(material, options)?;
        let ca_private_key_pem = material
            .authority
            .certificate_pair()
            .private_key_pem()
            .context(SerializeMaterialSnafu)?;

        let configs = renderer
            .render(&bundle)
            .map_err(|error| Box::new(error) as Box<dyn std::error::Error + Send + Sync>)
            .context(RenderSnafu)?;

        let paths = &self.paths;
        let mut report = MaterializeReport::default();
        report.write(paths, FileRole::CaCertificate, bundle.ca_certificate_pem.as_bytes());
        report.write(paths, FileRole::CaPrivateKey, ca_private_key_pem.as_bytes());
        report.write(paths, FileRole::ServerCertificate, bundle.server_certificate_pem.as_bytes());
        report.write(paths, FileRole::ServerPrivateKey, bundle.server_private_key_pem.as_bytes());
        report.write(paths, FileRole::ClientCertificate, bundle.client_certificate_pem.as_bytes());
        report.write(paths, FileRole::ClientPrivateKey, bundle.client_private_key_pem.as_bytes());
        report.write(paths, FileRole::ServerConfig, configs.server.as_bytes());
        report.write(paths, FileRole::ClientConfig, configs.client.as_bytes());

        info!(
            written = report.written.len(),
            failed = report.failures.len(),
            "materialized trust store"
        );
        Ok(report)
    }

    /// Performs a complete run, see the [module documentation](self).
    #[instrument(skip_all, fields(directory = %self.paths.directory().display(), name = self.paths.name()))]
    pub fn run<R: ConfigRenderer>(
        &self,
        options: &ConnectionOptions,
        generators: AuxiliaryGenerators<'_>,
        renderer: &R,
    ) -> Result<MaterializeReport, Error> {
        let directory = self.paths.directory();
        fs::create_dir_all(directory).context(CreateDirectorySnafu { path: directory })?;

        let resolved_authority = self.resolve_authority()?;
        let authority_created = resolved_authority.is_created();
        let authority = match resolved_authority {
            Resolved::Loaded(ca) | Resolved::Created(ca) => ca,
            Resolved::Inconsistent { present, missing } => {
                return InconsistentAuthoritySnafu { present, missing }.fail();
            }
        };

        let server = match self.resolve_server(&authority, authority_created)? {
            Resolved::Loaded(server) | Resolved::Created(server) => server,
            Resolved::Inconsistent { present, missing } => {
                return InconsistentServerSnafu { present, missing }.fail();
            }
        };

        let client = self.issue_client(&authority)?;
        let auxiliary = self.resolve_auxiliary(options, generators)?;

        let material = IssuedMaterial {
            authority,
            server,
            client,
            auxiliary,
        };
        self.materialize(&material, options, renderer)
    }

    fn issue(&self, ca: &CertificateAuthority, role: LeafRole) -> Result<LeafCertificate, Error> {
        let common_name = match role {
            LeafRole::Server => self.config.server_common_name.as_deref(),
            LeafRole::Client => self.config.client_common_name.as_deref(),
        };

        let leaf = LeafCertificate::builder()
            .role(role)
            .maybe_common_name(common_name)
            .key_size(self.config.key_size)
            .validity(self.config.certificate_validity)
            .signed_by(ca)
            .build()
            .context(IssueLeafSnafu { role })?;
        info!(%role, "issued leaf certificate");

        Ok(leaf)
    }

    fn pair_state(
        &self,
        certificate: FileRole,
        private_key: FileRole,
    ) -> Result<PairState, Error> {
        let certificate = self.paths.path(certificate);
        let private_key = self.paths.path(private_key);

        let state = match (exists(&certificate)?, exists(&private_key)?) {
            (true, true) => PairState::Both,
            (false, false) => PairState::Neither,
            (true, false) => PairState::Partial {
                present: certificate,
                missing: private_key,
            },
            (false, true) => PairState::Partial {
                present: private_key,
                missing: certificate,
            },
        };

        Ok(state)
    }
}

fn exists(path: &Path) -> Result<bool, Error> {
    path.try_exists().context(CheckExistsSnafu { path })
}
