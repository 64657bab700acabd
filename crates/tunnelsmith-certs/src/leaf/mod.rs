//! Contains types and functions to issue and load server and client leaf
//! certificates signed by a [`CertificateAuthority`].
use std::{ops::RangeInclusive, path::Path};

use const_oid::{
    ObjectIdentifier,
    db::rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH},
};
use snafu::{ResultExt as _, ensure};
use tunnelsmith_shared::time::Duration;
use x509_cert::{
    der,
    ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages},
};

use crate::{
    CertificatePair, CertificatePairError, DecodeExtendedKeyUsageSnafu,
    MissingExtendedKeyUsageSnafu, VerifyCertificateError, ca::CertificateAuthority,
    verify_issued_by,
};

mod extensions;
mod leaf_builder;
pub use extensions::*;
pub use leaf_builder::*;

/// The default validity of leaf certificates, ten years.
pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::from_days_unchecked(3650);

/// Serial numbers of leaf certificates are drawn from this range.
///
/// Collisions are not tracked. Two leaves sharing a serial are both valid.
pub const SERIAL_NUMBER_RANGE: RangeInclusive<u64> = 1..=99_999_999;

/// The role a leaf certificate plays in a VPN deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LeafRole {
    Server,
    Client,
}

impl LeafRole {
    /// Prefix of the synthesized common name, which is followed by a UUID.
    pub const fn common_name_prefix(self) -> &'static str {
        match self {
            Self::Server => "server-",
            Self::Client => "client-",
        }
    }

    pub fn key_usage(self) -> KeyUsage {
        match self {
            Self::Server => KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment),
            Self::Client => KeyUsage(KeyUsages::DigitalSignature.into()),
        }
    }

    pub fn extended_key_usage(self) -> ExtendedKeyUsage {
        let purpose: ObjectIdentifier = match self {
            Self::Server => ID_KP_SERVER_AUTH,
            Self::Client => ID_KP_CLIENT_AUTH,
        };

        ExtendedKeyUsage(vec![purpose])
    }

    pub fn netscape_cert_type(self) -> der::Result<NetscapeCertType> {
        match self {
            Self::Server => NetscapeCertType::server(),
            Self::Client => NetscapeCertType::client(),
        }
    }
}

/// A server or client certificate together with its private key.
#[derive(Debug)]
pub struct LeafCertificate {
    role: LeafRole,
    certificate_pair: CertificatePair,
}

impl LeafCertificate {
    pub(crate) fn new(role: LeafRole, certificate_pair: CertificatePair) -> Self {
        Self {
            role,
            certificate_pair,
        }
    }

    /// Use this function in combination with [`LeafCertificateBuilder`] to
    /// issue new leaf certificates.
    pub fn builder<'a>() -> LeafCertificateBuilderBuilder<'a> {
        LeafCertificateBuilder::start_builder()
    }

    /// Loads a leaf certificate of the given `role` from a PEM-encoded
    /// certificate and PKCS8 private key.
    #[tracing::instrument(
        name = "load_leaf_certificate",
        skip(certificate_path, private_key_path),
        fields(certificate_path = %certificate_path.as_ref().display())
    )]
    pub fn from_pem_files(
        role: LeafRole,
        certificate_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<Self, CertificatePairError> {
        CertificatePair::from_pem_files(certificate_path, private_key_path)
            .map(|certificate_pair| Self::new(role, certificate_pair))
    }

    /// Checks that this certificate was issued and signed by `ca`, and that it
    /// may be used for its role.
    pub fn verify_signed_by(&self, ca: &CertificateAuthority) -> Result<(), VerifyCertificateError> {
        let certificate = self.certificate_pair.certificate();
        verify_issued_by(certificate, ca.ca_cert())?;

        let purposes = certificate
            .tbs_certificate
            .get::<ExtendedKeyUsage>()
            .context(DecodeExtendedKeyUsageSnafu)?
            .map(|(_critical, usage)| usage.0)
            .unwrap_or_default();
        for purpose in self.role.extended_key_usage().0 {
            ensure!(
                purposes.contains(&purpose),
                MissingExtendedKeyUsageSnafu {
                    role: self.role.to_string(),
                    purpose
                }
            );
        }

        Ok(())
    }

    pub fn certificate_pair(&self) -> &CertificatePair {
        &self.certificate_pair
    }
}
