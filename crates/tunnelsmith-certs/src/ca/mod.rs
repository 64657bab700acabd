//! Contains types and functions to generate, load and use the root
//! certificate authority (CA).
use std::path::Path;

use x509_cert::{Certificate, name::Name};

use crate::{CertificatePair, CertificatePairError, keys::rsa::SigningKey};

mod ca_builder;
mod consts;
pub use ca_builder::*;
pub use consts::*;

/// A self-signed root certificate authority (CA) which is used to sign
/// server and client leaf certificates.
///
/// Use [`CertificateAuthorityBuilder`] to create new CAs, or
/// [`CertificateAuthority::from_pem_files`] to load an existing one.
#[derive(Debug)]
pub struct CertificateAuthority {
    certificate_pair: CertificatePair,
}

impl CertificateAuthority {
    pub fn new(certificate_pair: CertificatePair) -> Self {
        Self { certificate_pair }
    }

    /// Use this function in combination with [`CertificateAuthorityBuilder`] to create new CAs.
    pub fn builder<'a>() -> CertificateAuthorityBuilderBuilder<'a> {
        CertificateAuthorityBuilder::start_builder()
    }

    /// Loads a CA from a PEM-encoded certificate and PKCS8 private key.
    #[tracing::instrument(
        name = "load_certificate_authority",
        skip_all,
        fields(certificate_path = %certificate_path.as_ref().display())
    )]
    pub fn from_pem_files(
        certificate_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<Self, CertificatePairError> {
        CertificatePair::from_pem_files(certificate_path, private_key_path).map(Self::new)
    }

    pub fn signing_key(&self) -> &SigningKey {
        self.certificate_pair.key_pair()
    }

    pub fn ca_cert(&self) -> &Certificate {
        self.certificate_pair.certificate()
    }

    pub fn certificate_pair(&self) -> &CertificatePair {
        &self.certificate_pair
    }

    /// The subject of the CA, which is the issuer of every certificate it
    /// signs.
    pub fn subject(&self) -> &Name {
        &self.ca_cert().tbs_certificate.subject
    }
}
