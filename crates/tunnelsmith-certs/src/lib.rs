//! This crate provides the certificate issuance engine of tunnelsmith. It
//! creates a self-signed certificate authority (CA), which signs the server
//! and client leaf certificates used by a VPN endpoint and its peers.
//!
//! The [`store::TrustStore`] persists all of this material as PEM files in a
//! fixed directory layout. Each run loads the CA if it is already present
//! and otherwise creates it, so repeated runs keep a stable trust root. Every
//! run still mints a fresh client identity. Diffie-Hellman parameters and the
//! pre-shared tls-auth key are provided by the [`auxiliary`] module and are
//! generated at most once.
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc5280>
//! - <https://openvpn.net/community-resources/reference-manual-for-openvpn-2-6/>
use std::path::{Path, PathBuf};

use const_oid::ObjectIdentifier;
use rsa::{BigUint, RsaPublicKey, pkcs1::der::Decode as _};
use signature::Verifier;
use snafu::{ResultExt, Snafu, ensure};
use x509_cert::{
    Certificate,
    der::{DecodePem, Encode, EncodePem, pem::LineEnding},
    name::Name,
};
use zeroize::Zeroizing;

use crate::keys::rsa::{MAXIMUM_KEY_SIZE, SigningKey};

pub mod auxiliary;
pub mod ca;
mod fs;
pub mod keys;
pub mod leaf;
pub mod store;

/// All PEM documents written by this crate use Unix line endings.
pub const PEM_LINE_ENDING: LineEnding = LineEnding::LF;

/// Error variants which can be encountered when serializing or loading a
/// [`CertificatePair`].
#[derive(Debug, Snafu)]
pub enum CertificatePairError {
    #[snafu(display("failed to serialize certificate as PEM"))]
    SerializeCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to serialize private key as PEM"))]
    SerializePrivateKey { source: keys::rsa::Error },

    #[snafu(display("failed to read file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse UTF-8 encoded private key from {path:?}"))]
    DecodeUtf8String {
        source: std::string::FromUtf8Error,
        path: PathBuf,
    },

    #[snafu(display("failed to deserialize PEM-encoded certificate from {path:?}"))]
    DeserializeCertificate {
        source: x509_cert::der::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to deserialize PEM-encoded private key from {path:?}"))]
    DeserializePrivateKey {
        source: keys::rsa::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to derive the public key of the private key in {path:?}"))]
    DerivePublicKey {
        source: keys::rsa::Error,
        path: PathBuf,
    },

    #[snafu(display(
        "the private key in {private_key_path:?} does not belong to the certificate in {certificate_path:?}"
    ))]
    KeyMismatch {
        certificate_path: PathBuf,
        private_key_path: PathBuf,
    },
}

/// Contains the certificate and the signing / embedded key pair.
///
/// A [`CertificateAuthority`](crate::ca::CertificateAuthority) uses this struct
/// internally to store the signing key pair which is used to sign the CA
/// itself (self-signed) and all child leaf certificates. Leaf certificates on
/// the other hand use this to store the bound keypair.
#[derive(Debug)]
pub struct CertificatePair {
    certificate: Certificate,
    key_pair: SigningKey,
}

impl CertificatePair {
    pub(crate) fn new(certificate: Certificate, key_pair: SigningKey) -> Self {
        Self {
            certificate,
            key_pair,
        }
    }

    /// Returns a reference to the [`Certificate`].
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Returns a reference to the (signing) key pair.
    pub fn key_pair(&self) -> &SigningKey {
        &self.key_pair
    }

    /// Serializes the certificate as a PEM document.
    pub fn certificate_pem(&self) -> Result<String, CertificatePairError> {
        self.certificate
            .to_pem(PEM_LINE_ENDING)
            .context(SerializeCertificateSnafu)
    }

    /// Serializes the private key as a PEM-encoded PKCS8 document.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>, CertificatePairError> {
        self.key_pair
            .to_pkcs8_pem(PEM_LINE_ENDING)
            .context(SerializePrivateKeySnafu)
    }

    /// Reads in a PEM-encoded certificate from `certificate_path` and the
    /// PEM-encoded PKCS8 private key from `private_key_path`.
    ///
    /// Both files must be readable and well-formed, and the private key must
    /// match the public key embedded in the certificate.
    pub fn from_pem_files(
        certificate_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<Self, CertificatePairError> {
        let certificate_path = certificate_path.as_ref();
        let private_key_path = private_key_path.as_ref();

        let certificate_pem = std::fs::read(certificate_path).context(ReadFileSnafu {
            path: certificate_path,
        })?;
        let certificate = Certificate::from_pem(&certificate_pem).context(
            DeserializeCertificateSnafu {
                path: certificate_path,
            },
        )?;

        let private_key_pem = std::fs::read(private_key_path).context(ReadFileSnafu {
            path: private_key_path,
        })?;
        let private_key_pem = Zeroizing::new(String::from_utf8(private_key_pem).context(
            DecodeUtf8StringSnafu {
                path: private_key_path,
            },
        )?);
        let key_pair = SigningKey::from_pkcs8_pem(&private_key_pem).context(
            DeserializePrivateKeySnafu {
                path: private_key_path,
            },
        )?;

        let embedded_spki = &certificate.tbs_certificate.subject_public_key_info;
        let key_spki = key_pair
            .subject_public_key_info()
            .context(DerivePublicKeySnafu {
                path: private_key_path,
            })?;
        ensure!(embedded_spki == &key_spki, KeyMismatchSnafu {
            certificate_path,
            private_key_path,
        });

        Ok(Self::new(certificate, key_pair))
    }
}

/// Error variants which can be encountered when checking that a certificate
/// was issued by another certificate.
#[derive(Debug, Snafu)]
pub enum VerifyCertificateError {
    #[snafu(display("the certificate issuer {issuer} does not match the CA subject {ca_subject}"))]
    IssuerMismatch { issuer: Name, ca_subject: Name },

    #[snafu(display("failed to encode the to-be-signed certificate as DER"))]
    EncodeTbsCertificate { source: x509_cert::der::Error },

    #[snafu(display("the CA public key uses {algorithm}, only RSA keys are supported"))]
    UnsupportedIssuerKeyAlgorithm { algorithm: ObjectIdentifier },

    #[snafu(display("failed to decode the CA public key as PKCS#1 RSA key"))]
    DecodeIssuerPublicKey { source: x509_cert::der::Error },

    #[snafu(display("the CA public key is not a valid RSA key"))]
    InvalidIssuerPublicKey { source: rsa::Error },

    #[snafu(display("failed to decode the certificate signature"))]
    DecodeSignature { source: signature::Error },

    #[snafu(display("the certificate signature does not verify against the CA public key"))]
    InvalidSignature { source: signature::Error },

    #[snafu(display("failed to decode the extended key usage of the certificate"))]
    DecodeExtendedKeyUsage { source: x509_cert::der::Error },

    #[snafu(display("the {role} certificate lacks the extended key usage {purpose}"))]
    MissingExtendedKeyUsage {
        role: String,
        purpose: ObjectIdentifier,
    },
}

/// Checks that `certificate` names `issuer` as its issuer and that its
/// signature verifies against the public key of `issuer`.
///
/// For a self-signed CA, pass the same certificate twice.
pub fn verify_issued_by(
    certificate: &Certificate,
    issuer: &Certificate,
) -> Result<(), VerifyCertificateError> {
    let ca_subject = &issuer.tbs_certificate.subject;
    ensure!(
        &certificate.tbs_certificate.issuer == ca_subject,
        IssuerMismatchSnafu {
            issuer: certificate.tbs_certificate.issuer.clone(),
            ca_subject: ca_subject.clone(),
        }
    );

    let tbs_der = certificate
        .tbs_certificate
        .to_der()
        .context(EncodeTbsCertificateSnafu)?;

    let issuer_spki = &issuer.tbs_certificate.subject_public_key_info;
    ensure!(
        issuer_spki.algorithm.oid == rsa::pkcs1::ALGORITHM_OID,
        UnsupportedIssuerKeyAlgorithmSnafu {
            algorithm: issuer_spki.algorithm.oid
        }
    );

    // Decoded by hand, the SPKI decoder of the rsa crate rejects keys above
    // 4096 bits
    let issuer_key = rsa::pkcs1::RsaPublicKey::from_der(issuer_spki.subject_public_key.raw_bytes())
        .context(DecodeIssuerPublicKeySnafu)?;
    let issuer_public_key = RsaPublicKey::new_with_max_size(
        BigUint::from_bytes_be(issuer_key.modulus.as_bytes()),
        BigUint::from_bytes_be(issuer_key.public_exponent.as_bytes()),
        MAXIMUM_KEY_SIZE,
    )
    .context(InvalidIssuerPublicKeySnafu)?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(issuer_public_key);

    let signature = rsa::pkcs1v15::Signature::try_from(certificate.signature.raw_bytes())
        .context(DecodeSignatureSnafu)?;

    verifying_key
        .verify(&tbs_der, &signature)
        .context(InvalidSignatureSnafu)
}

/// Builds a subject which only contains the common name `common_name`.
///
/// Characters with a special meaning in RFC 4514 strings are escaped.
pub(crate) fn common_name_subject(common_name: &str) -> Result<Name, x509_cert::der::Error> {
    let mut escaped = String::with_capacity(common_name.len() + 3);
    escaped.push_str("CN=");

    for chr in common_name.chars() {
        if matches!(chr, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(chr);
    }

    escaped.parse()
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use rstest::rstest;

    use super::*;
    use crate::{ca::CertificateAuthority, keys::rsa::MINIMUM_KEY_SIZE};

    #[rstest]
    #[case("vpn", "CN=vpn")]
    #[case("CA-1234", "CN=CA-1234")]
    #[case("acme, inc", "CN=acme\\, inc")]
    fn common_name_subjects(#[case] common_name: &str, #[case] expected: &str) {
        let subject = common_name_subject(common_name).expect("valid common name");
        assert_eq!(subject, expected.parse().expect("valid subject"));
    }

    #[test]
    fn pem_round_trip_is_byte_identical() {
        let ca = CertificateAuthority::builder()
            .key_size(MINIMUM_KEY_SIZE)
            .build()
            .expect("failed to build CA");
        let pair = ca.certificate_pair();

        let temp_dir = tempfile::tempdir().expect("create temporary directory");
        let certificate_path = temp_dir.path().join("ca.crt");
        let private_key_path = temp_dir.path().join("ca.key");

        let certificate_pem = pair.certificate_pem().unwrap();
        let private_key_pem = pair.private_key_pem().unwrap();
        fs::write(&certificate_path, &certificate_pem).unwrap();
        fs::write(&private_key_path, private_key_pem.as_bytes()).unwrap();

        let reloaded = CertificatePair::from_pem_files(&certificate_path, &private_key_path)
            .expect("failed to reload certificate pair");

        assert_eq!(reloaded.certificate_pem().unwrap(), certificate_pem);
        assert_eq!(reloaded.private_key_pem().unwrap(), private_key_pem);
    }

    #[test]
    fn rejects_malformed_certificate() {
        let temp_dir = tempfile::tempdir().expect("create temporary directory");
        let certificate_path = temp_dir.path().join("broken.crt");
        let mut file = fs::File::create(&certificate_path).unwrap();
        file.write_all(b"-----BEGIN CERTIFICATE-----\ngarbage\n-----END CERTIFICATE-----\n")
            .unwrap();

        let err = CertificatePair::from_pem_files(&certificate_path, temp_dir.path().join("x.key"))
            .expect_err("malformed certificate must be rejected");
        assert!(
            matches!(&err, CertificatePairError::DeserializeCertificate { path, .. } if path == &certificate_path)
        );
    }

    #[test]
    fn verifies_leaf_of_large_ca() {
        let ca = Certificate::from_pem(include_str!("../fixtures/large-ca.crt")).unwrap();
        let leaf = Certificate::from_pem(include_str!("../fixtures/large-ca-leaf.crt")).unwrap();

        verify_issued_by(&ca, &ca).expect("a 4608 bit CA must verify itself");
        verify_issued_by(&leaf, &ca).expect("a 4608 bit CA must verify its leaves");
    }

    #[test]
    fn rejects_mismatched_key() {
        let ca = CertificateAuthority::builder()
            .key_size(MINIMUM_KEY_SIZE)
            .build()
            .expect("failed to build CA");
        let foreign_key = SigningKey::new(MINIMUM_KEY_SIZE).expect("failed to create key");

        let temp_dir = tempfile::tempdir().expect("create temporary directory");
        let certificate_path = temp_dir.path().join("ca.crt");
        let private_key_path = temp_dir.path().join("ca.key");
        fs::write(&certificate_path, ca.certificate_pair().certificate_pem().unwrap()).unwrap();
        fs::write(
            &private_key_path,
            foreign_key.to_pkcs8_pem(PEM_LINE_ENDING).unwrap().as_bytes(),
        )
        .unwrap();

        let err = CertificatePair::from_pem_files(&certificate_path, &private_key_path)
            .expect_err("mismatched key must be rejected");
        assert!(matches!(err, CertificatePairError::KeyMismatch { .. }));
    }
}
