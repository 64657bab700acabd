use bon::Builder;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use tunnelsmith_shared::time::Duration;
use uuid::Uuid;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::referenced::OwnedToRef,
    ext::pkix::AuthorityKeyIdentifier,
    serial_number::SerialNumber,
    time::Validity,
};

use super::CertificateAuthority;
use crate::{
    CertificatePair,
    ca::{CA_COMMON_NAME_PREFIX, DEFAULT_CA_VALIDITY},
    common_name_subject,
    keys::rsa::{self, DEFAULT_KEY_SIZE, SigningKey},
};

#[derive(Debug, Snafu)]
pub enum CreateCertificateAuthorityError {
    #[snafu(display("failed to parse validity"))]
    ParseValidity { source: x509_cert::der::Error },

    #[snafu(display("failed to parse \"{common_name}\" as subject common name"))]
    ParseSubject {
        source: x509_cert::der::Error,
        common_name: String,
    },

    #[snafu(display("failed to create signing key pair"))]
    CreateSigningKeyPair { source: rsa::Error },

    #[snafu(display("failed to derive the subject public key info"))]
    SubjectPublicKeyInfo { source: rsa::Error },

    #[snafu(display("failed to parse AuthorityKeyIdentifier"))]
    ParseAuthorityKeyIdentifier { source: x509_cert::der::Error },

    #[snafu(display("failed to create certificate builder"))]
    CreateCertificateBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to add certificate extension"))]
    AddCertificateExtension { source: x509_cert::builder::Error },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: x509_cert::builder::Error },
}

/// Builds a self-signed [`CertificateAuthority`].
///
/// Unset fields fall back to a `CA-<random UUID>` common name, a
/// [`DEFAULT_KEY_SIZE`] bit key and [`DEFAULT_CA_VALIDITY`]. The serial number
/// is always random. A provided `signing_key_pair` is used as is, which is how
/// an existing CA key is reused.
///
/// ```no_run
/// use tunnelsmith_certs::ca::CertificateAuthority;
///
/// let ca = CertificateAuthority::builder()
///     .common_name("vpn.example.com CA")
///     .build()
///     .expect("failed to build CA");
/// ```
#[derive(Builder)]
#[builder(start_fn = start_builder, finish_fn = finish_builder)]
pub struct CertificateAuthorityBuilder<'a> {
    /// Defaults to `CA-<random UUID>`.
    common_name: Option<&'a str>,

    /// Size in bits of a freshly generated signing key.
    ///
    /// Ignored if a `signing_key_pair` is provided.
    #[builder(default = DEFAULT_KEY_SIZE)]
    key_size: usize,

    #[builder(default = DEFAULT_CA_VALIDITY)]
    validity: Duration,

    /// Key the CA certificate is issued for, and which signs the leaves.
    /// Generated when unset.
    signing_key_pair: Option<SigningKey>,
}

impl<S> CertificateAuthorityBuilderBuilder<'_, S>
where
    S: certificate_authority_builder_builder::IsComplete,
{
    /// Shorthand for `finish_builder().build()`.
    pub fn build(self) -> Result<CertificateAuthority, CreateCertificateAuthorityError> {
        self.finish_builder().build()
    }
}

impl CertificateAuthorityBuilder<'_> {
    #[instrument(
        name = "build_certificate_authority",
        skip(self),
        fields(common_name = self.common_name, key_size = self.key_size),
    )]
    pub fn build(self) -> Result<CertificateAuthority, CreateCertificateAuthorityError> {
        let common_name = match self.common_name {
            Some(common_name) => common_name.to_owned(),
            None => format!("{CA_COMMON_NAME_PREFIX}{}", Uuid::new_v4()),
        };
        let subject = common_name_subject(&common_name)
            .context(ParseSubjectSnafu { common_name })?;

        let validity = Validity::from_now(*self.validity).context(ParseValiditySnafu)?;
        let signing_key_pair = match self.signing_key_pair {
            Some(signing_key_pair) => signing_key_pair,
            None => SigningKey::new(self.key_size).context(CreateSigningKeyPairSnafu)?,
        };

        // 64 random bits, collisions between CAs are not a concern
        let serial_number = SerialNumber::from(rand::random::<u64>());

        let spki = signing_key_pair
            .subject_public_key_info()
            .context(SubjectPublicKeyInfoSnafu)?;

        // Profile::Root adds a critical CA:true basicConstraints, the SKI and
        // keyCertSign|cRLSign key usage. The AKI is added manually and points
        // at the CA's own key.
        let aki = AuthorityKeyIdentifier::try_from(spki.owned_to_ref())
            .context(ParseAuthorityKeyIdentifierSnafu)?;

        debug!(
            ca.subject = %subject,
            ca.not_after = %validity.not_after,
            ca.not_before = %validity.not_before,
            ca.serial = %serial_number,
            ca.public_key.algorithm = SigningKey::algorithm_name(),
            ca.public_key.size = signing_key_pair.key_size(),
            "creating certificate authority"
        );
        let signer = signing_key_pair.signing_key();
        let mut builder = CertificateBuilder::new(
            Profile::Root,
            serial_number,
            validity,
            subject,
            spki,
            signer,
        )
        .context(CreateCertificateBuilderSnafu)?;

        builder
            .add_extension(&aki)
            .context(AddCertificateExtensionSnafu)?;
        let certificate = builder
            .build::<::rsa::pkcs1v15::Signature>()
            .context(BuildCertificateSnafu)?;

        Ok(CertificateAuthority::new(CertificatePair::new(
            certificate,
            signing_key_pair,
        )))
    }
}

#[cfg(test)]
mod tests {
    use const_oid::{
        AssociatedOid,
        db::rfc5280::{ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_SUBJECT_KEY_IDENTIFIER},
    };
    use rstest::rstest;
    use x509_cert::{
        certificate::{TbsCertificateInner, Version},
        der::Decode,
        ext::pkix::{BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier},
    };

    use super::*;
    use crate::{keys::rsa::MINIMUM_KEY_SIZE, verify_issued_by};

    #[test]
    fn minimal_ca() {
        let ca = CertificateAuthority::builder()
            .key_size(MINIMUM_KEY_SIZE)
            .build()
            .expect("failed to build CA");

        let tbs = &ca.ca_cert().tbs_certificate;
        let subject = tbs.subject.to_string();
        assert!(
            subject.starts_with("CN=CA-"),
            "unexpected synthesized subject {subject}"
        );
        assert_validity(tbs, DEFAULT_CA_VALIDITY);
    }

    #[rstest]
    #[case(Duration::from_days_unchecked(13))]
    #[case(Duration::from_hours_unchecked(1))]
    fn customized_ca(#[case] validity: Duration) {
        let ca = CertificateAuthority::builder()
            .common_name("Test")
            .signing_key_pair(SigningKey::new(MINIMUM_KEY_SIZE).unwrap())
            .validity(validity)
            .build()
            .expect("failed to build CA");

        let tbs = &ca.ca_cert().tbs_certificate;
        assert_eq!(tbs.subject, "CN=Test".parse().unwrap());
        assert_validity(tbs, validity);
    }

    #[test]
    fn synthesized_common_names_are_unique() {
        let key = || SigningKey::new(MINIMUM_KEY_SIZE).unwrap();
        let first = CertificateAuthority::builder()
            .signing_key_pair(key())
            .build()
            .unwrap();
        let second = CertificateAuthority::builder()
            .signing_key_pair(key())
            .build()
            .unwrap();

        assert_ne!(first.subject(), second.subject());
    }

    #[test]
    fn ca_is_self_signed_with_expected_extensions() {
        let ca = CertificateAuthority::builder()
            .key_size(MINIMUM_KEY_SIZE)
            .common_name("Test")
            .build()
            .expect("failed to build CA");
        let tbs = &ca.ca_cert().tbs_certificate;

        assert_eq!(tbs.version, Version::V3);
        assert_eq!(tbs.issuer, tbs.subject);
        verify_issued_by(ca.ca_cert(), ca.ca_cert()).expect("CA must be self-signed");

        let extensions = tbs.extensions.as_ref().expect("CA has no extensions");
        let find = |oid| {
            extensions
                .iter()
                .find(|ext| ext.extn_id == oid)
                .unwrap_or_else(|| panic!("CA has no extension {oid}"))
        };

        let basic_constraints =
            BasicConstraints::from_der(find(BasicConstraints::OID).extn_value.as_bytes()).unwrap();
        assert!(basic_constraints.ca);

        let key_usage = KeyUsage::from_der(find(KeyUsage::OID).extn_value.as_bytes()).unwrap();
        assert_eq!(key_usage.0, KeyUsages::KeyCertSign | KeyUsages::CRLSign);

        let ski = SubjectKeyIdentifier::from_der(
            find(ID_CE_SUBJECT_KEY_IDENTIFIER).extn_value.as_bytes(),
        )
        .unwrap();
        let aki = AuthorityKeyIdentifier::from_der(
            find(ID_CE_AUTHORITY_KEY_IDENTIFIER).extn_value.as_bytes(),
        )
        .unwrap();
        assert_eq!(aki.key_identifier, Some(ski.0));
    }

    fn assert_validity(tbs: &TbsCertificateInner, validity: Duration) {
        let not_before = tbs.validity.not_before.to_system_time();
        let not_after = tbs.validity.not_after.to_system_time();
        assert_eq!(
            not_after
                .duration_since(not_before)
                .expect("Failed to calculate duration between notBefore and notAfter"),
            *validity
        );
    }
}
