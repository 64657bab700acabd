use bon::Builder;
use rand::Rng as _;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument, warn};
use tunnelsmith_shared::time::Duration;
use uuid::Uuid;
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::referenced::OwnedToRef,
    ext::pkix::{AuthorityKeyIdentifier, BasicConstraints, SubjectKeyIdentifier},
    serial_number::SerialNumber,
    time::Validity,
};

use super::{
    DEFAULT_CERTIFICATE_VALIDITY, LeafCertificate, LeafRole, NonCritical, SERIAL_NUMBER_RANGE,
};
use crate::{
    CertificatePair,
    ca::CertificateAuthority,
    common_name_subject,
    keys::rsa::{self, DEFAULT_KEY_SIZE, SigningKey},
};

/// A leaf issued right after a CA of the same validity ends a few seconds
/// later than the CA. Only larger overshoots are reported.
const VALIDITY_OVERSHOOT_TOLERANCE: Duration = Duration::from_days_unchecked(1);

/// Defines all error variants which can occur when issuing a leaf certificate.
#[derive(Debug, Snafu)]
pub enum CreateLeafCertificateError {
    #[snafu(display("failed to parse validity"))]
    ParseValidity { source: x509_cert::der::Error },

    #[snafu(display("failed to parse \"{common_name}\" as subject common name"))]
    ParseSubject {
        source: x509_cert::der::Error,
        common_name: String,
    },

    #[snafu(display(
        "serial number {serial_number} is out of range, expected {}..={}",
        SERIAL_NUMBER_RANGE.start(),
        SERIAL_NUMBER_RANGE.end()
    ))]
    SerialNumberOutOfRange { serial_number: u64 },

    #[snafu(display("failed to create key pair"))]
    CreateKeyPair { source: rsa::Error },

    #[snafu(display("failed to derive the subject public key info"))]
    SubjectPublicKeyInfo { source: rsa::Error },

    #[snafu(display("failed to derive the {name} key identifier"))]
    DeriveKeyIdentifier {
        source: x509_cert::der::Error,
        name: &'static str,
    },

    #[snafu(display("failed to encode the netscape certificate type"))]
    EncodeNetscapeCertType { source: x509_cert::der::Error },

    #[snafu(display("failed to create certificate builder"))]
    CreateCertificateBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to add certificate extension"))]
    AddCertificateExtension { source: x509_cert::builder::Error },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: x509_cert::builder::Error },
}

/// This builder issues leaf certificates of type [`LeafCertificate`].
///
/// Defaults:
///
/// - A validity of [`DEFAULT_CERTIFICATE_VALIDITY`]
/// - A common name of `server-<random UUID>` or `client-<random UUID>`
/// - A key size of [`DEFAULT_KEY_SIZE`] bits
/// - A random serial number from [`SERIAL_NUMBER_RANGE`]
///
/// ```no_run
/// use tunnelsmith_certs::{
///     ca::CertificateAuthority,
///     leaf::{LeafCertificate, LeafRole},
/// };
///
/// let ca = CertificateAuthority::builder()
///     .build()
///     .expect("failed to build CA");
///
/// let server = LeafCertificate::builder()
///     .role(LeafRole::Server)
///     .common_name("vpn.example.com")
///     .signed_by(&ca)
///     .build()
///     .expect("failed to issue server certificate");
/// ```
#[derive(Builder)]
#[builder(start_fn = start_builder, finish_fn = finish_builder)]
pub struct LeafCertificateBuilder<'a> {
    role: LeafRole,

    /// Common name of the subject. Synthesized from the role and a random
    /// UUID if not specified.
    common_name: Option<&'a str>,

    /// Size in bits of a freshly generated key. Ignored if a `key_pair` is
    /// provided.
    #[builder(default = DEFAULT_KEY_SIZE)]
    key_size: usize,

    #[builder(default = DEFAULT_CERTIFICATE_VALIDITY)]
    validity: Duration,

    /// The key bound to the certificate. A random one is generated if not
    /// specified.
    key_pair: Option<SigningKey>,

    /// Explicit serial number, which must lie in [`SERIAL_NUMBER_RANGE`].
    serial_number: Option<u64>,

    signed_by: &'a CertificateAuthority,
}

impl<S> LeafCertificateBuilderBuilder<'_, S>
where
    S: leaf_certificate_builder_builder::IsComplete,
{
    /// Convenience function to avoid calling `builder().finish_builder().build()`
    pub fn build(self) -> Result<LeafCertificate, CreateLeafCertificateError> {
        self.finish_builder().build()
    }
}

impl LeafCertificateBuilder<'_> {
    #[instrument(
        name = "build_leaf_certificate",
        skip(self),
        fields(role = %self.role, common_name = self.common_name, key_size = self.key_size),
    )]
    pub fn build(self) -> Result<LeafCertificate, CreateLeafCertificateError> {
        let serial_number = match self.serial_number {
            Some(serial_number) => {
                ensure!(
                    SERIAL_NUMBER_RANGE.contains(&serial_number),
                    SerialNumberOutOfRangeSnafu { serial_number }
                );
                serial_number
            }
            None => rand::rng().random_range(SERIAL_NUMBER_RANGE),
        };
        let serial_number = SerialNumber::from(serial_number);

        let common_name = match self.common_name {
            Some(common_name) => common_name.to_owned(),
            None => format!("{}{}", self.role.common_name_prefix(), Uuid::new_v4()),
        };
        let subject = common_name_subject(&common_name)
            .context(ParseSubjectSnafu { common_name })?;

        let validity = Validity::from_now(*self.validity).context(ParseValiditySnafu)?;
        let ca_not_after = &self.signed_by.ca_cert().tbs_certificate.validity.not_after;
        if validity.not_after.to_system_time()
            > ca_not_after.to_system_time() + *VALIDITY_OVERSHOOT_TOLERANCE
        {
            warn!(
                certificate.not_after = %validity.not_after,
                ca.not_after = %ca_not_after,
                "the leaf certificate outlives the certificate authority"
            );
        }

        let key_pair = match self.key_pair {
            Some(key_pair) => key_pair,
            None => SigningKey::new(self.key_size).context(CreateKeyPairSnafu)?,
        };
        let spki = key_pair
            .subject_public_key_info()
            .context(SubjectPublicKeyInfoSnafu)?;

        let ski = SubjectKeyIdentifier::try_from(spki.owned_to_ref())
            .context(DeriveKeyIdentifierSnafu { name: "subject" })?;
        let aki = AuthorityKeyIdentifier::try_from(
            self.signed_by
                .ca_cert()
                .tbs_certificate
                .subject_public_key_info
                .owned_to_ref(),
        )
        .context(DeriveKeyIdentifierSnafu { name: "authority" })?;
        let netscape_cert_type = self
            .role
            .netscape_cert_type()
            .context(EncodeNetscapeCertTypeSnafu)?;

        debug!(
            certificate.role = %self.role,
            certificate.subject = %subject,
            certificate.issuer = %self.signed_by.subject(),
            certificate.not_after = %validity.not_after,
            certificate.not_before = %validity.not_before,
            certificate.serial = %serial_number,
            certificate.public_key.algorithm = SigningKey::algorithm_name(),
            certificate.public_key.size = key_pair.key_size(),
            "issuing leaf certificate"
        );

        // The manual profile adds no extensions on its own. All extensions
        // are added below, so the set is identical for loaded and fresh CAs.
        let signer = self.signed_by.signing_key().signing_key();
        let mut builder = CertificateBuilder::new(
            Profile::Manual {
                issuer: Some(self.signed_by.subject().clone()),
            },
            serial_number,
            validity,
            subject,
            spki,
            signer,
        )
        .context(CreateCertificateBuilderSnafu)?;

        builder
            .add_extension(&NonCritical(BasicConstraints {
                ca: false,
                path_len_constraint: None,
            }))
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&ski)
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&aki)
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&self.role.key_usage())
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&self.role.extended_key_usage())
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&netscape_cert_type)
            .context(AddCertificateExtensionSnafu)?;

        let certificate = builder
            .build::<::rsa::pkcs1v15::Signature>()
            .context(BuildCertificateSnafu)?;

        Ok(LeafCertificate::new(
            self.role,
            CertificatePair::new(certificate, key_pair),
        ))
    }
}

#[cfg(test)]
mod tests {
    use const_oid::{
        AssociatedOid, ObjectIdentifier,
        db::rfc5280::{ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_SUBJECT_KEY_IDENTIFIER},
    };
    use rstest::{fixture, rstest};
    use x509_cert::{
        Certificate,
        der::{Decode, asn1::BitString},
        ext::{
            Extension,
            pkix::{ExtendedKeyUsage, KeyUsage},
        },
    };

    use super::*;
    use crate::{keys::rsa::MINIMUM_KEY_SIZE, leaf::NetscapeCertType};

    #[fixture]
    fn ca() -> CertificateAuthority {
        CertificateAuthority::builder()
            .common_name("Test CA")
            .key_size(MINIMUM_KEY_SIZE)
            .build()
            .expect("failed to build CA")
    }

    fn issue(ca: &CertificateAuthority, role: LeafRole) -> LeafCertificate {
        LeafCertificate::builder()
            .role(role)
            .key_size(MINIMUM_KEY_SIZE)
            .signed_by(ca)
            .build()
            .expect("failed to issue leaf certificate")
    }

    fn extension<'c>(certificate: &'c Certificate, oid: ObjectIdentifier) -> &'c Extension {
        certificate
            .tbs_certificate
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.iter().find(|ext| ext.extn_id == oid))
            .unwrap_or_else(|| panic!("certificate has no extension {oid}"))
    }

    #[rstest]
    #[case(LeafRole::Server)]
    #[case(LeafRole::Client)]
    fn leaf_is_signed_by_ca(ca: CertificateAuthority, #[case] role: LeafRole) {
        let leaf = issue(&ca, role);
        let tbs = &leaf.certificate_pair().certificate().tbs_certificate;

        assert_eq!(&tbs.issuer, ca.subject());
        assert!(SERIAL_NUMBER_RANGE.contains(&serial_of(leaf.certificate_pair().certificate())));
        assert!(
            tbs.subject
                .to_string()
                .starts_with(&format!("CN={}", role.common_name_prefix()))
        );
        leaf.verify_signed_by(&ca).expect("leaf must verify against its CA");
    }

    #[rstest]
    fn client_certificate_does_not_verify_as_server(ca: CertificateAuthority) {
        let client = issue(&ca, LeafRole::Client);
        let as_server = LeafCertificate::new(LeafRole::Server, client.certificate_pair);

        assert!(matches!(
            as_server.verify_signed_by(&ca),
            Err(crate::VerifyCertificateError::MissingExtendedKeyUsage { purpose, .. })
                if purpose == const_oid::db::rfc5280::ID_KP_SERVER_AUTH
        ));
    }

    #[rstest]
    fn leaf_does_not_verify_against_other_ca(ca: CertificateAuthority) {
        let other = CertificateAuthority::builder()
            .common_name("Test CA")
            .key_size(MINIMUM_KEY_SIZE)
            .build()
            .unwrap();
        let leaf = issue(&ca, LeafRole::Server);

        assert!(matches!(
            leaf.verify_signed_by(&other),
            Err(crate::VerifyCertificateError::InvalidSignature { .. })
        ));
    }

    #[rstest]
    #[case(LeafRole::Server, NetscapeCertType::server().unwrap())]
    #[case(LeafRole::Client, NetscapeCertType::client().unwrap())]
    fn leaf_extensions(
        ca: CertificateAuthority,
        #[case] role: LeafRole,
        #[case] expected_cert_type: NetscapeCertType,
    ) {
        let leaf = issue(&ca, role);
        let certificate = leaf.certificate_pair().certificate();

        let basic_constraints = extension(certificate, BasicConstraints::OID);
        assert!(!basic_constraints.critical);
        assert!(
            !BasicConstraints::from_der(basic_constraints.extn_value.as_bytes())
                .unwrap()
                .ca
        );

        let key_usage =
            KeyUsage::from_der(extension(certificate, KeyUsage::OID).extn_value.as_bytes())
                .unwrap();
        assert_eq!(key_usage, role.key_usage());

        let extended_key_usage = ExtendedKeyUsage::from_der(
            extension(certificate, ExtendedKeyUsage::OID)
                .extn_value
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(extended_key_usage, role.extended_key_usage());

        let cert_type = extension(certificate, NetscapeCertType::OID);
        assert!(!cert_type.critical);
        assert_eq!(
            BitString::from_der(cert_type.extn_value.as_bytes()).unwrap(),
            expected_cert_type.0
        );
    }

    #[rstest]
    fn authority_key_identifier_points_at_ca(ca: CertificateAuthority) {
        let leaf = issue(&ca, LeafRole::Client);

        let ca_ski = SubjectKeyIdentifier::from_der(
            extension(ca.ca_cert(), ID_CE_SUBJECT_KEY_IDENTIFIER)
                .extn_value
                .as_bytes(),
        )
        .unwrap();
        let leaf_aki = AuthorityKeyIdentifier::from_der(
            extension(
                leaf.certificate_pair().certificate(),
                ID_CE_AUTHORITY_KEY_IDENTIFIER,
            )
            .extn_value
            .as_bytes(),
        )
        .unwrap();

        assert_eq!(leaf_aki.key_identifier, Some(ca_ski.0));
    }

    #[rstest]
    fn colliding_serial_numbers_are_accepted(ca: CertificateAuthority) {
        let issue_with_serial = || {
            LeafCertificate::builder()
                .role(LeafRole::Client)
                .key_size(MINIMUM_KEY_SIZE)
                .serial_number(42)
                .signed_by(&ca)
                .build()
                .expect("failed to issue leaf certificate")
        };
        let first = issue_with_serial();
        let second = issue_with_serial();

        assert_eq!(serial_of(first.certificate_pair().certificate()), 42);
        assert_eq!(serial_of(second.certificate_pair().certificate()), 42);
        first.verify_signed_by(&ca).unwrap();
        second.verify_signed_by(&ca).unwrap();
    }

    #[rstest]
    #[case(0)]
    #[case(100_000_000)]
    fn serial_numbers_out_of_range_are_rejected(ca: CertificateAuthority, #[case] serial: u64) {
        let err = LeafCertificate::builder()
            .role(LeafRole::Server)
            .key_size(MINIMUM_KEY_SIZE)
            .serial_number(serial)
            .signed_by(&ca)
            .build()
            .expect_err("out of range serial numbers must be rejected");

        assert!(matches!(
            err,
            CreateLeafCertificateError::SerialNumberOutOfRange { serial_number } if serial_number == serial
        ));
    }

    #[rstest]
    fn leaf_may_outlive_ca(ca: CertificateAuthority) {
        let leaf = LeafCertificate::builder()
            .role(LeafRole::Client)
            .key_size(MINIMUM_KEY_SIZE)
            .validity(Duration::from_days_unchecked(4000))
            .signed_by(&ca)
            .build()
            .expect("issuing must succeed even if the leaf outlives the CA");

        leaf.verify_signed_by(&ca).unwrap();
    }

    fn serial_of(certificate: &Certificate) -> u64 {
        certificate
            .tbs_certificate
            .serial_number
            .as_bytes()
            .iter()
            .fold(0, |serial, byte| (serial << 8) | u64::from(*byte))
    }
}
