//! Certificate extensions which are not provided by [`x509_cert::ext`].
use const_oid::{AssociatedOid, ObjectIdentifier};
use x509_cert::{
    der::{self, Encode, Length, Writer, asn1::BitString},
    ext::{AsExtension, Extension},
    name::Name,
};

/// The legacy Netscape certificate type extension (`nsCertType`).
///
/// OpenVPN peers configured with `remote-cert-tls` or `ns-cert-type` still
/// look at this bit string to tell server and client certificates apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetscapeCertType(pub BitString);

impl NetscapeCertType {
    /// Bit 0, SSL client.
    pub fn client() -> der::Result<Self> {
        BitString::new(7, [0x80]).map(Self)
    }

    /// Bit 1, SSL server.
    pub fn server() -> der::Result<Self> {
        BitString::new(6, [0x40]).map(Self)
    }
}

impl AssociatedOid for NetscapeCertType {
    const OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113730.1.1");
}

impl Encode for NetscapeCertType {
    fn encoded_len(&self) -> der::Result<Length> {
        self.0.encoded_len()
    }

    fn encode(&self, encoder: &mut impl Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}

impl AsExtension for NetscapeCertType {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}

/// Adds the wrapped extension without the critical flag.
///
/// [`x509_cert`] always marks some extensions, like
/// [`BasicConstraints`](x509_cert::ext::pkix::BasicConstraints), as critical.
/// Leaf certificates carry them as non-critical.
#[derive(Clone, Debug)]
pub struct NonCritical<E>(pub E);

impl<E: AssociatedOid> AssociatedOid for NonCritical<E> {
    const OID: ObjectIdentifier = E::OID;
}

impl<E: Encode> Encode for NonCritical<E> {
    fn encoded_len(&self) -> der::Result<Length> {
        self.0.encoded_len()
    }

    fn encode(&self, encoder: &mut impl Writer) -> der::Result<()> {
        self.0.encode(encoder)
    }
}

impl<E: AssociatedOid + Encode> AsExtension for NonCritical<E> {
    fn critical(&self, _subject: &Name, _extensions: &[Extension]) -> bool {
        false
    }
}
