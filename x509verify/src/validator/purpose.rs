//! Certificate purposes and the key usage and extended key usage checks associated with each

use core::fmt;
use core::str::FromStr;

use const_oid::db::rfc5912::{
    ANY_EXTENDED_KEY_USAGE, ID_KP_CLIENT_AUTH, ID_KP_CODE_SIGNING, ID_KP_EMAIL_PROTECTION,
    ID_KP_OCSP_SIGNING, ID_KP_SERVER_AUTH, ID_KP_TIME_STAMPING,
};
use der::asn1::ObjectIdentifier;
use flagset::FlagSet;
use serde::{Deserialize, Serialize};
use x509_cert::ext::pkix::KeyUsages;

use crate::{util::error::*, validator::pdv_certificate::PDVCertificate};

/// `Purpose` names the application a certificate chain is being verified for. The purpose selects
/// the extended key usage used for trust decisions and the key usage bits a leaf must assert.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// TLS client
    SslClient,
    /// TLS server
    SslServer,
    /// S/MIME signing
    SmimeSign,
    /// S/MIME encryption
    SmimeEncrypt,
    /// Code signing
    CodeSign,
    /// Time stamping
    TimestampSign,
    /// OCSP response signing
    OcspHelper,
    /// CRL signing
    CrlSign,
    /// Accepts any certificate
    Any,
}

impl Purpose {
    /// `all` returns every purpose, in declaration order.
    pub fn all() -> &'static [Purpose] {
        &[
            Purpose::SslClient,
            Purpose::SslServer,
            Purpose::SmimeSign,
            Purpose::SmimeEncrypt,
            Purpose::CodeSign,
            Purpose::TimestampSign,
            Purpose::OcspHelper,
            Purpose::CrlSign,
            Purpose::Any,
        ]
    }

    /// Short name, as accepted by [`Purpose::from_str`]
    pub fn name(&self) -> &'static str {
        match self {
            Purpose::SslClient => "sslclient",
            Purpose::SslServer => "sslserver",
            Purpose::SmimeSign => "smimesign",
            Purpose::SmimeEncrypt => "smimeencrypt",
            Purpose::CodeSign => "codesign",
            Purpose::TimestampSign => "timestampsign",
            Purpose::OcspHelper => "ocsphelper",
            Purpose::CrlSign => "crlsign",
            Purpose::Any => "any",
        }
    }

    /// `trust_eku` returns the extended key usage that trust annotations are consulted for
    pub fn trust_eku(&self) -> ObjectIdentifier {
        match self {
            Purpose::SslClient => ID_KP_CLIENT_AUTH,
            Purpose::SslServer => ID_KP_SERVER_AUTH,
            Purpose::SmimeSign | Purpose::SmimeEncrypt => ID_KP_EMAIL_PROTECTION,
            Purpose::CodeSign => ID_KP_CODE_SIGNING,
            Purpose::TimestampSign => ID_KP_TIME_STAMPING,
            Purpose::OcspHelper => ID_KP_OCSP_SIGNING,
            Purpose::CrlSign | Purpose::Any => ANY_EXTENDED_KEY_USAGE,
        }
    }

    /// `key_usage` returns the key usage bits of which a leaf must assert at least one when the
    /// keyUsage extension is present. An empty set imposes no requirement.
    pub fn key_usage(&self) -> FlagSet<KeyUsages> {
        match self {
            Purpose::SslClient => KeyUsages::DigitalSignature | KeyUsages::KeyAgreement,
            Purpose::SslServer => {
                KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment | KeyUsages::KeyAgreement
            }
            Purpose::SmimeSign | Purpose::TimestampSign | Purpose::OcspHelper => {
                KeyUsages::DigitalSignature | KeyUsages::NonRepudiation
            }
            Purpose::SmimeEncrypt => KeyUsages::KeyEncipherment | KeyUsages::KeyAgreement,
            Purpose::CodeSign => KeyUsages::DigitalSignature.into(),
            Purpose::CrlSign => KeyUsages::CRLSign.into(),
            Purpose::Any => FlagSet::default(),
        }
    }

    /// `eku_accepted` returns true if the extKeyUsage extension of `cert` is absent or contains
    /// either the purpose's extended key usage or anyExtendedKeyUsage.
    fn eku_accepted(&self, cert: &PDVCertificate) -> bool {
        let wanted = self.trust_eku();
        match cert.extended_key_usage() {
            Some(eku) if wanted != ANY_EXTENDED_KEY_USAGE => eku
                .0
                .iter()
                .any(|oid| *oid == wanted || *oid == ANY_EXTENDED_KEY_USAGE),
            _ => true,
        }
    }

    /// `check_leaf` evaluates key usage and extended key usage of an end entity certificate
    pub fn check_leaf(&self, cert: &PDVCertificate) -> bool {
        if *self == Purpose::Any {
            return true;
        }
        let wanted = self.key_usage();
        if let Some(ku) = cert.key_usage() {
            if !wanted.is_empty() && ku.0.is_disjoint(wanted) {
                return false;
            }
        }
        self.eku_accepted(cert)
    }

    /// `check_ca` evaluates extended key usage of a CA certificate
    pub fn check_ca(&self, cert: &PDVCertificate) -> bool {
        *self == Purpose::Any || self.eku_accepted(cert)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Purpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Purpose::all()
            .iter()
            .find(|p| p.name() == lower)
            .copied()
            .ok_or(Error::Unrecognized)
    }
}

#[test]
fn purpose_names() {
    for p in Purpose::all() {
        assert_eq!(*p, Purpose::from_str(p.name()).unwrap());
    }
    assert_eq!(Purpose::SslServer, Purpose::from_str("SSLServer").unwrap());
    assert!(Purpose::from_str("nothing").is_err());
    assert_eq!(ID_KP_SERVER_AUTH, Purpose::SslServer.trust_eku());
    assert_eq!(ANY_EXTENDED_KEY_USAGE, Purpose::Any.trust_eku());
    assert!(Purpose::Any.key_usage().is_empty());
    assert!(Purpose::SslServer
        .key_usage()
        .contains(KeyUsages::KeyEncipherment));
}
