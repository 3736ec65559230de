//! Wrappers around asn.1 encoder/decoder structures to support chain building and verification

use std::collections::BTreeMap;

use const_oid::db::rfc5912::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES,
    ID_CE_CRL_DISTRIBUTION_POINTS, ID_CE_EXT_KEY_USAGE, ID_CE_INHIBIT_ANY_POLICY, ID_CE_KEY_USAGE,
    ID_CE_NAME_CONSTRAINTS, ID_CE_POLICY_CONSTRAINTS, ID_CE_POLICY_MAPPINGS,
    ID_CE_SUBJECT_ALT_NAME, ID_CE_SUBJECT_KEY_IDENTIFIER,
};
use der::asn1::ObjectIdentifier;
use x509_cert::ext::{pkix::crl::CrlDistributionPoints, pkix::*};

use crate::util::error::*;

/// `EXTS_OF_INTEREST` lists the certificate extensions parsed when a
/// [`PDVCertificate`](crate::PDVCertificate) is prepared. Any critical extension not in this list
/// is reported as unhandled during verification.
pub const EXTS_OF_INTEREST: &[ObjectIdentifier] = &[
    ID_CE_SUBJECT_KEY_IDENTIFIER,
    ID_CE_AUTHORITY_KEY_IDENTIFIER,
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_NAME_CONSTRAINTS,
    ID_CE_SUBJECT_ALT_NAME,
    ID_CE_EXT_KEY_USAGE,
    ID_CE_KEY_USAGE,
    ID_CE_POLICY_CONSTRAINTS,
    ID_CE_CERTIFICATE_POLICIES,
    ID_CE_POLICY_MAPPINGS,
    ID_CE_INHIBIT_ANY_POLICY,
    ID_CE_CRL_DISTRIBUTION_POINTS,
];

/// The [`ExtensionProcessing`] trait provides a common means of reaching the decoded extensions
/// retained by wrappers like [`PDVCertificate`](crate::PDVCertificate).
pub trait ExtensionProcessing {
    /// `get_extension` takes an ObjectIdentifier that identifies an extension type and returns
    /// a previously parsed [`PDVExtension`] instance if the extension was present.
    fn get_extension(&self, oid: &ObjectIdentifier) -> Option<&PDVExtension>;

    /// `parse_extensions` decodes each extension type listed in `oids` that is present, saving
    /// the results for use via `get_extension`. Extensions that fail to decode yield an error.
    fn parse_extensions(&mut self, oids: &[ObjectIdentifier]) -> Result<()>;
}

/// [`ParsedExtensions`] associates [`PDVExtension`] objects with object identifier values. This
/// avoids parsing extensions repeatedly while building and verifying chains.
pub type ParsedExtensions = BTreeMap<ObjectIdentifier, PDVExtension>;

/// [`PDVExtension`] provides a wrapper for supported extension types.
#[derive(PartialEq, Clone, Eq, Debug)]
pub enum PDVExtension {
    /// Parsed BasicConstraints extension
    BasicConstraints(BasicConstraints),
    /// Parsed SubjectKeyIdentifier extension
    SubjectKeyIdentifier(SubjectKeyIdentifier),
    /// Parsed ExtendedKeyUsage extension
    ExtendedKeyUsage(ExtendedKeyUsage),
    /// Parsed KeyUsage extension
    KeyUsage(KeyUsage),
    /// Parsed SubjectAltName extension
    SubjectAltName(SubjectAltName),
    /// Parsed NameConstraints extension
    NameConstraints(NameConstraints),
    /// Parsed CertificatePolicies extension
    CertificatePolicies(CertificatePolicies),
    /// Parsed PolicyMappings extension
    PolicyMappings(PolicyMappings),
    /// Parsed AuthorityKeyIdentifier extension
    AuthorityKeyIdentifier(AuthorityKeyIdentifier),
    /// Parsed PolicyConstraints extension
    PolicyConstraints(PolicyConstraints),
    /// Parsed InhibitAnyPolicy extension
    InhibitAnyPolicy(InhibitAnyPolicy),
    /// Parsed CRLDistributionPoints extension
    CrlDistributionPoints(CrlDistributionPoints),
}
