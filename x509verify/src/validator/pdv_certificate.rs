//! Wrappers around asn.1 encoder/decoder structures to support chain building and verification

use std::collections::BTreeSet;

use const_oid::db::rfc5912::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES,
    ID_CE_CRL_DISTRIBUTION_POINTS, ID_CE_EXT_KEY_USAGE, ID_CE_INHIBIT_ANY_POLICY, ID_CE_KEY_USAGE,
    ID_CE_NAME_CONSTRAINTS, ID_CE_POLICY_CONSTRAINTS, ID_CE_POLICY_MAPPINGS,
    ID_CE_SUBJECT_ALT_NAME, ID_CE_SUBJECT_KEY_IDENTIFIER,
};
use der::asn1::BitString;
use der::{asn1::ObjectIdentifier, Decode, Encode};
use log::error;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::{pkix::crl::CrlDistributionPoints, pkix::*};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::util::error::*;
use crate::validator::pdv_extension::*;

/// `TrustAnnotation` is a side table attached to a certificate that marks it as trusted for, or
/// explicitly rejected for, particular usages expressed as extended key usage OIDs. It may also
/// carry a friendly alias and a key identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TrustAnnotation {
    /// Usages the certificate is trusted for
    pub trust: BTreeSet<ObjectIdentifier>,
    /// Usages the certificate is rejected for
    pub reject: BTreeSet<ObjectIdentifier>,
    /// Optional friendly name
    pub alias: Option<String>,
    /// Optional key identifier
    pub key_id: Option<Vec<u8>>,
}

/// [`PDVCertificate`] aggregates a binary, DER-encoded Certificate, a parsed Certificate, an
/// optional locator, parsed extensions and an optional [`TrustAnnotation`] in support of chain
/// building and verification.
///
/// The parsed extensions are those listed in [`EXTS_OF_INTEREST`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PDVCertificate {
    /// Binary, encoded Certificate object
    pub encoded_cert: Vec<u8>,
    /// Decoded Certificate object
    pub decoded_cert: Certificate,
    /// Optional file name, URI or other locator for troubleshooting purposes
    pub locator: Option<String>,
    /// Parsed extensions from the Certificate
    pub parsed_extensions: ParsedExtensions,
    aux: Option<TrustAnnotation>,
}

impl TryFrom<&[u8]> for PDVCertificate {
    type Error = Error;

    fn try_from(enc_cert: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(enc_cert)?;
        let mut pdv_cert = PDVCertificate {
            encoded_cert: enc_cert.to_vec(),
            decoded_cert: cert,
            locator: None,
            parsed_extensions: Default::default(),
            aux: None,
        };
        pdv_cert.parse_extensions(EXTS_OF_INTEREST)?;
        Ok(pdv_cert)
    }
}

impl TryFrom<Certificate> for PDVCertificate {
    type Error = Error;

    fn try_from(cert: Certificate) -> Result<Self> {
        let enc_cert = cert.to_der()?;
        let mut pdv_cert = PDVCertificate {
            encoded_cert: enc_cert,
            decoded_cert: cert,
            locator: None,
            parsed_extensions: Default::default(),
            aux: None,
        };
        pdv_cert.parse_extensions(EXTS_OF_INTEREST)?;
        Ok(pdv_cert)
    }
}

impl ExtensionProcessing for PDVCertificate {
    fn get_extension(&self, oid: &ObjectIdentifier) -> Option<&PDVExtension> {
        self.parsed_extensions.get(oid)
    }

    fn parse_extensions(&mut self, oids: &[ObjectIdentifier]) -> Result<()> {
        let pe = &mut self.parsed_extensions;
        let subject = &self.decoded_cert.tbs_certificate.subject;
        let exts = match self.decoded_cert.tbs_certificate.extensions.as_ref() {
            Some(exts) => exts,
            None => return Ok(()),
        };
        for oid in oids {
            if pe.contains_key(oid) {
                continue;
            }
            let i = match exts.iter().find(|ext| ext.extn_id == *oid) {
                Some(i) => i,
                None => continue,
            };
            let v = i.extn_value.as_bytes();
            let parsed = match *oid {
                ID_CE_BASIC_CONSTRAINTS => {
                    BasicConstraints::from_der(v).map(PDVExtension::BasicConstraints)
                }
                ID_CE_SUBJECT_KEY_IDENTIFIER => {
                    SubjectKeyIdentifier::from_der(v).map(PDVExtension::SubjectKeyIdentifier)
                }
                ID_CE_EXT_KEY_USAGE => {
                    ExtendedKeyUsage::from_der(v).map(PDVExtension::ExtendedKeyUsage)
                }
                ID_CE_KEY_USAGE => KeyUsage::from_der(v).map(PDVExtension::KeyUsage),
                ID_CE_SUBJECT_ALT_NAME => {
                    SubjectAltName::from_der(v).map(PDVExtension::SubjectAltName)
                }
                ID_CE_NAME_CONSTRAINTS => {
                    NameConstraints::from_der(v).map(PDVExtension::NameConstraints)
                }
                ID_CE_CERTIFICATE_POLICIES => {
                    CertificatePolicies::from_der(v).map(PDVExtension::CertificatePolicies)
                }
                ID_CE_POLICY_MAPPINGS => {
                    PolicyMappings::from_der(v).map(PDVExtension::PolicyMappings)
                }
                ID_CE_AUTHORITY_KEY_IDENTIFIER => {
                    AuthorityKeyIdentifier::from_der(v).map(PDVExtension::AuthorityKeyIdentifier)
                }
                ID_CE_POLICY_CONSTRAINTS => {
                    PolicyConstraints::from_der(v).map(PDVExtension::PolicyConstraints)
                }
                ID_CE_INHIBIT_ANY_POLICY => {
                    InhibitAnyPolicy::from_der(v).map(PDVExtension::InhibitAnyPolicy)
                }
                ID_CE_CRL_DISTRIBUTION_POINTS => {
                    CrlDistributionPoints::from_der(v).map(PDVExtension::CrlDistributionPoints)
                }
                // ignore unrecognized
                _ => continue,
            };
            match parsed {
                Ok(ext) => {
                    pe.insert(*oid, ext);
                }
                Err(e) => {
                    error!(
                        "Failed to parse {} extension in certificate issued to {}: {}",
                        oid, subject, e
                    );
                    return Err(Error::Asn1Error(e));
                }
            }
        }
        Ok(())
    }
}

impl PDVCertificate {
    /// Subject name of the certificate
    pub fn subject(&self) -> &Name {
        &self.decoded_cert.tbs_certificate.subject
    }

    /// Issuer name of the certificate
    pub fn issuer(&self) -> &Name {
        &self.decoded_cert.tbs_certificate.issuer
    }

    /// Serial number bytes of the certificate
    pub fn serial(&self) -> &[u8] {
        self.decoded_cert.tbs_certificate.serial_number.as_bytes()
    }

    /// Parsed basicConstraints extension, if present
    pub fn basic_constraints(&self) -> Option<&BasicConstraints> {
        match self.get_extension(&ID_CE_BASIC_CONSTRAINTS) {
            Some(PDVExtension::BasicConstraints(bc)) => Some(bc),
            _ => None,
        }
    }

    /// Parsed keyUsage extension, if present
    pub fn key_usage(&self) -> Option<&KeyUsage> {
        match self.get_extension(&ID_CE_KEY_USAGE) {
            Some(PDVExtension::KeyUsage(ku)) => Some(ku),
            _ => None,
        }
    }

    /// Parsed extKeyUsage extension, if present
    pub fn extended_key_usage(&self) -> Option<&ExtendedKeyUsage> {
        match self.get_extension(&ID_CE_EXT_KEY_USAGE) {
            Some(PDVExtension::ExtendedKeyUsage(eku)) => Some(eku),
            _ => None,
        }
    }

    /// Parsed subjectAltName extension, if present
    pub fn subject_alt_name(&self) -> Option<&SubjectAltName> {
        match self.get_extension(&ID_CE_SUBJECT_ALT_NAME) {
            Some(PDVExtension::SubjectAltName(san)) => Some(san),
            _ => None,
        }
    }

    /// Parsed nameConstraints extension, if present
    pub fn name_constraints(&self) -> Option<&NameConstraints> {
        match self.get_extension(&ID_CE_NAME_CONSTRAINTS) {
            Some(PDVExtension::NameConstraints(nc)) => Some(nc),
            _ => None,
        }
    }

    /// Parsed certificatePolicies extension, if present
    pub fn certificate_policies(&self) -> Option<&CertificatePolicies> {
        match self.get_extension(&ID_CE_CERTIFICATE_POLICIES) {
            Some(PDVExtension::CertificatePolicies(cp)) => Some(cp),
            _ => None,
        }
    }

    /// Parsed policyMappings extension, if present
    pub fn policy_mappings(&self) -> Option<&PolicyMappings> {
        match self.get_extension(&ID_CE_POLICY_MAPPINGS) {
            Some(PDVExtension::PolicyMappings(pm)) => Some(pm),
            _ => None,
        }
    }

    /// Parsed policyConstraints extension, if present
    pub fn policy_constraints(&self) -> Option<&PolicyConstraints> {
        match self.get_extension(&ID_CE_POLICY_CONSTRAINTS) {
            Some(PDVExtension::PolicyConstraints(pc)) => Some(pc),
            _ => None,
        }
    }

    /// Skip certificates value from the inhibitAnyPolicy extension, if present
    pub fn inhibit_any_policy(&self) -> Option<u32> {
        match self.get_extension(&ID_CE_INHIBIT_ANY_POLICY) {
            Some(PDVExtension::InhibitAnyPolicy(iap)) => Some(iap.0),
            _ => None,
        }
    }

    /// Key identifier from the subjectKeyIdentifier extension, if present
    pub fn subject_key_identifier(&self) -> Option<&[u8]> {
        match self.get_extension(&ID_CE_SUBJECT_KEY_IDENTIFIER) {
            Some(PDVExtension::SubjectKeyIdentifier(skid)) => Some(skid.0.as_bytes()),
            _ => None,
        }
    }

    /// Key identifier from the authorityKeyIdentifier extension, if present
    pub fn authority_key_identifier(&self) -> Option<&[u8]> {
        match self.get_extension(&ID_CE_AUTHORITY_KEY_IDENTIFIER) {
            Some(PDVExtension::AuthorityKeyIdentifier(akid)) => {
                akid.key_identifier.as_ref().map(|kid| kid.as_bytes())
            }
            _ => None,
        }
    }

    /// Trust annotation attached to this certificate, if any
    pub fn trust_annotation(&self) -> Option<&TrustAnnotation> {
        self.aux.as_ref()
    }

    /// Marks the certificate as trusted for the usage identified by `eku`.
    pub fn add_trust_object(&mut self, eku: ObjectIdentifier) {
        self.aux.get_or_insert_with(Default::default).trust.insert(eku);
    }

    /// Marks the certificate as rejected for the usage identified by `eku`.
    pub fn add_reject_object(&mut self, eku: ObjectIdentifier) {
        self.aux.get_or_insert_with(Default::default).reject.insert(eku);
    }

    /// Removes all trust markers.
    pub fn clear_trust(&mut self) {
        if let Some(aux) = self.aux.as_mut() {
            aux.trust.clear();
        }
    }

    /// Removes all reject markers.
    pub fn clear_reject(&mut self) {
        if let Some(aux) = self.aux.as_mut() {
            aux.reject.clear();
        }
    }

    /// Sets (or clears) the alias.
    pub fn set_alias(&mut self, alias: Option<String>) {
        self.aux.get_or_insert_with(Default::default).alias = alias;
    }

    /// Sets (or clears) the key identifier carried in the annotation.
    pub fn set_key_id(&mut self, key_id: Option<Vec<u8>>) {
        self.aux.get_or_insert_with(Default::default).key_id = key_id;
    }
}

/// [`DeferDecodeSigned`] is used to parse only the top-level structure of a signed object, i.e., a
/// Certificate or CertificateList, without parsing the details of the to-be-signed field.
///
/// Deferred decoding is useful when verifying signatures to avoid re-encoding the to-be-signed
/// structure (and potentially encountering problems with structures that were not DER-encoded
/// prior to signing).
pub struct DeferDecodeSigned {
    /// tbsCertificate or tbsCertList
    pub tbs_field: Vec<u8>,
    /// signatureAlgorithm   AlgorithmIdentifier,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    /// signature            BIT STRING
    pub signature: BitString,
}

impl ::der::FixedTag for DeferDecodeSigned {
    const TAG: ::der::Tag = ::der::Tag::Sequence;
}

impl<'a> ::der::DecodeValue<'a> for DeferDecodeSigned {
    fn decode_value<R: ::der::Reader<'a>>(
        reader: &mut R,
        header: ::der::Header,
    ) -> ::der::Result<Self> {
        use ::der::Reader as _;
        reader.read_nested(header.length, |reader| {
            let tbs_field = reader.tlv_bytes()?;
            let signature_algorithm = reader.decode()?;
            let signature = reader.decode()?;
            Ok(Self {
                tbs_field: tbs_field.to_vec(),
                signature_algorithm,
                signature,
            })
        })
    }
}

/// `parse_cert` takes a buffer containing a binary DER encoded certificate and returns
/// a [`PDVCertificate`] containing the parsed certificate if parsing was successful.
pub fn parse_cert(buffer: &[u8], locator: &str) -> Result<PDVCertificate> {
    match PDVCertificate::try_from(buffer) {
        Ok(mut cert) => {
            cert.locator = Some(locator.to_string());
            Ok(cert)
        }
        Err(e) => {
            error!("Failed to parse certificate from {}: {}", locator, e);
            Err(e)
        }
    }
}
