//! Provides structures that represent a certificate chain and the set of certificates a chain may
//! terminate at.

use x509_cert::name::Name;

use crate::{
    source::cert_store::CertificateStore, util::pdv_utilities::compare_names,
    validator::pdv_certificate::PDVCertificate,
};

/// `CertificationPath` is an ordered list of certificates beginning with the target certificate and
/// ending with a trusted certificate, i.e., `chain[i + 1]` issued `chain[i]`.
#[derive(Clone, Debug, Default)]
pub struct CertificationPath<'a> {
    /// Certificates in the chain, leaf first
    pub chain: Vec<&'a PDVCertificate>,
}

impl<'a> CertificationPath<'a> {
    /// instantiates a new CertificationPath from a list of certificates ordered leaf first
    pub fn new(chain: Vec<&'a PDVCertificate>) -> CertificationPath<'a> {
        CertificationPath { chain }
    }

    /// The target certificate, if any
    pub fn target(&self) -> Option<&'a PDVCertificate> {
        self.chain.first().copied()
    }

    /// The certificate the chain terminates at, if any
    pub fn trust_anchor(&self) -> Option<&'a PDVCertificate> {
        self.chain.last().copied()
    }

    /// Certificates between the target and the trust anchor, ordered from the certificate issued
    /// by the trust anchor down to the issuer of the target
    pub fn intermediates(&self) -> Vec<&'a PDVCertificate> {
        if self.chain.len() < 3 {
            return vec![];
        }
        self.chain[1..self.chain.len() - 1]
            .iter()
            .rev()
            .copied()
            .collect()
    }

    /// Number of certificates in the chain
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns true if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

/// `TrustedCertificates` is a view of the certificates a chain may terminate at, either a
/// [`CertificateStore`] or a caller supplied list that overrides the store.
#[derive(Clone, Copy, Debug)]
pub enum TrustedCertificates<'a> {
    /// Certificates held by a store
    Store(&'a CertificateStore),
    /// Caller supplied certificates
    List(&'a [PDVCertificate]),
}

impl<'a> TrustedCertificates<'a> {
    /// `lookup_by_subject` returns every certificate whose subject matches `name`, in insertion order
    pub fn lookup_by_subject(&self, name: &Name) -> Vec<&'a PDVCertificate> {
        match self {
            TrustedCertificates::Store(store) => store.lookup_by_subject(name),
            TrustedCertificates::List(certs) => certs
                .iter()
                .filter(|c| compare_names(c.subject(), name))
                .collect(),
        }
    }

    /// Number of certificates in the view
    pub fn len(&self) -> usize {
        match self {
            TrustedCertificates::Store(store) => store.len(),
            TrustedCertificates::List(certs) => certs.len(),
        }
    }

    /// Returns true if the view holds no certificates
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
