//! Store of trusted certificates and CRLs used by chain building and revocation checking
//!
//! Certificates are indexed by the DER encoding of their subject name and, when present, by their
//! subject key identifier. CRLs are indexed by the DER encoding of their issuer name. Lookups are
//! byte-exact and return every match in insertion order, so that multiple certificates sharing a
//! subject name (i.e., across a CA key rollover) are all available as issuer candidates.

use std::collections::BTreeMap;

use log::{debug, error};
use x509_cert::name::Name;

use crate::{
    revocation::pdv_crl::PDVCrl, util::error::*, util::pdv_utilities::*,
    validator::pdv_certificate::PDVCertificate,
};

/// [`CertificateStore`] owns trusted certificates and CRLs. Once populated it is read-only and may
/// be shared across concurrent verifications.
#[derive(Clone, Debug, Default)]
pub struct CertificateStore {
    certs: Vec<PDVCertificate>,
    crls: Vec<PDVCrl>,

    /// Maps DER-encoded subject names to indices in certs
    name_map: BTreeMap<Vec<u8>, Vec<usize>>,

    /// Maps subject key identifiers to indices in certs
    skid_map: BTreeMap<Vec<u8>, Vec<usize>>,

    /// Maps DER-encoded issuer names to indices in crls
    crl_issuer_map: BTreeMap<Vec<u8>, Vec<usize>>,
}

impl CertificateStore {
    /// CertificateStore::new returns an empty store
    pub fn new() -> CertificateStore {
        CertificateStore::default()
    }

    /// `add_trusted` adds a certificate to the store. Certificates added here are trust anchors
    /// when self-issued or when partial chains are allowed, and stored intermediates otherwise.
    ///
    /// Returns [`Error::DuplicateEntry`] if a certificate with the same encoding is already present.
    /// Distinct certificates sharing a subject name are all retained.
    pub fn add_trusted(&mut self, cert: PDVCertificate) -> Result<()> {
        let name = name_to_der(cert.subject())?;
        if let Some(indices) = self.name_map.get(&name) {
            if indices
                .iter()
                .any(|i| self.certs[*i].encoded_cert == cert.encoded_cert)
            {
                error!(
                    "Certificate issued to {} is already present in the store",
                    cert.subject()
                );
                return Err(Error::DuplicateEntry);
            }
        }

        let index = self.certs.len();
        debug!("Adding certificate issued to {} at index {}", cert.subject(), index);
        self.name_map.entry(name).or_default().push(index);
        if let Some(skid) = cert.subject_key_identifier() {
            self.skid_map.entry(skid.to_vec()).or_default().push(index);
        }
        self.certs.push(cert);
        Ok(())
    }

    /// `add_crl` adds a CRL to the store. Returns [`Error::DuplicateEntry`] if a CRL with the same
    /// encoding is already present.
    pub fn add_crl(&mut self, crl: PDVCrl) -> Result<()> {
        let name = name_to_der(crl.issuer())?;
        if let Some(indices) = self.crl_issuer_map.get(&name) {
            if indices
                .iter()
                .any(|i| self.crls[*i].encoded_crl == crl.encoded_crl)
            {
                error!("CRL issued by {} is already present in the store", crl.issuer());
                return Err(Error::DuplicateEntry);
            }
        }

        let index = self.crls.len();
        self.crl_issuer_map.entry(name).or_default().push(index);
        self.crls.push(crl);
        Ok(())
    }

    /// `lookup_by_subject` returns every certificate whose subject name has the same DER encoding as
    /// `name`, in insertion order.
    pub fn lookup_by_subject(&self, name: &Name) -> Vec<&PDVCertificate> {
        let key = match name_to_der(name) {
            Ok(key) => key,
            Err(_) => return vec![],
        };
        match self.name_map.get(&key) {
            Some(indices) => indices.iter().map(|i| &self.certs[*i]).collect(),
            None => vec![],
        }
    }

    /// `lookup_by_skid` returns every certificate with the given subject key identifier, in
    /// insertion order.
    pub fn lookup_by_skid(&self, skid: &[u8]) -> Vec<&PDVCertificate> {
        match self.skid_map.get(skid) {
            Some(indices) => indices.iter().map(|i| &self.certs[*i]).collect(),
            None => vec![],
        }
    }

    /// `lookup_crls_by_issuer` returns every CRL whose issuer name has the same DER encoding as
    /// `name`, in insertion order.
    pub fn lookup_crls_by_issuer(&self, name: &Name) -> Vec<&PDVCrl> {
        let key = match name_to_der(name) {
            Ok(key) => key,
            Err(_) => return vec![],
        };
        match self.crl_issuer_map.get(&key) {
            Some(indices) => indices.iter().map(|i| &self.crls[*i]).collect(),
            None => vec![],
        }
    }

    /// Number of certificates in the store
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Returns true if the store holds no certificates
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Number of CRLs in the store
    pub fn num_crls(&self) -> usize {
        self.crls.len()
    }

    /// Iterates over certificates in insertion order
    pub fn certs(&self) -> impl Iterator<Item = &PDVCertificate> {
        self.certs.iter()
    }

    /// Iterates over CRLs in insertion order
    pub fn crls(&self) -> impl Iterator<Item = &PDVCrl> {
        self.crls.iter()
    }

    /// `log_certs` logs the subject name and locator of each certificate at debug level
    pub fn log_certs(&self) {
        for (i, c) in self.certs.iter().enumerate() {
            debug!(
                "Index: {:3}; Subject: {}; Locator: {}",
                i,
                c.subject(),
                c.locator.as_deref().unwrap_or("<none>")
            );
        }
    }
}

#[test]
fn store_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CertificateStore>();
}
