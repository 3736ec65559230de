//! PkiEnvironment aggregates the function pointers used to hash buffers, verify signatures and
//! produce friendly names for OIDs while building and verifying certificate chains.
//!
//! The sample below illustrates preparation of a PkiEnvironment object.
//! ```
//! use x509verify::PkiEnvironment;
//!
//! // the default PkiEnvironment uses `oid_lookup` to look up friendly names for OIDs
//! let mut pe = PkiEnvironment::default();
//!
//! // add hashing and signature verification capabilities
//! pe.populate_rust_crypto();
//! ```
//!
//! The aggregation of function pointers allows support to vary. For example, an app may add a
//! verifier for an algorithm the RustCrypto implementation does not handle, or a test may install
//! a verifier that accepts everything.

use der::asn1::ObjectIdentifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::{
    environment::pki_environment_traits::*, util::crypto::*, util::error::*,
    util::pdv_utilities::oid_lookup,
};

/// [`PkiEnvironment`] provides a switchboard of callback functions that allow support to vary on
/// different platforms or to allow support to be tailored for specific use cases.
///
/// It holds function pointers only, so a populated instance is `Send + Sync` and may be shared by
/// concurrent verifications.
#[derive(Clone)]
pub struct PkiEnvironment {
    /// List of functions that provide a message digest functionality
    calculate_hash_callbacks: Vec<CalculateHash>,

    /// List of functions that provide a signature verification functionality given a message
    verify_signature_message_callbacks: Vec<VerifySignatureMessage>,

    /// List of functions that provide OID lookup capabilities
    oid_lookups: Vec<OidLookup>,
}

impl Default for PkiEnvironment {
    /// PkiEnvironment::default returns a new [`PkiEnvironment`] with empty callback vectors for each
    /// type of callback except `oid_lookups`, which features the [`oid_lookup`] function.
    fn default() -> Self {
        PkiEnvironment {
            calculate_hash_callbacks: vec![],
            verify_signature_message_callbacks: vec![],
            oid_lookups: vec![oid_lookup],
        }
    }
}

impl PkiEnvironment {
    /// PkiEnvironment::new returns a new [`PkiEnvironment`] with empty callback vectors for each type of callback
    pub fn new() -> PkiEnvironment {
        PkiEnvironment {
            calculate_hash_callbacks: vec![],
            verify_signature_message_callbacks: vec![],
            oid_lookups: vec![],
        }
    }

    /// `populate_rust_crypto` adds the RustCrypto based hashing and signature verification
    /// implementations along with [`oid_lookup`] (if not already present).
    pub fn populate_rust_crypto(&mut self) {
        self.add_calculate_hash_callback(calculate_hash_rust_crypto);
        self.add_verify_signature_message_callback(verify_signature_message_rust_crypto);
        if self.oid_lookups.is_empty() {
            self.add_oid_lookup(oid_lookup);
        }
    }

    /// clear_all_callbacks clears the contents of all function pointer vectors associated with an
    /// instance of [`PkiEnvironment`].
    pub fn clear_all_callbacks(&mut self) {
        self.clear_calculate_hash_callbacks();
        self.clear_verify_signature_message_callbacks();
        self.clear_oid_lookups();
    }

    /// add_calculate_hash_callback adds a [`CalculateHash`] callback to the list used by calculate_hash.
    pub fn add_calculate_hash_callback(&mut self, c: CalculateHash) {
        self.calculate_hash_callbacks.push(c);
    }

    /// clear_calculate_hash_callbacks clears the list of [`CalculateHash`] callbacks used by calculate_hash.
    pub fn clear_calculate_hash_callbacks(&mut self) {
        self.calculate_hash_callbacks.clear();
    }

    /// calculate_hash iterates over calculate_hash_callbacks until an authoritative answer is found
    /// or all options have been exhausted
    pub fn calculate_hash(
        &self,
        hash_alg: &AlgorithmIdentifierOwned,
        buffer_to_hash: &[u8],
    ) -> Result<Vec<u8>> {
        for f in &self.calculate_hash_callbacks {
            if let Ok(r) = f(self, hash_alg, buffer_to_hash) {
                return Ok(r);
            }
        }
        Err(Error::Unrecognized)
    }

    /// add_verify_signature_message_callback adds a [`VerifySignatureMessage`] callback to the list used by verify_signature_message.
    pub fn add_verify_signature_message_callback(&mut self, c: VerifySignatureMessage) {
        self.verify_signature_message_callbacks.push(c);
    }

    /// clear_verify_signature_message_callbacks clears the list of [`VerifySignatureMessage`] callbacks used by verify_signature_message.
    pub fn clear_verify_signature_message_callbacks(&mut self) {
        self.verify_signature_message_callbacks.clear();
    }

    /// verify_signature_message iterates over verify_signature_message_callbacks until one
    /// verifies the signature.
    ///
    /// When none succeed, a `CertSignatureFailure` reported by any callback is returned in
    /// preference to other errors, i.e., a key that decoded but did not verify is reported over an
    /// implementation that did not recognize the algorithm. With no callbacks, or with no callback
    /// recognizing the key, `UnableToDecodeIssuerPublicKey` is returned.
    pub fn verify_signature_message(
        &self,
        message_to_verify: &[u8],                 // buffer to verify
        signature: &[u8],                         // signature
        signature_alg: &AlgorithmIdentifierOwned, // signature algorithm
        spki: &SubjectPublicKeyInfoOwned,         // public key
    ) -> Result<()> {
        let mut sig_failed = false;
        for f in &self.verify_signature_message_callbacks {
            match f(self, message_to_verify, signature, signature_alg, spki) {
                Ok(()) => return Ok(()),
                Err(Error::PathValidation(PathValidationStatus::CertSignatureFailure)) => {
                    sig_failed = true
                }
                Err(_) => {}
            }
        }
        if sig_failed {
            Err(Error::PathValidation(
                PathValidationStatus::CertSignatureFailure,
            ))
        } else {
            Err(Error::PathValidation(
                PathValidationStatus::UnableToDecodeIssuerPublicKey,
            ))
        }
    }

    /// add_oid_lookup adds a [`OidLookup`] callback to the list used by oid_lookup.
    pub fn add_oid_lookup(&mut self, c: OidLookup) {
        self.oid_lookups.push(c);
    }

    /// clear_oid_lookups clears the list of [`OidLookup`] callbacks used by oid_lookup.
    pub fn clear_oid_lookups(&mut self) {
        self.oid_lookups.clear();
    }

    /// oid_lookup iterates over oid_lookups until a friendly name is found, falling back to the
    /// dot notation form of the OID.
    pub fn oid_lookup(&self, oid: &ObjectIdentifier) -> String {
        for f in &self.oid_lookups {
            if let Ok(r) = f(oid) {
                return r;
            }
        }
        oid.to_string()
    }
}

#[test]
fn switchboard_test() {
    use const_oid::db::rfc5280::ANY_POLICY;
    use const_oid::db::rfc5912::ID_SHA_256;

    let pe = PkiEnvironment::new();
    assert_eq!("2.5.29.32.0", pe.oid_lookup(&ANY_POLICY));
    let alg = AlgorithmIdentifierOwned {
        oid: ID_SHA_256,
        parameters: None,
    };
    assert_eq!(Err(Error::Unrecognized), pe.calculate_hash(&alg, b"abc"));

    let mut pe = PkiEnvironment::default();
    assert_eq!("X509v3 Any Policy", pe.oid_lookup(&ANY_POLICY));
    pe.populate_rust_crypto();
    assert_eq!(32, pe.calculate_hash(&alg, b"abc").unwrap().len());

    fn accept_all(
        _pe: &PkiEnvironment,
        _m: &[u8],
        _s: &[u8],
        _a: &AlgorithmIdentifierOwned,
        _k: &SubjectPublicKeyInfoOwned,
    ) -> Result<()> {
        Ok(())
    }
    let spki = SubjectPublicKeyInfoOwned {
        algorithm: alg.clone(),
        subject_public_key: der::asn1::BitString::from_bytes(&[0]).unwrap(),
    };
    let mut pe = PkiEnvironment::new();
    assert_eq!(
        Err(Error::PathValidation(
            PathValidationStatus::UnableToDecodeIssuerPublicKey
        )),
        pe.verify_signature_message(b"abc", b"sig", &alg, &spki)
    );
    pe.add_verify_signature_message_callback(accept_all);
    assert!(pe.verify_signature_message(b"abc", b"sig", &alg, &spki).is_ok());
}
