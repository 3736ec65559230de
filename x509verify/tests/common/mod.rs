//! Minting of small P-256 PKIs for integration tests

#![allow(dead_code)]

use core::str::FromStr;
use core::time::Duration;

use const_oid::db::rfc5912::{ECDSA_WITH_SHA_256, ID_EC_PUBLIC_KEY, SECP_256_R_1};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::asn1::{Any, BitString, Ia5String, OctetString, Uint, UtcTime};
use der::Encode;
use flagset::FlagSet;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::certpolicy::PolicyInformation;
use x509_cert::ext::pkix::constraints::name::GeneralSubtree;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, BaseCrlNumber, BasicConstraints, CertificatePolicies, CrlNumber,
    CrlReason, ExtendedKeyUsage, InhibitAnyPolicy, KeyUsage, KeyUsages, NameConstraints,
    PolicyConstraints, PolicyMapping, PolicyMappings, SubjectAltName, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use x509verify::*;

/// Reference time used by the tests (November 2023)
pub const NOW: u64 = 1_700_000_000;
pub const NOT_BEFORE: u64 = 1_600_000_000;
pub const NOT_AFTER: u64 = 1_900_000_000;

pub const P1: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.2.1.48.1");
pub const P2: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.2.1.48.2");
pub const P3: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.2.1.48.3");

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub fn key_id(seed: u8) -> Vec<u8> {
    vec![seed; 8]
}

pub fn name(s: &str) -> Name {
    Name::from_str(s).unwrap()
}

pub fn time(secs: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).unwrap())
}

fn ecdsa_alg() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA_256,
        parameters: None,
    }
}

fn spki(seed: u8) -> SubjectPublicKeyInfoOwned {
    let sk = signing_key(seed);
    SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: ID_EC_PUBLIC_KEY,
            parameters: Some(Any::encode_from(&SECP_256_R_1).unwrap()),
        },
        subject_public_key: BitString::from_bytes(
            sk.verifying_key().to_encoded_point(false).as_bytes(),
        )
        .unwrap(),
    }
}

fn sign(seed: u8, tbs: &[u8]) -> BitString {
    let sig: Signature = signing_key(seed).sign(tbs);
    BitString::from_bytes(sig.to_der().as_bytes()).unwrap()
}

pub fn ext<T: AssociatedOid + Encode>(value: &T, critical: bool) -> Extension {
    Extension {
        extn_id: T::OID,
        critical,
        extn_value: OctetString::new(value.to_der().unwrap()).unwrap(),
    }
}

/// Contents of a certificate to mint
#[derive(Clone)]
pub struct CertSpec {
    pub subject: String,
    pub issuer: String,
    pub serial: u8,
    /// Seed of the subject key pair
    pub key: u8,
    /// Seed of the key pair that signs the certificate
    pub issuer_key: u8,
    pub not_before: u64,
    pub not_after: u64,
    pub basic_constraints: Option<BasicConstraints>,
    pub key_usage: Option<FlagSet<KeyUsages>>,
    pub eku: Vec<ObjectIdentifier>,
    pub skid: bool,
    pub akid: bool,
    pub policies: Vec<ObjectIdentifier>,
    pub mappings: Vec<(ObjectIdentifier, ObjectIdentifier)>,
    pub policy_constraints: Option<PolicyConstraints>,
    pub inhibit_any: Option<u32>,
    pub name_constraints: Option<NameConstraints>,
    pub dns_names: Vec<String>,
    pub extra: Vec<Extension>,
}

impl CertSpec {
    /// CA certificate asserting keyCertSign and cRLSign
    pub fn ca(subject: &str, issuer: &str, key: u8, issuer_key: u8) -> CertSpec {
        CertSpec {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            serial: key,
            key,
            issuer_key,
            not_before: NOT_BEFORE,
            not_after: NOT_AFTER,
            basic_constraints: Some(BasicConstraints {
                ca: true,
                path_len_constraint: None,
            }),
            key_usage: Some(KeyUsages::KeyCertSign | KeyUsages::CRLSign),
            eku: vec![],
            skid: true,
            akid: subject != issuer,
            policies: vec![],
            mappings: vec![],
            policy_constraints: None,
            inhibit_any: None,
            name_constraints: None,
            dns_names: vec![],
            extra: vec![],
        }
    }

    /// Self-signed trust anchor
    pub fn root(subject: &str, key: u8) -> CertSpec {
        CertSpec::ca(subject, subject, key, key)
    }

    /// End entity certificate asserting digitalSignature
    pub fn leaf(subject: &str, issuer: &str, key: u8, issuer_key: u8) -> CertSpec {
        CertSpec {
            basic_constraints: None,
            key_usage: Some(KeyUsages::DigitalSignature.into()),
            akid: true,
            ..CertSpec::ca(subject, issuer, key, issuer_key)
        }
    }

    pub fn mint(&self) -> PDVCertificate {
        let mut exts = vec![];
        if let Some(bc) = &self.basic_constraints {
            exts.push(ext(bc, true));
        }
        if let Some(ku) = self.key_usage {
            exts.push(ext(&KeyUsage(ku), true));
        }
        if !self.eku.is_empty() {
            exts.push(ext(&ExtendedKeyUsage(self.eku.clone()), false));
        }
        if self.skid {
            let skid = SubjectKeyIdentifier(OctetString::new(key_id(self.key)).unwrap());
            exts.push(ext(&skid, false));
        }
        if self.akid {
            let akid = AuthorityKeyIdentifier {
                key_identifier: Some(OctetString::new(key_id(self.issuer_key)).unwrap()),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            };
            exts.push(ext(&akid, false));
        }
        if !self.policies.is_empty() {
            let cps = CertificatePolicies(
                self.policies
                    .iter()
                    .map(|p| PolicyInformation {
                        policy_identifier: *p,
                        policy_qualifiers: None,
                    })
                    .collect(),
            );
            exts.push(ext(&cps, false));
        }
        if !self.mappings.is_empty() {
            let pm = PolicyMappings(
                self.mappings
                    .iter()
                    .map(|(idp, sdp)| PolicyMapping {
                        issuer_domain_policy: *idp,
                        subject_domain_policy: *sdp,
                    })
                    .collect(),
            );
            exts.push(ext(&pm, true));
        }
        if let Some(pc) = &self.policy_constraints {
            exts.push(ext(pc, true));
        }
        if let Some(skip) = self.inhibit_any {
            exts.push(ext(&InhibitAnyPolicy(skip), true));
        }
        if let Some(nc) = &self.name_constraints {
            exts.push(ext(nc, true));
        }
        if !self.dns_names.is_empty() {
            let san = SubjectAltName(
                self.dns_names
                    .iter()
                    .map(|d| GeneralName::DnsName(Ia5String::new(d).unwrap()))
                    .collect(),
            );
            exts.push(ext(&san, false));
        }
        exts.extend(self.extra.iter().cloned());

        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&[self.serial]).unwrap(),
            signature: ecdsa_alg(),
            issuer: name(&self.issuer),
            validity: Validity {
                not_before: time(self.not_before),
                not_after: time(self.not_after),
            },
            subject: name(&self.subject),
            subject_public_key_info: spki(self.key),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if exts.is_empty() { None } else { Some(exts) },
        };
        let signature = sign(self.issuer_key, &tbs.to_der().unwrap());
        let cert = Certificate {
            tbs_certificate: tbs,
            signature_algorithm: ecdsa_alg(),
            signature,
        };
        let enc = cert.to_der().unwrap();
        parse_cert(&enc, &self.subject).unwrap()
    }
}

/// `dns_constraint` returns name constraints permitting a single DNS subtree
pub fn dns_constraint(permitted: &str) -> NameConstraints {
    NameConstraints {
        permitted_subtrees: Some(vec![GeneralSubtree {
            base: GeneralName::DnsName(Ia5String::new(permitted).unwrap()),
            minimum: 0,
            maximum: None,
        }]),
        excluded_subtrees: None,
    }
}

/// Contents of a CRL to mint
#[derive(Clone)]
pub struct CrlSpec {
    pub issuer: String,
    pub issuer_key: u8,
    pub this_update: u64,
    pub next_update: Option<u64>,
    pub revoked: Vec<(u8, Option<CrlReason>)>,
    pub number: Option<u8>,
    pub base: Option<u8>,
    pub extra: Vec<Extension>,
}

impl CrlSpec {
    pub fn new(issuer: &str, issuer_key: u8) -> CrlSpec {
        CrlSpec {
            issuer: issuer.to_string(),
            issuer_key,
            this_update: NOW - 3600,
            next_update: Some(NOW + 86400),
            revoked: vec![],
            number: Some(1),
            base: None,
            extra: vec![],
        }
    }

    pub fn mint(&self) -> PDVCrl {
        let mut exts = vec![];
        if let Some(n) = self.number {
            exts.push(ext(&CrlNumber(Uint::new(&[n]).unwrap()), false));
        }
        if let Some(b) = self.base {
            exts.push(ext(&BaseCrlNumber(Uint::new(&[b]).unwrap()), true));
        }
        exts.extend(self.extra.iter().cloned());

        let revoked: Vec<RevokedCert> = self
            .revoked
            .iter()
            .map(|(serial, reason)| RevokedCert {
                serial_number: SerialNumber::new(&[*serial]).unwrap(),
                revocation_date: time(NOW - 7200),
                crl_entry_extensions: reason.map(|r| vec![ext(&r, false)]),
            })
            .collect();

        let tbs = TbsCertList {
            version: Version::V2,
            signature: ecdsa_alg(),
            issuer: name(&self.issuer),
            this_update: time(self.this_update),
            next_update: self.next_update.map(time),
            revoked_certificates: if revoked.is_empty() {
                None
            } else {
                Some(revoked)
            },
            crl_extensions: if exts.is_empty() { None } else { Some(exts) },
        };
        let signature = sign(self.issuer_key, &tbs.to_der().unwrap());
        let crl = CertificateList {
            tbs_cert_list: tbs,
            signature_algorithm: ecdsa_alg(),
            signature,
        };
        let enc = crl.to_der().unwrap();
        parse_crl(&enc, &self.issuer).unwrap()
    }
}

pub const ROOT: &str = "CN=Test Root,O=Example,C=US";
pub const CA: &str = "CN=Test CA,O=Example,C=US";
pub const LEAF: &str = "CN=Leaf,O=Example,C=US";

pub const ROOT_KEY: u8 = 1;
pub const CA_KEY: u8 = 2;
pub const LEAF_KEY: u8 = 3;

/// Root, intermediate CA and leaf using the default specs
pub struct Pki {
    pub root: PDVCertificate,
    pub ca: PDVCertificate,
    pub leaf: PDVCertificate,
}

pub fn three_tier(
    root: CertSpec,
    ca: CertSpec,
    leaf: CertSpec,
) -> Pki {
    Pki {
        root: root.mint(),
        ca: ca.mint(),
        leaf: leaf.mint(),
    }
}

pub fn root_spec() -> CertSpec {
    CertSpec::root(ROOT, ROOT_KEY)
}

pub fn ca_spec() -> CertSpec {
    CertSpec::ca(CA, ROOT, CA_KEY, ROOT_KEY)
}

pub fn leaf_spec() -> CertSpec {
    CertSpec::leaf(LEAF, CA, LEAF_KEY, CA_KEY)
}

pub fn default_pki() -> Pki {
    three_tier(root_spec(), ca_spec(), leaf_spec())
}

pub fn pe() -> PkiEnvironment {
    let mut pe = PkiEnvironment::default();
    pe.populate_rust_crypto();
    pe
}

pub fn params() -> VerifyParams {
    VerifyParams {
        time: Some(NOW),
        ..Default::default()
    }
}

pub fn store_with(certs: &[&PDVCertificate]) -> CertificateStore {
    let mut store = CertificateStore::new();
    for c in certs {
        store.add_trusted((*c).clone()).unwrap();
    }
    store
}
