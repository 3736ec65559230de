//! Structures and functions related to configuring certificate chain verification

use std::collections::BTreeSet;
use std::path::Path;

use flagset::{flags, FlagSet};
use log::error;
use serde::{Deserialize, Serialize};

use const_oid::db::rfc5280::ANY_POLICY;
use der::asn1::ObjectIdentifier;

use crate::{util::error::*, util::pdv_utilities::get_now_as_unix_epoch, validator::purpose::Purpose};

/// Default maximum number of intermediate certificates in a chain
pub const DEFAULT_DEPTH: usize = 100;

flags! {
    /// Options that alter how chains are built and verified
    #[derive(PartialOrd, Ord, Hash)]
    pub enum VerifyFlags: u16 {
        /// Check revocation status of the leaf certificate using CRLs
        CrlCheck,
        /// Check revocation status of every certificate except the trust anchor using CRLs
        CrlCheckAll,
        /// Consult delta CRLs in addition to complete CRLs
        UseDeltas,
        /// Require the chain to be valid for at least one policy (initial-explicit-policy)
        ExplicitPolicy,
        /// Do not let anyPolicy match specific policies (initial-any-policy-inhibit)
        InhibitAny,
        /// Disallow policy mapping (initial-policy-mapping-inhibit)
        InhibitMap,
        /// Apply additional checks on extension contents
        X509Strict,
        /// Treat any certificate in the trusted set as a trust anchor, not only self-issued ones
        PartialChain,
        /// Verify the signature of a self-signed trust anchor
        CheckSelfSigned,
        /// Do not report unrecognized critical extensions
        IgnoreCritical,
        /// Skip certificate and CRL validity period checks
        NoCheckTime,
    }
}

impl VerifyFlags {
    /// Name used on the command line and in logs, i.e., "crl_check_all"
    pub fn name(&self) -> &'static str {
        match self {
            VerifyFlags::CrlCheck => "crl_check",
            VerifyFlags::CrlCheckAll => "crl_check_all",
            VerifyFlags::UseDeltas => "use_deltas",
            VerifyFlags::ExplicitPolicy => "explicit_policy",
            VerifyFlags::InhibitAny => "inhibit_any",
            VerifyFlags::InhibitMap => "inhibit_map",
            VerifyFlags::X509Strict => "x509_strict",
            VerifyFlags::PartialChain => "partial_chain",
            VerifyFlags::CheckSelfSigned => "check_ss_sig",
            VerifyFlags::IgnoreCritical => "ignore_critical",
            VerifyFlags::NoCheckTime => "no_check_time",
        }
    }
}

/// [`VerifyParams`] governs a verification operation. All fields are optional when deserializing
/// from JSON; missing fields take their default values.
///
/// ```
/// use x509verify::*;
/// let params: VerifyParams =
///     serde_json::from_str(r#"{"depth": 3, "purpose": "SslServer", "policies": ["2.16.840.1.101.3.2.1.48.1"]}"#).unwrap();
/// assert_eq!(3, params.depth);
/// assert_eq!(Some(Purpose::SslServer), params.purpose);
/// assert!(params.flags.is_empty());
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyParams {
    /// Purpose the chain is verified for. None disables purpose checks and uses
    /// anyExtendedKeyUsage for trust decisions.
    pub purpose: Option<Purpose>,
    /// Maximum number of intermediate certificates
    pub depth: usize,
    /// Verification options
    pub flags: FlagSet<VerifyFlags>,
    /// Dotted OIDs of acceptable policies (user-initial-policy-set). Empty means any policy.
    pub policies: Vec<String>,
    /// Reference time, as seconds since the Unix epoch. None means the current time.
    pub time: Option<u64>,
    /// Statuses the verify callback may not override
    pub non_overridable: BTreeSet<PathValidationStatus>,
    /// Log every callback event at info level
    pub log_events: bool,
}

impl Default for VerifyParams {
    fn default() -> Self {
        VerifyParams {
            purpose: None,
            depth: DEFAULT_DEPTH,
            flags: FlagSet::default(),
            policies: vec![],
            time: None,
            non_overridable: BTreeSet::new(),
            log_events: false,
        }
    }
}

impl VerifyParams {
    /// Creates a new [`VerifyParams`] with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `flag` is set
    pub fn has_flag(&self, flag: VerifyFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Sets `flag`
    pub fn set_flag(&mut self, flag: VerifyFlags) {
        self.flags |= flag;
    }

    /// `time_of_interest` returns the configured time or the current time when none is set
    pub fn time_of_interest(&self) -> u64 {
        self.time.unwrap_or_else(get_now_as_unix_epoch)
    }

    /// `policy_set` resolves the policies field into a set of object identifiers. An empty list
    /// yields a set containing only anyPolicy. Returns [`Error::Misconfiguration`] if a value is
    /// not a valid dotted OID.
    pub fn policy_set(&self) -> Result<BTreeSet<ObjectIdentifier>> {
        let mut set = BTreeSet::new();
        for p in &self.policies {
            match ObjectIdentifier::new(p.trim()) {
                Ok(oid) => {
                    set.insert(oid);
                }
                Err(e) => {
                    error!("Invalid policy OID {}: {}", p, e);
                    return Err(Error::Misconfiguration);
                }
            }
        }
        if set.is_empty() {
            set.insert(ANY_POLICY);
        }
        Ok(set)
    }
}

/// `read_params` deserializes a JSON file into a [`VerifyParams`] instance.
pub fn read_params(fname: &Path) -> Result<VerifyParams> {
    let json = std::fs::read(fname)?;
    match serde_json::from_slice(&json) {
        Ok(params) => Ok(params),
        Err(e) => {
            error!("Failed to parse {}: {}", fname.display(), e);
            Err(Error::ParseError)
        }
    }
}

#[test]
fn default_params() {
    let params = VerifyParams::default();
    assert_eq!(100, params.depth);
    assert!(params.purpose.is_none());
    assert!(params.flags.is_empty());
    assert!(params.non_overridable.is_empty());
    let policies = params.policy_set().unwrap();
    assert_eq!(1, policies.len());
    assert!(policies.contains(&ANY_POLICY));
}

#[test]
fn params_json() {
    let mut params = VerifyParams::new();
    params.set_flag(VerifyFlags::CrlCheck);
    params.set_flag(VerifyFlags::X509Strict);
    params.purpose = Some(Purpose::SmimeSign);
    params.time = Some(1_700_000_000);
    params
        .non_overridable
        .insert(PathValidationStatus::CertRevoked);
    let json = serde_json::to_string(&params).unwrap();
    let back: VerifyParams = serde_json::from_str(&json).unwrap();
    assert_eq!(params, back);
    assert!(back.has_flag(VerifyFlags::CrlCheck));
    assert!(!back.has_flag(VerifyFlags::CrlCheckAll));
    assert_eq!(1_700_000_000, back.time_of_interest());

    let sparse: VerifyParams = serde_json::from_str("{}").unwrap();
    assert_eq!(VerifyParams::default(), sparse);
}

#[test]
fn bad_policy() {
    let params = VerifyParams {
        policies: vec!["2.16.840.1.101.3.2.1.48.1".to_string(), "not.an.oid".to_string()],
        ..Default::default()
    };
    assert_eq!(Err(Error::Misconfiguration), params.policy_set());
}

#[test]
fn read_params_file() {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(br#"{"depth": 2, "flags": 1}"#).unwrap();
    let params = read_params(f.path()).unwrap();
    assert_eq!(2, params.depth);
    assert!(params.has_flag(VerifyFlags::CrlCheck));

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    bad.write_all(b"not json").unwrap();
    assert_eq!(Err(Error::ParseError), read_params(bad.path()));
}
