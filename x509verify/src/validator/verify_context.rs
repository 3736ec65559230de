//! The verification state machine
//!
//! A [`VerifyContext`] borrows everything a verification needs, builds a chain for the target
//! certificate, validates each link, evaluates certificate policies and, when enabled, checks
//! revocation status. Every problem found is reported to a [`VerifyCallback`], which decides
//! whether verification continues.
//!
//! ```no_run
//! use x509verify::*;
//! # fn demo(store: &CertificateStore, target: &PDVCertificate) {
//! let mut pe = PkiEnvironment::default();
//! pe.populate_rust_crypto();
//! let params = VerifyParams::default();
//! let mut ctx = VerifyContext::new(&pe, store, &params, target);
//! let outcome = ctx.verify(&mut default_verify_callback);
//! if !outcome.accepted {
//!     println!("error {} at {} depth lookup: {}", outcome.error.code(), outcome.error_depth, outcome.error);
//! }
//! # }
//! ```

use std::collections::BTreeSet;

use log::{debug, error, info};

use crate::{
    builder::chain_builder::*,
    environment::pki_environment::PkiEnvironment,
    revocation::{crl::*, pdv_crl::PDVCrl},
    source::cert_store::CertificateStore,
    util::error::*,
    util::pdv_utilities::*,
    validator::cert_path::TrustedCertificates,
    validator::name_constraints::check_name_constraints,
    validator::pdv_certificate::PDVCertificate,
    validator::pdv_extension::EXTS_OF_INTEREST,
    validator::policy_tree::*,
    validator::verify_params::*,
};
use x509_cert::ext::pkix::KeyUsages;

/// Stage of a verification operation
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VerifyState {
    /// verify has not been called, or is resetting
    Init,
    /// Looking for a chain to a trusted certificate
    BuildingChain,
    /// Checking the certificate at the given depth (leaf is 0)
    ValidatingLink(usize),
    /// Evaluating certificate policies
    PolicyCheck,
    /// Checking revocation status
    RevocationCheck,
    /// Verification succeeded
    Accepted,
    /// Verification failed
    Rejected,
}

/// `VerifyCallback` arbitrates each event raised during verification.
///
/// `ok` is false when a problem was found, in which case [`VerifyContext::error`] names it.
/// Returning true from a failure event overrides the problem. Returning false from a success
/// event rejects the chain with `ApplicationVerification`.
pub trait VerifyCallback {
    /// Called for each event
    fn on_event(&mut self, ok: bool, ctx: &VerifyContext<'_>) -> bool;
}

impl<F> VerifyCallback for F
where
    F: FnMut(bool, &VerifyContext<'_>) -> bool,
{
    fn on_event(&mut self, ok: bool, ctx: &VerifyContext<'_>) -> bool {
        self(ok, ctx)
    }
}

/// `default_verify_callback` accepts success events and rejects every problem
pub fn default_verify_callback(ok: bool, _ctx: &VerifyContext<'_>) -> bool {
    ok
}

/// Verdict returned by an override policy
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverrideDecision {
    /// Continue as though the problem was not found
    Accept,
    /// Reject the chain
    Reject,
}

/// `AllowList` is a callback that overrides a fixed set of statuses and rejects all others
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AllowList {
    /// Statuses that are overridden
    pub allowed: BTreeSet<PathValidationStatus>,
}

impl AllowList {
    /// Creates an `AllowList` from a list of statuses
    pub fn new<I: IntoIterator<Item = PathValidationStatus>>(statuses: I) -> Self {
        AllowList {
            allowed: statuses.into_iter().collect(),
        }
    }

    /// Returns the decision for `status`
    pub fn decide(&self, status: PathValidationStatus) -> OverrideDecision {
        if self.allowed.contains(&status) {
            OverrideDecision::Accept
        } else {
            OverrideDecision::Reject
        }
    }
}

impl VerifyCallback for AllowList {
    fn on_event(&mut self, ok: bool, ctx: &VerifyContext<'_>) -> bool {
        ok || OverrideDecision::Accept == self.decide(ctx.error())
    }
}

/// `Arbiter` adapts a function of an error category and the context to a callback. Success
/// events are always accepted.
pub struct Arbiter<F>(pub F)
where
    F: Fn(ErrorKind, &VerifyContext<'_>) -> OverrideDecision;

impl<F> VerifyCallback for Arbiter<F>
where
    F: Fn(ErrorKind, &VerifyContext<'_>) -> OverrideDecision,
{
    fn on_event(&mut self, ok: bool, ctx: &VerifyContext<'_>) -> bool {
        ok || OverrideDecision::Accept == (self.0)(ctx.error().kind(), ctx)
    }
}

/// Result of [`VerifyContext::verify`]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VerifyOutcome {
    /// True if the chain was accepted
    pub accepted: bool,
    /// Status that caused rejection, `Ok` when accepted
    pub error: PathValidationStatus,
    /// Depth of the certificate associated with `error`
    pub error_depth: usize,
    /// Problems the callback overrode, with the depth each was found at
    pub overridden: Vec<(PathValidationStatus, usize)>,
}

type Step = core::result::Result<(), PathValidationStatus>;

/// `VerifyContext` carries the inputs and state of a verification operation. See the
/// module documentation for an example.
pub struct VerifyContext<'a> {
    pe: &'a PkiEnvironment,
    store: &'a CertificateStore,
    params: &'a VerifyParams,
    target: &'a PDVCertificate,
    untrusted: &'a [PDVCertificate],
    trusted: Option<&'a [PDVCertificate]>,
    crls: Option<&'a [PDVCrl]>,

    chain: Vec<&'a PDVCertificate>,
    chain_complete: bool,
    toi: u64,
    error: PathValidationStatus,
    error_depth: usize,
    current_cert: Option<&'a PDVCertificate>,
    current_crl: Option<&'a PDVCrl>,
    policy_tree: Option<ValidPolicyTree>,
    state: VerifyState,
    overridden: Vec<(PathValidationStatus, usize)>,
}

impl<'a> VerifyContext<'a> {
    /// Creates a context that verifies `target` against the trusted certificates in `store`
    pub fn new(
        pe: &'a PkiEnvironment,
        store: &'a CertificateStore,
        params: &'a VerifyParams,
        target: &'a PDVCertificate,
    ) -> VerifyContext<'a> {
        VerifyContext {
            pe,
            store,
            params,
            target,
            untrusted: &[],
            trusted: None,
            crls: None,
            chain: vec![],
            chain_complete: false,
            toi: 0,
            error: PathValidationStatus::Ok,
            error_depth: 0,
            current_cert: None,
            current_crl: None,
            policy_tree: None,
            state: VerifyState::Init,
            overridden: vec![],
        }
    }

    /// Supplies certificates that may be used as intermediates
    pub fn with_untrusted(mut self, untrusted: &'a [PDVCertificate]) -> Self {
        self.untrusted = untrusted;
        self
    }

    /// Supplies trusted certificates used instead of those in the store
    pub fn with_trusted(mut self, trusted: &'a [PDVCertificate]) -> Self {
        self.trusted = Some(trusted);
        self
    }

    /// Supplies CRLs used instead of those in the store
    pub fn with_crls(mut self, crls: &'a [PDVCrl]) -> Self {
        self.crls = Some(crls);
        self
    }

    /// Status of the most recent event
    pub fn error(&self) -> PathValidationStatus {
        self.error
    }

    /// Depth of the certificate associated with the most recent event (leaf is 0)
    pub fn error_depth(&self) -> usize {
        self.error_depth
    }

    /// Certificate associated with the most recent event
    pub fn current_cert(&self) -> Option<&'a PDVCertificate> {
        self.current_cert
    }

    /// CRL associated with the most recent event, if any
    pub fn current_crl(&self) -> Option<&'a PDVCrl> {
        self.current_crl
    }

    /// Chain built for the target, leaf first. Partial when no chain to a trusted certificate was
    /// found.
    pub fn chain(&self) -> &[&'a PDVCertificate] {
        &self.chain
    }

    /// Returns true if the chain ends at a trusted certificate
    pub fn is_chain_complete(&self) -> bool {
        self.chain_complete
    }

    /// Valid policy tree from the most recent policy evaluation
    pub fn policy_tree(&self) -> Option<&ValidPolicyTree> {
        self.policy_tree.as_ref()
    }

    /// Reference time of the most recent verification, fixed when [`VerifyContext::verify`]
    /// starts
    pub fn time_of_interest(&self) -> u64 {
        self.toi
    }

    /// Current state
    pub fn state(&self) -> VerifyState {
        self.state
    }

    /// Parameters governing verification
    pub fn params(&self) -> &VerifyParams {
        self.params
    }

    /// Certificate being verified
    pub fn target(&self) -> &'a PDVCertificate {
        self.target
    }

    /// Problems overridden so far
    pub fn overridden(&self) -> &[(PathValidationStatus, usize)] {
        &self.overridden
    }

    fn reset(&mut self) {
        self.chain.clear();
        self.chain_complete = false;
        self.toi = self.params.time_of_interest();
        self.error = PathValidationStatus::Ok;
        self.error_depth = 0;
        self.current_cert = None;
        self.current_crl = None;
        self.policy_tree = None;
        self.state = VerifyState::Init;
        self.overridden.clear();
    }

    fn log_event(&self, ok: bool) {
        let subject = match self.current_cert {
            Some(cert) => name_to_string(cert.subject()),
            None => String::new(),
        };
        if self.params.log_events {
            info!(
                "depth={} ok={} {}: {}",
                self.error_depth, ok, subject, self.error
            );
        } else {
            debug!(
                "depth={} ok={} {}: {}",
                self.error_depth, ok, subject, self.error
            );
        }
    }

    /// Reports a problem to the callback. Returns Ok if the problem was overridden.
    fn report(
        &mut self,
        cb: &mut dyn VerifyCallback,
        status: PathValidationStatus,
        depth: usize,
        crl: Option<&'a PDVCrl>,
    ) -> Step {
        self.error = status;
        self.error_depth = depth;
        self.current_cert = self.chain.get(depth).copied();
        self.current_crl = crl;
        self.log_event(false);

        if PathValidationStatus::InternalError == status {
            // final notification, the answer is ignored
            let _ = cb.on_event(false, self);
            return Err(status);
        }

        let ok = cb.on_event(false, self);
        if ok && !self.params.non_overridable.contains(&status) {
            debug!("{} at depth {} overridden", status, depth);
            self.overridden.push((status, depth));
            Ok(())
        } else {
            if ok {
                info!("{} at depth {} cannot be overridden", status, depth);
            }
            Err(status)
        }
    }

    /// Reports a successful link to the callback
    fn report_success(&mut self, cb: &mut dyn VerifyCallback, depth: usize) -> Step {
        self.error = PathValidationStatus::Ok;
        self.error_depth = depth;
        self.current_cert = self.chain.get(depth).copied();
        self.current_crl = None;
        self.log_event(true);
        if cb.on_event(true, self) {
            Ok(())
        } else {
            self.error = PathValidationStatus::ApplicationVerification;
            Err(PathValidationStatus::ApplicationVerification)
        }
    }

    /// Reports a library error, mapping anything that is not a verification status to
    /// `InternalError`
    fn report_error(&mut self, cb: &mut dyn VerifyCallback, e: Error, depth: usize) -> Step {
        let status = status_of(e, false);
        self.report(cb, status, depth, None)
    }

    /// `verify` builds and validates a chain for the target certificate, reporting each event to
    /// `cb`. All state from a previous call is discarded first, so repeated calls with the same
    /// inputs and callback behavior yield the same outcome.
    pub fn verify(&mut self, cb: &mut dyn VerifyCallback) -> VerifyOutcome {
        self.reset();
        match self.run(cb) {
            Ok(()) => {
                self.state = VerifyState::Accepted;
                self.error = PathValidationStatus::Ok;
                info!(
                    "Verification of certificate issued to {} succeeded",
                    name_to_string(self.target.subject())
                );
                VerifyOutcome {
                    accepted: true,
                    error: PathValidationStatus::Ok,
                    error_depth: 0,
                    overridden: self.overridden.clone(),
                }
            }
            Err(status) => {
                self.state = VerifyState::Rejected;
                self.error = status;
                info!(
                    "Verification of certificate issued to {} failed at depth {}: {}",
                    name_to_string(self.target.subject()),
                    self.error_depth,
                    status
                );
                VerifyOutcome {
                    accepted: false,
                    error: status,
                    error_depth: self.error_depth,
                    overridden: self.overridden.clone(),
                }
            }
        }
    }

    fn run(&mut self, cb: &mut dyn VerifyCallback) -> Step {
        self.state = VerifyState::BuildingChain;
        self.build(cb)?;

        for i in 0..self.chain.len() {
            self.state = VerifyState::ValidatingLink(i);
            self.validate_link(cb, i)?;
            self.report_success(cb, i)?;
        }

        self.state = VerifyState::PolicyCheck;
        self.check_policies(cb)?;

        if self.params.has_flag(VerifyFlags::CrlCheck)
            || self.params.has_flag(VerifyFlags::CrlCheckAll)
        {
            self.state = VerifyState::RevocationCheck;
            self.check_revocation(cb)?;
        }
        Ok(())
    }

    fn build(&mut self, cb: &mut dyn VerifyCallback) -> Step {
        let trusted = match self.trusted {
            Some(list) => TrustedCertificates::List(list),
            None => TrustedCertificates::Store(self.store),
        };
        let (pe, params, toi) = (self.pe, self.params, self.toi);
        let options = BuildOptions {
            time_of_interest: toi,
            budget: BuildBudget::default(),
        };
        // prefer a chain on which every link passes, before any problem reaches the callback
        let mut accept = |chain: &[&PDVCertificate]| {
            (0..chain.len())
                .all(|i| link_problems(pe, params, toi, chain, i, true, true).is_empty())
        };
        match build_chain_with(
            pe,
            self.target,
            self.untrusted,
            trusted,
            params,
            options,
            &mut accept,
        ) {
            Ok(path) => {
                self.chain = path.chain;
                self.chain_complete = true;
                Ok(())
            }
            Err(NoPathError {
                status,
                partial_chain,
            }) => {
                self.chain = if partial_chain.is_empty() {
                    vec![self.target]
                } else {
                    partial_chain
                };
                let depth = self.chain.len() - 1;
                self.report(cb, status, depth, None)
            }
        }
    }

    fn validate_link(&mut self, cb: &mut dyn VerifyCallback, i: usize) -> Step {
        let problems = link_problems(
            self.pe,
            self.params,
            self.toi,
            &self.chain,
            i,
            self.chain_complete,
            false,
        );
        for status in problems {
            self.report(cb, status, i, None)?;
        }
        Ok(())
    }

    fn check_policies(&mut self, cb: &mut dyn VerifyCallback) -> Step {
        let params = self.params;
        let user_policies = match params.policy_set() {
            Ok(set) => set,
            Err(e) => return self.report_error(cb, e, 0),
        };
        match evaluate_policies(
            &self.chain,
            &user_policies,
            params.has_flag(VerifyFlags::ExplicitPolicy),
            params.has_flag(VerifyFlags::InhibitAny),
            params.has_flag(VerifyFlags::InhibitMap),
        ) {
            Ok(tree) => {
                self.policy_tree = Some(tree);
                Ok(())
            }
            Err(PolicyFailure { status, depth }) => self.report(cb, status, depth, None),
        }
    }

    fn check_revocation(&mut self, cb: &mut dyn VerifyCallback) -> Step {
        let params = self.params;
        let options = CrlCheckOptions {
            time_of_interest: self.toi,
            no_check_time: params.has_flag(VerifyFlags::NoCheckTime),
            use_deltas: params.has_flag(VerifyFlags::UseDeltas),
        };

        // the top certificate has no issuer in the chain and is never checked
        let last = self.chain.len().saturating_sub(1);
        let count = if params.has_flag(VerifyFlags::CrlCheckAll) {
            last
        } else {
            last.min(1)
        };

        for i in 0..count {
            let cert = self.chain[i];
            let issuer = self.chain[i + 1];
            let candidates: Vec<&'a PDVCrl> = match self.crls {
                Some(crls) => crls.iter().collect(),
                None => self.store.lookup_crls_by_issuer(cert.issuer()),
            };
            let report = check_crl_status(self.pe, cert, issuer, &candidates, &options);
            for (status, crl) in report.findings {
                self.report(cb, status, i, crl.or(report.crl))?;
            }
        }
        Ok(())
    }
}

fn status_of(e: Error, stifle_log: bool) -> PathValidationStatus {
    match e {
        Error::PathValidation(s) => s,
        e => {
            if !stifle_log {
                error!("Unexpected error during verification: {}", e);
            }
            PathValidationStatus::InternalError
        }
    }
}

/// `link_problems` returns the problems with the certificate at depth `i` of `chain`, in the
/// order they are reported. `complete` indicates the top certificate of `chain` is trusted.
pub(crate) fn link_problems(
    pe: &PkiEnvironment,
    params: &VerifyParams,
    toi: u64,
    chain: &[&PDVCertificate],
    i: usize,
    complete: bool,
    stifle_log: bool,
) -> Vec<PathValidationStatus> {
    let mut problems = vec![];
    let cert = chain[i];
    let is_top = i + 1 == chain.len();
    let is_anchor = is_top && complete;
    let note = |msg: &str| {
        if !stifle_log {
            log_error_for_cert(cert, msg);
        }
    };

    // signature
    if !is_top {
        if let Err(e) = verify_issued_by(pe, cert, chain[i + 1]) {
            problems.push(status_of(e, stifle_log));
        }
    } else if is_anchor
        && params.has_flag(VerifyFlags::CheckSelfSigned)
        && is_self_issued(&cert.decoded_cert)
    {
        if let Err(e) = verify_issued_by(pe, cert, cert) {
            problems.push(status_of(e, stifle_log));
        }
    }

    // validity
    if !params.has_flag(VerifyFlags::NoCheckTime) {
        if let Err(e) = valid_at_time(&cert.decoded_cert.tbs_certificate, toi, stifle_log) {
            problems.push(status_of(e, stifle_log));
        }
    }

    // basic constraints
    let bc = cert.basic_constraints();
    if let Some(bc) = bc {
        if params.has_flag(VerifyFlags::X509Strict) && !bc.ca && bc.path_len_constraint.is_some()
        {
            note("pathLenConstraint present in a non-CA certificate");
            problems.push(PathValidationStatus::InvalidExtension);
        }
    }
    if i > 0 {
        match bc {
            Some(bc) if bc.ca => {
                // (l) and (m) of RFC 5280 6.1.4, counted from the top down: self-issued
                // intermediates do not count against pathLenConstraint
                if let Some(pl) = bc.path_len_constraint {
                    let below = chain[1..i]
                        .iter()
                        .filter(|c| !is_self_issued(&c.decoded_cert))
                        .count();
                    if below > pl as usize {
                        note("path length constraint violation");
                        problems.push(PathValidationStatus::PathLengthExceeded);
                    }
                }
            }
            None if is_anchor && !params.has_flag(VerifyFlags::X509Strict) => {
                if !stifle_log {
                    debug!("Tolerating trust anchor without basic constraints");
                }
            }
            _ => {
                note("missing or invalid basic constraints");
                problems.push(PathValidationStatus::InvalidCa);
            }
        }

        // key usage
        if let Some(ku) = cert.key_usage() {
            if !ku.0.contains(KeyUsages::KeyCertSign) {
                note("keyCertSign is not set in key usage extension");
                problems.push(PathValidationStatus::KeyUsageNoCertSign);
            }
        }
    }

    // purpose
    if let Some(purpose) = params.purpose {
        let suitable = if 0 == i {
            purpose.check_leaf(cert)
        } else {
            purpose.check_ca(cert)
        };
        if !suitable {
            note(format!("not suitable for {}", purpose).as_str());
            problems.push(PathValidationStatus::InvalidPurpose);
        }
    }

    // name constraints
    if let Err(e) = check_name_constraints(chain, i) {
        problems.push(status_of(e, stifle_log));
    }

    // critical extensions
    if !params.has_flag(VerifyFlags::IgnoreCritical) {
        if let Some(exts) = &cert.decoded_cert.tbs_certificate.extensions {
            if let Some(ext) = exts
                .iter()
                .find(|e| e.critical && !EXTS_OF_INTEREST.contains(&e.extn_id))
            {
                note(format!("unhandled critical extension {}", ext.extn_id).as_str());
                problems.push(PathValidationStatus::UnhandledCriticalExtension);
            }
        }
    }
    problems
}
