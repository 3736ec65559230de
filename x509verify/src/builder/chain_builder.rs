//! Depth-first certificate chain building with backtracking
//!
//! Starting from a target certificate, [`build_chain`] looks for issuer candidates among trusted
//! certificates then untrusted certificates, orders them so the most promising candidates are
//! tried first and recurses until a trusted certificate is reached. When a branch cannot reach a
//! trusted certificate the builder backtracks and tries the next candidate. This allows chains to
//! be found when more than one certificate shares an issuer name, i.e., across a CA key rollover.
//! [`build_chain_with`] also backtracks past complete chains that a caller supplied check declines,
//! and every search is bounded by a [`BuildBudget`].

use const_oid::db::rfc5912::ANY_EXTENDED_KEY_USAGE;
use der::{asn1::ObjectIdentifier, Decode};
use log::{debug, info};

use crate::{
    environment::pki_environment::PkiEnvironment,
    util::error::*,
    util::pdv_utilities::*,
    validator::cert_path::{CertificationPath, TrustedCertificates},
    validator::pdv_certificate::{DeferDecodeSigned, PDVCertificate},
    validator::verify_params::{VerifyFlags, VerifyParams},
};

/// `NoPathError` is returned by [`build_chain`] when no chain to a trusted certificate was found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NoPathError<'a> {
    /// Reason the deepest branch explored could not be completed
    pub status: PathValidationStatus,
    /// Deepest partial chain explored, leaf first
    pub partial_chain: Vec<&'a PDVCertificate>,
}

/// Trust determination for a single certificate relative to a usage
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrustDecision {
    /// The certificate terminates the chain
    Trusted,
    /// The certificate may appear in a chain but does not terminate it
    Untrusted,
    /// The certificate is explicitly rejected for the usage
    Rejected,
}

/// `trust_usage` returns the extended key usage consulted for trust decisions given `params`
pub fn trust_usage(params: &VerifyParams) -> ObjectIdentifier {
    match params.purpose {
        Some(p) => p.trust_eku(),
        None => ANY_EXTENDED_KEY_USAGE,
    }
}

/// `trust_decision` determines whether `cert` terminates a chain for `usage`. `in_trusted_set`
/// indicates the certificate was obtained from the trusted certificates rather than from the
/// untrusted list.
///
/// A trust annotation takes precedence: rejection of the usage (or of anyExtendedKeyUsage) yields
/// [`TrustDecision::Rejected`] and trust for the usage (or anyExtendedKeyUsage) yields
/// [`TrustDecision::Trusted`] wherever the certificate came from. An annotation that lists other
/// usages only yields [`TrustDecision::Untrusted`]. Otherwise certificates from the trusted set are
/// trusted when self-issued or when [`VerifyFlags::PartialChain`] is set.
pub fn trust_decision(
    cert: &PDVCertificate,
    in_trusted_set: bool,
    usage: &ObjectIdentifier,
    params: &VerifyParams,
) -> TrustDecision {
    if let Some(aux) = cert.trust_annotation() {
        if aux.reject.contains(usage) || aux.reject.contains(&ANY_EXTENDED_KEY_USAGE) {
            return TrustDecision::Rejected;
        }
        if aux.trust.contains(usage) || aux.trust.contains(&ANY_EXTENDED_KEY_USAGE) {
            return TrustDecision::Trusted;
        }
        if !aux.trust.is_empty() {
            return TrustDecision::Untrusted;
        }
    }
    if in_trusted_set
        && (is_self_issued(&cert.decoded_cert) || params.has_flag(VerifyFlags::PartialChain))
    {
        TrustDecision::Trusted
    } else {
        TrustDecision::Untrusted
    }
}

/// `verify_issued_by` verifies the signature on `cert` using the public key from `issuer`.
///
/// Returns `CertSignatureFailure` or `UnableToDecodeIssuerPublicKey` on failure, or
/// `InternalError` if the encoded certificate cannot be split into its signed parts.
pub fn verify_issued_by(
    pe: &PkiEnvironment,
    cert: &PDVCertificate,
    issuer: &PDVCertificate,
) -> Result<()> {
    let defer_cert = match DeferDecodeSigned::from_der(cert.encoded_cert.as_slice()) {
        Ok(c) => c,
        Err(e) => {
            log_error_for_cert(cert, format!("failed to split certificate: {}", e).as_str());
            return Err(Error::PathValidation(PathValidationStatus::InternalError));
        }
    };
    pe.verify_signature_message(
        &defer_cert.tbs_field,
        defer_cert.signature.raw_bytes(),
        &defer_cert.signature_algorithm,
        &issuer
            .decoded_cert
            .tbs_certificate
            .subject_public_key_info,
    )
}

/// `is_self_signed` returns true if `cert` is self-issued and its own key verifies its signature
pub fn is_self_signed(pe: &PkiEnvironment, cert: &PDVCertificate) -> bool {
    is_self_issued(&cert.decoded_cert) && verify_issued_by(pe, cert, cert).is_ok()
}

fn in_trusted_set(trusted: &TrustedCertificates<'_>, cert: &PDVCertificate) -> bool {
    trusted
        .lookup_by_subject(cert.subject())
        .iter()
        .any(|c| c.encoded_cert == cert.encoded_cert)
}

/// Certificates with the same subject and public key are the same node for loop detection
fn in_chain(chain: &[&PDVCertificate], cert: &PDVCertificate) -> bool {
    let spki = &cert.decoded_cert.tbs_certificate.subject_public_key_info;
    chain.iter().any(|c| {
        compare_names(c.subject(), cert.subject())
            && &c.decoded_cert.tbs_certificate.subject_public_key_info == spki
    })
}

/// `BuildBudget` limits the work done by a single chain search. When either count is spent the
/// search stops with `BuildBudgetExceeded`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BuildBudget {
    /// Signature verifications, including those made while ranking issuer candidates. Each
    /// complete chain offered to the acceptance check costs one per certificate.
    pub signatures: usize,
    /// Steps that extend a partial chain by one certificate
    pub build_calls: usize,
}

impl Default for BuildBudget {
    fn default() -> Self {
        BuildBudget {
            signatures: 100,
            build_calls: 200_000,
        }
    }
}

impl BuildBudget {
    fn consume_signatures(&mut self, n: usize) -> Search<()> {
        self.signatures = self
            .signatures
            .checked_sub(n)
            .ok_or(PathValidationStatus::BuildBudgetExceeded)?;
        Ok(())
    }

    fn consume_build_call(&mut self) -> Search<()> {
        self.build_calls = self
            .build_calls
            .checked_sub(1)
            .ok_or(PathValidationStatus::BuildBudgetExceeded)?;
        Ok(())
    }
}

/// Options for [`build_chain_with`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BuildOptions {
    /// Reference time used to rank issuer candidates
    pub time_of_interest: u64,
    /// Work limit for the search
    pub budget: BuildBudget,
}

impl BuildOptions {
    /// Options using the reference time from `params` and the default budget
    pub fn new(params: &VerifyParams) -> BuildOptions {
        BuildOptions {
            time_of_interest: params.time_of_interest(),
            budget: BuildBudget::default(),
        }
    }
}

type Search<T> = core::result::Result<T, PathValidationStatus>;

/// Chain acceptance check, see [`build_chain_with`]
pub type AcceptChain<'c, 'a> = dyn FnMut(&[&'a PDVCertificate]) -> bool + 'c;

struct ChainSearch<'a, 'p> {
    pe: &'p PkiEnvironment,
    params: &'p VerifyParams,
    untrusted: &'a [PDVCertificate],
    trusted: TrustedCertificates<'a>,
    usage: ObjectIdentifier,
    toi: u64,
    max_len: usize,
    budget: BuildBudget,

    deepest: Vec<&'a PDVCertificate>,
    deepest_status: PathValidationStatus,
    rejected: Option<Vec<&'a PDVCertificate>>,
    fallback: Option<Vec<&'a PDVCertificate>>,
}

impl<'a, 'p> ChainSearch<'a, 'p> {
    fn dead_end(&mut self, chain: &[&'a PDVCertificate], status: PathValidationStatus) {
        debug!(
            "Dead end at {} with {} certificates: {}",
            chain[chain.len() - 1].subject(),
            chain.len(),
            status
        );
        if PathValidationStatus::CertRejected == status {
            if self.rejected.is_none() {
                self.rejected = Some(chain.to_vec());
            }
        } else if chain.len() > self.deepest.len() {
            self.deepest = chain.to_vec();
            self.deepest_status = status;
        }
    }

    /// Orders issuer candidates: key identifier agreement first, then signature verification,
    /// then validity at the time of interest. The sort is stable so trusted candidates stay ahead
    /// of untrusted candidates on ties.
    fn rank_candidates(
        &mut self,
        cert: &PDVCertificate,
        candidates: Vec<(&'a PDVCertificate, bool)>,
    ) -> Search<Vec<(&'a PDVCertificate, bool)>> {
        let no_check_time = self.params.has_flag(VerifyFlags::NoCheckTime);
        let mut ranked = Vec::with_capacity(candidates.len());
        for (candidate, trusted) in candidates {
            self.budget.consume_signatures(1)?;
            let kid_rank = match key_ids_agree(cert, candidate) {
                Some(true) => 0,
                None => 1,
                Some(false) => 2,
            };
            let sig_rank = match verify_issued_by(self.pe, cert, candidate) {
                Ok(()) => 0,
                Err(_) => 1,
            };
            let time_rank = if no_check_time
                || valid_at_time(&candidate.decoded_cert.tbs_certificate, self.toi, true).is_ok()
            {
                0
            } else {
                1
            };
            ranked.push(((kid_rank, sig_rank, time_rank), candidate, trusted));
        }
        ranked.sort_by_key(|(rank, _, _)| *rank);
        Ok(ranked.into_iter().map(|(_, c, t)| (c, t)).collect())
    }

    /// Offers a chain ending at a trusted certificate to `accept`. A declined chain is kept as the
    /// result of last resort and the search continues.
    fn complete(
        &mut self,
        chain: &[&'a PDVCertificate],
        accept: &mut AcceptChain<'_, 'a>,
    ) -> Search<bool> {
        self.budget.consume_signatures(chain.len())?;
        if accept(chain) {
            return Ok(true);
        }
        debug!(
            "Chain with {} certificates ending at {} failed link checks",
            chain.len(),
            chain[chain.len() - 1].subject()
        );
        if self.fallback.is_none() {
            self.fallback = Some(chain.to_vec());
        }
        Ok(false)
    }

    /// Extends `chain` from its last certificate. Returns true when `chain` is complete and
    /// accepted. An error means the budget is spent and the search is over.
    fn extend(
        &mut self,
        chain: &mut Vec<&'a PDVCertificate>,
        from_trusted: bool,
        accept: &mut AcceptChain<'_, 'a>,
    ) -> Search<bool> {
        self.budget.consume_build_call()?;
        let cur = chain[chain.len() - 1];
        match trust_decision(cur, from_trusted, &self.usage, self.params) {
            TrustDecision::Trusted => return self.complete(chain, accept),
            TrustDecision::Rejected => {
                info!("Certificate issued to {} is rejected", cur.subject());
                self.dead_end(chain, PathValidationStatus::CertRejected);
                return Ok(false);
            }
            TrustDecision::Untrusted => {}
        }

        if is_self_issued(&cur.decoded_cert) {
            self.budget.consume_signatures(1)?;
            if is_self_signed(self.pe, cur) {
                let status = if from_trusted {
                    // annotated for other usages only
                    PathValidationStatus::CertUntrusted
                } else if 1 == chain.len() {
                    PathValidationStatus::DepthZeroSelfSignedCert
                } else {
                    PathValidationStatus::SelfSignedCertInChain
                };
                self.dead_end(chain, status);
                return Ok(false);
            }
        }

        if chain.len() >= self.max_len {
            self.dead_end(chain, PathValidationStatus::CertChainTooLong);
            return Ok(false);
        }

        let issuer = cur.issuer();
        let mut candidates: Vec<(&'a PDVCertificate, bool)> = self
            .trusted
            .lookup_by_subject(issuer)
            .into_iter()
            .map(|c| (c, true))
            .collect();
        for c in self
            .untrusted
            .iter()
            .filter(|c| compare_names(c.subject(), issuer))
        {
            if !candidates
                .iter()
                .any(|(t, _)| t.encoded_cert == c.encoded_cert)
            {
                candidates.push((c, false));
            }
        }

        if candidates.is_empty() {
            self.dead_end(chain, PathValidationStatus::UnableToGetIssuerCert);
            return Ok(false);
        }

        candidates.retain(|(c, _)| !in_chain(chain, c));
        if candidates.is_empty() {
            self.dead_end(chain, PathValidationStatus::PathLoop);
            return Ok(false);
        }

        for (candidate, trusted) in self.rank_candidates(cur, candidates)? {
            chain.push(candidate);
            if self.extend(chain, trusted, accept)? {
                return Ok(true);
            }
            chain.pop();
        }
        Ok(false)
    }
}

/// `build_chain` finds a chain from `leaf` to a trusted certificate using issuer candidates from
/// `trusted` and `untrusted`. The first chain found is returned.
///
/// The chain holds at most `params.depth + 2` certificates, i.e., `params.depth` intermediates
/// plus the leaf and trust anchor. On failure, the returned [`NoPathError`] carries the status of
/// the deepest branch explored and that branch's partial chain. A branch that ended at a rejected
/// certificate is reported with `CertRejected` in preference to other failures.
pub fn build_chain<'a>(
    pe: &PkiEnvironment,
    leaf: &'a PDVCertificate,
    untrusted: &'a [PDVCertificate],
    trusted: TrustedCertificates<'a>,
    params: &VerifyParams,
) -> core::result::Result<CertificationPath<'a>, NoPathError<'a>> {
    build_chain_with(
        pe,
        leaf,
        untrusted,
        trusted,
        params,
        BuildOptions::new(params),
        &mut |_| true,
    )
}

/// `build_chain_with` works like [`build_chain`] but offers each chain that reaches a trusted
/// certificate to `accept`. When `accept` declines, the builder backtracks and keeps searching.
/// If no chain is accepted, the first chain found is returned so the caller can report its
/// problems.
///
/// When `options.budget` is spent the search stops. The first chain found is returned if there is
/// one, otherwise `BuildBudgetExceeded` with the branch being explored.
pub fn build_chain_with<'a>(
    pe: &PkiEnvironment,
    leaf: &'a PDVCertificate,
    untrusted: &'a [PDVCertificate],
    trusted: TrustedCertificates<'a>,
    params: &VerifyParams,
    options: BuildOptions,
    accept: &mut AcceptChain<'_, 'a>,
) -> core::result::Result<CertificationPath<'a>, NoPathError<'a>> {
    let mut search = ChainSearch {
        pe,
        params,
        untrusted,
        trusted,
        usage: trust_usage(params),
        toi: options.time_of_interest,
        max_len: params.depth.saturating_add(2),
        budget: options.budget,
        deepest: vec![],
        deepest_status: PathValidationStatus::UnableToGetIssuerCert,
        rejected: None,
        fallback: None,
    };

    let mut chain = vec![leaf];
    let leaf_trusted = in_trusted_set(&trusted, leaf);
    match search.extend(&mut chain, leaf_trusted, accept) {
        Ok(true) => {
            debug!(
                "Found chain with {} certificates for {}",
                chain.len(),
                leaf.subject()
            );
            return Ok(CertificationPath::new(chain));
        }
        Ok(false) => {}
        Err(status) if search.fallback.is_none() => {
            info!(
                "Stopped building a chain for {} after {} certificates: {}",
                leaf.subject(),
                chain.len(),
                status
            );
            return Err(NoPathError {
                status,
                partial_chain: chain,
            });
        }
        Err(status) => debug!("Chain search for {} stopped: {}", leaf.subject(), status),
    }

    if let Some(fallback) = search.fallback {
        debug!(
            "No chain for {} passed link checks, using the first chain found",
            leaf.subject()
        );
        return Ok(CertificationPath::new(fallback));
    }
    if let Some(rejected) = search.rejected {
        return Err(NoPathError {
            status: PathValidationStatus::CertRejected,
            partial_chain: rejected,
        });
    }
    Err(NoPathError {
        status: search.deepest_status,
        partial_chain: search.deepest,
    })
}
