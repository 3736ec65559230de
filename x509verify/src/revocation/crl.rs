//! CRL processing for a single certificate
//!
//! [`check_crl_status`] selects a complete CRL (and, optionally, a delta CRL) for a certificate
//! from a set of candidate CRLs, verifies the selected CRLs and determines whether the
//! certificate is revoked. Indirect CRLs, attribute certificate CRLs and CRLs partitioned by
//! reason code are not used.

use const_oid::db::rfc5280::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_CRL_NUMBER, ID_CE_CRL_REASONS,
    ID_CE_DELTA_CRL_INDICATOR, ID_CE_FRESHEST_CRL, ID_CE_HOLD_INSTRUCTION_CODE,
    ID_CE_INVALIDITY_DATE, ID_CE_ISSUING_DISTRIBUTION_POINT,
};
use core::cmp::Ordering;
use der::Decode;
use log::{debug, info};
use x509_cert::crl::RevokedCert;
use x509_cert::ext::pkix::{CrlReason, KeyUsages};
use x509_cert::ext::Extensions;

use crate::{
    environment::pki_environment::PkiEnvironment,
    revocation::pdv_crl::*,
    util::error::*,
    util::pdv_utilities::*,
    validator::pdv_certificate::{DeferDecodeSigned, PDVCertificate},
};

/// Options that govern CRL processing for one certificate
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CrlCheckOptions {
    /// Reference time, as seconds since the Unix epoch
    pub time_of_interest: u64,
    /// Skip thisUpdate/nextUpdate checks
    pub no_check_time: bool,
    /// Consult delta CRLs
    pub use_deltas: bool,
}

/// `CrlCheckReport` is the result of [`check_crl_status`]. `findings` lists problems in the order
/// they were detected, each paired with the CRL it concerns. An empty list means the certificate
/// is not revoked and the CRLs used were acceptable.
#[derive(Clone, Debug, Default)]
pub struct CrlCheckReport<'a> {
    /// Complete CRL selected for the certificate
    pub crl: Option<&'a PDVCrl>,
    /// Delta CRL consulted in addition to the complete CRL
    pub delta: Option<&'a PDVCrl>,
    /// Problems found, in the order they were detected
    pub findings: Vec<(PathValidationStatus, Option<&'a PDVCrl>)>,
}

impl<'a> CrlCheckReport<'a> {
    /// Returns true if the certificate was found to be revoked
    pub fn is_revoked(&self) -> bool {
        self.findings
            .iter()
            .any(|(s, _)| PathValidationStatus::CertRevoked == *s)
    }
}

/// `verify_crl_signature` verifies the signature on `crl` using the public key from `issuer`.
///
/// Returns `CrlSignatureFailure` or `UnableToDecodeIssuerPublicKey` on failure, or
/// `InternalError` if the encoded CRL cannot be split into its signed parts.
pub fn verify_crl_signature(
    pe: &PkiEnvironment,
    crl: &PDVCrl,
    issuer: &PDVCertificate,
) -> Result<()> {
    let defer_crl = match DeferDecodeSigned::from_der(crl.encoded_crl.as_slice()) {
        Ok(c) => c,
        Err(e) => {
            log_error_for_name(crl.issuer(), format!("failed to split CRL: {}", e).as_str());
            return Err(Error::PathValidation(PathValidationStatus::InternalError));
        }
    };
    match pe.verify_signature_message(
        &defer_crl.tbs_field,
        defer_crl.signature.raw_bytes(),
        &defer_crl.signature_algorithm,
        &issuer
            .decoded_cert
            .tbs_certificate
            .subject_public_key_info,
    ) {
        Ok(()) => Ok(()),
        Err(Error::PathValidation(PathValidationStatus::CertSignatureFailure)) => {
            log_error_for_name(crl.issuer(), "CRL signature verification failed");
            Err(Error::PathValidation(
                PathValidationStatus::CrlSignatureFailure,
            ))
        }
        Err(e) => Err(e),
    }
}

/// Critical CRL extensions that are understood
const CRL_EXTS_HANDLED: &[const_oid::ObjectIdentifier] = &[
    ID_CE_ISSUING_DISTRIBUTION_POINT,
    ID_CE_DELTA_CRL_INDICATOR,
    ID_CE_FRESHEST_CRL,
    ID_CE_CRL_NUMBER,
    ID_CE_AUTHORITY_KEY_IDENTIFIER,
];

/// Critical CRL entry extensions that are understood. Hold instructions are ignored with the
/// certificate treated as revoked.
const CRL_ENTRY_EXTS_HANDLED: &[const_oid::ObjectIdentifier] = &[
    ID_CE_INVALIDITY_DATE,
    ID_CE_CRL_REASONS,
    ID_CE_HOLD_INSTRUCTION_CODE,
];

fn has_unhandled_critical(exts: &Option<Extensions>, handled: &[const_oid::ObjectIdentifier]) -> bool {
    match exts {
        Some(exts) => exts
            .iter()
            .any(|e| e.critical && !handled.contains(&e.extn_id)),
        None => false,
    }
}

/// `unhandled_critical_crl_extension` returns true if the CRL or any of its entries carries a
/// critical extension that is not understood.
pub fn unhandled_critical_crl_extension(crl: &PDVCrl) -> bool {
    has_unhandled_critical(&crl.decoded_crl.tbs_cert_list.crl_extensions, CRL_EXTS_HANDLED)
        || crl
            .entries()
            .iter()
            .any(|rc| has_unhandled_critical(&rc.crl_entry_extensions, CRL_ENTRY_EXTS_HANDLED))
}

/// `entry_reason` returns the reasonCode of a CRL entry, if present and decodable
pub fn entry_reason(rc: &RevokedCert) -> Option<CrlReason> {
    rc.crl_entry_extensions
        .as_ref()?
        .iter()
        .find(|e| e.extn_id == ID_CE_CRL_REASONS)
        .and_then(|e| CrlReason::from_der(e.extn_value.as_bytes()).ok())
}

fn find_entry<'a>(crl: &'a PDVCrl, cert: &PDVCertificate) -> Option<&'a RevokedCert> {
    crl.entries()
        .iter()
        .find(|rc| rc.serial_number.as_bytes() == cert.serial())
}

/// `crl_in_scope` returns true if `crl` was issued by the issuer of `cert` and its
/// issuingDistributionPoint, if any, covers `cert`.
pub fn crl_in_scope(crl: &PDVCrl, cert: &PDVCertificate) -> bool {
    if !compare_names(crl.issuer(), cert.issuer()) {
        return false;
    }
    if crl.is_indirect() || crl.only_some_reasons() {
        return false;
    }
    let is_ca = matches!(cert.basic_constraints(), Some(bc) if bc.ca);
    match crl.coverage() {
        CrlCoverage::All => true,
        CrlCoverage::EeOnly => !is_ca,
        CrlCoverage::CaOnly => is_ca,
        CrlCoverage::AttributeOnly => false,
    }
}

fn rank(crl: &PDVCrl, options: &CrlCheckOptions) -> (bool, u64) {
    let current = options.no_check_time || crl.valid_at_time(options.time_of_interest).is_ok();
    (current, crl.this_update())
}

/// Verifies a selected CRL, adding problems to `findings`
fn check_crl<'a>(
    pe: &PkiEnvironment,
    crl: &'a PDVCrl,
    issuer: &PDVCertificate,
    options: &CrlCheckOptions,
    findings: &mut Vec<(PathValidationStatus, Option<&'a PDVCrl>)>,
) {
    if let Some(ku) = issuer.key_usage() {
        if !ku.0.contains(KeyUsages::CRLSign) {
            info!(
                "Key usage of CRL issuer {} does not include cRLSign",
                name_to_string(issuer.subject())
            );
            findings.push((PathValidationStatus::KeyUsageNoCrlSign, Some(crl)));
        }
    }

    if let Err(e) = verify_crl_signature(pe, crl, issuer) {
        let status = match e {
            Error::PathValidation(s) => s,
            _ => PathValidationStatus::CrlSignatureFailure,
        };
        findings.push((status, Some(crl)));
    }

    if !options.no_check_time {
        if let Err(status) = crl.valid_at_time(options.time_of_interest) {
            info!(
                "CRL from {} is not valid at {}: {}",
                name_to_string(crl.issuer()),
                options.time_of_interest,
                status
            );
            findings.push((status, Some(crl)));
        }
    }

    if unhandled_critical_crl_extension(crl) {
        log_error_for_name(crl.issuer(), "CRL contains an unhandled critical extension");
        findings.push((PathValidationStatus::UnhandledCriticalCrlExtension, Some(crl)));
    }
}

/// `check_crl_status` determines the revocation status of `cert`, issued by `issuer`, using CRLs
/// drawn from `candidates`.
///
/// The complete CRL chosen is the newest in-scope CRL that is valid at the reference time, else
/// the newest in-scope CRL. When `options.use_deltas` is set, a delta CRL whose BaseCRLNumber is
/// no greater than the complete CRL's number and whose own number is greater is consulted too.
/// An entry in the delta CRL with reason removeFromCRL restores a certificate revoked by the
/// complete CRL.
pub fn check_crl_status<'a>(
    pe: &PkiEnvironment,
    cert: &PDVCertificate,
    issuer: &PDVCertificate,
    candidates: &[&'a PDVCrl],
    options: &CrlCheckOptions,
) -> CrlCheckReport<'a> {
    let mut report = CrlCheckReport::default();

    let in_scope: Vec<&'a PDVCrl> = candidates
        .iter()
        .filter(|crl| crl_in_scope(crl, cert))
        .copied()
        .collect();

    let crl = match in_scope
        .iter()
        .filter(|crl| !crl.is_delta())
        .max_by_key(|crl| rank(crl, options))
    {
        Some(crl) => *crl,
        None => {
            info!(
                "No CRL available for certificate issued to {}",
                name_to_string(cert.subject())
            );
            report
                .findings
                .push((PathValidationStatus::UnableToGetCrl, None));
            return report;
        }
    };
    report.crl = Some(crl);
    check_crl(pe, crl, issuer, options, &mut report.findings);

    if options.use_deltas {
        if let Some(number) = &crl.crl_number {
            report.delta = in_scope
                .iter()
                .filter(|d| match (&d.base_crl_number, &d.crl_number) {
                    (Some(base), Some(delta_number)) => {
                        Ordering::Greater != compare_crl_numbers(base, number)
                            && Ordering::Greater == compare_crl_numbers(delta_number, number)
                    }
                    _ => false,
                })
                .max_by_key(|d| rank(d, options))
                .copied();
        }
        if let Some(delta) = report.delta {
            debug!(
                "Using delta CRL from {} with complete CRL",
                name_to_string(delta.issuer())
            );
            check_crl(pe, delta, issuer, options, &mut report.findings);
        }
    }

    let revoked_by = match report.delta.and_then(|d| find_entry(d, cert).map(|e| (d, e))) {
        Some((delta, entry)) => match entry_reason(entry) {
            Some(CrlReason::RemoveFromCRL) => None,
            _ => Some(delta),
        },
        None => match find_entry(crl, cert) {
            Some(entry) if Some(CrlReason::RemoveFromCRL) != entry_reason(entry) => Some(crl),
            _ => None,
        },
    };
    if let Some(revoked_by) = revoked_by {
        info!(
            "Certificate issued to {} with serial {} is revoked",
            name_to_string(cert.subject()),
            buffer_to_hex(cert.serial())
        );
        report
            .findings
            .push((PathValidationStatus::CertRevoked, Some(revoked_by)));
    }
    report
}
