mod common;

use common::*;
use const_oid::ObjectIdentifier;
use der::asn1::{Null, OctetString};
use der::Encode;
use x509_cert::ext::pkix::{CrlReason, KeyUsages};
use x509_cert::ext::Extension;
use x509verify::PathValidationStatus::*;
use x509verify::*;

fn crl_params() -> VerifyParams {
    let mut params = params();
    params.set_flag(VerifyFlags::CrlCheck);
    params
}

fn verify_with_crls(pki: &Pki, params: &VerifyParams, crls: &[PDVCrl]) -> VerifyOutcome {
    let pe = pe();
    let mut store = store_with(&[&pki.root]);
    for crl in crls {
        store.add_crl(crl.clone()).unwrap();
    }
    let untrusted = vec![pki.ca.clone()];
    let mut ctx = VerifyContext::new(&pe, &store, params, &pki.leaf).with_untrusted(&untrusted);
    ctx.verify(&mut default_verify_callback)
}

fn revoking_leaf(reason: Option<CrlReason>) -> CrlSpec {
    let mut spec = CrlSpec::new(CA, CA_KEY);
    spec.revoked = vec![(LEAF_KEY, reason)];
    spec
}

fn critical_unknown() -> Extension {
    Extension {
        extn_id: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.2"),
        critical: true,
        extn_value: OctetString::new(Null.to_der().unwrap()).unwrap(),
    }
}

#[test]
fn good_and_revoked() {
    let pki = default_pki();
    let params = crl_params();

    let empty = CrlSpec::new(CA, CA_KEY).mint();
    assert!(verify_with_crls(&pki, &params, &[empty]).accepted);

    let revoked = revoking_leaf(Some(CrlReason::KeyCompromise)).mint();
    let outcome = verify_with_crls(&pki, &params, &[revoked]);
    assert_eq!(CertRevoked, outcome.error);
    assert_eq!(0, outcome.error_depth);

    // revocation is not checked unless requested
    let revoked = revoking_leaf(None).mint();
    assert!(verify_with_crls(&pki, &self::params(), &[revoked]).accepted);
}

#[test]
fn missing_crl() {
    let pki = default_pki();
    let outcome = verify_with_crls(&pki, &crl_params(), &[]);
    assert_eq!(UnableToGetCrl, outcome.error);
}

#[test]
fn crl_problems() {
    let pki = default_pki();
    let params = crl_params();

    let mut wrong_key = CrlSpec::new(CA, CA_KEY);
    wrong_key.issuer_key = ROOT_KEY;
    let outcome = verify_with_crls(&pki, &params, &[wrong_key.mint()]);
    assert_eq!(CrlSignatureFailure, outcome.error);

    let mut stale = CrlSpec::new(CA, CA_KEY);
    stale.this_update = NOW - 7 * 86400;
    stale.next_update = Some(NOW - 86400);
    let outcome = verify_with_crls(&pki, &params, &[stale.mint()]);
    assert_eq!(CrlHasExpired, outcome.error);

    let mut early = CrlSpec::new(CA, CA_KEY);
    early.this_update = NOW + 3600;
    early.next_update = None;
    let outcome = verify_with_crls(&pki, &params, &[early.mint()]);
    assert_eq!(CrlNotYetValid, outcome.error);

    let mut critical = CrlSpec::new(CA, CA_KEY);
    critical.extra = vec![critical_unknown()];
    let outcome = verify_with_crls(&pki, &params, &[critical.mint()]);
    assert_eq!(UnhandledCriticalCrlExtension, outcome.error);
}

#[test]
fn crl_issuer_needs_crl_sign() {
    let mut ca = ca_spec();
    ca.key_usage = Some(KeyUsages::KeyCertSign.into());
    let pki = three_tier(root_spec(), ca, leaf_spec());
    let outcome = verify_with_crls(&pki, &crl_params(), &[CrlSpec::new(CA, CA_KEY).mint()]);
    assert_eq!(KeyUsageNoCrlSign, outcome.error);
}

#[test]
fn newest_current_crl_is_used() {
    let pki = default_pki();
    let mut older = revoking_leaf(None);
    older.this_update = NOW - 7200;
    let mut newer = CrlSpec::new(CA, CA_KEY);
    newer.number = Some(2);
    let older = older.mint();
    let newer = newer.mint();

    let options = CrlCheckOptions {
        time_of_interest: NOW,
        no_check_time: false,
        use_deltas: false,
    };
    let report = check_crl_status(&pe(), &pki.leaf, &pki.ca, &[&older, &newer], &options);
    assert_eq!(Some(&newer), report.crl);
    assert!(report.findings.is_empty());
    assert!(!report.is_revoked());
}

#[test]
fn delta_crls() {
    let pki = default_pki();
    let complete = CrlSpec::new(CA, CA_KEY).mint();
    let mut delta = revoking_leaf(Some(CrlReason::KeyCompromise));
    delta.number = Some(2);
    delta.base = Some(1);
    let delta = delta.mint();
    let crls = vec![complete, delta];

    let mut params = crl_params();
    assert!(verify_with_crls(&pki, &params, &crls).accepted);

    params.set_flag(VerifyFlags::UseDeltas);
    let outcome = verify_with_crls(&pki, &params, &crls);
    assert_eq!(CertRevoked, outcome.error);
}

#[test]
fn delta_removes_hold() {
    let pki = default_pki();
    let complete = revoking_leaf(Some(CrlReason::CertificateHold)).mint();
    let mut delta = revoking_leaf(Some(CrlReason::RemoveFromCRL));
    delta.number = Some(2);
    delta.base = Some(1);
    let crls = vec![complete, delta.mint()];

    let mut params = crl_params();
    assert_eq!(CertRevoked, verify_with_crls(&pki, &params, &crls).error);

    params.set_flag(VerifyFlags::UseDeltas);
    assert!(verify_with_crls(&pki, &params, &crls).accepted);
}

#[test]
fn crl_check_all() {
    let pki = default_pki();
    let leaf_crl = CrlSpec::new(CA, CA_KEY).mint();
    let mut ca_crl = CrlSpec::new(ROOT, ROOT_KEY);
    ca_crl.revoked = vec![(CA_KEY, None)];
    let crls = vec![leaf_crl, ca_crl.mint()];

    let params = crl_params();
    assert!(verify_with_crls(&pki, &params, &crls).accepted);

    let mut params = self::params();
    params.set_flag(VerifyFlags::CrlCheckAll);
    let outcome = verify_with_crls(&pki, &params, &crls);
    assert_eq!(CertRevoked, outcome.error);
    assert_eq!(1, outcome.error_depth);
}

#[test]
fn crl_override_and_current_crl() {
    let pki = default_pki();
    let pe = pe();
    let store = store_with(&[&pki.root]);
    let untrusted = vec![pki.ca.clone()];
    let crls = vec![revoking_leaf(None).mint()];
    let params = crl_params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &pki.leaf)
        .with_untrusted(&untrusted)
        .with_crls(&crls);
    let mut seen = None;
    let outcome = ctx.verify(&mut |ok: bool, ctx: &VerifyContext<'_>| {
        if !ok {
            seen = ctx.current_crl().map(|c| c.crl_number.clone());
        }
        ok
    });
    assert_eq!(CertRevoked, outcome.error);
    assert_eq!(Some(Some(vec![1])), seen);
}
