mod common;

use common::*;
use const_oid::db::rfc5912::ID_KP_CLIENT_AUTH;
use const_oid::ObjectIdentifier;
use der::asn1::Null;
use x509_cert::ext::pkix::{BasicConstraints, KeyUsages};
use x509_cert::ext::Extension;
use x509verify::PathValidationStatus::*;
use x509verify::*;

/// Verifies `pki.leaf` with `pki.root` in the store and `pki.ca` as an untrusted intermediate
fn run(pki: &Pki, params: &VerifyParams, cb: &mut dyn VerifyCallback) -> VerifyOutcome {
    let pe = pe();
    let store = store_with(&[&pki.root]);
    let untrusted = vec![pki.ca.clone()];
    let mut ctx = VerifyContext::new(&pe, &store, params, &pki.leaf).with_untrusted(&untrusted);
    ctx.verify(cb)
}

fn rejected(pki: &Pki, params: &VerifyParams) -> (PathValidationStatus, usize) {
    let outcome = run(pki, params, &mut default_verify_callback);
    assert!(!outcome.accepted);
    (outcome.error, outcome.error_depth)
}

#[test]
fn accepts_valid_chain() {
    let pki = default_pki();
    let pe = pe();
    let store = store_with(&[&pki.root]);
    let untrusted = vec![pki.ca.clone()];
    let params = params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &pki.leaf).with_untrusted(&untrusted);
    let mut events = vec![];
    let outcome = ctx.verify(&mut |ok: bool, ctx: &VerifyContext<'_>| {
        events.push((ok, ctx.error_depth()));
        ok
    });
    assert!(outcome.accepted);
    assert_eq!(PathValidationStatus::Ok, outcome.error);
    assert!(outcome.overridden.is_empty());
    assert_eq!(vec![(true, 0), (true, 1), (true, 2)], events);
    assert_eq!(VerifyState::Accepted, ctx.state());
    assert_eq!(3, ctx.chain().len());
    assert!(ctx.is_chain_complete());
    assert!(ctx.policy_tree().is_some());
}

#[test]
fn expired_leaf_can_be_overridden() {
    let mut leaf = leaf_spec();
    leaf.not_after = NOW - 1;
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    let params = params();

    assert_eq!((CertHasExpired, 0), rejected(&pki, &params));

    let outcome = run(&pki, &params, &mut AllowList::new([CertHasExpired]));
    assert!(outcome.accepted);
    assert_eq!(vec![(CertHasExpired, 0)], outcome.overridden);

    let mut arbiter = Arbiter(|kind: ErrorKind, _ctx: &VerifyContext<'_>| {
        if ErrorKind::Validity == kind {
            OverrideDecision::Accept
        } else {
            OverrideDecision::Reject
        }
    });
    assert!(run(&pki, &params, &mut arbiter).accepted);

    let mut strict = params.clone();
    strict.non_overridable.insert(CertHasExpired);
    let outcome = run(&pki, &strict, &mut AllowList::new([CertHasExpired]));
    assert!(!outcome.accepted);
    assert_eq!(CertHasExpired, outcome.error);
}

#[test]
fn not_yet_valid_and_no_check_time() {
    let mut ca = ca_spec();
    ca.not_before = NOW + 100;
    let pki = three_tier(root_spec(), ca, leaf_spec());
    let mut params = params();
    assert_eq!((CertNotYetValid, 1), rejected(&pki, &params));

    params.set_flag(VerifyFlags::NoCheckTime);
    assert!(run(&pki, &params, &mut default_verify_callback).accepted);
}

#[test]
fn callback_can_decline_success() {
    let pki = default_pki();
    let params = params();
    let outcome = run(&pki, &params, &mut |ok: bool, ctx: &VerifyContext<'_>| {
        ok && 1 != ctx.error_depth()
    });
    assert!(!outcome.accepted);
    assert_eq!(ApplicationVerification, outcome.error);
    assert_eq!(1, outcome.error_depth);
}

#[test]
fn verify_is_repeatable() {
    let mut leaf = leaf_spec();
    leaf.not_after = NOW - 1;
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    let pe = pe();
    let store = store_with(&[&pki.root]);
    let untrusted = vec![pki.ca.clone()];
    let params = params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &pki.leaf).with_untrusted(&untrusted);
    let mut cb = AllowList::new([CertHasExpired]);
    let first = ctx.verify(&mut cb);
    let second = ctx.verify(&mut cb);
    assert_eq!(first, second);
    assert_eq!(1, second.overridden.len());
}

#[test]
fn internal_errors_are_fatal() {
    let pki = default_pki();
    let mut params = params();
    params.policies = vec![String::from("not an oid")];
    let mut calls = 0;
    let outcome = run(&pki, &params, &mut |_ok: bool, ctx: &VerifyContext<'_>| {
        if InternalError == ctx.error() {
            calls += 1;
        }
        true
    });
    assert!(!outcome.accepted);
    assert_eq!(InternalError, outcome.error);
    assert_eq!(1, calls);
}

#[test]
fn missing_issuer_reports_partial_chain() {
    let pki = default_pki();
    let pe = pe();
    let store = CertificateStore::new();
    let untrusted = vec![pki.ca.clone()];
    let params = params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &pki.leaf).with_untrusted(&untrusted);
    let outcome = ctx.verify(&mut default_verify_callback);
    assert_eq!(UnableToGetIssuerCert, outcome.error);
    assert_eq!(1, outcome.error_depth);
    assert!(!ctx.is_chain_complete());
    assert_eq!(2, ctx.chain().len());
    assert_eq!(VerifyState::Rejected, ctx.state());

    // overriding the failure validates what was found
    let outcome = ctx.verify(&mut AllowList::new([UnableToGetIssuerCert]));
    assert!(outcome.accepted);
}

#[test]
fn trusted_list_replaces_store() {
    let pki = default_pki();
    let pe = pe();
    let store = CertificateStore::new();
    let untrusted = vec![pki.ca.clone()];
    let trusted = vec![pki.root.clone()];
    let params = params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &pki.leaf)
        .with_untrusted(&untrusted)
        .with_trusted(&trusted);
    assert!(ctx.verify(&mut default_verify_callback).accepted);
}

#[test]
fn bad_signature() {
    let mut leaf = leaf_spec();
    leaf.issuer_key = 9;
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    assert_eq!((CertSignatureFailure, 0), rejected(&pki, &params()));
}

#[test]
fn self_signature_of_anchor_checked_on_request() {
    let mut root = root_spec();
    root.issuer_key = 9;
    let pki = three_tier(root, ca_spec(), leaf_spec());
    let mut params = params();
    assert!(run(&pki, &params, &mut default_verify_callback).accepted);

    params.set_flag(VerifyFlags::CheckSelfSigned);
    assert_eq!((CertSignatureFailure, 2), rejected(&pki, &params));
}

#[test]
fn path_length() {
    let root = root_spec().mint();
    let mut ca1 = ca_spec();
    ca1.basic_constraints = Some(BasicConstraints {
        ca: true,
        path_len_constraint: Some(0),
    });
    let ca1 = ca1.mint();
    let ca2 = CertSpec::ca("CN=Sub CA,O=Example,C=US", CA, 5, CA_KEY).mint();
    let leaf = CertSpec::leaf(LEAF, "CN=Sub CA,O=Example,C=US", LEAF_KEY, 5).mint();

    let pe = pe();
    let store = store_with(&[&root]);
    let untrusted = vec![ca1, ca2];
    let params = params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &leaf).with_untrusted(&untrusted);
    let outcome = ctx.verify(&mut default_verify_callback);
    assert_eq!(PathLengthExceeded, outcome.error);
    assert_eq!(2, outcome.error_depth);
}

#[test]
fn issuer_must_be_a_ca() {
    let mut ca = ca_spec();
    ca.basic_constraints = None;
    let pki = three_tier(root_spec(), ca, leaf_spec());
    assert_eq!((InvalidCa, 1), rejected(&pki, &params()));

    let mut ca = ca_spec();
    ca.key_usage = Some(KeyUsages::DigitalSignature.into());
    let pki = three_tier(root_spec(), ca, leaf_spec());
    assert_eq!((KeyUsageNoCertSign, 1), rejected(&pki, &params()));
}

#[test]
fn anchor_without_basic_constraints() {
    let mut root = root_spec();
    root.basic_constraints = None;
    let pki = three_tier(root, ca_spec(), leaf_spec());
    let mut params = params();
    assert!(run(&pki, &params, &mut default_verify_callback).accepted);

    params.set_flag(VerifyFlags::X509Strict);
    assert_eq!((InvalidCa, 2), rejected(&pki, &params));
}

#[test]
fn strict_extension_checks() {
    let mut leaf = leaf_spec();
    leaf.basic_constraints = Some(BasicConstraints {
        ca: false,
        path_len_constraint: Some(1),
    });
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    let mut params = params();
    assert!(run(&pki, &params, &mut default_verify_callback).accepted);

    params.set_flag(VerifyFlags::X509Strict);
    assert_eq!((InvalidExtension, 0), rejected(&pki, &params));
}

#[test]
fn purpose() {
    let mut leaf = leaf_spec();
    leaf.eku = vec![ID_KP_CLIENT_AUTH];
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    let mut params = params();
    params.purpose = Some(Purpose::SslClient);
    assert!(run(&pki, &params, &mut default_verify_callback).accepted);

    params.purpose = Some(Purpose::SslServer);
    assert_eq!((InvalidPurpose, 0), rejected(&pki, &params));
}

#[test]
fn name_constraints() {
    let mut ca = ca_spec();
    ca.name_constraints = Some(dns_constraint("example.com"));

    let mut inside = leaf_spec();
    inside.dns_names = vec![String::from("www.example.com")];
    let pki = three_tier(root_spec(), ca.clone(), inside);
    assert!(run(&pki, &params(), &mut default_verify_callback).accepted);

    let mut outside = leaf_spec();
    outside.dns_names = vec![String::from("www.example.org")];
    let pki = three_tier(root_spec(), ca, outside);
    assert_eq!((NameConstraintsViolation, 0), rejected(&pki, &params()));
}

#[test]
fn unhandled_critical_extension() {
    let mut leaf = leaf_spec();
    leaf.extra = vec![Extension {
        extn_id: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1"),
        critical: true,
        extn_value: der::asn1::OctetString::new(der::Encode::to_der(&Null).unwrap()).unwrap(),
    }];
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    let mut params = params();
    assert_eq!((UnhandledCriticalExtension, 0), rejected(&pki, &params));

    params.set_flag(VerifyFlags::IgnoreCritical);
    assert!(run(&pki, &params, &mut default_verify_callback).accepted);
}

#[test]
fn callback_sees_current_certificate() {
    let mut leaf = leaf_spec();
    leaf.not_after = NOW - 1;
    let pki = three_tier(root_spec(), ca_spec(), leaf);
    let params = params();
    let mut seen = None;
    let outcome = run(&pki, &params, &mut |ok: bool, ctx: &VerifyContext<'_>| {
        if !ok {
            seen = ctx.current_cert().map(|c| c.subject().to_string());
        }
        ok
    });
    assert!(!outcome.accepted);
    assert_eq!(Some(name(LEAF).to_string()), seen);
}

#[test]
fn unusable_issuer_is_passed_over() {
    let root = root_spec().mint();
    let good = ca_spec().mint();
    let leaf = leaf_spec().mint();
    // same name and key as the good CA
    let mut not_ca = ca_spec();
    not_ca.serial = 50;
    not_ca.basic_constraints = Some(BasicConstraints {
        ca: false,
        path_len_constraint: None,
    });
    let mut no_cert_sign = ca_spec();
    no_cert_sign.serial = 51;
    no_cert_sign.key_usage = Some(KeyUsages::CRLSign.into());

    let pe = pe();
    let store = store_with(&[&root]);
    let params = params();
    for bad in [not_ca.mint(), no_cert_sign.mint()] {
        let untrusted = vec![bad, good.clone()];
        let mut ctx = VerifyContext::new(&pe, &store, &params, &leaf).with_untrusted(&untrusted);
        let outcome = ctx.verify(&mut default_verify_callback);
        assert!(outcome.accepted);
        assert_eq!(good.encoded_cert, ctx.chain()[1].encoded_cert);
    }

    // with no usable alternative the first chain found is reported
    let untrusted = vec![not_ca.mint()];
    let mut ctx = VerifyContext::new(&pe, &store, &params, &leaf).with_untrusted(&untrusted);
    let outcome = ctx.verify(&mut default_verify_callback);
    assert_eq!(InvalidCa, outcome.error);
    assert_eq!(1, outcome.error_depth);
    assert!(ctx.is_chain_complete());
}

#[test]
fn reference_time_fixed_per_verification() {
    let pki = default_pki();
    let pe = pe();
    let store = store_with(&[&pki.root]);
    let untrusted = vec![pki.ca.clone()];

    let params = params();
    let mut ctx = VerifyContext::new(&pe, &store, &params, &pki.leaf).with_untrusted(&untrusted);
    assert!(ctx.verify(&mut default_verify_callback).accepted);
    assert_eq!(NOW, ctx.time_of_interest());

    let current = VerifyParams::default();
    let mut ctx = VerifyContext::new(&pe, &store, &current, &pki.leaf).with_untrusted(&untrusted);
    let mut seen = vec![];
    let outcome = ctx.verify(&mut |ok: bool, ctx: &VerifyContext<'_>| {
        seen.push(ctx.time_of_interest());
        ok
    });
    assert!(outcome.accepted);
    assert_eq!(3, seen.len());
    assert!(seen.iter().all(|t| *t == ctx.time_of_interest()));
    assert!(ctx.time_of_interest() > NOW);
}
