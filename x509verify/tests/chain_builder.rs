mod common;

use common::*;
use const_oid::db::rfc5912::{ANY_EXTENDED_KEY_USAGE, ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH};
use x509verify::*;

#[test]
fn builds_three_tier_chain() {
    let pki = default_pki();
    let store = store_with(&[&pki.root]);
    let untrusted = vec![pki.ca.clone()];
    let params = params();
    let path = build_chain(
        &pe(),
        &pki.leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap();
    assert_eq!(3, path.len());
    assert_eq!(Some(&pki.leaf), path.target());
    assert_eq!(Some(&pki.root), path.trust_anchor());
    assert_eq!(vec![&untrusted[0]], path.intermediates());
}

#[test]
fn backtracks_past_dead_end_issuer() {
    let root = root_spec().mint();
    // same name and key as the good CA but issued by an unknown root
    let mut stray = ca_spec();
    stray.issuer = String::from("CN=Other Root,O=Example,C=US");
    stray.issuer_key = 9;
    stray.serial = 99;
    let stray = stray.mint();
    let good = ca_spec().mint();
    let mut leaf = leaf_spec();
    leaf.akid = false;
    let leaf = leaf.mint();

    let store = store_with(&[&root]);
    let untrusted = vec![stray, good.clone()];
    let params = params();
    let path = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap();
    assert_eq!(3, path.len());
    assert_eq!(good.encoded_cert, path.chain[1].encoded_cert);
}

#[test]
fn prefers_matching_key_identifier_across_rollover() {
    let root = root_spec().mint();
    let old_ca = ca_spec().mint();
    let mut new_ca = ca_spec();
    new_ca.key = 4;
    new_ca.serial = 4;
    let new_ca = new_ca.mint();
    let mut leaf = leaf_spec();
    leaf.issuer_key = 4;
    let leaf = leaf.mint();

    let store = store_with(&[&root]);
    let untrusted = vec![old_ca, new_ca.clone()];
    let params = params();
    let path = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap();
    assert_eq!(new_ca.encoded_cert, path.chain[1].encoded_cert);
}

#[test]
fn prefers_issuer_valid_at_reference_time() {
    let root = root_spec().mint();
    let mut expired = ca_spec();
    expired.not_after = NOW - 10;
    expired.serial = 50;
    let expired = expired.mint();
    let current = ca_spec().mint();
    let leaf = leaf_spec().mint();

    let store = store_with(&[&root]);
    let untrusted = vec![expired, current.clone()];
    let params = params();
    let path = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap();
    assert_eq!(current.encoded_cert, path.chain[1].encoded_cert);
}

#[test]
fn reports_missing_issuer() {
    let pki = default_pki();
    let store = CertificateStore::new();
    let params = params();
    let err = build_chain(
        &pe(),
        &pki.leaf,
        &[],
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::UnableToGetIssuerCert, err.status);
    assert_eq!(vec![&pki.leaf], err.partial_chain);
}

#[test]
fn enforces_depth_limit() {
    let root = root_spec().mint();
    let ca1 = ca_spec().mint();
    let ca2 = CertSpec::ca("CN=Sub CA,O=Example,C=US", CA, 5, CA_KEY).mint();
    let leaf = CertSpec::leaf(LEAF, "CN=Sub CA,O=Example,C=US", LEAF_KEY, 5).mint();
    let store = store_with(&[&root]);
    let untrusted = vec![ca1, ca2];

    let mut params = params();
    params.depth = 1;
    let err = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::CertChainTooLong, err.status);
    assert_eq!(3, err.partial_chain.len());

    params.depth = 2;
    let path = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap();
    assert_eq!(4, path.len());
}

#[test]
fn detects_loops() {
    let a = CertSpec::ca("CN=A,C=US", "CN=B,C=US", 10, 11).mint();
    let b = CertSpec::ca("CN=B,C=US", "CN=A,C=US", 11, 10).mint();
    let leaf = CertSpec::leaf(LEAF, "CN=A,C=US", LEAF_KEY, 10).mint();
    let store = CertificateStore::new();
    let untrusted = vec![a, b];
    let params = params();
    let err = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::PathLoop, err.status);
    assert_eq!(3, err.partial_chain.len());
}

/// Five certificates for X issued by Y and five for Y issued by X, all with valid signatures
fn cross_certified() -> Vec<PDVCertificate> {
    let mut certs = vec![];
    for serial in 0..5 {
        let mut x = CertSpec::ca("CN=X,C=US", "CN=Y,C=US", 10, 11);
        x.serial = 20 + serial;
        certs.push(x.mint());
        let mut y = CertSpec::ca("CN=Y,C=US", "CN=X,C=US", 11, 10);
        y.serial = 30 + serial;
        certs.push(y.mint());
    }
    certs
}

#[test]
fn loops_detected_by_subject_and_key() {
    let leaf = CertSpec::leaf(LEAF, "CN=X,C=US", LEAF_KEY, 10).mint();
    let store = CertificateStore::new();
    let untrusted = cross_certified();
    let params = params();
    let err = build_chain(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::PathLoop, err.status);
    assert_eq!(3, err.partial_chain.len());
}

#[test]
fn search_budget() {
    let leaf = CertSpec::leaf(LEAF, "CN=X,C=US", LEAF_KEY, 10).mint();
    let store = CertificateStore::new();
    let untrusted = cross_certified();
    let params = params();
    let mut options = BuildOptions::new(&params);
    options.budget.signatures = 8;
    let err = build_chain_with(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
        options,
        &mut |_| true,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::BuildBudgetExceeded, err.status);
    assert_eq!(2, err.partial_chain.len());

    let mut options = BuildOptions::new(&params);
    options.budget.build_calls = 1;
    let err = build_chain_with(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
        options,
        &mut |_| true,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::BuildBudgetExceeded, err.status);
}

#[test]
fn declined_chains_are_kept_as_last_resort() {
    let root = root_spec().mint();
    let first = ca_spec().mint();
    let mut second = ca_spec();
    second.serial = 60;
    let second = second.mint();
    let leaf = leaf_spec().mint();
    let store = store_with(&[&root]);
    let untrusted = vec![first.clone(), second.clone()];
    let params = params();

    let mut offered = 0;
    let path = build_chain_with(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
        BuildOptions::new(&params),
        &mut |chain: &[&PDVCertificate]| {
            offered += 1;
            chain[1].encoded_cert == second.encoded_cert
        },
    )
    .unwrap();
    assert_eq!(2, offered);
    assert_eq!(second.encoded_cert, path.chain[1].encoded_cert);

    let path = build_chain_with(
        &pe(),
        &leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
        BuildOptions::new(&params),
        &mut |_| false,
    )
    .unwrap();
    assert_eq!(first.encoded_cert, path.chain[1].encoded_cert);
}

#[test]
fn untrusted_self_signed_certificates() {
    let pki = default_pki();
    let store = CertificateStore::new();
    let params = params();

    let err = build_chain(
        &pe(),
        &pki.root,
        &[],
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::DepthZeroSelfSignedCert, err.status);

    let untrusted = vec![pki.ca.clone(), pki.root.clone()];
    let err = build_chain(
        &pe(),
        &pki.leaf,
        &untrusted,
        TrustedCertificates::Store(&store),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::SelfSignedCertInChain, err.status);
    assert_eq!(3, err.partial_chain.len());
}

#[test]
fn trust_annotations() {
    let pki = default_pki();
    let untrusted = vec![pki.ca.clone()];
    let mut params = params();
    params.purpose = Some(Purpose::SslServer);

    let mut rejected_root = pki.root.clone();
    rejected_root.add_reject_object(ID_KP_SERVER_AUTH);
    let trusted = vec![rejected_root];
    let err = build_chain(
        &pe(),
        &pki.leaf,
        &untrusted,
        TrustedCertificates::List(&trusted),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::CertRejected, err.status);

    // a trusted root annotated for another usage only
    let mut client_root = pki.root.clone();
    client_root.add_trust_object(ID_KP_CLIENT_AUTH);
    let trusted = vec![client_root];
    let err = build_chain(
        &pe(),
        &pki.leaf,
        &untrusted,
        TrustedCertificates::List(&trusted),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::CertUntrusted, err.status);
    assert_eq!(3, err.partial_chain.len());

    // an annotated intermediate terminates the chain without PartialChain
    let mut trusted_ca = pki.ca.clone();
    trusted_ca.add_trust_object(ANY_EXTENDED_KEY_USAGE);
    let trusted = vec![trusted_ca];
    let path = build_chain(
        &pe(),
        &pki.leaf,
        &[],
        TrustedCertificates::List(&trusted),
        &params,
    )
    .unwrap();
    assert_eq!(2, path.len());
}

#[test]
fn partial_chain_flag() {
    let pki = default_pki();
    let trusted = vec![pki.ca.clone()];
    let mut params = params();

    let err = build_chain(
        &pe(),
        &pki.leaf,
        &[],
        TrustedCertificates::List(&trusted),
        &params,
    )
    .unwrap_err();
    assert_eq!(PathValidationStatus::UnableToGetIssuerCert, err.status);
    assert_eq!(2, err.partial_chain.len());

    params.set_flag(VerifyFlags::PartialChain);
    let path = build_chain(
        &pe(),
        &pki.leaf,
        &[],
        TrustedCertificates::List(&trusted),
        &params,
    )
    .unwrap();
    assert_eq!(2, path.len());
    assert_eq!(Some(&trusted[0]), path.trust_anchor());
}

#[test]
fn store_lookups() {
    let pki = default_pki();
    let mut store = store_with(&[&pki.root, &pki.ca]);
    assert_eq!(2, store.len());
    assert_eq!(
        Err(Error::DuplicateEntry),
        store.add_trusted(pki.root.clone())
    );

    let mut rollover = ca_spec();
    rollover.key = 4;
    rollover.serial = 4;
    store.add_trusted(rollover.mint()).unwrap();
    assert_eq!(2, store.lookup_by_subject(&name(CA)).len());
    assert_eq!(1, store.lookup_by_skid(&key_id(4)).len());
    assert!(store.lookup_by_subject(&name(LEAF)).is_empty());

    let crl = CrlSpec::new(CA, CA_KEY).mint();
    store.add_crl(crl.clone()).unwrap();
    assert_eq!(Err(Error::DuplicateEntry), store.add_crl(crl));
    assert_eq!(1, store.lookup_crls_by_issuer(&name(CA)).len());
    assert_eq!(1, store.num_crls());
}
