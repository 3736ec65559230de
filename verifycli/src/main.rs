#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

mod args;
mod file_utils;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use flagset::FlagSet;
use log::{debug, error, info, warn, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use x509verify::*;

use crate::args::VerifyArgs;
use crate::file_utils::{load_all_certs, load_certs, load_crls, Result};

const EXIT_REJECTED: u8 = 2;
const EXIT_USAGE: u8 = 1;

fn init_logging(args: &VerifyArgs) {
    if let Some(logging_config) = &args.logging_config {
        if let Err(e) = log4rs::init_file(logging_config, Default::default()) {
            println!(
                "ERROR: failed to configure logging using {} with {:?}. Continuing without logging.",
                logging_config, e
            );
        }
        return;
    }

    // stdout carries verification results only
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    match Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
    {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                println!(
                    "ERROR: failed to configure logging for stderr with {:?}. Continuing without logging.",
                    e
                );
            }
        }
        Err(e) => {
            println!(
                "ERROR: failed to configure logging for stderr with {:?}. Continuing without logging.",
                e
            );
        }
    }
}

/// `build_params` reads the settings file, if any, then applies command line options on top
fn build_params(args: &VerifyArgs) -> Result<VerifyParams> {
    let mut params = match &args.settings {
        Some(settings) => read_params(Path::new(settings))
            .map_err(|e| format!("unable to read settings from {}: {}", settings, e))?,
        None => VerifyParams::default(),
    };

    if let Some(purpose) = &args.purpose {
        params.purpose = Some(
            Purpose::from_str(purpose).map_err(|_| format!("unrecognized purpose: {}", purpose))?,
        );
    }
    if let Some(depth) = args.depth {
        params.depth = depth;
    }
    if !args.policy.is_empty() {
        params.policies = args.policy.clone();
        params
            .policy_set()
            .map_err(|_| format!("invalid policy OID in {:?}", args.policy))?;
    }
    if args.attime.is_some() {
        params.time = args.attime;
    }

    let switches = [
        (args.explicit_policy, VerifyFlags::ExplicitPolicy),
        (args.inhibit_any, VerifyFlags::InhibitAny),
        (args.inhibit_map, VerifyFlags::InhibitMap),
        (args.x509_strict, VerifyFlags::X509Strict),
        (args.partial_chain, VerifyFlags::PartialChain),
        (args.check_ss_sig, VerifyFlags::CheckSelfSigned),
        (args.crl_check, VerifyFlags::CrlCheck),
        (args.crl_check_all, VerifyFlags::CrlCheckAll),
        (args.use_deltas, VerifyFlags::UseDeltas),
        (args.ignore_critical, VerifyFlags::IgnoreCritical),
        (args.no_check_time, VerifyFlags::NoCheckTime),
    ];
    for (set, flag) in switches {
        if set {
            params.set_flag(flag);
        }
    }
    params.log_events |= args.verbose;
    Ok(params)
}

fn allowed_statuses(args: &VerifyArgs) -> Result<AllowList> {
    let mut statuses = vec![];
    for name in &args.allow {
        match PathValidationStatus::from_name(name) {
            Some(status) => statuses.push(status),
            None => return Err(format!("unrecognized status: {}", name).into()),
        }
    }
    Ok(AllowList::new(statuses))
}

fn build_store(args: &VerifyArgs) -> Result<CertificateStore> {
    let mut store = CertificateStore::new();
    for cert in load_all_certs(&args.trusted)? {
        match store.add_trusted(cert) {
            Ok(()) => {}
            Err(Error::DuplicateEntry) => warn!("Ignoring duplicate trusted certificate"),
            Err(e) => return Err(e.into()),
        }
    }
    for f in &args.crl {
        for crl in load_crls(f)? {
            match store.add_crl(crl) {
                Ok(()) => {}
                Err(Error::DuplicateEntry) => warn!("Ignoring duplicate CRL from {}", f),
                Err(e) => return Err(e.into()),
            }
        }
    }
    info!(
        "Loaded {} trusted certificate(s) and {} CRL(s)",
        store.len(),
        store.num_crls()
    );
    Ok(store)
}

fn show_chain(out: &mut dyn Write, ctx: &VerifyContext<'_>, name_flags: FlagSet<NameFlags>) {
    let _ = writeln!(out, "Chain:");
    for (depth, cert) in ctx.chain().iter().enumerate() {
        let _ = writeln!(out, "depth={}:", depth);
        print_name(out, cert.subject(), name_flags, 2);
    }
}

/// `verify_target` verifies the first certificate in `target`. Any further certificates in the
/// file are made available to the chain builder as untrusted intermediates.
fn verify_target(
    pe: &PkiEnvironment,
    store: &CertificateStore,
    params: &VerifyParams,
    untrusted: &[PDVCertificate],
    args: &VerifyArgs,
    name_flags: FlagSet<NameFlags>,
    target: &str,
) -> Result<bool> {
    let mut certs = load_certs(target)?;
    if certs.is_empty() {
        return Err(format!("no certificate found in {}", target).into());
    }
    let leaf = certs.remove(0);
    certs.extend(untrusted.iter().cloned());

    let mut allow = allowed_statuses(args)?;
    let mut ctx = VerifyContext::new(pe, store, params, &leaf).with_untrusted(&certs);
    let outcome = ctx.verify(&mut allow);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.show_chain {
        show_chain(&mut out, &ctx, name_flags);
    }
    if args.policy_print {
        match ctx.policy_tree() {
            Some(tree) => print_policy_tree(tree, &mut out, 0),
            None => {
                let _ = writeln!(out, "<NULL policy tree>");
            }
        }
    }
    for (status, depth) in &outcome.overridden {
        debug!("{}: overrode {} at depth {}", target, status, depth);
    }

    if outcome.accepted {
        let _ = writeln!(out, "{}: OK", target);
    } else {
        let _ = writeln!(
            out,
            "error {} at {} depth lookup: {}",
            outcome.error.code(),
            outcome.error_depth,
            outcome.error
        );
        let _ = writeln!(out, "{}: verification failed", target);
    }
    Ok(outcome.accepted)
}

fn run(args: &VerifyArgs) -> Result<bool> {
    let params = build_params(args)?;
    debug!("Verification settings: {}", serde_json::to_string(&params)?);

    // validate before loading anything
    allowed_statuses(args)?;
    let name_flags = parse_name_flags(&args.nameopt)
        .map_err(|_| format!("unrecognized name option in {}", args.nameopt))?;

    let mut pe = PkiEnvironment::new();
    pe.populate_rust_crypto();

    let store = build_store(args)?;
    let untrusted = load_all_certs(&args.untrusted)?;

    let mut all_ok = true;
    for target in &args.targets {
        all_ok &= verify_target(&pe, &store, &params, &untrusted, args, name_flags, target)?;
    }
    Ok(all_ok)
}

fn main() -> ExitCode {
    let args = VerifyArgs::parse();
    init_logging(&args);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_REJECTED),
        Err(e) => {
            error!("{}", e);
            println!("ERROR: {}", e);
            ExitCode::from(EXIT_USAGE)
        }
    }
}
