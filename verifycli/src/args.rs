//! Arguments for the x509verify utility

use clap::Parser;

/// Verifies X.509 certificate chains against a set of trusted certificates
#[derive(Parser, Debug, Default)]
#[command(arg_required_else_help(true))]
#[clap(author, version, about, long_about = None)]
pub struct VerifyArgs {
    /// DER or PEM encoded certificate file(s) to verify
    #[clap(required = true)]
    pub targets: Vec<String>,

    /// File containing trusted certificates (repeatable). Each certificate in a file is added to
    /// the store.
    #[clap(short, long, help_heading = "INPUTS")]
    pub trusted: Vec<String>,

    /// File(s) containing untrusted intermediate CA certificates available to the chain builder
    #[clap(short, long, help_heading = "INPUTS")]
    pub untrusted: Vec<String>,

    /// File(s) containing CRLs used when revocation checking is enabled
    #[clap(short, long, help_heading = "INPUTS")]
    pub crl: Vec<String>,

    /// JSON file containing verification settings. Options given on the command line are applied
    /// on top of the settings read from this file.
    #[clap(short, long, help_heading = "INPUTS")]
    pub settings: Option<String>,

    /// Full path and filename of YAML-formatted configuration file for log4rs logging mechanism.
    /// See <https://docs.rs/log4rs/latest/log4rs/> for details.
    #[clap(short, long, help_heading = "INPUTS")]
    pub logging_config: Option<String>,

    /// Purpose to verify the chain for, i.e., sslserver, sslclient, smimesign, codesign, any
    #[clap(long, help_heading = "VERIFICATION")]
    pub purpose: Option<String>,

    /// Maximum number of intermediate certificates
    #[clap(long, help_heading = "VERIFICATION")]
    pub depth: Option<usize>,

    /// Acceptable certificate policy OID(s) (user-initial-policy-set)
    #[clap(long, value_delimiter = ',', help_heading = "VERIFICATION")]
    pub policy: Vec<String>,

    /// Require a valid policy for the chain
    #[clap(long, help_heading = "VERIFICATION")]
    pub explicit_policy: bool,

    /// Do not let anyPolicy match specific policies
    #[clap(long, help_heading = "VERIFICATION")]
    pub inhibit_any: bool,

    /// Disallow policy mapping
    #[clap(long, help_heading = "VERIFICATION")]
    pub inhibit_map: bool,

    /// Apply additional checks on extension contents
    #[clap(long, help_heading = "VERIFICATION")]
    pub x509_strict: bool,

    /// Treat any trusted certificate as a trust anchor, not only self-signed ones
    #[clap(long, help_heading = "VERIFICATION")]
    pub partial_chain: bool,

    /// Verify the signature of self-signed trust anchors
    #[clap(long, help_heading = "VERIFICATION")]
    pub check_ss_sig: bool,

    /// Check revocation status of the target certificate
    #[clap(long, help_heading = "VERIFICATION")]
    pub crl_check: bool,

    /// Check revocation status of every certificate in the chain
    #[clap(long, help_heading = "VERIFICATION")]
    pub crl_check_all: bool,

    /// Consult delta CRLs
    #[clap(long, help_heading = "VERIFICATION")]
    pub use_deltas: bool,

    /// Do not reject unrecognized critical extensions
    #[clap(long, help_heading = "VERIFICATION")]
    pub ignore_critical: bool,

    /// Skip validity period checks
    #[clap(long, help_heading = "VERIFICATION")]
    pub no_check_time: bool,

    /// Time to use for verification expressed as the number of seconds since Unix epoch
    /// (defaults to current system time).
    #[clap(long, help_heading = "VERIFICATION")]
    pub attime: Option<u64>,

    /// Status name(s) to accept when encountered, i.e., cert_has_expired
    #[clap(long, value_delimiter = ',', help_heading = "VERIFICATION")]
    pub allow: Vec<String>,

    /// Print the subject of each certificate in the verified chain
    #[clap(long, help_heading = "OUTPUT")]
    pub show_chain: bool,

    /// Print the valid policy tree after verification
    #[clap(long, help_heading = "OUTPUT")]
    pub policy_print: bool,

    /// Name printing options used with --show-chain, i.e., oneline, rfc2253 or multiline,-align
    #[clap(long, default_value = "oneline", help_heading = "OUTPUT")]
    pub nameopt: String,

    /// Log each verification event
    #[clap(short, long, help_heading = "OUTPUT")]
    pub verbose: bool,
}
