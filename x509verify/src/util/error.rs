//! Error types

use core::fmt;

use serde::{Deserialize, Serialize};

/// Result type
pub type Result<T> = core::result::Result<T, Error>;

/// `ErrorKind` groups [`PathValidationStatus`] values into the categories callers typically act on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No error
    None,
    /// No issuer found, depth exceeded, loop detected, untrusted self-signed certificate
    PathBuilding,
    /// An issuer key does not verify a certificate or CRL signature
    Signature,
    /// A certificate or CRL is not valid at the reference time
    Validity,
    /// Basic constraints, path length, key usage, purpose, name constraint or trust violations
    Constraint,
    /// Certificate policy processing failures
    Policy,
    /// Revocation status problems
    Revocation,
    /// The verify callback rejected an otherwise successful event
    Application,
    /// Malformed structures or other internal failures. Never overridable.
    Internal,
}

/// Status codes reported by the verification engine. Every value other than `Ok` is routed through
/// the verify callback before a final accept or reject decision is made.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PathValidationStatus {
    /// No error
    #[default]
    Ok,
    /// No certificate in the trusted or untrusted sets has a subject matching the issuer name of
    /// the last certificate in the (partial) chain.
    UnableToGetIssuerCert,
    /// The target certificate is self-issued and not trusted.
    DepthZeroSelfSignedCert,
    /// The chain ends in a self-issued certificate that is not trusted.
    SelfSignedCertInChain,
    /// The depth limit was reached before a trust anchor was found.
    CertChainTooLong,
    /// Every issuer candidate was already present in the chain.
    PathLoop,
    /// Chain building stopped after too many signature checks or extension steps.
    BuildBudgetExceeded,
    /// The issuer public key does not verify the certificate signature.
    CertSignatureFailure,
    /// The issuer public key does not verify the CRL signature.
    CrlSignatureFailure,
    /// The issuer public key could not be decoded or uses an unsupported algorithm.
    UnableToDecodeIssuerPublicKey,
    /// notBefore is after the reference time.
    CertNotYetValid,
    /// notAfter is before the reference time.
    CertHasExpired,
    /// thisUpdate is after the reference time.
    CrlNotYetValid,
    /// nextUpdate is before the reference time.
    CrlHasExpired,
    /// An issuing certificate lacks basicConstraints or has cA set to false.
    InvalidCa,
    /// More intermediate certificates follow a CA than its pathLenConstraint allows.
    PathLengthExceeded,
    /// An issuing certificate asserts keyUsage without keyCertSign.
    KeyUsageNoCertSign,
    /// A CRL issuer asserts keyUsage without cRLSign.
    KeyUsageNoCrlSign,
    /// A certificate is not suitable for the requested purpose.
    InvalidPurpose,
    /// A name in the chain violates a name constraint imposed by a superior CA.
    NameConstraintsViolation,
    /// A certificate contains an unrecognized critical extension.
    UnhandledCriticalExtension,
    /// An extension contains a value that is not permitted (X509Strict checks).
    InvalidExtension,
    /// A certificate is explicitly rejected for the requested usage.
    CertRejected,
    /// The chain ends at a trusted certificate that is not trusted for the requested usage.
    CertUntrusted,
    /// Certificate policy processing yielded no acceptable policy while one was required.
    NoValidPolicy,
    /// A policy related extension contains an invalid value, i.e., anyPolicy in a mapping.
    InvalidPolicyExtension,
    /// The certificate has been revoked.
    CertRevoked,
    /// No CRL covering the certificate was available.
    UnableToGetCrl,
    /// A CRL or CRL entry contains an unrecognized critical extension.
    UnhandledCriticalCrlExtension,
    /// The verify callback declined a success event.
    ApplicationVerification,
    /// An internal failure, e.g., a structure that could not be processed after initial parsing.
    InternalError,
}

impl PathValidationStatus {
    /// `kind` returns the [`ErrorKind`] category of a status.
    pub fn kind(&self) -> ErrorKind {
        use PathValidationStatus::*;
        match self {
            Ok => ErrorKind::None,
            UnableToGetIssuerCert
            | DepthZeroSelfSignedCert
            | SelfSignedCertInChain
            | CertChainTooLong
            | PathLoop
            | BuildBudgetExceeded => ErrorKind::PathBuilding,
            CertSignatureFailure | CrlSignatureFailure | UnableToDecodeIssuerPublicKey => {
                ErrorKind::Signature
            }
            CertNotYetValid | CertHasExpired | CrlNotYetValid | CrlHasExpired => {
                ErrorKind::Validity
            }
            InvalidCa
            | PathLengthExceeded
            | KeyUsageNoCertSign
            | KeyUsageNoCrlSign
            | InvalidPurpose
            | NameConstraintsViolation
            | UnhandledCriticalExtension
            | InvalidExtension
            | CertRejected
            | CertUntrusted => ErrorKind::Constraint,
            NoValidPolicy | InvalidPolicyExtension => ErrorKind::Policy,
            CertRevoked | UnableToGetCrl | UnhandledCriticalCrlExtension => ErrorKind::Revocation,
            ApplicationVerification => ErrorKind::Application,
            InternalError => ErrorKind::Internal,
        }
    }

    /// `code` returns a stable numeric value for a status, suitable for printing or exit codes.
    pub fn code(&self) -> u32 {
        use PathValidationStatus::*;
        match self {
            Ok => 0,
            UnableToGetIssuerCert => 2,
            UnableToGetCrl => 3,
            CertSignatureFailure => 7,
            CrlSignatureFailure => 8,
            CertNotYetValid => 9,
            CertHasExpired => 10,
            CrlNotYetValid => 11,
            CrlHasExpired => 12,
            DepthZeroSelfSignedCert => 18,
            SelfSignedCertInChain => 19,
            UnableToDecodeIssuerPublicKey => 21,
            CertChainTooLong => 22,
            CertRevoked => 23,
            InvalidCa => 24,
            PathLengthExceeded => 25,
            InvalidPurpose => 26,
            CertUntrusted => 27,
            CertRejected => 28,
            KeyUsageNoCertSign => 32,
            UnhandledCriticalExtension => 34,
            KeyUsageNoCrlSign => 35,
            UnhandledCriticalCrlExtension => 36,
            InvalidExtension => 41,
            InvalidPolicyExtension => 42,
            NoValidPolicy => 43,
            NameConstraintsViolation => 47,
            ApplicationVerification => 50,
            PathLoop => 55,
            BuildBudgetExceeded => 56,
            InternalError => 1,
        }
    }

    /// `all` returns every status value, in declaration order.
    pub fn all() -> &'static [PathValidationStatus] {
        use PathValidationStatus::*;
        &[
            Ok,
            UnableToGetIssuerCert,
            DepthZeroSelfSignedCert,
            SelfSignedCertInChain,
            CertChainTooLong,
            PathLoop,
            BuildBudgetExceeded,
            CertSignatureFailure,
            CrlSignatureFailure,
            UnableToDecodeIssuerPublicKey,
            CertNotYetValid,
            CertHasExpired,
            CrlNotYetValid,
            CrlHasExpired,
            InvalidCa,
            PathLengthExceeded,
            KeyUsageNoCertSign,
            KeyUsageNoCrlSign,
            InvalidPurpose,
            NameConstraintsViolation,
            UnhandledCriticalExtension,
            InvalidExtension,
            CertRejected,
            CertUntrusted,
            NoValidPolicy,
            InvalidPolicyExtension,
            CertRevoked,
            UnableToGetCrl,
            UnhandledCriticalCrlExtension,
            ApplicationVerification,
            InternalError,
        ]
    }

    /// `from_name` resolves the `Debug` name of a status, ignoring case and underscores, i.e.,
    /// "cert_has_expired" and "CertHasExpired" both yield [`PathValidationStatus::CertHasExpired`].
    pub fn from_name(name: &str) -> Option<PathValidationStatus> {
        let wanted: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        Self::all()
            .iter()
            .find(|s| format!("{:?}", s).to_lowercase() == wanted)
            .copied()
    }
}

/// Error type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// PathValidationError encountered
    PathValidation(PathValidationStatus),
    /// A bit-identical certificate or CRL is already present in a store
    DuplicateEntry,
    /// NotFound occurs when an action failed because a necessary artifact was not found.
    NotFound,
    /// Unrecognized occurs when an error conditions does not match anything else here.
    Unrecognized,
    /// An artifact could not be parsed
    ParseError,
    /// Asn1Error is used to propagate error information from the der and x509-cert crates.
    Asn1Error(der::Error),
    /// A configuration error was detected. See textual log output for more details.
    Misconfiguration,
    /// Error encapsulates an error derived from [std::io::ErrorKind]
    StdIoError(std::io::ErrorKind),
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Error {
        Error::Asn1Error(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::StdIoError(err.kind())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::None => "None",
            ErrorKind::PathBuilding => "PathBuildingError",
            ErrorKind::Signature => "SignatureError",
            ErrorKind::Validity => "ValidityError",
            ErrorKind::Constraint => "ConstraintError",
            ErrorKind::Policy => "PolicyError",
            ErrorKind::Revocation => "RevocationError",
            ErrorKind::Application => "ApplicationError",
            ErrorKind::Internal => "InternalError",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for PathValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PathValidationStatus::*;
        let s = match self {
            Ok => "ok",
            UnableToGetIssuerCert => "unable to get local issuer certificate",
            DepthZeroSelfSignedCert => "self-signed certificate",
            SelfSignedCertInChain => "self-signed certificate in certificate chain",
            CertChainTooLong => "certificate chain too long",
            PathLoop => "path loop",
            BuildBudgetExceeded => "path building budget exceeded",
            CertSignatureFailure => "certificate signature failure",
            CrlSignatureFailure => "CRL signature failure",
            UnableToDecodeIssuerPublicKey => "unable to decode issuer public key",
            CertNotYetValid => "certificate is not yet valid",
            CertHasExpired => "certificate has expired",
            CrlNotYetValid => "CRL is not yet valid",
            CrlHasExpired => "CRL has expired",
            InvalidCa => "invalid CA certificate",
            PathLengthExceeded => "path length constraint exceeded",
            KeyUsageNoCertSign => "key usage does not include certificate signing",
            KeyUsageNoCrlSign => "key usage does not include CRL signing",
            InvalidPurpose => "unsuitable certificate purpose",
            NameConstraintsViolation => "name constraints violation",
            UnhandledCriticalExtension => "unhandled critical extension",
            InvalidExtension => "invalid or inconsistent certificate extension",
            CertRejected => "certificate rejected",
            CertUntrusted => "certificate not trusted",
            NoValidPolicy => "no explicit policy",
            InvalidPolicyExtension => "invalid or inconsistent certificate policy extension",
            CertRevoked => "certificate revoked",
            UnableToGetCrl => "unable to get certificate CRL",
            UnhandledCriticalCrlExtension => "unhandled critical CRL extension",
            ApplicationVerification => "application verification failure",
            InternalError => "internal error",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PathValidation(err) => write!(f, "PathValidationError: {}", err),
            Error::DuplicateEntry => write!(f, "DuplicateEntry"),
            Error::NotFound => write!(f, "NotFound"),
            Error::Unrecognized => write!(f, "Unrecognized"),
            Error::ParseError => write!(f, "ParseError"),
            Error::Asn1Error(err) => write!(f, "Asn1Error: {}", err),
            Error::Misconfiguration => write!(f, "Misconfiguration"),
            Error::StdIoError(err) => write!(f, "StdError: {:?}", err),
        }
    }
}

impl std::error::Error for Error {}

#[test]
fn error_test() {
    for status in PathValidationStatus::all() {
        let s = format!("{}", status);
        assert!(!s.is_empty());
        assert_eq!(Some(*status), PathValidationStatus::from_name(&format!("{:?}", status)));
    }
    assert_eq!(
        Some(PathValidationStatus::CertHasExpired),
        PathValidationStatus::from_name("cert_has_expired")
    );
    assert_eq!(None, PathValidationStatus::from_name("not_a_status"));

    let _s = format!("{}", Error::DuplicateEntry);
    let _s = format!("{}", Error::NotFound);
    let _s = format!("{}", Error::Unrecognized);
    let _s = format!("{}", Error::ParseError);
    let _s = format!("{}", Error::Misconfiguration);
    let _s = format!("{}", Error::StdIoError(std::io::ErrorKind::NotFound));
    let _s = format!(
        "{}",
        Error::PathValidation(PathValidationStatus::CertRevoked)
    );
}

#[test]
fn codes_are_unique() {
    let mut codes: Vec<u32> = PathValidationStatus::all().iter().map(|s| s.code()).collect();
    codes.sort_unstable();
    let len = codes.len();
    codes.dedup();
    assert_eq!(len, codes.len());
}

#[test]
fn kinds() {
    assert_eq!(ErrorKind::None, PathValidationStatus::Ok.kind());
    assert_eq!(
        ErrorKind::PathBuilding,
        PathValidationStatus::UnableToGetIssuerCert.kind()
    );
    assert_eq!(
        ErrorKind::Signature,
        PathValidationStatus::CrlSignatureFailure.kind()
    );
    assert_eq!(ErrorKind::Validity, PathValidationStatus::CertHasExpired.kind());
    assert_eq!(
        ErrorKind::Constraint,
        PathValidationStatus::NameConstraintsViolation.kind()
    );
    assert_eq!(ErrorKind::Policy, PathValidationStatus::NoValidPolicy.kind());
    assert_eq!(ErrorKind::Revocation, PathValidationStatus::CertRevoked.kind());
    assert_eq!(ErrorKind::Internal, PathValidationStatus::InternalError.kind());
    assert_eq!(
        ErrorKind::PathBuilding,
        PathValidationStatus::BuildBudgetExceeded.kind()
    );
    assert_eq!("ValidityError", ErrorKind::Validity.to_string());
}
