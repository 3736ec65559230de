//! Function signatures for the callbacks aggregated by [`PkiEnvironment`]

use der::asn1::ObjectIdentifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::{environment::pki_environment::PkiEnvironment, util::error::*};

/// `CalculateHash` provides a function signature for implementations that perform hashing
pub type CalculateHash = fn(
    &PkiEnvironment,
    &AlgorithmIdentifierOwned, // hash alg
    &[u8],                     // buffer to hash
) -> Result<Vec<u8>>;

/// `VerifySignatureMessage` provides a function signature for implementations that hash a message
/// and verify a signature over it.
///
/// Implementations return `Error::PathValidation(PathValidationStatus::CertSignatureFailure)` when
/// the key was usable but the signature did not verify and
/// `Error::PathValidation(PathValidationStatus::UnableToDecodeIssuerPublicKey)` when the key or
/// algorithm is not supported.
pub type VerifySignatureMessage = fn(
    &PkiEnvironment,
    &[u8],                      // message to hash and verify
    &[u8],                      // signature
    &AlgorithmIdentifierOwned,  // signature algorithm
    &SubjectPublicKeyInfoOwned, // public key
) -> Result<()>;

/// `OidLookup` implementations take an OID and returns either a friendly name for the OID or a
/// NotFound error. Where NotFound is returned by all OidLookup implementations, the
/// [`PkiEnvironment`] returns a dot notation version of the OID.
pub type OidLookup = fn(&ObjectIdentifier) -> Result<String>;
