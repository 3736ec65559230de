//! Provides implementations of crypto-related [`PkiEnvironment`] interfaces using libraries from the
//! [Rust Crypto](https://github.com/RustCrypto) project for support.

use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ID_SHA_224, ID_SHA_256, ID_SHA_384, ID_SHA_512, SECP_256_R_1,
    SHA_224_WITH_RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
    SHA_512_WITH_RSA_ENCRYPTION,
};
use der::{asn1::ObjectIdentifier, Encode};
use log::error;
use p256::ecdsa::{
    signature::Verifier as Verifier256, Signature as Signature256, VerifyingKey as VerifyingKey256,
};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::environment::pki_environment::PkiEnvironment;
use crate::util::error::{Error, PathValidationStatus, Result};

/// get_padding_scheme takes an AlgorithmIdentifier containing a signature algorithm and returns
/// a corresponding Pkcs1v15Sign instance.
///
/// Only the PKCS #1 v1.5 scheme is supported, relative to the sha224WithRSAEncryption,
/// sha256WithRSAEncryption, sha384WithRSAEncryption and sha512WithRSAEncryption algorithm identifiers.
pub fn get_padding_scheme(signature_alg: &AlgorithmIdentifierOwned) -> Result<Pkcs1v15Sign> {
    match signature_alg.oid {
        SHA_256_WITH_RSA_ENCRYPTION => Ok(Pkcs1v15Sign::new::<Sha256>()),
        SHA_384_WITH_RSA_ENCRYPTION => Ok(Pkcs1v15Sign::new::<Sha384>()),
        SHA_224_WITH_RSA_ENCRYPTION => Ok(Pkcs1v15Sign::new::<Sha224>()),
        SHA_512_WITH_RSA_ENCRYPTION => Ok(Pkcs1v15Sign::new::<Sha512>()),
        _ => Err(Error::Unrecognized),
    }
}

/// `get_hash_alg_from_sig_alg` returns the hash algorithm used by a supported signature algorithm.
pub fn get_hash_alg_from_sig_alg(sig_alg: &ObjectIdentifier) -> Result<AlgorithmIdentifierOwned> {
    let oid = match *sig_alg {
        SHA_224_WITH_RSA_ENCRYPTION => ID_SHA_224,
        SHA_256_WITH_RSA_ENCRYPTION | ECDSA_WITH_SHA_256 => ID_SHA_256,
        SHA_384_WITH_RSA_ENCRYPTION => ID_SHA_384,
        SHA_512_WITH_RSA_ENCRYPTION => ID_SHA_512,
        _ => return Err(Error::Unrecognized),
    };
    Ok(AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    })
}

/// is_rsa returns true is the presented OID is one of the supported RSA PKCS #1 v1.5 signature
/// algorithms and false otherwise.
pub(crate) fn is_rsa(oid: &ObjectIdentifier) -> bool {
    *oid == SHA_256_WITH_RSA_ENCRYPTION
        || *oid == SHA_384_WITH_RSA_ENCRYPTION
        || *oid == SHA_224_WITH_RSA_ENCRYPTION
        || *oid == SHA_512_WITH_RSA_ENCRYPTION
}

/// calculate_hash_rust_crypto implements the [`CalculateHash`](crate::CalculateHash) interface for
/// [`PkiEnvironment`] using implementations from the Rust Crypto project.
///
/// It supports SHA-224, SHA-256, SHA-384 and SHA-512.
pub fn calculate_hash_rust_crypto(
    _pe: &PkiEnvironment,
    hash_alg: &AlgorithmIdentifierOwned,
    buffer_to_hash: &[u8],
) -> Result<Vec<u8>> {
    match hash_alg.oid {
        ID_SHA_224 => Ok(Sha224::digest(buffer_to_hash).to_vec()),
        ID_SHA_256 => Ok(Sha256::digest(buffer_to_hash).to_vec()),
        ID_SHA_384 => Ok(Sha384::digest(buffer_to_hash).to_vec()),
        ID_SHA_512 => Ok(Sha512::digest(buffer_to_hash).to_vec()),
        _ => Err(Error::Unrecognized),
    }
}

fn get_named_curve_parameter(alg_id: &AlgorithmIdentifierOwned) -> Result<ObjectIdentifier> {
    if let Some(params) = &alg_id.parameters {
        if let Ok(oid) = params.decode_as::<ObjectIdentifier>() {
            return Ok(oid);
        }
    }
    Err(Error::PathValidation(
        PathValidationStatus::UnableToDecodeIssuerPublicKey,
    ))
}

/// verify_signature_message_rust_crypto implements the
/// [`VerifySignatureMessage`](crate::VerifySignatureMessage) interface for [`PkiEnvironment`] using
/// implementations from the [Rust Crypto](https://github.com/RustCrypto) project.
///
/// RSA PKCS #1 v1.5 signatures and ECDSA P-256 with SHA-256 signatures are supported at present.
pub fn verify_signature_message_rust_crypto(
    pe: &PkiEnvironment,
    message_to_verify: &[u8],                 // buffer to verify
    signature: &[u8],                         // signature
    signature_alg: &AlgorithmIdentifierOwned, // signature algorithm
    spki: &SubjectPublicKeyInfoOwned,         // public key
) -> Result<()> {
    let bad_key = Error::PathValidation(PathValidationStatus::UnableToDecodeIssuerPublicKey);
    let bad_sig = Error::PathValidation(PathValidationStatus::CertSignatureFailure);

    if is_rsa(&signature_alg.oid) {
        let enc_spki = spki.to_der().map_err(|_| bad_key)?;
        let rsa = RsaPublicKey::from_public_key_der(&enc_spki).map_err(|_| bad_key)?;
        let hash_alg = get_hash_alg_from_sig_alg(&signature_alg.oid)?;
        let hash_to_verify = pe.calculate_hash(&hash_alg, message_to_verify)?;
        let ps = get_padding_scheme(signature_alg)?;
        return rsa
            .verify(ps, hash_to_verify.as_slice(), signature)
            .map_err(|_| bad_sig);
    } else if signature_alg.oid == ECDSA_WITH_SHA_256 {
        let named_curve = get_named_curve_parameter(&spki.algorithm)?;
        return match named_curve {
            SECP_256_R_1 => {
                let ecdsa = VerifyingKey256::from_sec1_bytes(spki.subject_public_key.raw_bytes())
                    .map_err(|_| bad_key)?;
                let s = Signature256::from_der(signature).map_err(|_| bad_sig)?;
                ecdsa.verify(message_to_verify, &s).map_err(|_| bad_sig)
            }
            _ => {
                error!("Unrecognized or unsupported named curve: {}", named_curve);
                Err(bad_key)
            }
        };
    }
    error!("Unrecognized signature algorithm: {}", signature_alg.oid);
    Err(bad_key)
}

#[test]
fn test_calculate_hash() {
    use hex_literal::hex;
    let mut pe = PkiEnvironment::default();
    pe.clear_all_callbacks();
    pe.add_calculate_hash_callback(calculate_hash_rust_crypto);

    let hash_algorithm = AlgorithmIdentifierOwned {
        oid: ID_SHA_256,
        parameters: None,
    };
    let result = pe.calculate_hash(&hash_algorithm, "abc".as_bytes()).unwrap();
    assert_eq!(
        result,
        hex!("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD")
    );
}

#[test]
fn test_verify_p256() {
    use const_oid::db::rfc5912::ID_EC_PUBLIC_KEY;
    use der::asn1::{Any, BitString};
    use p256::ecdsa::{signature::Signer, SigningKey};

    let sk = SigningKey::from_slice(&[7u8; 32]).unwrap();
    let vk = sk.verifying_key();
    let msg = b"to be signed";
    let sig: Signature256 = sk.sign(msg);
    let spki = SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: ID_EC_PUBLIC_KEY,
            parameters: Some(Any::encode_from(&SECP_256_R_1).unwrap()),
        },
        subject_public_key: BitString::from_bytes(vk.to_encoded_point(false).as_bytes()).unwrap(),
    };
    let alg = AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA_256,
        parameters: None,
    };
    let mut pe = PkiEnvironment::default();
    pe.populate_rust_crypto();
    let der_sig = sig.to_der();
    assert!(pe
        .verify_signature_message(msg, der_sig.as_bytes(), &alg, &spki)
        .is_ok());
    assert_eq!(
        Err(Error::PathValidation(
            PathValidationStatus::CertSignatureFailure
        )),
        pe.verify_signature_message(b"something else", der_sig.as_bytes(), &alg, &spki)
    );
    let unsupported = AlgorithmIdentifierOwned {
        oid: ObjectIdentifier::new_unwrap("1.2.3.4"),
        parameters: None,
    };
    assert_eq!(
        Err(Error::PathValidation(
            PathValidationStatus::UnableToDecodeIssuerPublicKey
        )),
        pe.verify_signature_message(msg, der_sig.as_bytes(), &unsupported, &spki)
    );
}
