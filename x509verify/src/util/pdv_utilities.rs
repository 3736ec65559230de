//! Utility functions that support chain building and verification

use std::time::{SystemTime, UNIX_EPOCH};

use log::error;

use const_oid::db::rfc2256::STATE_OR_PROVINCE_NAME;
use const_oid::db::rfc3280::{EMAIL_ADDRESS, PSEUDONYM};
use const_oid::db::rfc4519::{
    COMMON_NAME, COUNTRY_NAME, DN_QUALIFIER, DOMAIN_COMPONENT, GENERATION_QUALIFIER, GIVEN_NAME,
    INITIALS, LOCALITY_NAME, NAME, ORGANIZATIONAL_UNIT_NAME, ORGANIZATION_NAME, SERIAL_NUMBER,
    STREET, SURNAME, TITLE, UID,
};
use const_oid::db::rfc5280::ANY_POLICY;
use const_oid::db::rfc5912::{
    ANY_EXTENDED_KEY_USAGE, ID_KP_CLIENT_AUTH, ID_KP_CODE_SIGNING, ID_KP_EMAIL_PROTECTION, ID_KP_OCSP_SIGNING,
    ID_KP_SERVER_AUTH, ID_KP_TIME_STAMPING,
};
use der::{asn1::ObjectIdentifier, Encode};
use x509_cert::name::Name;
use x509_cert::{Certificate, TbsCertificate};

use crate::util::error::*;
use crate::validator::pdv_certificate::PDVCertificate;

/// `get_now_as_unix_epoch` returns the current time as seconds since the Unix epoch.
pub fn get_now_as_unix_epoch() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(n) => n.as_secs(),
        Err(_) => 0,
    }
}

/// [`compare_names`] compares two Name values returning true if their encodings match and false
/// otherwise.
pub fn compare_names(left: &Name, right: &Name) -> bool {
    left == right
}

/// `name_to_der` returns the DER encoding of a Name, used to index certificates and CRLs.
pub fn name_to_der(name: &Name) -> Result<Vec<u8>> {
    Ok(name.to_der()?)
}

/// `is_self_issued` returns true if the subject field in the certificate is the same as the issuer
/// field.
pub fn is_self_issued(cert: &Certificate) -> bool {
    compare_names(&cert.tbs_certificate.issuer, &cert.tbs_certificate.subject)
}

/// `valid_at_time` evaluates the not_before and not_after fields of the given TBSCertificate instance
/// and provides an indication of validity relative to presented time of interest.
///
/// It returns the number of seconds left to live if the certificate is valid at the given time or
/// an error indicating which field failed if the certificate is not valid. The not_before field is
/// evaluated first.
///
/// To stifle logging output upon error, pass true for the stifle_log parameter.
pub fn valid_at_time(target: &TbsCertificate, toi: u64, stifle_log: bool) -> Result<u64> {
    let nb = target.validity.not_before.to_unix_duration().as_secs();
    if nb > toi {
        if !stifle_log {
            log_error_for_name(
                &target.subject,
                "certificate is not yet valid, i.e., not_before is after the reference time",
            );
        }
        return Err(Error::PathValidation(PathValidationStatus::CertNotYetValid));
    }

    let na = target.validity.not_after.to_unix_duration().as_secs();
    if na < toi {
        if !stifle_log {
            log_error_for_name(
                &target.subject,
                format!(
                    "certificate is expired relative to the reference time: {}",
                    target.validity.not_after
                )
                .as_str(),
            );
        }
        Err(Error::PathValidation(PathValidationStatus::CertHasExpired))
    } else {
        Ok(na - toi)
    }
}

/// `key_ids_agree` compares the authorityKeyIdentifier of `cert` with the subjectKeyIdentifier of
/// `issuer`. It returns None when either value is absent.
pub fn key_ids_agree(cert: &PDVCertificate, issuer: &PDVCertificate) -> Option<bool> {
    match (
        cert.authority_key_identifier(),
        issuer.subject_key_identifier(),
    ) {
        (Some(akid), Some(skid)) => Some(akid == skid),
        _ => None,
    }
}

/// `buffer_to_hex` renders a buffer as upper case hex.
pub fn buffer_to_hex(buffer: &[u8]) -> String {
    buffer.iter().map(|b| format!("{:02X}", b)).collect()
}

pub(crate) fn log_error_for_name(name: &Name, msg: &str) {
    error!(
        "Encountered error while processing certificate with subject {}: {}",
        name, msg
    );
}

/// log a message with subject name of the certificate appended
pub fn log_error_for_cert(cert: &PDVCertificate, msg: &str) {
    log_error_for_name(cert.subject(), msg);
}

/// `name_to_string` returns a string representation of given Name value.
pub fn name_to_string(name: &Name) -> String {
    name.to_string()
}

/// `oid_lookup` takes an ObjectIdentifier and returns a string with a friendly name for the OID or
/// Error::NotFound. Attribute types resolve to their short names.
pub fn oid_lookup(oid: &ObjectIdentifier) -> Result<String> {
    let s = match *oid {
        NAME => "name",
        SURNAME => "SN",
        GIVEN_NAME => "GN",
        INITIALS => "initials",
        GENERATION_QUALIFIER => "generationQualifier",
        COMMON_NAME => "CN",
        LOCALITY_NAME => "L",
        STATE_OR_PROVINCE_NAME => "ST",
        STREET => "street",
        ORGANIZATIONAL_UNIT_NAME => "OU",
        ORGANIZATION_NAME => "O",
        TITLE => "title",
        DN_QUALIFIER => "dnQualifier",
        COUNTRY_NAME => "C",
        SERIAL_NUMBER => "serialNumber",
        PSEUDONYM => "pseudonym",
        DOMAIN_COMPONENT => "DC",
        EMAIL_ADDRESS => "emailAddress",
        UID => "UID",
        ANY_POLICY => "X509v3 Any Policy",
        ANY_EXTENDED_KEY_USAGE => "Any Extended Key Usage",
        ID_KP_SERVER_AUTH => "TLS Web Server Authentication",
        ID_KP_CLIENT_AUTH => "TLS Web Client Authentication",
        ID_KP_CODE_SIGNING => "Code Signing",
        ID_KP_EMAIL_PROTECTION => "E-mail Protection",
        ID_KP_TIME_STAMPING => "Time Stamping",
        ID_KP_OCSP_SIGNING => "OCSP Signing",
        _ => return Err(Error::NotFound),
    };
    Ok(s.to_string())
}

/// `oid_long_name` returns the long form name of an attribute type, i.e., "commonName" for CN,
/// falling back to the `const-oid` database and then Error::NotFound.
pub fn oid_long_name(oid: &ObjectIdentifier) -> Result<String> {
    let s = match *oid {
        COMMON_NAME => "commonName",
        SURNAME => "surname",
        GIVEN_NAME => "givenName",
        LOCALITY_NAME => "localityName",
        STATE_OR_PROVINCE_NAME => "stateOrProvinceName",
        STREET => "streetAddress",
        ORGANIZATIONAL_UNIT_NAME => "organizationalUnitName",
        ORGANIZATION_NAME => "organizationName",
        COUNTRY_NAME => "countryName",
        DOMAIN_COMPONENT => "domainComponent",
        UID => "userId",
        _ => {
            return match const_oid::db::DB.by_oid(oid) {
                Some(s) => Ok(s.to_string()),
                None => oid_lookup(oid),
            }
        }
    };
    Ok(s.to_string())
}

#[test]
fn self_issued_and_names() {
    use core::str::FromStr;
    let a = Name::from_str("CN=Test Root,O=Example,C=US").unwrap();
    let b = Name::from_str("CN=Test Root,O=Example,C=US").unwrap();
    let c = Name::from_str("CN=Test Root,O=Example,C=CA").unwrap();
    assert!(compare_names(&a, &b));
    assert!(!compare_names(&a, &c));
    assert_eq!(name_to_der(&a).unwrap(), name_to_der(&b).unwrap());
    assert_ne!(name_to_der(&a).unwrap(), name_to_der(&c).unwrap());
}

#[test]
fn lookups() {
    assert_eq!("CN", oid_lookup(&COMMON_NAME).unwrap());
    assert_eq!("commonName", oid_long_name(&COMMON_NAME).unwrap());
    assert_eq!("X509v3 Any Policy", oid_lookup(&ANY_POLICY).unwrap());
    assert!(oid_lookup(&ObjectIdentifier::new_unwrap("1.2.3.4")).is_err());
    assert_eq!("0A0BFF", buffer_to_hex(&[0x0a, 0x0b, 0xff]));
}
