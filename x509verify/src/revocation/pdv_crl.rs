//! Wrapper around a decoded CertificateList with the CRL extensions used for revocation checking
//! pre-parsed

use core::cmp::Ordering;

use const_oid::db::rfc5280::{
    ID_CE_CRL_NUMBER, ID_CE_DELTA_CRL_INDICATOR, ID_CE_ISSUING_DISTRIBUTION_POINT,
};
use der::asn1::Uint;
use der::{Decode, Encode};
use log::error;
use x509_cert::crl::{CertificateList, RevokedCert};
use x509_cert::ext::pkix::crl::IssuingDistributionPoint;
use x509_cert::name::Name;

use crate::util::error::*;

/// Population of certificates a CRL covers, per its issuingDistributionPoint extension
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CrlCoverage {
    /// Covers all certificates issued by the CRL issuer
    All,
    /// onlyContainsUserCerts is set
    EeOnly,
    /// onlyContainsCACerts is set
    CaOnly,
    /// onlyContainsAttributeCerts is set
    AttributeOnly,
}

/// [`PDVCrl`] aggregates a binary, DER-encoded CertificateList, the decoded structure, an optional
/// locator and the pre-parsed CRL number, delta CRL indicator and issuingDistributionPoint.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PDVCrl {
    /// Binary, encoded CertificateList object
    pub encoded_crl: Vec<u8>,
    /// Decoded CertificateList object
    pub decoded_crl: CertificateList,
    /// Optional file name, URI or other locator for troubleshooting purposes
    pub locator: Option<String>,
    /// Big endian value of the cRLNumber extension, without leading zeros
    pub crl_number: Option<Vec<u8>>,
    /// Big endian value of the deltaCRLIndicator extension (BaseCRLNumber), without leading zeros.
    /// Present only for delta CRLs.
    pub base_crl_number: Option<Vec<u8>>,
    /// Decoded issuingDistributionPoint extension
    pub idp: Option<IssuingDistributionPoint>,
}

fn decode_crl_number(crl: &CertificateList, wanted: &const_oid::ObjectIdentifier) -> Result<Option<Vec<u8>>> {
    if let Some(exts) = &crl.tbs_cert_list.crl_extensions {
        if let Some(ext) = exts.iter().find(|e| e.extn_id == *wanted) {
            let v = Uint::from_der(ext.extn_value.as_bytes())?;
            return Ok(Some(strip_leading_zeros(v.as_bytes()).to_vec()));
        }
    }
    Ok(None)
}

fn strip_leading_zeros(v: &[u8]) -> &[u8] {
    let first = v.iter().position(|b| *b != 0).unwrap_or(v.len());
    &v[first..]
}

/// `compare_crl_numbers` compares two unsigned big endian integers of arbitrary length.
pub fn compare_crl_numbers(lhs: &[u8], rhs: &[u8]) -> Ordering {
    let lhs = strip_leading_zeros(lhs);
    let rhs = strip_leading_zeros(rhs);
    lhs.len().cmp(&rhs.len()).then_with(|| lhs.cmp(rhs))
}

impl TryFrom<CertificateList> for PDVCrl {
    type Error = Error;

    fn try_from(crl: CertificateList) -> Result<Self> {
        let encoded_crl = crl.to_der()?;
        let crl_number = decode_crl_number(&crl, &ID_CE_CRL_NUMBER)?;
        let base_crl_number = decode_crl_number(&crl, &ID_CE_DELTA_CRL_INDICATOR)?;
        let mut idp = None;
        if let Some(exts) = &crl.tbs_cert_list.crl_extensions {
            if let Some(ext) = exts
                .iter()
                .find(|e| e.extn_id == ID_CE_ISSUING_DISTRIBUTION_POINT)
            {
                idp = Some(IssuingDistributionPoint::from_der(
                    ext.extn_value.as_bytes(),
                )?);
            }
        }
        Ok(PDVCrl {
            encoded_crl,
            decoded_crl: crl,
            locator: None,
            crl_number,
            base_crl_number,
            idp,
        })
    }
}

impl TryFrom<&[u8]> for PDVCrl {
    type Error = Error;

    fn try_from(enc_crl: &[u8]) -> Result<Self> {
        let crl = CertificateList::from_der(enc_crl)?;
        let mut pdv_crl = PDVCrl::try_from(crl)?;
        // keep the presented encoding for signature verification
        pdv_crl.encoded_crl = enc_crl.to_vec();
        Ok(pdv_crl)
    }
}

impl PDVCrl {
    /// Issuer name of the CRL
    pub fn issuer(&self) -> &Name {
        &self.decoded_crl.tbs_cert_list.issuer
    }

    /// thisUpdate as seconds since the Unix epoch
    pub fn this_update(&self) -> u64 {
        self.decoded_crl
            .tbs_cert_list
            .this_update
            .to_unix_duration()
            .as_secs()
    }

    /// nextUpdate as seconds since the Unix epoch, if present
    pub fn next_update(&self) -> Option<u64> {
        self.decoded_crl
            .tbs_cert_list
            .next_update
            .map(|nu| nu.to_unix_duration().as_secs())
    }

    /// Returns true if the CRL carries a deltaCRLIndicator extension
    pub fn is_delta(&self) -> bool {
        self.base_crl_number.is_some()
    }

    /// `coverage` reports which certificates the CRL covers per its issuingDistributionPoint
    pub fn coverage(&self) -> CrlCoverage {
        match &self.idp {
            Some(idp) if idp.only_contains_attribute_certs => CrlCoverage::AttributeOnly,
            Some(idp) if idp.only_contains_user_certs => CrlCoverage::EeOnly,
            Some(idp) if idp.only_contains_ca_certs => CrlCoverage::CaOnly,
            _ => CrlCoverage::All,
        }
    }

    /// Returns true if the issuingDistributionPoint marks the CRL as indirect
    pub fn is_indirect(&self) -> bool {
        matches!(&self.idp, Some(idp) if idp.indirect_crl)
    }

    /// Returns true if the issuingDistributionPoint limits the CRL to some revocation reasons
    pub fn only_some_reasons(&self) -> bool {
        matches!(&self.idp, Some(idp) if idp.only_some_reasons.is_some())
    }

    /// Revoked certificate entries, empty if the CRL lists none
    pub fn entries(&self) -> &[RevokedCert] {
        match &self.decoded_crl.tbs_cert_list.revoked_certificates {
            Some(rcs) => rcs.as_slice(),
            None => &[],
        }
    }

    /// `valid_at_time` returns `CrlNotYetValid` if thisUpdate is after `toi` and `CrlHasExpired` if
    /// nextUpdate is present and before `toi`.
    pub fn valid_at_time(&self, toi: u64) -> core::result::Result<(), PathValidationStatus> {
        if self.this_update() > toi {
            return Err(PathValidationStatus::CrlNotYetValid);
        }
        match self.next_update() {
            Some(nu) if nu < toi => Err(PathValidationStatus::CrlHasExpired),
            _ => Ok(()),
        }
    }
}

/// `parse_crl` takes a buffer containing a binary DER encoded CRL and returns a [`PDVCrl`] if
/// parsing was successful.
pub fn parse_crl(buffer: &[u8], locator: &str) -> Result<PDVCrl> {
    match PDVCrl::try_from(buffer) {
        Ok(mut crl) => {
            crl.locator = Some(locator.to_string());
            Ok(crl)
        }
        Err(e) => {
            error!("Failed to parse CRL from {}: {}", locator, e);
            Err(e)
        }
    }
}

#[test]
fn crl_number_ordering() {
    assert_eq!(Ordering::Equal, compare_crl_numbers(&[0, 5], &[5]));
    assert_eq!(Ordering::Less, compare_crl_numbers(&[0xff], &[1, 0]));
    assert_eq!(Ordering::Greater, compare_crl_numbers(&[2, 0], &[1, 0xff]));
    assert_eq!(Ordering::Equal, compare_crl_numbers(&[], &[0]));
}
