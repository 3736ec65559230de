//! Revocation status determination using CRLs
//!
//! CRLs are presented to the engine already retrieved and parsed, either through the
//! [`CertificateStore`](crate::CertificateStore) or as an override set on a
//! [`VerifyContext`](crate::VerifyContext). CRL checking runs when the
//! [`CrlCheck`](crate::VerifyFlags::CrlCheck) or [`CrlCheckAll`](crate::VerifyFlags::CrlCheckAll)
//! flags are set.

pub mod crl;
pub mod pdv_crl;

pub use crate::revocation::{crl::*, pdv_crl::*};
