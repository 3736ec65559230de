//! Verification of certificate chains, including the verification state machine and certificate
//! policy processing

pub mod cert_path;
pub mod name_constraints;
pub mod pdv_certificate;
pub mod pdv_extension;
pub mod policy_tree;
mod policy_utilities;
pub mod purpose;
pub mod verify_context;
pub mod verify_params;

pub use crate::{
    validator::cert_path::*, validator::name_constraints::*, validator::pdv_certificate::*,
    validator::pdv_extension::*, validator::policy_tree::*, validator::purpose::*,
    validator::verify_context::*, validator::verify_params::*,
};
