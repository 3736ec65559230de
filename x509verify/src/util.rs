//! Basic utility functionality supporting certificate chain verification

pub mod crypto;
pub mod error;
pub mod pdv_utilities;

pub use crate::{util::crypto::*, util::error::*, util::pdv_utilities::*};
