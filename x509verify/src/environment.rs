//! Callback switchboard used to verify signatures during chain building and verification

pub mod pki_environment;
pub mod pki_environment_traits;

pub use crate::environment::{pki_environment::*, pki_environment_traits::*};
