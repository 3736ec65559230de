//! Storage for trusted certificates and CRLs

pub mod cert_store;

pub use crate::source::cert_store::*;
