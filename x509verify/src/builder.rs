//! Certificate chain building

pub mod chain_builder;

pub use crate::builder::chain_builder::*;
