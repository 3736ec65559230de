//! Human readable rendering of distinguished names and policy trees

pub mod name_printer;
pub mod policy_printer;

pub use crate::printers::{name_printer::*, policy_printer::*};
