//! Domain models for commission processing

pub mod domain;

pub use domain::*;
