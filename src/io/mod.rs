//! Input/output helpers.
//!
//! - master and processed dataset CSVs (`dataset`)

pub mod dataset;

pub use dataset::*;
