//! Terminal plots: risk gauge and metric history.

pub mod ascii;

pub use ascii::*;
