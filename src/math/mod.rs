//! Numeric utilities: regression metrics and the seeded train/test split.

pub mod metrics;
pub mod split;

pub use metrics::*;
pub use split::*;
