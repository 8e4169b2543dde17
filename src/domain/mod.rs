//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - reef sites and daily CRW observations (`ReefLocation`, `Observation`)
//! - model inputs and labeled rows (`FeatureVector`, `ProcessedRecord`)
//! - risk classes and the DHW labeling bands (`RiskLevel`, `DhwBand`)

pub mod types;

pub use types::*;
