//! Dataset preparation: merge patches, clean, derive features, label.
//!
//! Stages run in this order for `coral prep`:
//! 1. [`clean::clean`] forward-fills gaps per location and drops duplicates
//! 2. [`features::build_records`] keeps complete rows and derives calendar features
//! 3. [`label::apply_heuristic_labels`] draws proxy bleaching labels from DHW

pub mod clean;
pub mod features;
pub mod label;
pub mod merge;

pub use clean::{CleanReport, clean};
pub use features::{FeatureReport, build_records};
pub use label::{LabelSummary, apply_heuristic_labels};
pub use merge::{MergeReport, merge_datasets};
