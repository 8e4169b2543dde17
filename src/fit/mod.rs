//! Model training orchestration.
//!
//! Responsibilities:
//!
//! - split processed rows into train/test sets (seeded)
//! - fit the gradient boosting model
//! - score the held-out rows

pub mod train;

pub use train::*;
