//! Turn cleaned observations into complete model rows.

use crate::domain::{FeatureVector, Observation, ProcessedRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureReport {
    pub rows_in: usize,
    /// Rows dropped because a CRW value was still missing after filling.
    pub dropped_incomplete: usize,
}

/// Derive the ten features for every complete observation.
///
/// Labels start at 0 and are filled by [`super::label::apply_heuristic_labels`].
pub fn build_records(rows: &[Observation]) -> (Vec<ProcessedRecord>, FeatureReport) {
    let records: Vec<ProcessedRecord> = rows
        .iter()
        .filter_map(|obs| {
            let features = FeatureVector::from_reading(obs.time, &obs.values)?;
            Some(ProcessedRecord {
                time: obs.time,
                latitude: obs.latitude,
                longitude: obs.longitude,
                location_name: obs.location_name.clone(),
                features,
                bleaching_risk_percent: 0.0,
            })
        })
        .collect();

    let report = FeatureReport {
        rows_in: rows.len(),
        dropped_incomplete: rows.len() - records.len(),
    };
    if report.dropped_incomplete > 0 {
        tracing::warn!(dropped = report.dropped_incomplete, "dropped rows with missing CRW values");
    }
    (records, report)
}
