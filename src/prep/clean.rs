//! Gap filling and de-duplication of the raw master dataset.

use std::collections::{HashMap, HashSet};

use crate::domain::{CRW_COLUMNS, CrwValues, Observation};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows_in: usize,
    /// Missing values per CRW column before filling, in [`CRW_COLUMNS`] order.
    pub missing_per_column: [usize; 6],
    /// Values filled from an earlier row of the same location.
    pub filled: usize,
    pub duplicates_removed: usize,
    /// Missing values left after filling (leading gaps).
    pub still_missing: usize,
    pub rows_out: usize,
}

impl CleanReport {
    pub fn missing_by_name(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        CRW_COLUMNS.iter().copied().zip(self.missing_per_column.iter().copied())
    }
}

/// Forward-fill missing CRW values, then drop exact duplicate rows.
///
/// Filling walks the rows in order and carries the last seen value per
/// location, so one reef's readings never leak into another's. Gaps at the
/// start of a location stay missing. Duplicates are compared after filling;
/// the first occurrence is kept.
pub fn clean(rows: Vec<Observation>) -> (Vec<Observation>, CleanReport) {
    let mut report = CleanReport {
        rows_in: rows.len(),
        ..CleanReport::default()
    };

    let mut last_seen: HashMap<String, [Option<f64>; 6]> = HashMap::new();
    let mut filled_rows = Vec::with_capacity(rows.len());

    for mut obs in rows {
        let carried = last_seen
            .entry(obs.location_name.clone())
            .or_insert([None; 6]);

        let mut values = obs.values.as_array();
        for (col, (value, carry)) in values.iter_mut().zip(carried.iter_mut()).enumerate() {
            match *value {
                Some(v) => *carry = Some(v),
                None => {
                    report.missing_per_column[col] += 1;
                    if carry.is_some() {
                        *value = *carry;
                        report.filled += 1;
                    } else {
                        report.still_missing += 1;
                    }
                }
            }
        }
        obs.values = CrwValues::from_array(values);
        filled_rows.push(obs);
    }

    let mut seen = HashSet::with_capacity(filled_rows.len());
    let before = filled_rows.len();
    let deduped: Vec<Observation> = filled_rows.into_iter().filter(|o| seen.insert(o.key())).collect();
    report.duplicates_removed = before - deduped.len();
    report.rows_out = deduped.len();

    tracing::info!(
        rows_in = report.rows_in,
        filled = report.filled,
        still_missing = report.still_missing,
        duplicates_removed = report.duplicates_removed,
        "cleaned dataset"
    );

    (deduped, report)
}
