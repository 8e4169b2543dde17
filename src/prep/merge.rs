//! Replace a location's rows in the master dataset with a re-fetched patch.

use std::collections::HashSet;

use crate::domain::Observation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub master_rows: usize,
    pub patch_rows: usize,
    /// Master rows dropped because their location appears in the patch.
    pub removed: usize,
    pub final_rows: usize,
    /// Locations replaced by the patch, sorted.
    pub patched_locations: Vec<String>,
}

/// Drop every master row whose location occurs in `patch`, append the patch,
/// and sort by `(location_name, time)`.
///
/// The sort is stable, so rows with equal keys keep master-then-patch order.
pub fn merge_datasets(master: Vec<Observation>, patch: Vec<Observation>) -> (Vec<Observation>, MergeReport) {
    let patched: HashSet<&str> = patch.iter().map(|o| o.location_name.as_str()).collect();
    let mut patched_locations: Vec<String> = patched.iter().map(|s| s.to_string()).collect();
    patched_locations.sort();

    let master_rows = master.len();
    let patch_rows = patch.len();

    let mut merged: Vec<Observation> = master
        .into_iter()
        .filter(|o| !patched_locations.iter().any(|p| p == &o.location_name))
        .collect();
    let removed = master_rows - merged.len();

    merged.extend(patch);
    merged.sort_by(|a, b| {
        a.location_name
            .cmp(&b.location_name)
            .then_with(|| a.time.cmp(&b.time))
    });

    tracing::info!(master_rows, patch_rows, removed, final_rows = merged.len(), "merged datasets");

    let report = MergeReport {
        master_rows,
        patch_rows,
        removed,
        final_rows: merged.len(),
        patched_locations,
    };
    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrwValues, parse_time};

    fn obs(loc: &str, date: &str, sst: f64) -> Observation {
        Observation {
            time: parse_time(date).unwrap(),
            latitude: 0.0,
            longitude: 0.0,
            location_name: loc.to_string(),
            values: CrwValues {
                sst: Some(sst),
                ..CrwValues::default()
            },
        }
    }

    #[test]
    fn patch_replaces_whole_location() {
        let master = vec![
            obs("Gulf_of_Mannar", "2020-01-02", f64::NAN),
            obs("Andaman_Islands", "2020-01-01", 28.0),
            obs("Gulf_of_Mannar", "2020-01-01", f64::NAN),
        ];
        let patch = vec![
            obs("Gulf_of_Mannar", "2020-01-02", 29.2),
            obs("Gulf_of_Mannar", "2020-01-01", 29.1),
        ];

        let (merged, report) = merge_datasets(master, patch);
        assert_eq!(
            report,
            MergeReport {
                master_rows: 3,
                patch_rows: 2,
                removed: 2,
                final_rows: 3,
                patched_locations: vec!["Gulf_of_Mannar".to_string()],
            }
        );
        assert_eq!(merged[0].location_name, "Andaman_Islands");
        assert_eq!(merged[1].values.sst, Some(29.1));
        assert_eq!(merged[2].values.sst, Some(29.2));
    }

    #[test]
    fn empty_patch_only_sorts() {
        let master = vec![obs("B", "2020-01-01", 1.0), obs("A", "2020-01-02", 2.0)];
        let (merged, report) = merge_datasets(master, Vec::new());
        assert_eq!(report.removed, 0);
        assert_eq!(merged[0].location_name, "A");
    }
}
