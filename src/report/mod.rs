//! Reporting utilities: per-location dataset summaries and formatted terminal
//! output.

pub mod format;

pub use format::*;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::Observation;

/// Row count and date range of one location in a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSummary {
    pub location_name: String,
    pub rows: usize,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

/// Summaries sorted by location name.
pub fn summarize_locations(rows: &[Observation]) -> Vec<LocationSummary> {
    let mut by_loc: BTreeMap<&str, LocationSummary> = BTreeMap::new();
    for obs in rows {
        let date = obs.time.date_naive();
        by_loc
            .entry(obs.location_name.as_str())
            .and_modify(|s| {
                s.rows += 1;
                s.first = s.first.min(date);
                s.last = s.last.max(date);
            })
            .or_insert_with(|| LocationSummary {
                location_name: obs.location_name.clone(),
                rows: 1,
                first: date,
                last: date,
            });
    }
    by_loc.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrwValues, parse_time};

    #[test]
    fn summaries_group_and_sort_by_location() {
        let obs = |loc: &str, date: &str| Observation {
            time: parse_time(date).unwrap(),
            latitude: 0.0,
            longitude: 0.0,
            location_name: loc.to_string(),
            values: CrwValues::default(),
        };
        let rows = vec![
            obs("Lakshadweep_Islands", "2020-02-01"),
            obs("Andaman_Islands", "2020-03-01"),
            obs("Lakshadweep_Islands", "2019-12-31"),
        ];

        let s = summarize_locations(&rows);
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].location_name, "Andaman_Islands");
        assert_eq!(s[1].rows, 2);
        assert_eq!(s[1].first, NaiveDate::from_ymd_opt(2019, 12, 31).unwrap());
        assert_eq!(s[1].last, NaiveDate::from_ymd_opt(2020, 2, 1).unwrap());
    }
}
