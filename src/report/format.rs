//! Formatted terminal output for every command.
//!
//! Formatting lives here so the pipeline code stays free of presentation and
//! output changes stay localized.

use std::path::Path;

use crate::domain::display_location;
use crate::fit::TrainOutcome;
use crate::prep::{CleanReport, FeatureReport, LabelSummary, MergeReport};
use crate::report::LocationSummary;
use crate::risk::{DataSource, HistoricalInsight, RiskAssessment, Simulation};

pub fn format_fetch_summary(summaries: &[LocationSummary], output: &Path, failed: &[String]) -> String {
    let mut out = String::new();
    out.push_str("=== coral - NOAA CRW download ===\n");
    out.push_str(&format_location_table(summaries));
    for name in failed {
        out.push_str(&format!("  (no data) {}\n", display_location(name)));
    }
    let total: usize = summaries.iter().map(|s| s.rows).sum();
    out.push_str(&format!("\nSaved {total} rows to '{}'.\n", output.display()));
    out
}

pub fn format_merge_summary(report: &MergeReport, output: &Path) -> String {
    let mut out = String::new();
    out.push_str("=== coral - merge ===\n");
    out.push_str(&format!("Original rows : {}\n", report.master_rows));
    out.push_str(&format!("Patch rows    : {}\n", report.patch_rows));
    if report.patched_locations.is_empty() {
        out.push_str("Replaced      : (none)\n");
    } else {
        let names: Vec<String> = report
            .patched_locations
            .iter()
            .map(|n| display_location(n))
            .collect();
        out.push_str(&format!("Replaced      : {} ({} rows removed)\n", names.join(", "), report.removed));
    }
    out.push_str(&format!("Final rows    : {}\n", report.final_rows));
    out.push_str(&format!("\nSaved merged dataset to '{}'.\n", output.display()));
    out
}

pub fn format_prep_summary(
    clean: &CleanReport,
    features: &FeatureReport,
    labels: &LabelSummary,
    rows_out: usize,
    output: &Path,
) -> String {
    let mut out = String::new();
    out.push_str("=== coral - preprocessing ===\n");
    out.push_str(&format!("Rows read: {}\n", clean.rows_in));

    out.push_str("\nMissing values before filling:\n");
    for (name, count) in clean.missing_by_name() {
        out.push_str(&format!("  {name:<28} {count:>8}\n"));
    }
    out.push_str(&format!(
        "Forward-filled {} value(s); {} left missing.\n",
        clean.filled, clean.still_missing
    ));
    out.push_str(&format!("Removed {} duplicate row(s).\n", clean.duplicates_removed));
    if features.dropped_incomplete > 0 {
        out.push_str(&format!("Dropped {} incomplete row(s).\n", features.dropped_incomplete));
    }

    out.push_str("\nLabels by DHW band:\n");
    out.push_str(&format!("  DHW = 0      (1-5%)   {:>8}\n", labels.none));
    out.push_str(&format!("  0 < DHW < 4  (10-30%) {:>8}\n", labels.watch));
    out.push_str(&format!("  4 <= DHW < 8 (30-60%) {:>8}\n", labels.warning));
    out.push_str(&format!("  DHW >= 8     (60-90%) {:>8}\n", labels.severe));
    if labels.unbanded > 0 {
        out.push_str(&format!("  negative DHW (0%)     {:>8}\n", labels.unbanded));
    }

    out.push_str(&format!("\nSaved {rows_out} processed rows to '{}'.\n", output.display()));
    out
}

pub fn format_training_summary(outcome: &TrainOutcome, output: &Path) -> String {
    let p = &outcome.model.params;
    let mut out = String::new();
    out.push_str("=== coral - model training ===\n");
    out.push_str(&format!(
        "Split: train={} | test={}\n",
        outcome.n_train, outcome.n_test
    ));
    out.push_str(&format!(
        "Params: trees={} lr={} depth={} subsample={} colsample={} seed={}\n",
        p.n_estimators, p.learning_rate, p.max_depth, p.subsample, p.colsample, p.seed
    ));
    if let Some(best) = outcome.model.best_iteration {
        out.push_str(&format!(
            "Early stopping kept {} tree(s) (best round {}).\n",
            outcome.model.n_trees(),
            best + 1
        ));
    }

    out.push_str("\nModel evaluation (test set):\n");
    out.push_str(&format!("R-squared (R2)            : {:.4}\n", outcome.metrics.r2));
    out.push_str(&format!("Mean Absolute Error (MAE) : {:.4}\n", outcome.metrics.mae));
    out.push_str(&format!("Root Mean Sq. Error (RMSE): {:.4}\n", outcome.metrics.rmse));
    out.push_str(&format!("\nSaved model to '{}'.\n", output.display()));
    out
}

pub fn format_assessment(a: &RiskAssessment) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} - live risk assessment ===\n", a.reef.display_name()));
    if let DataSource::HistoricalFallback { date } = a.source {
        out.push_str(&format!(
            "WARNING: live data unavailable; using most recent historical data from {date}.\n"
        ));
    }
    out.push_str(&format!("Data date       : {}\n", a.time.date_naive()));
    out.push_str(&format!(
        "Bleaching risk  : {:.2}% ({}, {})\n",
        a.risk_percent,
        a.level.display_name(),
        a.level.color_name()
    ));
    out.push_str(&format!("Sea surface temp: {:.2} °C\n", a.sst));
    out.push_str(&format!("Degree heating  : {:.2} °C-weeks\n", a.dhw));
    out
}

pub fn format_simulation(s: &Simulation) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "What-if: SST {:.1} °C, DHW {:.1} °C-weeks -> {:.2}% ({})\n",
        s.sst,
        s.dhw,
        s.risk_percent,
        s.level.display_name()
    ));
    if s.clamped {
        out.push_str("  (inputs clamped to the simulator range)\n");
    }
    out
}

pub fn format_insight(reef_name: &str, insight: Option<&HistoricalInsight>) -> String {
    match insight {
        Some(i) => format!(
            "Historical peak for {}: {:.2}% on {} (DHW {:.2} °C-weeks).\n",
            display_location(reef_name),
            i.risk_percent,
            i.date,
            i.dhw
        ),
        None => format!("No historical rows for {}.\n", display_location(reef_name)),
    }
}

fn format_location_table(rows: &[LocationSummary]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<24} {:>8} {:<10} {:<10}", "location", "rows", "first", "last").trim_end());
    out.push('\n');
    out.push_str(&format!("{:-<24} {:-<8} {:-<10} {:-<10}", "", "", "", ""));
    out.push('\n');
    for s in rows {
        out.push_str(&format!(
            "{:<24} {:>8} {:<10} {:<10}",
            truncate(&display_location(&s.location_name), 24),
            s.rows,
            s.first,
            s.last
        ));
        out.push('\n');
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::domain::{ReefLocation, RiskLevel, parse_time};

    #[test]
    fn fetch_summary_table() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let rows = vec![LocationSummary {
            location_name: "Gulf_of_Mannar".to_string(),
            rows: 365,
            first: d("2020-01-01"),
            last: d("2020-12-30"),
        }];
        let txt = format_fetch_summary(&rows, Path::new("out.csv"), &["Gulf_of_Kutch".to_string()]);
        let expected = concat!(
            "=== coral - NOAA CRW download ===\n",
            "location                     rows first      last\n",
            "------------------------ -------- ---------- ----------\n",
            "Gulf of Mannar                365 2020-01-01 2020-12-30\n",
            "  (no data) Gulf of Kutch\n",
            "\n",
            "Saved 365 rows to 'out.csv'.\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn fallback_warning_names_the_date() {
        let a = RiskAssessment {
            reef: ReefLocation::new("Andaman_Islands", 11.25, 92.77),
            time: parse_time("2024-12-31").unwrap(),
            risk_percent: 42.0,
            level: RiskLevel::Moderate,
            sst: 29.5,
            dhw: 4.25,
            source: DataSource::HistoricalFallback {
                date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            },
        };
        let txt = format_assessment(&a);
        assert!(txt.starts_with("=== Andaman Islands - live risk assessment ===\n"));
        assert!(txt.contains("historical data from 2024-12-31"));
        assert!(txt.contains("Bleaching risk  : 42.00% (Moderate, yellow)\n"));
        assert!(txt.contains("Degree heating  : 4.25 °C-weeks\n"));
    }

    #[test]
    fn insight_line() {
        let i = HistoricalInsight {
            date: NaiveDate::from_ymd_opt(2016, 5, 20).unwrap(),
            risk_percent: 88.5,
            dhw: 11.0,
        };
        assert_eq!(
            format_insight("Gulf_of_Mannar", Some(&i)),
            "Historical peak for Gulf of Mannar: 88.50% on 2016-05-20 (DHW 11.00 °C-weeks).\n"
        );
        assert_eq!(format_insight("X", None), "No historical rows for X.\n");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
