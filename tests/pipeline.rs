//! End-to-end run over on-disk fixtures: master CSV -> prep -> train -> assess.
//! No network: the live lookup runs offline and falls back to history.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate};
use coral_risk::app::pipeline::{self, LiveLookup};
use coral_risk::data::ErddapClient;
use coral_risk::domain::{Metric, ReefLocation, RiskLevel};
use coral_risk::fit::{TrainOptions, train_from_processed};
use coral_risk::models::{BoostParams, GradientBoostingModel};
use coral_risk::risk::{DataSource, LiveCache};

const DAYS: i64 = 60;

/// Two reefs: one heating up to DHW 12, one that never accumulates heat.
fn write_master_fixture(path: &Path) {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let mut text = String::from(
        "time,latitude,longitude,location_name,sea_surface_temp_c,hotspot_c,degree_heating_week_c_weeks,\
         sst_anomaly_c,bleaching_alert_area,bleaching_alert_area_7d_max\n",
    );
    for i in 0..DAYS {
        let date = start + ChronoDuration::days(i);
        let dhw = 12.0 * i as f64 / (DAYS - 1) as f64;
        let sst = 28.0 + dhw / 4.0;
        // One gap in the SST column to exercise forward fill.
        let sst_cell = if i == 10 { String::new() } else { format!("{sst:.2}") };
        writeln!(
            text,
            "{date}T12:00:00Z,10.0,80.0,Hot_Reef,{sst_cell},{:.2},{dhw:.2},{:.2},{},{}",
            dhw / 6.0,
            dhw / 5.0,
            (dhw / 3.0).floor().min(4.0),
            (dhw / 3.0).floor().min(4.0),
        )
        .unwrap();
        writeln!(text, "{date}T12:00:00Z,20.0,70.0,Cool_Reef,26.50,0.00,0.00,-0.20,0,0").unwrap();
    }
    // Duplicate row and an unparseable row.
    text.push_str("2020-01-01T12:00:00Z,20.0,70.0,Cool_Reef,26.50,0.00,0.00,-0.20,0,0\n");
    text.push_str("not-a-date,20.0,70.0,Cool_Reef,26.50,0.00,0.00,-0.20,0,0\n");
    std::fs::write(path, text).unwrap();
}

fn small_params() -> BoostParams {
    BoostParams {
        n_estimators: 40,
        learning_rate: 0.3,
        max_depth: 3,
        subsample: 1.0,
        ..BoostParams::default()
    }
}

fn offline_lookup() -> LiveLookup<ErddapClient> {
    LiveLookup::new(None, LiveCache::new(Duration::from_secs(60)))
}

#[test]
fn prep_train_assess_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let master = dir.path().join("master.csv");
    let processed = dir.path().join("processed.csv");
    let model_path = dir.path().join("model.json");
    write_master_fixture(&master);

    let loaded = coral_risk::io::read_observations(&master).unwrap();
    assert_eq!(loaded.row_errors.len(), 1);
    assert_eq!(loaded.rows.len(), (2 * DAYS + 1) as usize);

    let prep = pipeline::run_prep(loaded.rows, 42).unwrap();
    assert_eq!(prep.clean.duplicates_removed, 1);
    assert_eq!(prep.clean.filled, 1);
    assert_eq!(prep.records.len(), (2 * DAYS) as usize);
    assert!(
        prep.records
            .iter()
            .all(|r| (0.0..=100.0).contains(&r.bleaching_risk_percent))
    );

    coral_risk::io::write_processed(&processed, &prep.records).unwrap();
    let history = pipeline::load_history(&processed).unwrap();
    assert_eq!(history.len(), prep.records.len());

    let opts = TrainOptions {
        params: small_params(),
        ..TrainOptions::default()
    };
    let outcome = train_from_processed(&history, &opts).unwrap();
    assert_eq!(outcome.n_train + outcome.n_test, history.len());
    assert!(outcome.metrics.r2 > 0.5, "r2 = {}", outcome.metrics.r2);

    outcome.model.save(&model_path).unwrap();
    let model = pipeline::load_model(&model_path).unwrap();
    assert_eq!(model.n_trees(), outcome.model.n_trees());
    assert_eq!(
        model.predict(&history[0].features),
        outcome.model.predict(&history[0].features)
    );

    let mut lookup = offline_lookup();
    assert!(lookup.is_offline());

    let hot = ReefLocation::new("Hot_Reef", 10.0, 80.0);
    let cool = ReefLocation::new("Cool_Reef", 20.0, 70.0);
    let (hot_base, hot_risk) = pipeline::assess_reef(&mut lookup, &model, &hot, &history).unwrap();
    let (_, cool_risk) = pipeline::assess_reef(&mut lookup, &model, &cool, &history).unwrap();

    let last_day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + ChronoDuration::days(DAYS - 1);
    assert_eq!(hot_risk.source, DataSource::HistoricalFallback { date: last_day });
    assert!((hot_risk.dhw - 12.0).abs() < 1e-9);
    assert!(hot_risk.risk_percent > cool_risk.risk_percent);
    assert_eq!(cool_risk.level, RiskLevel::Low);

    // Cooling the hot reef in the simulator lowers its risk.
    let sim = coral_risk::risk::simulate(&model, &hot_base, hot_base.features.sst() - 2.0, 0.0).unwrap();
    assert!(!sim.clamped);
    assert!(sim.risk_percent < hot_risk.risk_percent);

    let rows = coral_risk::risk::history_for_location(&history, "Hot_Reef");
    let plot = coral_risk::plot::render_history_plot(&rows, &Metric::DEFAULT_SELECTION, 40, 10);
    assert!(plot.starts_with(&format!("Plot: 2020-01-01..{last_day}")));

    let insight = coral_risk::risk::historical_insight(&history, "Hot_Reef").unwrap();
    assert!(insight.dhw >= 8.0);
}

#[test]
fn missing_model_names_the_producing_command() {
    let dir = tempfile::tempdir().unwrap();
    let err = pipeline::load_model(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("coral train"));
}

#[test]
fn corrupt_model_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(&path, "{\"format_version\": 1}").unwrap();
    assert!(GradientBoostingModel::load(&path).is_err());
}

#[test]
fn offline_assessment_without_history_fails_cleanly() {
    let mut lookup = offline_lookup();
    let model = {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.csv");
        write_master_fixture(&master);
        let rows = pipeline::load_observations(&master).unwrap();
        let prep = pipeline::run_prep(rows, 7).unwrap();
        let opts = TrainOptions {
            params: small_params(),
            ..TrainOptions::default()
        };
        train_from_processed(&prep.records, &opts).unwrap().model
    };

    let unknown = ReefLocation::new("Nowhere", 0.0, 0.0);
    let err = pipeline::assess_reef(&mut lookup, &model, &unknown, &[]).unwrap_err();
    assert_eq!(err.exit_code(), 3);
}
