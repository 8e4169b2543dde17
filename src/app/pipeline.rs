//! Shared workflows used by both the CLI and the dashboard.
//!
//! Keeping these in one place avoids duplicating the core flows:
//! - fetch: ERDDAP history per reef -> master rows
//! - prep: clean -> features -> labels
//! - assess: live lookup (cached) or historical fallback -> model
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use std::path::Path;
use std::time::Instant;

use chrono::Utc;

use crate::cli::require_file;
use crate::config::Settings;
use crate::data::{ErddapClient, HttpFetch};
use crate::data::erddap::{SECS_PER_REQUEST_ESTIMATE, estimate_requests};
use crate::domain::{Observation, ProcessedRecord, ReefLocation};
use crate::error::AppError;
use crate::models::GradientBoostingModel;
use crate::prep::{CleanReport, FeatureReport, LabelSummary};
use crate::report::{LocationSummary, summarize_locations};
use crate::risk::{Baseline, LiveCache, LiveSource, RiskAssessment};

/// Output of a bulk download.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// All rows, sorted by `(location_name, time)`.
    pub rows: Vec<Observation>,
    pub summaries: Vec<LocationSummary>,
    /// Reefs for which no chunk returned data.
    pub failed: Vec<String>,
}

/// Download `start_year..=end_year` for each reef.
///
/// Fails with exit 4 when no reef returned any data.
pub fn run_fetch(
    settings: &Settings,
    reefs: &[ReefLocation],
    start_year: i32,
    end_year: i32,
    chunk_months: u32,
) -> Result<FetchOutcome, AppError> {
    let client = ErddapClient::from_settings(settings)?;
    run_fetch_with(&client, reefs, start_year, end_year, chunk_months)
}

pub fn run_fetch_with<H: HttpFetch>(
    client: &ErddapClient<H>,
    reefs: &[ReefLocation],
    start_year: i32,
    end_year: i32,
    chunk_months: u32,
) -> Result<FetchOutcome, AppError> {
    let requests = estimate_requests(reefs.len(), start_year, end_year, chunk_months);
    tracing::info!(
        reefs = reefs.len(),
        start_year,
        end_year,
        requests,
        est_minutes = requests as u64 * SECS_PER_REQUEST_ESTIMATE / 60,
        "starting download"
    );

    let mut rows = Vec::new();
    let mut failed = Vec::new();

    for reef in reefs {
        let fetched = client.fetch_history(reef, start_year, end_year, chunk_months)?;
        if fetched.is_empty() {
            tracing::warn!(reef = %reef.name, "no data retrieved");
            failed.push(reef.name.clone());
        } else {
            tracing::info!(reef = %reef.name, rows = fetched.len(), "reef complete");
            rows.extend(fetched);
        }
    }

    if rows.is_empty() {
        return Err(AppError::new(4, "No data was fetched for any location."));
    }

    rows.sort_by(|a, b| {
        a.location_name
            .cmp(&b.location_name)
            .then_with(|| a.time.cmp(&b.time))
    });
    let summaries = summarize_locations(&rows);

    Ok(FetchOutcome {
        rows,
        summaries,
        failed,
    })
}

#[derive(Debug, Clone)]
pub struct PrepOutcome {
    pub records: Vec<ProcessedRecord>,
    pub clean: CleanReport,
    pub features: FeatureReport,
    pub labels: LabelSummary,
}

/// Clean, derive features and label. Fails with exit 3 when nothing survives.
pub fn run_prep(rows: Vec<Observation>, seed: u64) -> Result<PrepOutcome, AppError> {
    let (cleaned, clean) = crate::prep::clean(rows);
    let (mut records, features) = crate::prep::build_records(&cleaned);
    if records.is_empty() {
        return Err(AppError::new(3, "No complete rows remain after cleaning."));
    }
    let labels = crate::prep::apply_heuristic_labels(&mut records, seed);

    Ok(PrepOutcome {
        records,
        clean,
        features,
        labels,
    })
}

pub fn load_observations(path: &Path) -> Result<Vec<Observation>, AppError> {
    require_file(path, "coral fetch")?;
    let loaded = crate::io::read_observations(path)?;
    loaded.log_row_errors(path);
    tracing::info!(path = %path.display(), rows = loaded.rows.len(), "loaded dataset");
    Ok(loaded.rows)
}

pub fn load_history(path: &Path) -> Result<Vec<ProcessedRecord>, AppError> {
    require_file(path, "coral prep")?;
    let loaded = crate::io::read_processed(path)?;
    loaded.log_row_errors(path);
    if loaded.rows.is_empty() {
        return Err(AppError::new(3, format!("No usable rows in '{}'.", path.display())));
    }
    tracing::info!(path = %path.display(), rows = loaded.rows.len(), "loaded history");
    Ok(loaded.rows)
}

pub fn load_model(path: &Path) -> Result<GradientBoostingModel, AppError> {
    require_file(path, "coral train")?;
    GradientBoostingModel::load(path)
}

/// Live lookups behind a TTL cache. Offline mode never touches the network.
pub struct LiveLookup<S = ErddapClient> {
    source: Option<S>,
    cache: LiveCache,
}

impl LiveLookup<ErddapClient> {
    pub fn from_settings(settings: &Settings, offline: bool) -> Result<Self, AppError> {
        let source = if offline {
            None
        } else {
            Some(ErddapClient::from_settings(settings)?)
        };
        Ok(Self::new(source, LiveCache::new(settings.live_cache_ttl())))
    }
}

impl<S: LiveSource> LiveLookup<S> {
    pub fn new(source: Option<S>, cache: LiveCache) -> Self {
        Self { source, cache }
    }

    pub fn is_offline(&self) -> bool {
        self.source.is_none()
    }

    pub fn latest(&mut self, reef: &ReefLocation) -> Option<Observation> {
        let source = self.source.as_ref()?;
        let today = Utc::now().date_naive();
        self.cache
            .get_or_fetch(reef, Instant::now(), || source.latest(reef, today))
    }

    /// Baseline for a reef: live if possible, else the latest historical row.
    pub fn baseline(&mut self, reef: &ReefLocation, history: &[ProcessedRecord]) -> Result<Baseline, AppError> {
        let live = self.latest(reef);
        crate::risk::resolve_baseline(reef, live.as_ref(), history)
    }

    /// Drop the cached reading so the next lookup hits the server.
    pub fn refresh(&mut self, reef: &ReefLocation) {
        self.cache.invalidate(reef);
    }
}

pub fn assess_reef<S: LiveSource>(
    lookup: &mut LiveLookup<S>,
    model: &GradientBoostingModel,
    reef: &ReefLocation,
    history: &[ProcessedRecord],
) -> Result<(Baseline, RiskAssessment), AppError> {
    let baseline = lookup.baseline(reef, history)?;
    let assessment = crate::risk::assess(model, &baseline)?;
    Ok((baseline, assessment))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::data::{FetchError, FetchPolicy};
    use crate::domain::{CrwValues, parse_time};
    use crate::risk::DataSource;

    const PAYLOAD: &str = "time,latitude,longitude,CRW_SST,CRW_HOTSPOT,CRW_DHW,CRW_SSTANOMALY,CRW_BAA,CRW_BAA_7D_MAX
UTC,degrees_north,degrees_east,Celsius,Celsius,Celsius weeks,Celsius,1,1
2024-04-01T12:00:00Z,11.275,92.775,30.12,0.4,1.5,0.9,1,2
2024-04-02T12:00:00Z,11.275,92.775,30.20,0.5,1.6,1.0,1,2
";

    /// One response per request, in order; waits are skipped.
    struct Queued(RefCell<VecDeque<Result<String, FetchError>>>);

    impl HttpFetch for Queued {
        fn fetch_text(&self, _url: &str, _timeout: Duration) -> Result<String, FetchError> {
            self.0
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transport("no more responses".to_string())))
        }

        fn pause(&self, _delay: Duration) {}
    }

    /// One request per reef: a single one-year chunk and no retries.
    fn queued_client(responses: Vec<Result<String, FetchError>>) -> ErddapClient<Queued> {
        let mut policy = FetchPolicy::from_settings(&Settings::default());
        policy.max_retries = 1;
        ErddapClient::with_http(Queued(RefCell::new(responses.into())), policy)
    }

    struct CountingSource {
        calls: Cell<usize>,
        reading: Option<Observation>,
    }

    impl LiveSource for CountingSource {
        fn latest(&self, _reef: &ReefLocation, _today: NaiveDate) -> Option<Observation> {
            self.calls.set(self.calls.get() + 1);
            self.reading.clone()
        }
    }

    fn obs(date: &str, dhw: Option<f64>) -> Observation {
        Observation {
            time: parse_time(date).unwrap(),
            latitude: 22.47,
            longitude: 69.07,
            location_name: "Gulf_of_Kutch".to_string(),
            values: CrwValues {
                sst: Some(27.0),
                hotspot: Some(0.0),
                dhw,
                sst_anomaly: Some(0.2),
                baa: Some(0.0),
                baa_7d_max: Some(0.0),
            },
        }
    }

    fn reef() -> ReefLocation {
        ReefLocation::new("Gulf_of_Kutch", 22.47, 69.07)
    }

    #[test]
    fn prep_runs_all_stages() {
        let rows = vec![
            obs("2020-01-01", Some(0.0)),
            obs("2020-01-02", None),
            obs("2020-01-02", None),
            obs("2020-01-03", Some(9.0)),
        ];
        let out = run_prep(rows, 42).unwrap();
        assert_eq!(out.clean.duplicates_removed, 1);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.labels.none, 2);
        assert_eq!(out.labels.severe, 1);
        assert!(out.records[2].bleaching_risk_percent >= 60.0);

        let err = run_prep(vec![obs("2020-01-01", None)], 42).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn live_lookup_caches_and_offline_skips() {
        let history = crate::prep::build_records(&[obs("2019-12-31", Some(1.0))]).0;
        let source = CountingSource {
            calls: Cell::new(0),
            reading: Some(obs("2025-01-01", Some(3.0))),
        };
        let mut lookup = LiveLookup::new(Some(source), LiveCache::new(Duration::from_secs(3600)));

        let b = lookup.baseline(&reef(), &history).unwrap();
        assert_eq!(b.source, DataSource::Live);
        lookup.baseline(&reef(), &history).unwrap();
        assert_eq!(lookup.source.as_ref().unwrap().calls.get(), 1);

        lookup.refresh(&reef());
        lookup.baseline(&reef(), &history).unwrap();
        assert_eq!(lookup.source.as_ref().unwrap().calls.get(), 2);

        let mut offline: LiveLookup<CountingSource> =
            LiveLookup::new(None, LiveCache::new(Duration::from_secs(3600)));
        assert!(offline.is_offline());
        let b = offline.baseline(&reef(), &history).unwrap();
        assert!(matches!(b.source, DataSource::HistoricalFallback { .. }));
    }

    #[test]
    fn fetch_sorts_across_reefs_and_lists_failures() {
        let reefs = [
            ReefLocation::new("Zeta_Reef", 11.25, 92.77),
            ReefLocation::new("Alpha_Reef", 10.56, 72.64),
            ReefLocation::new("Mid_Reef", 8.80, 78.25),
        ];
        let client = queued_client(vec![
            Ok(PAYLOAD.to_string()),
            Ok("ERROR".to_string()),
            Ok(PAYLOAD.to_string()),
        ]);

        let out = run_fetch_with(&client, &reefs, 2024, 2024, 12).unwrap();
        assert_eq!(out.failed, vec!["Alpha_Reef".to_string()]);
        let order: Vec<(&str, NaiveDate)> = out
            .rows
            .iter()
            .map(|o| (o.location_name.as_str(), o.time.date_naive()))
            .collect();
        let d = |day| NaiveDate::from_ymd_opt(2024, 4, day).unwrap();
        assert_eq!(
            order,
            vec![("Mid_Reef", d(1)), ("Mid_Reef", d(2)), ("Zeta_Reef", d(1)), ("Zeta_Reef", d(2))]
        );
        let names: Vec<&str> = out.summaries.iter().map(|s| s.location_name.as_str()).collect();
        assert_eq!(names, vec!["Mid_Reef", "Zeta_Reef"]);
    }

    #[test]
    fn fetch_with_no_data_anywhere_is_exit_4() {
        let reefs = [reef(), ReefLocation::new("Gulf_of_Mannar", 8.80, 78.25)];
        let client = queued_client(vec![Ok("ERROR".to_string()), Err(FetchError::Timeout)]);
        let err = run_fetch_with(&client, &reefs, 2024, 2024, 12).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
