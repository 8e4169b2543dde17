//! Risk assessment: live lookup with historical fallback, what-if simulation,
//! and historical summaries.
//!
//! The flow for one reef:
//! 1. try the latest live CRW reading (cached per reef for a TTL)
//! 2. if that fails or is incomplete, use the most recent processed row
//! 3. run the model on the resulting [`Baseline`]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};

use crate::data::{ErddapClient, HttpFetch};
use crate::domain::{FeatureVector, Observation, ProcessedRecord, ReefLocation, RiskLevel};
use crate::error::AppError;
use crate::models::GradientBoostingModel;

/// Where the baseline reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Live,
    /// Live data was unavailable; `date` is the historical row used instead.
    HistoricalFallback { date: NaiveDate },
}

/// The reading a risk assessment (and simulation) starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub reef: ReefLocation,
    pub time: DateTime<Utc>,
    pub features: FeatureVector,
    pub source: DataSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub reef: ReefLocation,
    pub time: DateTime<Utc>,
    pub risk_percent: f64,
    pub level: RiskLevel,
    pub sst: f64,
    pub dhw: f64,
    pub source: DataSource,
}

/// Source of the latest live observation for a reef.
pub trait LiveSource {
    fn latest(&self, reef: &ReefLocation, today: NaiveDate) -> Option<Observation>;
}

impl<H: HttpFetch> LiveSource for ErddapClient<H> {
    fn latest(&self, reef: &ReefLocation, today: NaiveDate) -> Option<Observation> {
        self.fetch_latest(reef, today)
    }
}

/// Per-reef cache of live lookups. Failed lookups are cached too, so an
/// unreachable server is not retried on every redraw.
#[derive(Debug, Clone)]
pub struct LiveCache {
    ttl: Duration,
    entries: HashMap<String, (Instant, Option<Observation>)>,
}

impl LiveCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get_or_fetch<F>(&mut self, reef: &ReefLocation, now: Instant, fetch: F) -> Option<Observation>
    where
        F: FnOnce() -> Option<Observation>,
    {
        if let Some((at, cached)) = self.entries.get(&reef.name) {
            if now.saturating_duration_since(*at) < self.ttl {
                tracing::debug!(reef = %reef.name, "live cache hit");
                return cached.clone();
            }
        }
        let fresh = fetch();
        self.entries.insert(reef.name.clone(), (now, fresh.clone()));
        fresh
    }

    pub fn invalidate(&mut self, reef: &ReefLocation) {
        self.entries.remove(&reef.name);
    }
}

/// Build the baseline from a live observation, falling back to history.
///
/// A live observation with any missing CRW value is treated as unavailable.
pub fn resolve_baseline(
    reef: &ReefLocation,
    live: Option<&Observation>,
    history: &[ProcessedRecord],
) -> Result<Baseline, AppError> {
    if let Some(obs) = live {
        match FeatureVector::from_reading(obs.time, &obs.values) {
            Some(features) => {
                return Ok(Baseline {
                    reef: reef.clone(),
                    time: obs.time,
                    features,
                    source: DataSource::Live,
                });
            }
            None => tracing::warn!(reef = %reef.name, time = %obs.time, "live reading incomplete"),
        }
    }

    let latest = latest_for_location(history, &reef.name).ok_or_else(|| {
        AppError::new(
            3,
            format!(
                "No live data and no historical rows for {}.",
                reef.display_name()
            ),
        )
    })?;
    tracing::warn!(reef = %reef.name, date = %latest.date(), "using historical fallback");

    Ok(Baseline {
        reef: reef.clone(),
        time: latest.time,
        features: latest.features,
        source: DataSource::HistoricalFallback { date: latest.date() },
    })
}

pub fn assess(model: &GradientBoostingModel, baseline: &Baseline) -> Result<RiskAssessment, AppError> {
    let risk_percent = predict_checked(model, &baseline.features)?;
    Ok(RiskAssessment {
        reef: baseline.reef.clone(),
        time: baseline.time,
        risk_percent,
        level: RiskLevel::from_percent(risk_percent),
        sst: baseline.features.sst(),
        dhw: baseline.features.dhw(),
        source: baseline.source,
    })
}

/// Slider ranges for the what-if simulator, centred on a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimBounds {
    pub sst_min: f64,
    pub sst_max: f64,
    pub dhw_min: f64,
    pub dhw_max: f64,
}

impl SimBounds {
    pub const STEP: f64 = 0.1;

    /// SST in `[base - 2, base + 4]`, DHW in `[0, base + 8]`.
    pub fn around(features: &FeatureVector) -> Self {
        let sst = features.sst();
        let dhw = features.dhw();
        Self {
            sst_min: sst - 2.0,
            sst_max: sst + 4.0,
            dhw_min: 0.0,
            dhw_max: dhw.max(0.0) + 8.0,
        }
    }

    pub fn clamp_sst(&self, v: f64) -> f64 {
        v.clamp(self.sst_min, self.sst_max)
    }

    pub fn clamp_dhw(&self, v: f64) -> f64 {
        v.clamp(self.dhw_min, self.dhw_max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    pub sst: f64,
    pub dhw: f64,
    pub risk_percent: f64,
    pub level: RiskLevel,
    /// True when a requested value was outside [`SimBounds`].
    pub clamped: bool,
}

/// Predict risk for the baseline with SST and DHW replaced.
pub fn simulate(model: &GradientBoostingModel, baseline: &Baseline, sst: f64, dhw: f64) -> Result<Simulation, AppError> {
    if !(sst.is_finite() && dhw.is_finite()) {
        return Err(AppError::new(2, "Simulated SST and DHW must be finite numbers."));
    }
    let bounds = SimBounds::around(&baseline.features);
    let (sst_c, dhw_c) = (bounds.clamp_sst(sst), bounds.clamp_dhw(dhw));
    let clamped = sst_c != sst || dhw_c != dhw;
    if clamped {
        tracing::warn!(sst, dhw, sst_c, dhw_c, "simulated values clamped to slider range");
    }

    let risk_percent = predict_checked(model, &baseline.features.with_drivers(sst_c, dhw_c))?;
    Ok(Simulation {
        sst: sst_c,
        dhw: dhw_c,
        risk_percent,
        level: RiskLevel::from_percent(risk_percent),
        clamped,
    })
}

fn predict_checked(model: &GradientBoostingModel, features: &FeatureVector) -> Result<f64, AppError> {
    let risk = model.predict(features);
    if risk.is_finite() {
        Ok(risk)
    } else {
        Err(AppError::new(4, "Model produced a non-finite prediction."))
    }
}

/// Rows of one location, oldest first.
pub fn history_for_location<'a>(history: &'a [ProcessedRecord], name: &str) -> Vec<&'a ProcessedRecord> {
    let reef = ReefLocation::new(name, 0.0, 0.0);
    let mut rows: Vec<&ProcessedRecord> = history
        .iter()
        .filter(|r| reef.matches(&r.location_name))
        .collect();
    rows.sort_by_key(|r| r.time);
    rows
}

/// Most recent row of one location (last in file order on equal times).
pub fn latest_for_location<'a>(history: &'a [ProcessedRecord], name: &str) -> Option<&'a ProcessedRecord> {
    let reef = ReefLocation::new(name, 0.0, 0.0);
    history
        .iter()
        .filter(|r| reef.matches(&r.location_name))
        .max_by_key(|r| r.time)
}

/// Peak historical risk of a location.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalInsight {
    pub date: NaiveDate,
    pub risk_percent: f64,
    pub dhw: f64,
}

/// The row with the highest label; the earliest wins ties.
pub fn historical_insight(history: &[ProcessedRecord], name: &str) -> Option<HistoricalInsight> {
    let rows = history_for_location(history, name);
    let mut best: Option<&ProcessedRecord> = None;
    for r in rows {
        if best.is_none_or(|b| r.bleaching_risk_percent > b.bleaching_risk_percent) {
            best = Some(r);
        }
    }
    best.map(|r| HistoricalInsight {
        date: r.date(),
        risk_percent: r.bleaching_risk_percent,
        dhw: r.features.dhw(),
    })
}

/// Latest date across the whole history ("data last updated").
pub fn last_updated(history: &[ProcessedRecord]) -> Option<NaiveDate> {
    history.iter().map(|r| r.date()).max()
}
