//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during preprocessing, training and inference
//! - exported to CSV/JSON
//! - reloaded later by the dashboard

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of model input features.
pub const N_FEATURES: usize = 10;

/// Feature names in model input order.
///
/// These match the processed CSV column names, so a saved model can be checked
/// against the dataset it is applied to.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "sea_surface_temp_c",
    "hotspot_c",
    "degree_heating_week_c_weeks",
    "sst_anomaly_c",
    "bleaching_alert_area",
    "bleaching_alert_area_7d_max",
    "year",
    "month",
    "day_of_year",
    "week_of_year",
];

/// Index of the SST feature in [`FEATURE_NAMES`].
pub const FEATURE_SST: usize = 0;
/// Index of the DHW feature in [`FEATURE_NAMES`].
pub const FEATURE_DHW: usize = 2;

/// A monitored reef site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReefLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl ReefLocation {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }

    /// `Gulf_of_Mannar` -> `Gulf of Mannar`.
    pub fn display_name(&self) -> String {
        display_location(&self.name)
    }

    /// True when `query` names this reef, ignoring case and `_` vs space.
    pub fn matches(&self, query: &str) -> bool {
        let norm = |s: &str| s.trim().replace(' ', "_").to_ascii_lowercase();
        norm(&self.name) == norm(query)
    }
}

pub fn display_location(name: &str) -> String {
    name.replace('_', " ")
}

/// The six NOAA Coral Reef Watch daily variables.
///
/// Each value may be missing: the ERDDAP server returns `NaN` for land-masked or
/// not-yet-processed cells.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrwValues {
    /// CRW_SST (°C).
    pub sst: Option<f64>,
    /// CRW_HOTSPOT (°C).
    pub hotspot: Option<f64>,
    /// CRW_DHW (°C-weeks).
    pub dhw: Option<f64>,
    /// CRW_SSTANOMALY (°C).
    pub sst_anomaly: Option<f64>,
    /// CRW_BAA (alert level 0-4).
    pub baa: Option<f64>,
    /// CRW_BAA_7D_MAX (alert level 0-4).
    pub baa_7d_max: Option<f64>,
}

impl CrwValues {
    pub fn as_array(&self) -> [Option<f64>; 6] {
        [
            self.sst,
            self.hotspot,
            self.dhw,
            self.sst_anomaly,
            self.baa,
            self.baa_7d_max,
        ]
    }

    pub fn from_array(values: [Option<f64>; 6]) -> Self {
        Self {
            sst: values[0],
            hotspot: values[1],
            dhw: values[2],
            sst_anomaly: values[3],
            baa: values[4],
            baa_7d_max: values[5],
        }
    }

    /// All six values, or `None` if any is missing.
    pub fn complete(&self) -> Option<[f64; 6]> {
        let a = self.as_array();
        let mut out = [0.0; 6];
        for (dst, src) in out.iter_mut().zip(a.iter()) {
            *dst = (*src)?;
        }
        Some(out)
    }

    pub fn missing_count(&self) -> usize {
        self.as_array().iter().filter(|v| v.is_none()).count()
    }
}

/// Column names of the six CRW variables (dataset schema order).
pub const CRW_COLUMNS: [&str; 6] = [
    "sea_surface_temp_c",
    "hotspot_c",
    "degree_heating_week_c_weeks",
    "sst_anomaly_c",
    "bleaching_alert_area",
    "bleaching_alert_area_7d_max",
];

/// One daily record for one reef.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: String,
    pub values: CrwValues,
}

/// Hashable identity of an observation, used to detect exact duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationKey {
    time: i64,
    latitude: u64,
    longitude: u64,
    location_name: String,
    values: [Option<u64>; 6],
}

impl Observation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            time: self.time.timestamp(),
            latitude: self.latitude.to_bits(),
            longitude: self.longitude.to_bits(),
            location_name: self.location_name.clone(),
            values: self.values.as_array().map(|v| v.map(f64::to_bits)),
        }
    }
}

/// The ten model inputs for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; N_FEATURES]);

impl FeatureVector {
    /// Build the features for a reading; `None` if any CRW variable is missing.
    pub fn from_reading(time: DateTime<Utc>, values: &CrwValues) -> Option<Self> {
        let crw = values.complete()?;
        let tf = TimeFeatures::from_time(time);
        Some(Self([
            crw[0],
            crw[1],
            crw[2],
            crw[3],
            crw[4],
            crw[5],
            tf.year as f64,
            tf.month as f64,
            tf.day_of_year as f64,
            tf.week_of_year as f64,
        ]))
    }

    pub fn values(&self) -> &[f64; N_FEATURES] {
        &self.0
    }

    pub fn sst(&self) -> f64 {
        self.0[FEATURE_SST]
    }

    pub fn dhw(&self) -> f64 {
        self.0[FEATURE_DHW]
    }

    /// Copy with SST and DHW replaced (the two independent bleaching drivers).
    pub fn with_drivers(&self, sst: f64, dhw: f64) -> Self {
        let mut out = *self;
        out.0[FEATURE_SST] = sst;
        out.0[FEATURE_DHW] = dhw;
        out
    }
}

/// Calendar features derived from the observation timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFeatures {
    pub year: i32,
    pub month: u32,
    pub day_of_year: u32,
    /// ISO-8601 week number.
    pub week_of_year: u32,
}

impl TimeFeatures {
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
            day_of_year: time.ordinal(),
            week_of_year: time.iso_week().week(),
        }
    }
}

/// A complete, labeled training row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: String,
    pub features: FeatureVector,
    pub bleaching_risk_percent: f64,
}

impl ProcessedRecord {
    pub fn date(&self) -> NaiveDate {
        self.time.date_naive()
    }
}

/// Dashboard risk classes (gauge colour bands).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub const MODERATE_FROM: f64 = 30.0;
    pub const HIGH_FROM: f64 = 60.0;

    /// Classify a risk percentage. Values are clamped to `[0, 100]` first.
    pub fn from_percent(risk: f64) -> Self {
        let r = if risk.is_finite() { risk.clamp(0.0, 100.0) } else { 0.0 };
        if r >= Self::HIGH_FROM {
            RiskLevel::High
        } else if r >= Self::MODERATE_FROM {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
        }
    }

    pub fn color_name(self) -> &'static str {
        match self {
            RiskLevel::Low => "green",
            RiskLevel::Moderate => "yellow",
            RiskLevel::High => "red",
        }
    }
}

/// DHW bands used to manufacture proxy bleaching labels.
///
/// | DHW      | label range |
/// |----------|-------------|
/// | `= 0`    | 1–5 %       |
/// | `(0, 4)` | 10–30 %     |
/// | `[4, 8)` | 30–60 %     |
/// | `≥ 8`    | 60–90 %     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhwBand {
    None,
    Watch,
    Warning,
    Severe,
}

impl DhwBand {
    /// Band for a DHW value. Negative or non-finite DHW has no band.
    pub fn classify(dhw: f64) -> Option<Self> {
        if !dhw.is_finite() || dhw < 0.0 {
            return None;
        }
        Some(if dhw == 0.0 {
            DhwBand::None
        } else if dhw < 4.0 {
            DhwBand::Watch
        } else if dhw < 8.0 {
            DhwBand::Warning
        } else {
            DhwBand::Severe
        })
    }

    /// Inclusive label range in percent.
    pub fn label_range(self) -> (f64, f64) {
        match self {
            DhwBand::None => (1.0, 5.0),
            DhwBand::Watch => (10.0, 30.0),
            DhwBand::Warning => (30.0, 60.0),
            DhwBand::Severe => (60.0, 90.0),
        }
    }
}

/// Numeric history columns that can be plotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Sst,
    Hotspot,
    Dhw,
    SstAnomaly,
    Baa,
    #[value(name = "baa-7d-max")]
    #[serde(rename = "baa-7d-max")]
    Baa7dMax,
    Risk,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Sst,
        Metric::Hotspot,
        Metric::Dhw,
        Metric::SstAnomaly,
        Metric::Baa,
        Metric::Baa7dMax,
        Metric::Risk,
    ];

    pub const DEFAULT_SELECTION: [Metric; 3] = [Metric::Sst, Metric::Dhw, Metric::Risk];

    pub fn column_name(self) -> &'static str {
        match self {
            Metric::Risk => "bleaching_risk_percent",
            other => FEATURE_NAMES[other.feature_index().unwrap_or(0)],
        }
    }

    fn feature_index(self) -> Option<usize> {
        match self {
            Metric::Sst => Some(0),
            Metric::Hotspot => Some(1),
            Metric::Dhw => Some(2),
            Metric::SstAnomaly => Some(3),
            Metric::Baa => Some(4),
            Metric::Baa7dMax => Some(5),
            Metric::Risk => None,
        }
    }

    pub fn value(self, record: &ProcessedRecord) -> f64 {
        match self.feature_index() {
            Some(idx) => record.features.0[idx],
            None => record.bleaching_risk_percent,
        }
    }
}

/// Parse a dataset/ERDDAP timestamp.
///
/// ERDDAP emits RFC 3339 (`2024-01-01T12:00:00Z`); spreadsheet round trips
/// often produce `2024-01-01 12:00:00+00:00` or plain dates. Date-only values are
/// taken as noon UTC, matching the ERDDAP daily product.
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0)?))
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
