//! NOAA Coral Reef Watch integration (ERDDAP griddap, `NOAA_DHW` dataset).
//!
//! Two access patterns:
//! - bulk history: one server, chunked by months, retried with back-off
//! - live lookup: the last N days, each configured server tried once in order

use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use reqwest::blocking::Client;
use thiserror::Error;

use crate::config::Settings;
use crate::domain::{CrwValues, Observation, ReefLocation, parse_time};
use crate::error::AppError;

/// Griddap variable names in dataset column order.
pub const VARIABLES: [&str; 6] = [
    "CRW_SST",
    "CRW_HOTSPOT",
    "CRW_DHW",
    "CRW_SSTANOMALY",
    "CRW_BAA",
    "CRW_BAA_7D_MAX",
];

/// Responses shorter than this carry no rows (header + units only).
const MIN_PAYLOAD_LEN: usize = 100;

/// Rough wall-clock cost per request, used for the up-front estimate.
pub const SECS_PER_REQUEST_ESTIMATE: u64 = 5;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(String),
}

/// Blocking text fetch; implemented by `reqwest` and by test doubles.
///
/// Waits between requests also go through here so doubles can record them
/// instead of sleeping.
pub trait HttpFetch {
    fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;

    fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

impl HttpFetch for Client {
    fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let resp = self.get(url).timeout(timeout).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        resp.text().map_err(|e| FetchError::Transport(e.to_string()))
    }
}

/// Request policy derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub servers: Vec<String>,
    pub request_timeout: Duration,
    pub live_timeout: Duration,
    pub max_retries: usize,
    pub retry_delay: Duration,
    pub empty_retry_delay: Duration,
    pub chunk_pause: Duration,
    pub live_window_days: i64,
}

impl FetchPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            servers: settings.servers.clone(),
            request_timeout: settings.request_timeout(),
            live_timeout: settings.live_timeout(),
            max_retries: settings.max_retries.max(1),
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            empty_retry_delay: Duration::from_secs(settings.empty_retry_delay_secs),
            chunk_pause: Duration::from_secs(settings.chunk_pause_secs),
            live_window_days: settings.live_window_days,
        }
    }
}

pub struct ErddapClient<H = Client> {
    http: H,
    policy: FetchPolicy,
}

impl ErddapClient<Client> {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(concat!("coral-risk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::new(4, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(http, FetchPolicy::from_settings(settings)))
    }
}

impl<H: HttpFetch> ErddapClient<H> {
    pub fn with_http(http: H, policy: FetchPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Fetch one date range from the primary server, retrying on failure.
    ///
    /// Exhausting all attempts is not an error: the range simply has no data.
    pub fn fetch_range(
        &self,
        reef: &ReefLocation,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Vec<Observation>> {
        let server = self.policy.servers.first()?;
        let url = request_url(server, reef.lat, reef.lon, start, end);
        let attempts = self.policy.max_retries;

        for attempt in 1..=attempts {
            tracing::debug!(%url, attempt, attempts, "ERDDAP request");
            let last = attempt == attempts;

            match self.http.fetch_text(&url, self.policy.request_timeout) {
                Ok(body) => {
                    if is_no_data(&body) {
                        tracing::warn!(reef = %reef.name, %start, %end, attempt, "server error or no data");
                        if !last {
                            self.http.pause(self.policy.empty_retry_delay);
                        }
                        continue;
                    }
                    match parse_griddap_csv(&body, &reef.name) {
                        Ok(rows) => {
                            tracing::info!(reef = %reef.name, %start, %end, rows = rows.len(), "fetched");
                            return Some(rows);
                        }
                        Err(err) => {
                            tracing::warn!(reef = %reef.name, attempt, "unparseable response: {err}");
                            if !last {
                                self.http.pause(self.policy.empty_retry_delay);
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(reef = %reef.name, %start, %end, attempt, "request failed: {err}");
                    if !last {
                        self.http.pause(self.policy.retry_delay);
                    }
                }
            }
        }

        tracing::warn!(reef = %reef.name, %start, %end, "max retries reached");
        None
    }

    /// Download `start_year..=end_year` in chunks of `chunk_months` months.
    ///
    /// Chunks with no data are skipped. The result is tagged with the reef name
    /// and sorted by time.
    pub fn fetch_history(
        &self,
        reef: &ReefLocation,
        start_year: i32,
        end_year: i32,
        chunk_months: u32,
    ) -> Result<Vec<Observation>, AppError> {
        if start_year > end_year {
            return Err(AppError::new(
                2,
                format!("Start year {start_year} is after end year {end_year}."),
            ));
        }

        let mut out = Vec::new();
        for year in start_year..=end_year {
            for (start, end) in chunk_ranges(year, chunk_months)? {
                tracing::info!(reef = %reef.name, %start, %end, "fetching chunk");
                match self.fetch_range(reef, start, end) {
                    Some(rows) if !rows.is_empty() => out.extend(rows),
                    _ => tracing::warn!(reef = %reef.name, %start, %end, "no data returned for this chunk"),
                }
                self.http.pause(self.policy.chunk_pause);
            }
        }

        out.sort_by_key(|o| o.time);
        Ok(out)
    }

    /// Most recent observation in the live window ending yesterday.
    ///
    /// Each configured server is tried once, in order; the first usable payload
    /// wins. `None` when every server fails.
    pub fn fetch_latest(&self, reef: &ReefLocation, today: NaiveDate) -> Option<Observation> {
        let (start, end) = live_window(today, self.policy.live_window_days);

        for (idx, server) in self.policy.servers.iter().enumerate() {
            let url = request_url(server, reef.lat, reef.lon, start, end);
            let body = match self.http.fetch_text(&url, self.policy.live_timeout) {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(reef = %reef.name, server = idx, "live request failed: {err}");
                    continue;
                }
            };
            if is_no_data(&body) {
                tracing::warn!(reef = %reef.name, server = idx, "live server returned no data");
                continue;
            }
            match parse_griddap_csv(&body, &reef.name) {
                Ok(rows) => {
                    if let Some(latest) = rows.into_iter().max_by_key(|o| o.time) {
                        tracing::info!(reef = %reef.name, server = idx, time = %latest.time, "live data");
                        return Some(latest);
                    }
                }
                Err(err) => tracing::warn!(reef = %reef.name, server = idx, "unparseable live response: {err}"),
            }
        }

        None
    }
}

/// `[today - 1 - window, today - 1]`.
pub fn live_window(today: NaiveDate, window_days: i64) -> (NaiveDate, NaiveDate) {
    let end = today - chrono::Duration::days(1);
    let start = end - chrono::Duration::days(window_days);
    (start, end)
}

/// Build the griddap query for all six variables at one grid point.
pub fn build_query(lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> String {
    let start = start.format("%Y-%m-%d");
    let end = end.format("%Y-%m-%d");
    VARIABLES
        .iter()
        .map(|var| {
            format!("{var}[({start}T12:00:00Z):1:({end}T12:00:00Z)][({lat}):1:({lat})][({lon}):1:({lon})]")
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub fn request_url(server: &str, lat: f64, lon: f64, start: NaiveDate, end: NaiveDate) -> String {
    format!("{server}?{}", build_query(lat, lon, start, end))
}

/// ERDDAP reports failures in-band (`Error { message="..." }`) or returns only
/// the header lines.
pub fn is_no_data(body: &str) -> bool {
    body.contains("ERROR") || body.len() < MIN_PAYLOAD_LEN
}

/// Parse a griddap CSV payload.
///
/// Layout: one header row, one units row (skipped), then
/// `time, latitude, longitude, <six variables>`. Columns are taken by position.
pub fn parse_griddap_csv(body: &str, location_name: &str) -> Result<Vec<Observation>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(4, format!("Failed to read ERDDAP header: {e}")))?;
    if headers.len() < 3 + VARIABLES.len() {
        return Err(AppError::new(
            4,
            format!("Expected {} ERDDAP columns, got {}.", 3 + VARIABLES.len(), headers.len()),
        ));
    }

    let mut out = Vec::new();
    // `skip(1)`: the units row (`UTC, degrees_north, ...`).
    for (idx, result) in reader.records().enumerate().skip(1) {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(4, format!("ERDDAP CSV line {line}: {e}")))?;

        let field = |i: usize| record.get(i).unwrap_or("");
        let time = parse_time(field(0))
            .ok_or_else(|| AppError::new(4, format!("ERDDAP CSV line {line}: invalid time '{}'", field(0))))?;
        let latitude = parse_value(field(1))
            .ok_or_else(|| AppError::new(4, format!("ERDDAP CSV line {line}: invalid latitude")))?;
        let longitude = parse_value(field(2))
            .ok_or_else(|| AppError::new(4, format!("ERDDAP CSV line {line}: invalid longitude")))?;

        let mut values = [None; 6];
        for (j, slot) in values.iter_mut().enumerate() {
            *slot = parse_value(field(3 + j));
        }

        out.push(Observation {
            time,
            latitude,
            longitude,
            location_name: location_name.to_string(),
            values: CrwValues::from_array(values),
        });
    }

    Ok(out)
}

fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Date ranges for one year in chunks of `chunk_months` months.
///
/// Each chunk runs from the 1st of its first month to the last day of its last
/// month; the final chunk is clamped to December.
pub fn chunk_ranges(year: i32, chunk_months: u32) -> Result<Vec<(NaiveDate, NaiveDate)>, AppError> {
    if !(1..=12).contains(&chunk_months) {
        return Err(AppError::new(2, "Chunk size must be between 1 and 12 months."));
    }

    let mut out = Vec::new();
    let mut month_start = 1u32;
    while month_start <= 12 {
        let month_end = (month_start + chunk_months - 1).min(12);
        let start = NaiveDate::from_ymd_opt(year, month_start, 1)
            .ok_or_else(|| AppError::new(2, format!("Invalid year {year}.")))?;
        let end = last_day_of_month(year, month_end)
            .ok_or_else(|| AppError::new(2, format!("Invalid year {year}.")))?;
        out.push((start, end));
        month_start += chunk_months;
    }
    Ok(out)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (y, m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}

/// Number of requests a bulk download will issue.
pub fn estimate_requests(n_locations: usize, start_year: i32, end_year: i32, chunk_months: u32) -> usize {
    if end_year < start_year || chunk_months == 0 {
        return 0;
    }
    let years = (end_year - start_year + 1) as usize;
    let per_year = 12usize.div_ceil(chunk_months as usize);
    n_locations * years * per_year
}

/// The last complete calendar year.
pub fn last_complete_year(today: NaiveDate) -> i32 {
    today.year() - 1
}
