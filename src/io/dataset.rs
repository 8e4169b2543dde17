//! CSV read/write for the master (raw CRW) and processed (labeled) datasets.
//!
//! Column names are matched case-insensitively and a UTF-8 BOM on the first
//! header is ignored. Bad rows are skipped and reported as [`RowError`]s rather
//! than aborting the whole load; a schema problem (missing column) is exit 2.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{
    CRW_COLUMNS, CrwValues, FeatureVector, Observation, ProcessedRecord, TimeFeatures, format_time,
    parse_time,
};
use crate::error::AppError;

/// Master dataset columns, in file order.
pub const MASTER_COLUMNS: [&str; 10] = [
    "time",
    "latitude",
    "longitude",
    "location_name",
    CRW_COLUMNS[0],
    CRW_COLUMNS[1],
    CRW_COLUMNS[2],
    CRW_COLUMNS[3],
    CRW_COLUMNS[4],
    CRW_COLUMNS[5],
];

/// Columns appended to [`MASTER_COLUMNS`] in the processed dataset.
pub const PROCESSED_EXTRA_COLUMNS: [&str; 5] = [
    "year",
    "month",
    "day_of_year",
    "week_of_year",
    "bleaching_risk_percent",
];

/// A row-level error encountered while reading a dataset.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Rows parsed from a dataset file plus what was skipped.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl<T> Loaded<T> {
    /// Log skipped rows (first few in detail).
    pub fn log_row_errors(&self, path: &Path) {
        if self.row_errors.is_empty() {
            return;
        }
        tracing::warn!(
            path = %path.display(),
            skipped = self.row_errors.len(),
            read = self.rows_read,
            "skipped invalid rows"
        );
        for e in self.row_errors.iter().take(5) {
            tracing::warn!(line = e.line, "{}", e.message);
        }
    }
}

pub fn read_observations(path: &Path) -> Result<Loaded<Observation>, AppError> {
    let (mut reader, header_map) = open_csv(path)?;
    require_columns(&header_map, &MASTER_COLUMNS, path)?;

    read_rows(&mut reader, |record| parse_observation(record, &header_map))
}

pub fn read_processed(path: &Path) -> Result<Loaded<ProcessedRecord>, AppError> {
    let (mut reader, header_map) = open_csv(path)?;
    require_columns(&header_map, &MASTER_COLUMNS, path)?;
    require_columns(&header_map, &["bleaching_risk_percent"], path)?;

    read_rows(&mut reader, |record| {
        let obs = parse_observation(record, &header_map)?;
        // Calendar features are recomputed from `time`; the stored columns
        // are informational.
        let features = FeatureVector::from_reading(obs.time, &obs.values)
            .ok_or_else(|| format!("{} missing CRW value(s)", obs.values.missing_count()))?;
        let risk = parse_opt_f64(get_optional(record, &header_map, "bleaching_risk_percent"))
            .ok_or_else(|| "missing or invalid bleaching_risk_percent".to_string())?;
        Ok(ProcessedRecord {
            time: obs.time,
            latitude: obs.latitude,
            longitude: obs.longitude,
            location_name: obs.location_name,
            features,
            bleaching_risk_percent: risk,
        })
    })
}

pub fn write_observations(path: &Path, rows: &[Observation]) -> Result<(), AppError> {
    let mut writer = create_csv(path)?;
    write_row(&mut writer, MASTER_COLUMNS.iter().map(|s| s.to_string()))?;

    for obs in rows {
        write_row(&mut writer, observation_fields(obs))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}

pub fn write_processed(path: &Path, rows: &[ProcessedRecord]) -> Result<(), AppError> {
    let mut writer = create_csv(path)?;
    write_row(
        &mut writer,
        MASTER_COLUMNS
            .iter()
            .chain(PROCESSED_EXTRA_COLUMNS.iter())
            .map(|s| s.to_string()),
    )?;

    for rec in rows {
        let f = rec.features.values();
        let tf = TimeFeatures::from_time(rec.time);
        let mut fields = vec![
            format_time(rec.time),
            rec.latitude.to_string(),
            rec.longitude.to_string(),
            rec.location_name.clone(),
        ];
        fields.extend(f[..6].iter().map(|v| v.to_string()));
        fields.extend([
            tf.year.to_string(),
            tf.month.to_string(),
            tf.day_of_year.to_string(),
            tf.week_of_year.to_string(),
            format!("{:.2}", rec.bleaching_risk_percent),
        ]);
        write_row(&mut writer, fields)?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}

fn observation_fields(obs: &Observation) -> Vec<String> {
    let mut fields = vec![
        format_time(obs.time),
        obs.latitude.to_string(),
        obs.longitude.to_string(),
        obs.location_name.clone(),
    ];
    fields.extend(
        obs.values
            .as_array()
            .iter()
            .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
    );
    fields
}

fn open_csv(path: &Path) -> Result<(csv::Reader<File>, HashMap<String, usize>), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers of '{}': {e}", path.display())))?
        .clone();

    Ok((reader, build_header_map(&headers)))
}

fn create_csv(path: &Path) -> Result<csv::Writer<File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", path.display())))
}

fn write_row<I>(writer: &mut csv::Writer<File>, fields: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = String>,
{
    writer
        .write_record(fields)
        .map_err(|e| AppError::new(2, format!("Failed to write CSV row: {e}")))
}

fn read_rows<T, F>(reader: &mut csv::Reader<File>, mut parse: F) -> Result<Loaded<T>, AppError>
where
    F: FnMut(&StringRecord) -> Result<T, String>,
{
    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse(&record) {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(Loaded {
        rows,
        row_errors,
        rows_read,
    })
}

fn parse_observation(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Observation, String> {
    let raw_time = get_optional(record, header_map, "time").ok_or("missing time")?;
    let time = parse_time(raw_time).ok_or_else(|| format!("invalid time '{raw_time}'"))?;
    let latitude = parse_opt_f64(get_optional(record, header_map, "latitude")).ok_or("invalid latitude")?;
    let longitude = parse_opt_f64(get_optional(record, header_map, "longitude")).ok_or("invalid longitude")?;
    let location_name = get_optional(record, header_map, "location_name")
        .ok_or("missing location_name")?
        .to_string();

    let mut values = [None; 6];
    for (slot, col) in values.iter_mut().zip(CRW_COLUMNS) {
        *slot = parse_opt_f64(get_optional(record, header_map, col));
    }

    Ok(Observation {
        time,
        latitude,
        longitude,
        location_name,
        values: CrwValues::from_array(values),
    })
}

fn require_columns(header_map: &HashMap<String, usize>, columns: &[&str], path: &Path) -> Result<(), AppError> {
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| !header_map.contains_key(*c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::new(
            2,
            format!("'{}' is missing required column(s): {}", path.display(), missing.join(", ")),
        ))
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

/// `NaN` and other non-finite values count as missing.
fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}
