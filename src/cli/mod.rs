//! Command-line parsing for the coral bleaching risk tool.
//!
//! Argument parsing and input-file checks live here, separate from the
//! pipeline and modeling code.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::domain::Metric;
use crate::error::AppError;

pub const DEFAULT_MASTER_FILE: &str = "coral_environmental_data_master.csv";
pub const DEFAULT_MERGED_FILE: &str = "coral_data_COMPLETE.csv";
pub const DEFAULT_PROCESSED_FILE: &str = "coral_data_PROCESSED.csv";
pub const DEFAULT_MODEL_FILE: &str = "coral_bleaching_model.json";

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "coral", version, about = "Coral bleaching risk from NOAA Coral Reef Watch data")]
pub struct Cli {
    /// Settings file (TOML). Defaults to ./coral.toml when present.
    #[arg(long, global = true, env = "CORAL_CONFIG", value_name = "TOML")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download daily CRW history for the configured reefs into a master CSV.
    Fetch(FetchArgs),
    /// Replace one location's rows in a dataset with a re-fetched patch.
    Merge(MergeArgs),
    /// Clean the master dataset, derive features and write proxy labels.
    Prep(PrepArgs),
    /// Train the gradient boosting model on a processed dataset.
    Train(TrainArgs),
    /// Assess current bleaching risk for one reef (optionally with a what-if).
    Assess(AssessArgs),
    /// Plot a reef's history in the terminal.
    History(HistoryArgs),
    /// Launch the interactive dashboard.
    Dashboard(DashboardArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// Output CSV.
    #[arg(short = 'o', long, default_value = DEFAULT_MASTER_FILE)]
    pub output: PathBuf,

    /// First year to download.
    #[arg(short = 's', long, default_value_t = 1985)]
    pub start_year: i32,

    /// Last year to download (default: last complete year).
    #[arg(short = 'e', long)]
    pub end_year: Option<i32>,

    /// Months per request.
    #[arg(short = 'c', long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub chunk_months: u32,

    /// Only these reefs (repeatable). Default: every configured reef.
    #[arg(long = "location", value_name = "NAME")]
    pub locations: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MergeArgs {
    /// Dataset whose rows are replaced.
    pub original: PathBuf,
    /// Re-fetched rows for one or more locations.
    pub patch: PathBuf,
    /// Output CSV.
    #[arg(short = 'o', long, default_value = DEFAULT_MERGED_FILE)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct PrepArgs {
    /// Master (or merged) dataset.
    pub input: PathBuf,
    /// Output CSV.
    #[arg(short = 'o', long, default_value = DEFAULT_PROCESSED_FILE)]
    pub output: PathBuf,
    /// Seed for the proxy label draw.
    #[arg(long, default_value_t = crate::prep::label::DEFAULT_LABEL_SEED)]
    pub seed: u64,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    /// Processed dataset.
    pub input: PathBuf,
    /// Output model (JSON).
    #[arg(short = 'o', long, default_value = DEFAULT_MODEL_FILE)]
    pub output: PathBuf,
    #[arg(long, default_value_t = 200)]
    pub n_estimators: usize,
    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: f64,
    #[arg(long, default_value_t = 6)]
    pub max_depth: usize,
    /// Row fraction per tree.
    #[arg(long, default_value_t = 0.8)]
    pub subsample: f64,
    /// Feature fraction per tree.
    #[arg(long, default_value_t = 1.0)]
    pub colsample: f64,
    #[arg(long, default_value_t = 1)]
    pub min_samples_leaf: usize,
    /// Seed for boosting and the train/test split.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Stop after N rounds without test-set MAE improvement.
    #[arg(long, value_name = "N")]
    pub early_stopping: Option<usize>,
}

/// Model and history inputs shared by `assess`, `history` and `dashboard`.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Trained model (JSON).
    #[arg(long, default_value = DEFAULT_MODEL_FILE)]
    pub model: PathBuf,
    /// Processed history (CSV).
    #[arg(long, default_value = DEFAULT_PROCESSED_FILE)]
    pub history: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct AssessArgs {
    /// Configured reef name (case and `_`/space insensitive).
    #[arg(short = 'r', long, conflicts_with_all = ["lat", "lon"])]
    pub reef: Option<String>,
    /// Ad-hoc site latitude (with --lon).
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    pub lat: Option<f64>,
    /// Ad-hoc site longitude (with --lat).
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lon: Option<f64>,
    #[command(flatten)]
    pub data: DataArgs,
    /// What-if SST (°C).
    #[arg(long)]
    pub sst: Option<f64>,
    /// What-if DHW (°C-weeks).
    #[arg(long)]
    pub dhw: Option<f64>,
    /// Skip the live lookup and use the latest historical row.
    #[arg(long)]
    pub offline: bool,
    /// Gauge width (columns).
    #[arg(long, default_value_t = 40)]
    pub width: usize,
}

#[derive(Debug, Args, Clone)]
pub struct HistoryArgs {
    #[arg(short = 'r', long)]
    pub reef: String,
    /// Processed history (CSV).
    #[arg(long, default_value = DEFAULT_PROCESSED_FILE)]
    pub history: PathBuf,
    /// Metric to plot (repeatable). Default: sst, dhw, risk.
    #[arg(short = 'm', long = "metric", value_enum)]
    pub metrics: Vec<Metric>,
    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,
    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub data: DataArgs,
    /// Never query ERDDAP; always use historical data.
    #[arg(long)]
    pub offline: bool,
}

impl HistoryArgs {
    pub fn selected_metrics(&self) -> Vec<Metric> {
        if self.metrics.is_empty() {
            Metric::DEFAULT_SELECTION.to_vec()
        } else {
            let mut out = Vec::new();
            for m in &self.metrics {
                if !out.contains(m) {
                    out.push(*m);
                }
            }
            out
        }
    }
}

/// Check that an input file exists, naming the command that produces it.
pub fn require_file(path: &Path, produced_by: &str) -> Result<(), AppError> {
    if !path.exists() {
        return Err(AppError::new(
            2,
            format!("File not found: {}. Create it with `{produced_by}`.", path.display()),
        ));
    }
    if path.is_dir() {
        return Err(AppError::new(
            2,
            format!("Expected a file, got a directory: {}", path.display()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_defaults_match_reference_model() {
        let cli = Cli::parse_from(["coral", "train", "data.csv"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.output, PathBuf::from(DEFAULT_MODEL_FILE));
        assert_eq!(args.n_estimators, 200);
        assert_eq!(args.learning_rate, 0.05);
        assert_eq!(args.max_depth, 6);
        assert_eq!(args.subsample, 0.8);
        assert_eq!(args.seed, 42);
        assert_eq!(args.early_stopping, None);
    }

    #[test]
    fn fetch_rejects_bad_chunk_size() {
        assert!(Cli::try_parse_from(["coral", "fetch", "-c", "13"]).is_err());
        let cli = Cli::try_parse_from(["coral", "fetch", "-s", "2000", "--location", "Gulf_of_Mannar"]).unwrap();
        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.start_year, 2000);
        assert_eq!(args.chunk_months, 3);
        assert_eq!(args.locations, vec!["Gulf_of_Mannar".to_string()]);
    }

    #[test]
    fn assess_site_needs_both_coordinates() {
        assert!(Cli::try_parse_from(["coral", "assess", "--lat", "10.0"]).is_err());
        assert!(Cli::try_parse_from(["coral", "assess", "--reef", "X", "--lat", "1", "--lon", "2"]).is_err());
        let cli = Cli::try_parse_from(["coral", "assess", "--lat", "-8.5", "--lon", "115.2", "--offline"]).unwrap();
        let Command::Assess(args) = cli.command else {
            panic!("expected assess");
        };
        assert_eq!(args.lat, Some(-8.5));
        assert!(args.offline);
    }

    #[test]
    fn history_metrics_default_and_dedupe() {
        let cli = Cli::parse_from(["coral", "history", "-r", "A"]);
        let Command::History(args) = cli.command else {
            panic!("expected history");
        };
        assert_eq!(args.selected_metrics(), Metric::DEFAULT_SELECTION.to_vec());

        let cli = Cli::parse_from(["coral", "history", "-r", "A", "-m", "dhw", "-m", "sst-anomaly", "-m", "dhw"]);
        let Command::History(args) = cli.command else {
            panic!("expected history");
        };
        assert_eq!(args.selected_metrics(), vec![Metric::Dhw, Metric::SstAnomaly]);
    }

    #[test]
    fn missing_file_names_producer() {
        let err = require_file(Path::new("definitely/not/here.json"), "coral train").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("`coral train`"));
    }
}
