//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env`, settings and logging
//! - parses CLI arguments
//! - runs the requested pipeline step
//! - prints reports/plots

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{AssessArgs, Cli, Command, DashboardArgs, FetchArgs, HistoryArgs, MergeArgs, PrepArgs, TrainArgs};
use crate::config::Settings;
use crate::domain::ReefLocation;
use crate::error::AppError;
use crate::fit::TrainOptions;
use crate::models::BoostParams;

pub mod pipeline;

const DEFAULT_LOG_FILTER: &str = "coral_risk=info";

/// Entry point for the `coral` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `coral` and `coral --offline` behave like `coral dashboard ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);

    // Log lines would corrupt the dashboard's alternate screen.
    let is_dashboard = matches!(cli.command, Command::Dashboard(_));
    init_logging(if is_dashboard { "off" } else { DEFAULT_LOG_FILTER });

    // Offline commands never read coral.toml.
    let settings = if needs_settings(&cli.command) {
        Settings::load(cli.config.as_deref())?
    } else {
        Settings::default()
    };

    match cli.command {
        Command::Fetch(args) => handle_fetch(&settings, args),
        Command::Merge(args) => handle_merge(args),
        Command::Prep(args) => handle_prep(args),
        Command::Train(args) => handle_train(args),
        Command::Assess(args) => handle_assess(&settings, args),
        Command::History(args) => handle_history(args),
        Command::Dashboard(args) => handle_dashboard(settings, args),
    }
}

/// Commands that query ERDDAP or resolve reef names from the registry.
fn needs_settings(command: &Command) -> bool {
    matches!(command, Command::Fetch(_) | Command::Assess(_) | Command::Dashboard(_))
}

/// Logs go to stderr; stdout carries reports. `RUST_LOG` overrides the default.
fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn handle_fetch(settings: &Settings, args: FetchArgs) -> Result<(), AppError> {
    let end_year = args
        .end_year
        .unwrap_or_else(|| crate::data::erddap::last_complete_year(Utc::now().date_naive()));

    let reefs: Vec<ReefLocation> = if args.locations.is_empty() {
        settings.reefs.clone()
    } else {
        args.locations
            .iter()
            .map(|name| settings.reef_or_err(name).cloned())
            .collect::<Result<_, _>>()?
    };

    let outcome = pipeline::run_fetch(settings, &reefs, args.start_year, end_year, args.chunk_months)?;
    crate::io::write_observations(&args.output, &outcome.rows)?;

    print!(
        "{}",
        crate::report::format_fetch_summary(&outcome.summaries, &args.output, &outcome.failed)
    );
    Ok(())
}

fn handle_merge(args: MergeArgs) -> Result<(), AppError> {
    let master = pipeline::load_observations(&args.original)?;
    let patch = pipeline::load_observations(&args.patch)?;

    let (merged, report) = crate::prep::merge_datasets(master, patch);
    crate::io::write_observations(&args.output, &merged)?;

    print!("{}", crate::report::format_merge_summary(&report, &args.output));
    Ok(())
}

fn handle_prep(args: PrepArgs) -> Result<(), AppError> {
    let rows = pipeline::load_observations(&args.input)?;
    let out = pipeline::run_prep(rows, args.seed)?;
    crate::io::write_processed(&args.output, &out.records)?;

    print!(
        "{}",
        crate::report::format_prep_summary(&out.clean, &out.features, &out.labels, out.records.len(), &args.output)
    );
    Ok(())
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let records = pipeline::load_history(&args.input)?;
    let opts = train_options_from_args(&args);

    let outcome = crate::fit::train_from_processed(&records, &opts)?;
    outcome.model.save(&args.output)?;

    print!("{}", crate::report::format_training_summary(&outcome, &args.output));
    Ok(())
}

pub fn train_options_from_args(args: &TrainArgs) -> TrainOptions {
    TrainOptions {
        params: BoostParams {
            n_estimators: args.n_estimators,
            learning_rate: args.learning_rate,
            max_depth: args.max_depth,
            subsample: args.subsample,
            colsample: args.colsample,
            min_samples_leaf: args.min_samples_leaf,
            seed: args.seed,
            early_stopping_rounds: args.early_stopping,
        },
        split_seed: args.seed,
        ..TrainOptions::default()
    }
}

fn handle_assess(settings: &Settings, args: AssessArgs) -> Result<(), AppError> {
    let reef = match (&args.reef, args.lat, args.lon) {
        (Some(name), _, _) => settings.reef_or_err(name)?.clone(),
        (None, Some(lat), Some(lon)) => site_from_coordinates(lat, lon)?,
        _ => {
            return Err(AppError::new(
                2,
                "Choose a site with --reef NAME or --lat X --lon Y.",
            ));
        }
    };

    let model = pipeline::load_model(&args.data.model)?;
    let history = pipeline::load_history(&args.data.history)?;
    let mut lookup = pipeline::LiveLookup::from_settings(settings, args.offline)?;

    let (baseline, assessment) = pipeline::assess_reef(&mut lookup, &model, &reef, &history)?;
    print!("{}", crate::report::format_assessment(&assessment));
    print!("{}", crate::plot::render_gauge(assessment.risk_percent, args.width));

    if args.sst.is_some() || args.dhw.is_some() {
        let sst = args.sst.unwrap_or(assessment.sst);
        let dhw = args.dhw.unwrap_or(assessment.dhw);
        let sim = crate::risk::simulate(&model, &baseline, sst, dhw)?;
        print!("\n{}", crate::report::format_simulation(&sim));
    }

    Ok(())
}

fn site_from_coordinates(lat: f64, lon: f64) -> Result<ReefLocation, AppError> {
    if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
        return Err(AppError::new(2, format!("Invalid latitude {lat}.")));
    }
    if !(lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
        return Err(AppError::new(2, format!("Invalid longitude {lon}.")));
    }
    Ok(ReefLocation::new(format!("Site_{lat:.2}_{lon:.2}"), lat, lon))
}

fn handle_history(args: HistoryArgs) -> Result<(), AppError> {
    let history = pipeline::load_history(&args.history)?;
    let rows = crate::risk::history_for_location(&history, &args.reef);
    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("No history rows for '{}' in '{}'.", args.reef, args.history.display()),
        ));
    }

    let metrics = args.selected_metrics();
    println!(
        "{}",
        crate::plot::render_history_plot(&rows, &metrics, args.width, args.height)
    );
    let insight = crate::risk::historical_insight(&history, &args.reef);
    print!("{}", crate::report::format_insight(&rows[0].location_name, insight.as_ref()));
    Ok(())
}

fn handle_dashboard(settings: Settings, args: DashboardArgs) -> Result<(), AppError> {
    let model = pipeline::load_model(&args.data.model)?;
    let history = pipeline::load_history(&args.data.history)?;
    let lookup = pipeline::LiveLookup::from_settings(&settings, args.offline)?;
    crate::tui::run(settings, model, history, lookup)
}

/// Rewrite argv so `coral` defaults to `coral dashboard`.
///
/// Rules:
/// - `coral`                        -> `coral dashboard`
/// - `coral --offline ...`          -> `coral dashboard --offline ...`
/// - `coral --help/--version/-h`    -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("dashboard".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(
        arg1.as_str(),
        "fetch" | "merge" | "prep" | "train" | "assess" | "history" | "dashboard"
    );
    if is_subcommand {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "dashboard".to_string());
        return argv;
    }

    argv
}
