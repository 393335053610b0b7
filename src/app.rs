//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads the observed series (CSV, download or synthetic)
//! - runs the delay search + calibration
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DemoArgs, FitArgs, ModelArgs, OutputArgs, PlotArgs, PlotView, SourceArgs};
use crate::data::SyntheticConfig;
use crate::domain::{LockdownWindow, SirParams};
use crate::error::AppError;
use crate::io::ColumnMap;
use crate::math::{OdeOptions, SimplexOptions};

pub mod pipeline;

use pipeline::{DataSource, FitSettings, RunOutput};

/// Entry point for the `sirfit` binary.
pub fn run() -> Result<(), AppError> {
    // Environment overrides (RUST_LOG, SIRFIT_DATA_URL) may live in `.env`.
    let _ = dotenvy::dotenv();

    // We want `sirfit` and `sirfit --csv x.csv` to behave like `sirfit fit ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    init_tracing(matches!(cli.command, Command::Tui(_)));

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
        Command::Plot(args) => handle_plot(args),
        Command::Tui(args) => handle_tui(args),
    }
}

/// Log to stderr. The TUI owns the terminal, so it stays silent unless
/// `RUST_LOG` asks otherwise.
fn init_tracing(quiet: bool) {
    let fallback = if quiet { "off" } else { "sir_forecast=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let settings = settings_from_args(&args.model);
    let source = source_from_args(&args.source);
    let run = pipeline::run_fit(&source, &column_map(&args.source), &settings)?;
    print_run(&run, &args.output)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let settings = settings_from_args(&args.model);
    let synthetic = synthetic_from_args(&args)?;
    let source = DataSource::Synthetic(synthetic);
    let run = pipeline::run_fit(&source, &ColumnMap::default(), &settings)?;
    print_run(&run, &args.output)
}

fn handle_tui(args: FitArgs) -> Result<(), AppError> {
    crate::tui::run(args)
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let fit = crate::io::read_fit_json(&args.fit)?;
    println!("{}", crate::report::format_fit_file_summary(&fit));
    println!("{}", render_view(&fit.forecast, args.view, args.width, args.height));
    Ok(())
}

fn print_run(run: &RunOutput, output: &OutputArgs) -> Result<(), AppError> {
    println!(
        "{}",
        crate::report::format_run_summary(
            &run.source,
            &run.observed,
            &run.config,
            run.initial,
            &run.search
        )
    );
    println!("{}", crate::report::format_forecast_tail(&run.forecast, output.tail));

    if !output.no_plot {
        println!(
            "{}",
            render_view(&run.forecast, output.view, output.width, output.height)
        );
    }

    // Optional exports.
    if let Some(dir) = &output.export_dir {
        let written = crate::io::write_all(dir, &run.observed, &run.forecast)?;
        info!(files = written.len(), dir = %dir.display(), "wrote CSV exports");
    }
    if let Some(path) = &output.export_fit {
        crate::io::write_fit_json(path, &run.fit_file())?;
        info!(path = %path.display(), "wrote fit JSON");
    }
    Ok(())
}

fn render_view(
    forecast: &crate::forecast::Forecast,
    view: PlotView,
    width: usize,
    height: usize,
) -> String {
    match view {
        PlotView::Cases => crate::plot::render_cases_plot(forecast, width, height),
        PlotView::Sir => crate::plot::render_sir_plot(forecast, width, height),
    }
}

pub fn settings_from_args(args: &ModelArgs) -> FitSettings {
    let simplex = SimplexOptions {
        restarts: args.restarts,
        max_iterations: args.max_iterations,
        ..SimplexOptions::default()
    };
    let ode = OdeOptions {
        rtol: args.rtol,
        atol: args.atol,
        ..OdeOptions::default()
    };
    FitSettings {
        model: args.model,
        lockdown_dates: args.lockdown_start.zip(args.lockdown_end),
        delays: args.delays.clone(),
        initial_condition: args.initial_condition,
        initial_guess: args.guess.clone(),
        include_susceptible: args.susceptible_term,
        horizon_days: args.horizon,
        ode,
        simplex,
        strict_counts: args.strict_counts,
    }
}

pub fn source_from_args(args: &SourceArgs) -> DataSource {
    match &args.csv {
        Some(path) => DataSource::Csv(path.clone()),
        None => DataSource::Remote {
            url: args.url.clone(),
            save_dir: (!args.no_save).then(|| args.data_dir.clone()),
        },
    }
}

pub fn column_map(args: &SourceArgs) -> ColumnMap {
    ColumnMap {
        date: args.date_column.clone(),
        cases: args.cases_column.clone(),
        dead: args.dead_column.clone(),
        recovered: args.recovered_column.clone(),
    }
}

/// Build the generating scenario. A lockdown window given on the command line
/// applies to both the generator and the fit, relative to `--start-date`.
fn synthetic_from_args(args: &DemoArgs) -> Result<SyntheticConfig, AppError> {
    let params = match args.delta {
        Some(delta) => SirParams::with_lockdown(args.population, args.beta, args.gamma, delta),
        None => SirParams::plain(args.population, args.beta, args.gamma),
    };
    let lockdown = match (args.model.lockdown_start, args.model.lockdown_end) {
        (Some(start), Some(end)) if params.delta.is_some() => {
            Some(LockdownWindow::from_dates(args.start_date, start, end)?)
        }
        _ => None,
    };
    if params.delta.is_some() && lockdown.is_none() {
        return Err(AppError::new(
            2,
            "--delta needs --lockdown-start and --lockdown-end.",
        ));
    }

    let config = SyntheticConfig {
        params,
        days: args.days,
        delay: args.true_delay,
        lockdown,
        death_share: args.death_share,
        noise: args.noise,
        seed: args.seed,
        start_date: args.start_date,
        ..SyntheticConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Rewrite argv so `sirfit` defaults to `sirfit fit`.
///
/// Rules:
/// - `sirfit`                        -> `sirfit fit`
/// - `sirfit --csv x.csv ...`        -> `sirfit fit --csv x.csv ...`
/// - `sirfit --help/--version/-h`    -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("fit".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "demo" | "plot" | "tui");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "fit flags".
    if arg1.starts_with('-') {
        argv.insert(1, "fit".to_string());
        return argv;
    }

    argv
}
