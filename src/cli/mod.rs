//! Command-line parsing for the SIR calibration tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{DEFAULT_HORIZON_DAYS, DelayList, InitialCondition, ModelChoice};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sirfit",
    version,
    about = "SIR epidemic calibration with reporting-delay search and forecasting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load daily counts, calibrate, forecast, print the report and optionally plot/export.
    Fit(FitArgs),
    /// Run the same pipeline on a synthetic series generated from known parameters.
    Demo(DemoArgs),
    /// Plot a previously exported fit JSON.
    Plot(PlotArgs),
    /// Launch the interactive forecast viewer.
    ///
    /// This uses the same underlying pipeline as `sirfit fit`, but renders the
    /// forecast in a terminal UI using Ratatui.
    Tui(FitArgs),
}

/// Where the observed series comes from, and how strictly it is checked.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Read a local CSV instead of downloading the dataset.
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,

    /// Dataset URL (defaults to $SIRFIT_DATA_URL, then the national trend file).
    #[arg(long, conflicts_with = "csv")]
    pub url: Option<String>,

    /// Directory the raw download is saved into.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Do not keep the raw download on disk.
    #[arg(long)]
    pub no_save: bool,

    /// Header of the date column.
    #[arg(long, default_value = "data")]
    pub date_column: String,

    /// Header of the cumulative cases column.
    #[arg(long, default_value = "totale_casi")]
    pub cases_column: String,

    /// Header of the cumulative deaths column.
    #[arg(long, default_value = "deceduti")]
    pub dead_column: String,

    /// Header of the cumulative recovered column.
    #[arg(long, default_value = "dimessi_guariti")]
    pub recovered_column: String,
}

/// Calibration, forecast and output options shared by `fit`, `demo` and `tui`.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Model variant (`auto` = lockdown iff a lockdown window is given).
    #[arg(long, value_enum, default_value_t = ModelChoice::Auto)]
    pub model: ModelChoice,

    /// First lockdown day (YYYY-MM-DD).
    #[arg(long, requires = "lockdown_end")]
    pub lockdown_start: Option<NaiveDate>,

    /// Last lockdown day (YYYY-MM-DD).
    #[arg(long, requires = "lockdown_start")]
    pub lockdown_end: Option<NaiveDate>,

    /// Delay candidates in days, e.g. `0,35-44` (default depends on the model).
    #[arg(long)]
    pub delays: Option<DelayList>,

    /// Day-zero state policy (default depends on the model).
    #[arg(long, value_enum)]
    pub initial_condition: Option<InitialCondition>,

    /// Minimizer start point: `N,beta,gamma[,delta]` (default depends on the model).
    #[arg(long, value_delimiter = ',', num_args = 1.., allow_negative_numbers = true)]
    pub guess: Option<Vec<f64>>,

    /// Include the susceptible compartment in the loss (default: lockdown model only).
    #[arg(long)]
    pub susceptible_term: Option<bool>,

    /// Forecast horizon in days past the last observation.
    #[arg(long, default_value_t = DEFAULT_HORIZON_DAYS)]
    pub horizon: usize,

    /// Extra Nelder-Mead restarts from the best point.
    #[arg(long, default_value_t = 2)]
    pub restarts: usize,

    /// Nelder-Mead iteration ceiling per run (default: 1000 per parameter).
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Relative tolerance of the ODE integrator.
    #[arg(long, default_value_t = 1e-6)]
    pub rtol: f64,

    /// Absolute tolerance of the ODE integrator.
    #[arg(long, default_value_t = 1e-6)]
    pub atol: f64,

    /// Treat decreasing cumulative counts as an error instead of a warning.
    #[arg(long)]
    pub strict_counts: bool,
}

/// Terminal plot and file export options.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Which chart to print.
    #[arg(long, value_enum, default_value_t = PlotView::Cases)]
    pub view: PlotView,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Forecast rows shown on each side of the last observed day.
    #[arg(long, default_value_t = 5)]
    pub tail: usize,

    /// Write the CSV exports (`generated-*.csv`) into this directory.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Export the fit (parameters + forecast) to JSON.
    #[arg(long = "export-fit", value_name = "JSON")]
    pub export_fit: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Synthetic scenario options.
#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Population `N` of the generating model.
    #[arg(long, default_value_t = 100_000.0)]
    pub population: f64,

    /// Transmission rate of the generating model.
    #[arg(long, default_value_t = 0.6)]
    pub beta: f64,

    /// Removal rate of the generating model.
    #[arg(long, default_value_t = 0.1)]
    pub gamma: f64,

    /// Lockdown multiplier of the generating model (needs a lockdown window).
    #[arg(long)]
    pub delta: Option<f64>,

    /// Number of generated days.
    #[arg(long, default_value_t = 30)]
    pub days: usize,

    /// Simulated days dropped before the first generated record.
    #[arg(long, default_value_t = 0)]
    pub true_delay: usize,

    /// Share of removed individuals reported as dead.
    #[arg(long, default_value_t = 0.0)]
    pub death_share: f64,

    /// Log-normal noise sigma (0 = exact model output).
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Date of the first generated record.
    #[arg(long, default_value = "2020-02-24")]
    pub start_date: NaiveDate,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for plotting a saved fit.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Fit JSON file produced by `sirfit fit --export-fit`.
    #[arg(long, value_name = "JSON")]
    pub fit: PathBuf,

    /// Which chart to print.
    #[arg(long, value_enum, default_value_t = PlotView::Cases)]
    pub view: PlotView,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Chart selection for terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlotView {
    /// Observed cumulative cases vs modeled cases.
    Cases,
    /// Simulated compartments vs observed-derived compartments.
    Sir,
}

impl PlotView {
    pub fn toggled(self) -> Self {
        match self {
            PlotView::Cases => PlotView::Sir,
            PlotView::Sir => PlotView::Cases,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            PlotView::Cases => "Cases forecast",
            PlotView::Sir => "SIR model",
        }
    }
}
