//! Shared "fit pipeline" logic used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! load records -> validate -> derive -> delay search -> forecast
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::info;

use crate::data::{DatasetClient, SyntheticConfig, generate};
use crate::domain::{
    DailyRecord, DelayList, DerivedSeries, FitConfig, InitialCondition, InitialState, LockdownWindow,
    ModelChoice, ModelVariant, ObservedSeries, DEFAULT_HORIZON_DAYS,
};
use crate::error::AppError;
use crate::fit::{DelaySearchOutcome, LossEvaluator, search_delays};
use crate::forecast::{Forecast, forecast};
use crate::io::{ColumnMap, FitFile, load_records};
use crate::math::{NelderMead, OdeOptions, SimplexOptions};
use crate::models::Simulator;

/// Where the observed records come from.
#[derive(Debug, Clone)]
pub enum DataSource {
    Csv(PathBuf),
    Remote {
        /// `None` uses `$SIRFIT_DATA_URL` or the default dataset.
        url: Option<String>,
        save_dir: Option<PathBuf>,
    },
    Synthetic(SyntheticConfig),
}

impl DataSource {
    /// Fetch or generate the raw records, plus a label for reports.
    pub fn load(
        &self,
        columns: &ColumnMap,
        ode: &OdeOptions,
    ) -> Result<(String, Vec<DailyRecord>), AppError> {
        match self {
            DataSource::Csv(path) => Ok((path.display().to_string(), load_records(path, columns)?)),
            DataSource::Remote { url, save_dir } => {
                let client = match url {
                    Some(url) => DatasetClient::new(url.clone())?,
                    None => DatasetClient::from_env()?,
                };
                let records = client.fetch_records(columns, save_dir.as_deref())?;
                Ok((client.url().to_string(), records))
            }
            DataSource::Synthetic(config) => {
                let label = format!(
                    "synthetic N={} beta={} gamma={}{} delay={} noise={}",
                    config.params.population,
                    config.params.beta,
                    config.params.gamma,
                    config
                        .params
                        .delta
                        .map(|d| format!(" delta={d}"))
                        .unwrap_or_default(),
                    config.delay,
                    config.noise,
                );
                Ok((label, generate(config, ode)?))
            }
        }
    }
}

/// Calibration settings before they are resolved against the observed dates.
///
/// `None` fields fall back to the defaults of the resolved model variant.
#[derive(Debug, Clone)]
pub struct FitSettings {
    pub model: ModelChoice,
    pub lockdown_dates: Option<(NaiveDate, NaiveDate)>,
    pub delays: Option<DelayList>,
    pub initial_condition: Option<InitialCondition>,
    pub initial_guess: Option<Vec<f64>>,
    pub include_susceptible: Option<bool>,
    pub horizon_days: usize,
    pub ode: OdeOptions,
    pub simplex: SimplexOptions,
    pub strict_counts: bool,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            model: ModelChoice::Auto,
            lockdown_dates: None,
            delays: None,
            initial_condition: None,
            initial_guess: None,
            include_susceptible: None,
            horizon_days: DEFAULT_HORIZON_DAYS,
            ode: OdeOptions::default(),
            simplex: SimplexOptions::default(),
            strict_counts: false,
        }
    }
}

impl FitSettings {
    /// Resolve the model variant and per-variant defaults for `observed`.
    pub fn resolve(&self, observed: &ObservedSeries) -> Result<FitConfig, AppError> {
        let window = self
            .lockdown_dates
            .map(|(start, end)| LockdownWindow::from_dates(observed.start_date(), start, end))
            .transpose()?;

        let mut config = match (self.model.resolve(window.is_some()), window) {
            (ModelVariant::Lockdown, Some(window)) => FitConfig::lockdown(window),
            (ModelVariant::Lockdown, None) => {
                return Err(AppError::new(
                    2,
                    "The lockdown model needs --lockdown-start and --lockdown-end.",
                ));
            }
            (ModelVariant::Plain, _) => FitConfig::plain(),
        };

        if let Some(delays) = &self.delays {
            config.delays = delays.clone();
        }
        if let Some(policy) = self.initial_condition {
            config.initial_condition = policy;
        }
        if let Some(guess) = &self.initial_guess {
            config.initial_guess = guess.clone();
        }
        if let Some(include) = self.include_susceptible {
            config.include_susceptible = include;
        }
        config.horizon_days = self.horizon_days;
        config.ode = self.ode;
        config.simplex = self.simplex;

        config.validate()?;
        Ok(config)
    }
}

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub source: String,
    pub config: FitConfig,
    pub observed: ObservedSeries,
    pub derived: DerivedSeries,
    pub initial: InitialState,
    pub simulator: Simulator,
    pub search: DelaySearchOutcome,
    pub forecast: Forecast,
}

impl RunOutput {
    /// Recompute the forecast for another horizon without refitting.
    pub fn reforecast(&mut self, horizon_days: usize) -> Result<(), AppError> {
        self.forecast = forecast(
            &self.simulator,
            &self.search.best,
            self.config.lockdown,
            &self.derived,
            horizon_days,
        )?;
        self.config.horizon_days = horizon_days;
        Ok(())
    }

    pub fn fit_file(&self) -> FitFile {
        FitFile::new(
            self.config.model,
            self.config.initial_condition,
            self.initial,
            self.config.lockdown,
            &self.search.best,
            &self.search.candidates,
            self.forecast.clone(),
        )
    }
}

/// Execute the full pipeline: load, validate, calibrate and forecast.
pub fn run_fit(
    source: &DataSource,
    columns: &ColumnMap,
    settings: &FitSettings,
) -> Result<RunOutput, AppError> {
    let (label, records) = source.load(columns, &settings.ode)?;
    let observed = ObservedSeries::new(records, settings.strict_counts)?;
    info!(
        source = %label,
        days = observed.len(),
        start = %observed.start_date(),
        end = %observed.end_date(),
        "loaded observed series"
    );
    run_fit_with_series(label, observed, settings)
}

/// Execute the pipeline on an already validated series.
pub fn run_fit_with_series(
    source: String,
    observed: ObservedSeries,
    settings: &FitSettings,
) -> Result<RunOutput, AppError> {
    let config = settings.resolve(&observed)?;
    let derived = observed.derive();
    let initial = match config.initial_condition {
        InitialCondition::Seed => InitialState::SEED,
        InitialCondition::FirstObservation => derived.first_state(),
    };

    let simulator = Simulator::new(initial, config.ode);
    let evaluator = LossEvaluator::new(&simulator, &derived, config.model, config.lockdown)
        .with_susceptible_term(config.include_susceptible);
    let minimizer = NelderMead::new(config.simplex);

    let search = search_delays(&evaluator, &minimizer, &config.initial_guess, &config.delays)?;
    let forecast = forecast(
        &simulator,
        &search.best,
        config.lockdown,
        &derived,
        config.horizon_days,
    )?;

    Ok(RunOutput {
        source,
        config,
        observed,
        derived,
        initial,
        simulator,
        search,
        forecast,
    })
}
