//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during calibration
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::math::{OdeOptions, SimplexOptions};

/// Concrete SIR variant that gets simulated and calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Constant transmission rate: free parameters `[N, beta, gamma]`.
    Plain,
    /// Transmission scaled by `delta` inside the lockdown window:
    /// free parameters `[N, beta, gamma, delta]`.
    Lockdown,
}

impl ModelVariant {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelVariant::Plain => "SIR",
            ModelVariant::Lockdown => "SIR + lockdown",
        }
    }

    /// Number of free parameters calibrated for this variant.
    pub fn param_count(self) -> usize {
        match self {
            ModelVariant::Plain => 3,
            ModelVariant::Lockdown => 4,
        }
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelVariant::Plain => &["N", "beta", "gamma"],
            ModelVariant::Lockdown => &["N", "beta", "gamma", "delta"],
        }
    }
}

/// Which variant to fit, as requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    /// Lockdown variant when a lockdown window is configured, plain otherwise.
    Auto,
    Plain,
    Lockdown,
}

impl ModelChoice {
    pub fn resolve(self, has_lockdown: bool) -> ModelVariant {
        match self {
            ModelChoice::Auto if has_lockdown => ModelVariant::Lockdown,
            ModelChoice::Auto => ModelVariant::Plain,
            ModelChoice::Plain => ModelVariant::Plain,
            ModelChoice::Lockdown => ModelVariant::Lockdown,
        }
    }
}

/// How the simulation's day-zero state is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InitialCondition {
    /// A single infected individual and nobody removed (`I0 = 1`, `R0 = 0`).
    Seed,
    /// Infected/removed counts of the first observed day.
    FirstObservation,
}

/// Infected and removed counts at simulated day zero.
///
/// The susceptible count follows from the population: `S0 = N - I0 - R0`.
/// A negative `S0` is allowed; the optimizer may visit such regions transiently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub infected: f64,
    pub removed: f64,
}

impl InitialState {
    pub const SEED: InitialState = InitialState {
        infected: 1.0,
        removed: 0.0,
    };

    pub fn susceptible(&self, population: f64) -> f64 {
        population - self.infected - self.removed
    }
}

/// One day of raw cumulative counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub cases: f64,
    pub dead: f64,
    pub recovered: f64,
}

/// A validated, immutable daily series of cumulative counts.
///
/// Invariants checked by [`ObservedSeries::new`]:
/// - at least one record
/// - dates advance by exactly one day
/// - counts are finite and non-negative
/// - counts never decrease (fatal only in strict mode, otherwise logged)
#[derive(Debug, Clone)]
pub struct ObservedSeries {
    records: Vec<DailyRecord>,
}

impl ObservedSeries {
    pub fn new(records: Vec<DailyRecord>, strict_counts: bool) -> Result<Self, AppError> {
        let Some(first) = records.first() else {
            return Err(AppError::new(3, "Observed series is empty."));
        };
        validate_counts(first)?;

        for pair in records.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            validate_counts(cur)?;

            if cur.date != prev.date + Duration::days(1) {
                return Err(AppError::new(
                    3,
                    format!(
                        "Observed dates must advance by exactly one day: {} is followed by {}.",
                        prev.date, cur.date
                    ),
                ));
            }

            let decreased = [
                ("cases", prev.cases, cur.cases),
                ("dead", prev.dead, cur.dead),
                ("recovered", prev.recovered, cur.recovered),
            ]
            .into_iter()
            .filter(|(_, a, b)| b < a)
            .map(|(name, _, _)| name)
            .collect::<Vec<_>>();

            if !decreased.is_empty() {
                let msg = format!(
                    "Cumulative counts decreased on {}: {}.",
                    cur.date,
                    decreased.join(", ")
                );
                if strict_counts {
                    return Err(AppError::new(3, msg));
                }
                warn!(date = %cur.date, "{msg}");
            }
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn start_date(&self) -> NaiveDate {
        self.records[0].date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.records[self.records.len() - 1].date
    }

    /// Day offset of `date` from the first observed day (may be negative).
    pub fn day_offset(&self, date: NaiveDate) -> i64 {
        (date - self.start_date()).num_days()
    }

    /// Fold deaths into the removed compartment and derive the infected count.
    pub fn derive(&self) -> DerivedSeries {
        let mut dates = Vec::with_capacity(self.records.len());
        let mut infected = Vec::with_capacity(self.records.len());
        let mut removed = Vec::with_capacity(self.records.len());
        for r in &self.records {
            let rem = r.recovered + r.dead;
            dates.push(r.date);
            infected.push(r.cases - rem);
            removed.push(rem);
        }
        DerivedSeries {
            dates,
            infected,
            removed,
        }
    }

    /// `100 * dead / cases` per day; `None` while no cases are recorded.
    pub fn death_percentage(&self) -> Vec<Option<f64>> {
        self.records
            .iter()
            .map(|r| (r.cases > 0.0).then(|| 100.0 * r.dead / r.cases))
            .collect()
    }
}

fn validate_counts(r: &DailyRecord) -> Result<(), AppError> {
    for (name, v) in [("cases", r.cases), ("dead", r.dead), ("recovered", r.recovered)] {
        if !(v.is_finite() && v >= 0.0) {
            return Err(AppError::new(
                3,
                format!("Invalid {name} count on {}: {v}.", r.date),
            ));
        }
    }
    Ok(())
}

/// Infected/removed columns the calibration consumes.
///
/// `removed = recovered + dead`, `infected = cases - removed`.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub dates: Vec<NaiveDate>,
    pub infected: Vec<f64>,
    pub removed: Vec<f64>,
}

impl DerivedSeries {
    /// Build a derived series directly from compartment values on consecutive days.
    pub fn from_compartments(
        start_date: NaiveDate,
        infected: Vec<f64>,
        removed: Vec<f64>,
    ) -> Result<Self, AppError> {
        if infected.len() != removed.len() {
            return Err(AppError::new(
                3,
                format!(
                    "Infected ({}) and removed ({}) columns differ in length.",
                    infected.len(),
                    removed.len()
                ),
            ));
        }
        if infected.is_empty() {
            return Err(AppError::new(3, "Observed series is empty."));
        }
        let dates = (0..infected.len())
            .map(|i| start_date + Duration::days(i as i64))
            .collect();
        Ok(Self {
            dates,
            infected,
            removed,
        })
    }

    pub fn len(&self) -> usize {
        self.infected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infected.is_empty()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Observed cumulative cases as seen by the model: `infected + removed`.
    pub fn cases(&self) -> Vec<f64> {
        self.infected
            .iter()
            .zip(&self.removed)
            .map(|(i, r)| i + r)
            .collect()
    }

    /// Observed susceptible count implied by a population size.
    pub fn susceptible(&self, population: f64) -> Vec<f64> {
        self.infected
            .iter()
            .zip(&self.removed)
            .map(|(i, r)| population - i - r)
            .collect()
    }

    /// Day-zero state taken from the first observed day.
    pub fn first_state(&self) -> InitialState {
        InitialState {
            infected: self.infected[0],
            removed: self.removed[0],
        }
    }
}

/// Model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SirParams {
    /// Effective population size `N`.
    pub population: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Lockdown contact multiplier; `None` for the plain variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

impl SirParams {
    pub fn plain(population: f64, beta: f64, gamma: f64) -> Self {
        Self {
            population,
            beta,
            gamma,
            delta: None,
        }
    }

    pub fn with_lockdown(population: f64, beta: f64, gamma: f64, delta: f64) -> Self {
        Self {
            population,
            beta,
            gamma,
            delta: Some(delta),
        }
    }

    /// Interpret an optimizer vector in the variant's parameter order.
    pub fn from_vector(variant: ModelVariant, x: &[f64]) -> Result<Self, AppError> {
        match (variant, x) {
            (ModelVariant::Plain, &[n, beta, gamma]) => Ok(Self::plain(n, beta, gamma)),
            (ModelVariant::Lockdown, &[n, beta, gamma, delta]) => {
                Ok(Self::with_lockdown(n, beta, gamma, delta))
            }
            _ => Err(AppError::new(
                2,
                format!(
                    "{} expects {} parameters ({}), got {}.",
                    variant.display_name(),
                    variant.param_count(),
                    variant.param_names().join(", "),
                    x.len()
                ),
            )),
        }
    }

    pub fn to_vector(&self) -> Vec<f64> {
        let mut out = vec![self.population, self.beta, self.gamma];
        if let Some(delta) = self.delta {
            out.push(delta);
        }
        out
    }

    /// Multiplier applied to `beta` inside the lockdown window.
    pub fn contact_multiplier(&self) -> f64 {
        self.delta.unwrap_or(1.0)
    }

    /// Basic reproduction number `beta / gamma`.
    pub fn r0(&self) -> f64 {
        self.beta / self.gamma
    }

    /// Finite and strictly positive in every component.
    pub fn is_physical(&self) -> bool {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        positive(self.population)
            && positive(self.beta)
            && positive(self.gamma)
            && self.delta.is_none_or(positive)
    }
}

/// Lockdown interval in observed-day indices (day 0 = first observed day).
///
/// Inside the simulation the window is shifted by the candidate delay and clipped
/// to the simulated horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockdownWindow {
    start: usize,
    end: usize,
}

impl LockdownWindow {
    pub fn new(start: usize, end: usize) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::new(
                2,
                format!("Lockdown window start ({start}) is after its end ({end})."),
            ));
        }
        Ok(Self { start, end })
    }

    /// Convert calendar dates into a window relative to `first_observed`.
    ///
    /// Dates before the first observed day clip to day 0.
    pub fn from_dates(
        first_observed: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::new(
                2,
                format!("Lockdown start {start} is after lockdown end {end}."),
            ));
        }
        let offset = |d: NaiveDate| (d - first_observed).num_days().max(0) as usize;
        Self::new(offset(start), offset(end))
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }
}

/// Simulated compartments, one value per day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub susceptible: Vec<f64>,
    pub infected: Vec<f64>,
    pub removed: Vec<f64>,
}

impl Trajectory {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            susceptible: Vec::with_capacity(n),
            infected: Vec::with_capacity(n),
            removed: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, s: f64, i: f64, r: f64) {
        self.susceptible.push(s);
        self.infected.push(i);
        self.removed.push(r);
    }

    pub fn len(&self) -> usize {
        self.infected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infected.is_empty()
    }

    /// `S + I + R` at day `t`.
    pub fn total(&self, t: usize) -> f64 {
        self.susceptible[t] + self.infected[t] + self.removed[t]
    }

    /// Keep `len` days starting at `offset`.
    pub fn window(&self, offset: usize, len: usize) -> Result<Trajectory, AppError> {
        if offset + len > self.len() {
            return Err(AppError::new(
                4,
                format!(
                    "Trajectory of {} days cannot provide {len} days after offset {offset}.",
                    self.len()
                ),
            ));
        }
        let range = offset..offset + len;
        Ok(Trajectory {
            susceptible: self.susceptible[range.clone()].to_vec(),
            infected: self.infected[range.clone()].to_vec(),
            removed: self.removed[range].to_vec(),
        })
    }

    /// Modeled cumulative cases `I + R`.
    pub fn cases(&self) -> Vec<f64> {
        self.infected
            .iter()
            .zip(&self.removed)
            .map(|(i, r)| i + r)
            .collect()
    }

    pub fn all_finite(&self) -> bool {
        self.susceptible
            .iter()
            .chain(&self.infected)
            .chain(&self.removed)
            .all(|v| v.is_finite())
    }
}

/// Calibration outcome for one delay candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayFit {
    pub delay: usize,
    pub params: SirParams,
    pub loss: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

impl DelayFit {
    /// Eligible for selection: finite loss and physical parameters.
    pub fn is_viable(&self) -> bool {
        self.loss.is_finite() && self.loss >= 0.0 && self.params.is_physical()
    }
}

/// Ordered, de-duplicated list of delay candidates.
///
/// Parsed from expressions such as `0,35-44` (single days and inclusive ranges).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayList(Vec<usize>);

impl DelayList {
    pub fn new(mut delays: Vec<usize>) -> Result<Self, AppError> {
        delays.sort_unstable();
        delays.dedup();
        if delays.is_empty() {
            return Err(AppError::new(2, "Delay candidate list is empty."));
        }
        Ok(Self(delays))
    }

    pub fn range(min: usize, max: usize) -> Result<Self, AppError> {
        Self::new((min..=max).collect())
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for DelayList {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |part: &str| AppError::new(2, format!("Invalid delay expression '{part}'."));
        let mut delays = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo: usize = lo.trim().parse().map_err(|_| bad(part))?;
                    let hi: usize = hi.trim().parse().map_err(|_| bad(part))?;
                    if lo > hi {
                        return Err(bad(part));
                    }
                    delays.extend(lo..=hi);
                }
                None => delays.push(part.parse().map_err(|_| bad(part))?),
            }
        }
        Self::new(delays)
    }
}

impl std::fmt::Display for DelayList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Delays tried for the plain variant: no lag, then a late-start window.
pub fn default_plain_delays() -> DelayList {
    DelayList(std::iter::once(0).chain(35..=44).collect())
}

/// Delays tried for the lockdown variant.
pub fn default_lockdown_delays() -> DelayList {
    DelayList((0..=9).collect())
}

pub const DEFAULT_PLAIN_GUESS: [f64; 3] = [80_000.0, 1.0, 1.0];
pub const DEFAULT_LOCKDOWN_GUESS: [f64; 4] = [100_000.0, 0.5, 0.1, 0.5];
pub const DEFAULT_HORIZON_DAYS: usize = 60;

/// A full calibration run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus per-variant defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub model: ModelVariant,
    pub lockdown: Option<LockdownWindow>,
    pub delays: DelayList,
    pub initial_condition: InitialCondition,
    /// Starting point for the minimizer, in [`ModelVariant::param_names`] order.
    pub initial_guess: Vec<f64>,
    /// Add the susceptible-compartment error term to the loss.
    pub include_susceptible: bool,
    pub horizon_days: usize,
    pub ode: OdeOptions,
    pub simplex: SimplexOptions,
}

impl FitConfig {
    pub fn plain() -> Self {
        Self {
            model: ModelVariant::Plain,
            lockdown: None,
            delays: default_plain_delays(),
            initial_condition: InitialCondition::Seed,
            initial_guess: DEFAULT_PLAIN_GUESS.to_vec(),
            include_susceptible: false,
            horizon_days: DEFAULT_HORIZON_DAYS,
            ode: OdeOptions::default(),
            simplex: SimplexOptions::default(),
        }
    }

    pub fn lockdown(window: LockdownWindow) -> Self {
        Self {
            model: ModelVariant::Lockdown,
            lockdown: Some(window),
            delays: default_lockdown_delays(),
            initial_condition: InitialCondition::FirstObservation,
            initial_guess: DEFAULT_LOCKDOWN_GUESS.to_vec(),
            include_susceptible: true,
            horizon_days: DEFAULT_HORIZON_DAYS,
            ode: OdeOptions::default(),
            simplex: SimplexOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.initial_guess.len() != self.model.param_count() {
            return Err(AppError::new(
                2,
                format!(
                    "Initial guess has {} values; {} needs {} ({}).",
                    self.initial_guess.len(),
                    self.model.display_name(),
                    self.model.param_count(),
                    self.model.param_names().join(", ")
                ),
            ));
        }
        if self.initial_guess.iter().any(|v| !v.is_finite()) {
            return Err(AppError::new(2, "Initial guess must be finite."));
        }
        if self.model == ModelVariant::Lockdown && self.lockdown.is_none() {
            return Err(AppError::new(
                2,
                "The lockdown variant requires a lockdown window.",
            ));
        }
        if self.delays.is_empty() {
            return Err(AppError::new(2, "Delay candidate list is empty."));
        }
        self.ode.validate()?;
        self.simplex.validate()?;
        Ok(())
    }
}
