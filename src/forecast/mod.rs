//! Projection of a calibrated fit beyond the observed window.
//!
//! The forecast re-simulates with the winning parameters over
//! `observed_days + horizon_days` days, using the same delay alignment as the
//! loss. Observed-derived columns are carried alongside the simulated ones and
//! are `None` past the last observed day, so both share one date axis.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DelayFit, DerivedSeries, LockdownWindow};
use crate::error::AppError;
use crate::models::Simulator;

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub susceptible: f64,
    pub infected: f64,
    pub removed: f64,
    /// `N - I_obs - R_obs` for the fitted `N`.
    pub observed_susceptible: Option<f64>,
    pub observed_infected: Option<f64>,
    pub observed_removed: Option<f64>,
    /// Observed-derived cumulative cases `I_obs + R_obs`.
    pub cases: Option<f64>,
    /// Modeled cumulative cases `I + R`.
    pub forecast: f64,
}

impl ForecastRow {
    pub fn is_observed(&self) -> bool {
        self.cases.is_some()
    }
}

/// Extended trajectory table keyed by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub start_date: NaiveDate,
    pub delay: usize,
    pub observed_days: usize,
    pub horizon_days: usize,
    pub rows: Vec<ForecastRow>,
}

impl Forecast {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.rows.last().map_or(self.start_date, |r| r.date)
    }

    pub fn observed_rows(&self) -> &[ForecastRow] {
        &self.rows[..self.observed_days.min(self.rows.len())]
    }

    pub fn future_rows(&self) -> &[ForecastRow] {
        &self.rows[self.observed_days.min(self.rows.len())..]
    }

    /// Day (row) at which modeled active infections peak.
    pub fn peak_infected(&self) -> Option<&ForecastRow> {
        self.rows
            .iter()
            .fold(None, |best: Option<&ForecastRow>, row| match best {
                Some(b) if b.infected >= row.infected => Some(b),
                _ => Some(row),
            })
    }
}

/// Project `fit` over the observed window plus `horizon_days`.
///
/// The lockdown window only applies when the fit carries a `delta`.
pub fn forecast(
    simulator: &Simulator,
    fit: &DelayFit,
    lockdown: Option<LockdownWindow>,
    observed: &DerivedSeries,
    horizon_days: usize,
) -> Result<Forecast, AppError> {
    let start_date = observed
        .start_date()
        .ok_or_else(|| AppError::new(3, "Cannot forecast from an empty series."))?;
    let observed_days = observed.len();
    let total = observed_days + horizon_days;
    let params = fit.params;
    let lockdown = lockdown.filter(|_| params.delta.is_some());

    let traj = simulator.aligned(&params, lockdown, fit.delay, total)?;
    if !traj.all_finite() {
        return Err(AppError::new(
            4,
            format!("Forecast with delay {} produced non-finite values.", fit.delay),
        ));
    }

    let observed_at = |col: &[f64], k: usize| col.get(k).copied();
    let rows = (0..total)
        .map(|k| {
            let (s, i, r) = (traj.susceptible[k], traj.infected[k], traj.removed[k]);
            let obs_i = observed_at(&observed.infected, k);
            let obs_r = observed_at(&observed.removed, k);
            let cases = obs_i.zip(obs_r).map(|(i, r)| i + r);
            ForecastRow {
                date: start_date + Duration::days(k as i64),
                susceptible: s,
                infected: i,
                removed: r,
                observed_susceptible: cases.map(|c| params.population - c),
                observed_infected: obs_i,
                observed_removed: obs_r,
                cases,
                forecast: i + r,
            }
        })
        .collect();

    debug!(
        delay = fit.delay,
        observed_days,
        horizon_days,
        "forecast computed"
    );

    Ok(Forecast {
        start_date,
        delay: fit.delay,
        observed_days,
        horizon_days,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InitialState, SirParams};
    use crate::math::OdeOptions;

    fn setup(days: usize) -> (Simulator, SirParams, DerivedSeries) {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let params = SirParams::plain(100_000.0, 0.6, 0.1);
        let traj = sim.simulate(&params, days).unwrap();
        let start = NaiveDate::from_ymd_opt(2020, 2, 24).unwrap();
        let observed = DerivedSeries::from_compartments(start, traj.infected, traj.removed).unwrap();
        (sim, params, observed)
    }

    fn fit_of(params: SirParams, delay: usize) -> DelayFit {
        DelayFit {
            delay,
            params,
            loss: 0.0,
            iterations: 0,
            evaluations: 0,
            converged: true,
        }
    }

    #[test]
    fn observed_columns_end_with_history() {
        let (sim, params, observed) = setup(30);
        let out = forecast(&sim, &fit_of(params, 0), None, &observed, 60).unwrap();

        assert_eq!(out.len(), 90);
        assert_eq!(out.observed_rows().len(), 30);
        assert_eq!(out.future_rows().len(), 60);
        for (k, row) in out.observed_rows().iter().enumerate() {
            assert_eq!(row.observed_infected, Some(observed.infected[k]));
            assert_eq!(row.observed_removed, Some(observed.removed[k]));
            assert_eq!(row.cases, Some(observed.infected[k] + observed.removed[k]));
        }
        for row in out.future_rows() {
            assert!(!row.is_observed());
            assert_eq!(row.observed_infected, None);
            assert_eq!(row.observed_removed, None);
            assert_eq!(row.observed_susceptible, None);
        }
        assert_eq!(out.end_date(), NaiveDate::from_ymd_opt(2020, 5, 23).unwrap());
    }

    #[test]
    fn observed_window_matches_the_fitted_alignment() {
        let (sim, params, observed) = setup(30);
        let out = forecast(&sim, &fit_of(params, 0), None, &observed, 10).unwrap();
        let aligned = sim.aligned(&params, None, 0, 30).unwrap();
        for (k, row) in out.observed_rows().iter().enumerate() {
            assert_eq!(row.infected, aligned.infected[k]);
            assert_eq!(row.removed, aligned.removed[k]);
            assert_eq!(row.forecast, row.infected + row.removed);
        }
    }

    #[test]
    fn lockdown_only_applies_to_fits_with_delta() {
        let (sim, params, observed) = setup(20);
        let window = LockdownWindow::new(2, 15).unwrap();
        let plain = forecast(&sim, &fit_of(params, 0), None, &observed, 20).unwrap();
        let ignored = forecast(&sim, &fit_of(params, 0), Some(window), &observed, 20).unwrap();
        assert_eq!(plain, ignored);

        let locked = SirParams::with_lockdown(100_000.0, 0.6, 0.1, 0.3);
        let slowed = forecast(&sim, &fit_of(locked, 0), Some(window), &observed, 20).unwrap();
        assert!(slowed.rows[39].forecast < plain.rows[39].forecast);
    }

    #[test]
    fn zero_horizon_covers_only_the_history() {
        let (sim, params, observed) = setup(12);
        let out = forecast(&sim, &fit_of(params, 3), None, &observed, 0).unwrap();
        assert_eq!(out.len(), 12);
        assert!(out.future_rows().is_empty());
        assert_eq!(out.delay, 3);
    }

    #[test]
    fn peak_is_found_inside_a_long_horizon() {
        let (sim, params, observed) = setup(30);
        let out = forecast(&sim, &fit_of(params, 0), None, &observed, 120).unwrap();
        let peak = out.peak_infected().unwrap();
        assert!(peak.date > out.start_date);
        assert!(peak.infected > out.rows[0].infected);
        assert!(peak.infected > out.rows.last().unwrap().infected);
    }
}
