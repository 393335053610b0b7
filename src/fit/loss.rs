//! Discrepancy between a delayed simulation and the observed series.
//!
//! For a candidate delay `d` the simulator runs for `len + d` days and the first
//! `d` simulated days are dropped, so simulated day `d` lines up with the first
//! observed day. The loss is a sum of per-compartment mean squared errors:
//!
//! ```text
//! loss = mse(I_sim, I_obs) + mse(R_sim, R_obs) [+ mse(S_sim, N - I_obs - R_obs)]
//! ```
//!
//! The susceptible term is optional; it gives the optimizer a direct signal on `N`.
//! Simulation failures and non-finite results map to `+∞` so a minimizer can
//! reject the candidate instead of aborting.

use tracing::trace;

use crate::domain::{DerivedSeries, LockdownWindow, ModelVariant, SirParams};
use crate::models::Simulator;

/// Scores parameter candidates against one observed series.
#[derive(Debug, Clone)]
pub struct LossEvaluator<'a> {
    simulator: &'a Simulator,
    observed: &'a DerivedSeries,
    variant: ModelVariant,
    lockdown: Option<LockdownWindow>,
    include_susceptible: bool,
}

impl<'a> LossEvaluator<'a> {
    /// The susceptible term defaults to on for the lockdown variant and off for the plain one.
    pub fn new(
        simulator: &'a Simulator,
        observed: &'a DerivedSeries,
        variant: ModelVariant,
        lockdown: Option<LockdownWindow>,
    ) -> Self {
        Self {
            simulator,
            observed,
            variant,
            lockdown,
            include_susceptible: variant == ModelVariant::Lockdown,
        }
    }

    pub fn with_susceptible_term(mut self, include: bool) -> Self {
        self.include_susceptible = include;
        self
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn observed(&self) -> &DerivedSeries {
        self.observed
    }

    pub fn includes_susceptible(&self) -> bool {
        self.include_susceptible
    }

    /// Loss for `params` at `delay`; always `>= 0`, `+∞` for failed simulations.
    pub fn loss(&self, params: &SirParams, delay: usize) -> f64 {
        let lockdown = match self.variant {
            ModelVariant::Lockdown => self.lockdown,
            ModelVariant::Plain => None,
        };

        let sim = match self
            .simulator
            .aligned(params, lockdown, delay, self.observed.len())
        {
            Ok(t) => t,
            Err(err) => {
                trace!(delay, ?params, error = %err, "simulation failed; penalizing candidate");
                return f64::INFINITY;
            }
        };

        let mut loss = mse(&sim.infected, &self.observed.infected)
            + mse(&sim.removed, &self.observed.removed);
        if self.include_susceptible {
            let s_obs = self.observed.susceptible(params.population);
            loss += mse(&sim.susceptible, &s_obs);
        }

        if loss.is_finite() { loss } else { f64::INFINITY }
    }

    /// Objective over the raw optimizer vector (variant parameter order) at a fixed delay.
    pub fn objective(&self, delay: usize) -> impl Fn(&[f64]) -> f64 + '_ {
        move |x: &[f64]| match SirParams::from_vector(self.variant, x) {
            Ok(params) => self.loss(&params, delay),
            Err(_) => f64::INFINITY,
        }
    }
}

fn mse(sim: &[f64], obs: &[f64]) -> f64 {
    if obs.is_empty() {
        return 0.0;
    }
    let sse: f64 = sim.iter().zip(obs).map(|(s, o)| (s - o) * (s - o)).sum();
    sse / obs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InitialState;
    use crate::math::OdeOptions;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 2, 24).unwrap()
    }

    fn observed_from(sim: &Simulator, params: &SirParams, days: usize) -> DerivedSeries {
        let traj = sim.simulate(params, days).unwrap();
        DerivedSeries::from_compartments(start(), traj.infected, traj.removed).unwrap()
    }

    #[test]
    fn exact_trajectory_scores_zero() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let params = SirParams::plain(100_000.0, 0.6, 0.1);
        let observed = observed_from(&sim, &params, 30);

        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);
        assert_eq!(eval.loss(&params, 0), 0.0);
        assert!(eval.loss(&SirParams::plain(100_000.0, 0.65, 0.1), 0) > 0.0);
    }

    #[test]
    fn delay_shifts_the_comparison_window() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let params = SirParams::plain(100_000.0, 0.5, 0.1);
        let full = sim.simulate(&params, 40).unwrap();
        let observed =
            DerivedSeries::from_compartments(start(), full.infected[7..].to_vec(), full.removed[7..].to_vec())
                .unwrap();

        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);
        assert_eq!(eval.loss(&params, 7), 0.0);
        assert!(eval.loss(&params, 6) > 0.0);
        assert!(eval.loss(&params, 8) > 0.0);
    }

    #[test]
    fn susceptible_term_is_a_toggle() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let truth = SirParams::plain(100_000.0, 0.6, 0.1);
        let observed = observed_from(&sim, &truth, 30);
        let wrong_n = SirParams::plain(120_000.0, 0.6, 0.1);

        let without = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);
        let with = without.clone().with_susceptible_term(true);
        assert!(!without.includes_susceptible());
        assert!(with.loss(&wrong_n, 0) > without.loss(&wrong_n, 0));
        // At the true parameters the extra term only carries integration round-off.
        assert!(with.loss(&truth, 0) < 1e-6);
    }

    #[test]
    fn lockdown_variant_defaults_to_susceptible_term() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let observed = observed_from(&sim, &SirParams::plain(10_000.0, 0.4, 0.1), 20);
        let window = LockdownWindow::new(5, 10).unwrap();
        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Lockdown, Some(window));
        assert!(eval.includes_susceptible());

        let params = SirParams::with_lockdown(10_000.0, 0.4, 0.1, 0.5);
        let locked = eval.loss(&params, 0);
        let neutral = eval.loss(&SirParams::with_lockdown(10_000.0, 0.4, 0.1, 1.0), 0);
        assert!(locked > neutral);
    }

    #[test]
    fn pathological_parameters_are_penalized_not_fatal() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let observed = observed_from(&sim, &SirParams::plain(10_000.0, 0.4, 0.1), 20);
        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);

        assert_eq!(eval.loss(&SirParams::plain(0.0, 0.4, 0.1), 0), f64::INFINITY);
        assert_eq!(eval.loss(&SirParams::plain(f64::NAN, 0.4, 0.1), 0), f64::INFINITY);

        let objective = eval.objective(0);
        assert_eq!(objective(&[1.0, 2.0]), f64::INFINITY);
        assert!(objective(&[10_000.0, 0.4, 0.1]) < 1e-12);
    }
}
