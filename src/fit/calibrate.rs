//! Parameter calibration for a single delay candidate.
//!
//! The minimizer is a pluggable [`Minimizer`] strategy; the default is the
//! deterministic Nelder–Mead simplex. Starting points are fixed configuration
//! values, so repeated runs give identical fits.

use tracing::debug;

use crate::domain::{DelayFit, ModelVariant, SirParams};
use crate::error::AppError;
use crate::fit::loss::LossEvaluator;
use crate::math::{Minimizer, Minimum};

/// Minimize `objective` from `initial_guess`.
pub fn calibrate<M: Minimizer + ?Sized>(
    minimizer: &M,
    initial_guess: &[f64],
    objective: &dyn Fn(&[f64]) -> f64,
) -> Result<Minimum, AppError> {
    minimizer.minimize(objective, initial_guess)
}

/// Calibrate the evaluator's variant at a fixed `delay`.
pub fn calibrate_delay<M: Minimizer + ?Sized>(
    evaluator: &LossEvaluator<'_>,
    minimizer: &M,
    initial_guess: &[f64],
    delay: usize,
) -> Result<DelayFit, AppError> {
    let variant = evaluator.variant();
    check_guess(variant, initial_guess)?;

    let objective = evaluator.objective(delay);
    let min = calibrate(minimizer, initial_guess, &objective)?;
    let params = SirParams::from_vector(variant, &min.x)?;

    debug!(
        delay,
        loss = min.value,
        iterations = min.iterations,
        evaluations = min.evaluations,
        converged = min.converged,
        ?params,
        "calibrated delay candidate"
    );

    Ok(DelayFit {
        delay,
        params,
        loss: min.value,
        iterations: min.iterations,
        evaluations: min.evaluations,
        converged: min.converged,
    })
}

fn check_guess(variant: ModelVariant, guess: &[f64]) -> Result<(), AppError> {
    if guess.len() != variant.param_count() {
        return Err(AppError::new(
            2,
            format!(
                "Initial guess has {} values; {} needs {} ({}).",
                guess.len(),
                variant.display_name(),
                variant.param_count(),
                variant.param_names().join(", ")
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DerivedSeries, InitialState};
    use crate::math::{NelderMead, OdeOptions};
    use crate::models::Simulator;
    use chrono::NaiveDate;

    #[test]
    fn recovers_rates_from_clean_data() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let truth = SirParams::plain(50_000.0, 0.5, 0.12);
        let traj = sim.simulate(&truth, 40).unwrap();
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let observed = DerivedSeries::from_compartments(start, traj.infected, traj.removed).unwrap();

        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);
        let fit = calibrate_delay(&eval, &NelderMead::default(), &[45_000.0, 0.45, 0.1], 0).unwrap();

        assert_eq!(fit.delay, 0);
        assert!((fit.params.beta - 0.5).abs() / 0.5 < 0.01, "{:?}", fit.params);
        assert!((fit.params.gamma - 0.12).abs() / 0.12 < 0.01, "{:?}", fit.params);
        assert!(fit.is_viable());
    }

    #[test]
    fn guess_arity_must_match_variant() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let observed = DerivedSeries::from_compartments(start, vec![1.0; 5], vec![0.0; 5]).unwrap();
        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);

        let err = calibrate_delay(&eval, &NelderMead::default(), &[1.0, 2.0, 3.0, 4.0], 0).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn calibrate_accepts_any_objective() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2);
        let min = calibrate(&NelderMead::default(), &[0.0], &f).unwrap();
        assert!((min.x[0] - 3.0).abs() < 1e-3);
    }
}
