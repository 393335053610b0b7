//! Reporting-delay search.
//!
//! Every candidate delay is calibrated independently (in parallel) and the
//! fits are reduced to a single winner: minimum loss, ties broken by the
//! smaller delay. Non-viable fits (infinite loss, non-physical parameters) are
//! kept in the candidate list for reporting but never selected.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{DelayFit, DelayList};
use crate::error::AppError;
use crate::fit::calibrate::calibrate_delay;
use crate::fit::loss::LossEvaluator;
use crate::math::Minimizer;

/// Output of a delay search.
#[derive(Debug, Clone)]
pub struct DelaySearchOutcome {
    pub best: DelayFit,
    /// One fit per candidate delay, in ascending delay order.
    pub candidates: Vec<DelayFit>,
}

impl DelaySearchOutcome {
    pub fn viable_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_viable()).count()
    }
}

/// Calibrate every delay in `delays` and select the best fit.
pub fn search_delays<M: Minimizer + ?Sized>(
    evaluator: &LossEvaluator<'_>,
    minimizer: &M,
    initial_guess: &[f64],
    delays: &DelayList,
) -> Result<DelaySearchOutcome, AppError> {
    debug!(
        variant = evaluator.variant().display_name(),
        delays = %delays,
        observed_days = evaluator.observed().len(),
        "starting delay search"
    );

    let candidates: Vec<DelayFit> = delays
        .as_slice()
        .par_iter()
        .map(|&delay| calibrate_delay(evaluator, minimizer, initial_guess, delay))
        .collect::<Result<_, _>>()?;

    for fit in candidates.iter().filter(|c| !c.is_viable()) {
        warn!(delay = fit.delay, loss = fit.loss, "discarding non-viable fit");
    }

    let best = select_best(&candidates)?;
    info!(
        delay = best.delay,
        loss = best.loss,
        r0 = best.params.r0(),
        "selected delay"
    );

    Ok(DelaySearchOutcome { best, candidates })
}

/// Deterministic selection: minimum loss among viable fits; ties go to the smaller delay.
pub fn select_best(candidates: &[DelayFit]) -> Result<DelayFit, AppError> {
    let mut best: Option<&DelayFit> = None;
    for c in candidates.iter().filter(|c| c.is_viable()) {
        best = match best {
            Some(b) if !(c.loss < b.loss || (c.loss == b.loss && c.delay < b.delay)) => Some(b),
            _ => Some(c),
        };
    }

    best.cloned().ok_or_else(|| {
        AppError::new(
            4,
            format!(
                "No viable fit among {} delay candidate(s); try another initial guess or delay range.",
                candidates.len()
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DerivedSeries, InitialState, ModelVariant, SirParams};
    use crate::math::{NelderMead, OdeOptions};
    use crate::models::Simulator;
    use chrono::NaiveDate;

    fn fit(delay: usize, loss: f64) -> DelayFit {
        DelayFit {
            delay,
            params: SirParams::plain(1000.0, 0.3, 0.1),
            loss,
            iterations: 1,
            evaluations: 1,
            converged: true,
        }
    }

    #[test]
    fn lowest_loss_wins() {
        let best = select_best(&[fit(0, 5.0), fit(3, 1.0), fit(7, 2.0)]).unwrap();
        assert_eq!(best.delay, 3);
    }

    #[test]
    fn equal_losses_prefer_the_smaller_delay() {
        let best = select_best(&[fit(9, 1.0), fit(4, 1.0), fit(6, 1.0)]).unwrap();
        assert_eq!(best.delay, 4);
    }

    #[test]
    fn non_viable_fits_are_skipped() {
        let mut negative = fit(1, 0.1);
        negative.params.beta = -0.2;
        let best = select_best(&[fit(0, f64::INFINITY), negative, fit(2, 9.0)]).unwrap();
        assert_eq!(best.delay, 2);
    }

    #[test]
    fn no_viable_fit_is_an_error() {
        let err = select_best(&[fit(0, f64::INFINITY), fit(1, f64::NAN)]).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(select_best(&[]).unwrap_err().exit_code(), 4);
    }

    #[test]
    fn search_recovers_the_generating_delay() {
        let sim = Simulator::new(InitialState::SEED, OdeOptions::default());
        let truth = SirParams::plain(20_000.0, 0.5, 0.1);
        let full = sim.simulate(&truth, 35).unwrap();
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let observed = DerivedSeries::from_compartments(
            start,
            full.infected[5..].to_vec(),
            full.removed[5..].to_vec(),
        )
        .unwrap();

        let eval = LossEvaluator::new(&sim, &observed, ModelVariant::Plain, None);
        let delays = DelayList::new(vec![3, 5, 7]).unwrap();
        let outcome =
            search_delays(&eval, &NelderMead::default(), &[20_000.0, 0.5, 0.1], &delays).unwrap();

        assert_eq!(outcome.candidates.len(), 3);
        assert_eq!(
            outcome.candidates.iter().map(|c| c.delay).collect::<Vec<_>>(),
            vec![3, 5, 7]
        );
        assert_eq!(outcome.best.delay, 5);
        assert!(outcome.best.loss < 1e-3);
        assert_eq!(outcome.viable_count(), 3);
    }
}
