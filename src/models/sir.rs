//! SIR dynamics and the piecewise simulator.
//!
//! ```text
//! dS/dt = -m(t)·beta·S·I/N
//! dI/dt =  m(t)·beta·S·I/N - gamma·I
//! dR/dt =  gamma·I
//! ```
//!
//! `m(t)` is a piecewise-constant contact multiplier described by an ordered list
//! of [`Segment`]s. The plain model is a single segment with `m = 1`; the lockdown
//! model uses `m = delta` inside the (delay-shifted) lockdown window. Each segment
//! is integrated separately and starts from the previous segment's final state.
//!
//! Simulated day `k` sits at `t = k`.

use nalgebra::Vector3;

use crate::domain::{InitialState, LockdownWindow, SirParams, Trajectory};
use crate::error::AppError;
use crate::math::{OdeOptions, integrate};

/// A contiguous run of days sharing one contact multiplier.
///
/// Integration runs from `start_day` to `end_day`; the segment contributes the
/// states for days `start_day + 1 ..= end_day`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start_day: usize,
    pub end_day: usize,
    pub contact_multiplier: f64,
}

/// SIR right-hand side for a state `[S, I, R]`.
pub fn sir_rhs(population: f64, beta: f64, gamma: f64, y: &Vector3<f64>) -> Vector3<f64> {
    let (s, i) = (y[0], y[1]);
    let force = beta * s * i / population;
    let removal = gamma * i;
    Vector3::new(-force, force - removal, removal)
}

/// Build the contact schedule over `num_days` simulated days.
///
/// The lockdown window (observed-day indices) is shifted by `delay` and clipped to
/// the last simulated day. Zero-length segments are dropped and neighbours with the
/// same multiplier are merged, so `delta = 1` or an empty window collapses to the
/// plain single-segment schedule.
pub fn contact_schedule(
    lockdown: Option<LockdownWindow>,
    delta: f64,
    delay: usize,
    num_days: usize,
) -> Vec<Segment> {
    if num_days == 0 {
        return Vec::new();
    }
    let last = num_days - 1;

    let raw = match lockdown {
        None => vec![Segment {
            start_day: 0,
            end_day: last,
            contact_multiplier: 1.0,
        }],
        Some(window) => {
            let start = window.start().saturating_add(delay).min(last);
            let end = window.end().saturating_add(delay).min(last);
            vec![
                Segment {
                    start_day: 0,
                    end_day: start,
                    contact_multiplier: 1.0,
                },
                Segment {
                    start_day: start,
                    end_day: end,
                    contact_multiplier: delta,
                },
                Segment {
                    start_day: end,
                    end_day: last,
                    contact_multiplier: 1.0,
                },
            ]
        }
    };

    let mut out: Vec<Segment> = Vec::with_capacity(raw.len());
    for seg in raw.into_iter().filter(|s| s.end_day > s.start_day) {
        match out.last_mut() {
            Some(prev) if prev.contact_multiplier == seg.contact_multiplier => {
                prev.end_day = seg.end_day;
            }
            _ => out.push(seg),
        }
    }
    out
}

/// Stateless SIR simulator with a fixed day-zero state and integration options.
#[derive(Debug, Clone)]
pub struct Simulator {
    initial: InitialState,
    ode: OdeOptions,
}

impl Simulator {
    pub fn new(initial: InitialState, ode: OdeOptions) -> Self {
        Self { initial, ode }
    }

    pub fn initial(&self) -> InitialState {
        self.initial
    }

    pub fn ode_options(&self) -> &OdeOptions {
        &self.ode
    }

    /// Plain SIR over `num_days` days (no lockdown).
    pub fn simulate(&self, params: &SirParams, num_days: usize) -> Result<Trajectory, AppError> {
        let schedule = contact_schedule(None, 1.0, 0, num_days);
        self.simulate_schedule(params, &schedule, num_days)
    }

    /// SIR with `beta·delta` inside the lockdown window shifted by `delay`.
    pub fn simulate_lockdown(
        &self,
        params: &SirParams,
        window: LockdownWindow,
        delay: usize,
        num_days: usize,
    ) -> Result<Trajectory, AppError> {
        let schedule = contact_schedule(Some(window), params.contact_multiplier(), delay, num_days);
        self.simulate_schedule(params, &schedule, num_days)
    }

    /// Simulate `delay + len` days and keep the last `len`, so that day 0 of the
    /// result lines up with the first observed day.
    pub fn aligned(
        &self,
        params: &SirParams,
        lockdown: Option<LockdownWindow>,
        delay: usize,
        len: usize,
    ) -> Result<Trajectory, AppError> {
        let total = delay + len;
        let full = match lockdown {
            Some(window) => self.simulate_lockdown(params, window, delay, total)?,
            None => self.simulate(params, total)?,
        };
        full.window(delay, len)
    }

    /// Integrate an explicit piecewise schedule.
    ///
    /// The schedule must start at day 0, be contiguous and end at `num_days - 1`.
    pub fn simulate_schedule(
        &self,
        params: &SirParams,
        schedule: &[Segment],
        num_days: usize,
    ) -> Result<Trajectory, AppError> {
        if num_days == 0 {
            return Ok(Trajectory::default());
        }
        validate_schedule(schedule, num_days)?;

        let SirParams {
            population,
            beta,
            gamma,
            ..
        } = *params;
        if ![population, beta, gamma].iter().all(|v| v.is_finite()) {
            return Err(AppError::new(4, "SIR parameters must be finite."));
        }

        let mut y = Vector3::new(
            self.initial.susceptible(population),
            self.initial.infected,
            self.initial.removed,
        );
        let mut trajectory = Trajectory::with_capacity(num_days);
        trajectory.push(y[0], y[1], y[2]);

        for seg in schedule {
            let rate = beta * seg.contact_multiplier;
            let times: Vec<f64> = (seg.start_day..=seg.end_day).map(|d| d as f64).collect();
            let states = integrate(
                |_, state: &Vector3<f64>| sir_rhs(population, rate, gamma, state),
                y,
                &times,
                &self.ode,
            )?;
            for state in &states[1..] {
                trajectory.push(state[0], state[1], state[2]);
            }
            if let Some(last) = states.last() {
                y = *last;
            }
        }

        Ok(trajectory)
    }
}

fn validate_schedule(schedule: &[Segment], num_days: usize) -> Result<(), AppError> {
    let mut expected = 0usize;
    for seg in schedule {
        if seg.start_day != expected || seg.end_day <= seg.start_day {
            return Err(AppError::new(
                4,
                format!(
                    "Contact schedule is not contiguous at day {expected} (segment {}..{}).",
                    seg.start_day, seg.end_day
                ),
            ));
        }
        if !seg.contact_multiplier.is_finite() {
            return Err(AppError::new(4, "Contact multiplier must be finite."));
        }
        expected = seg.end_day;
    }
    if expected != num_days - 1 {
        return Err(AppError::new(
            4,
            format!(
                "Contact schedule ends at day {expected}, expected {}.",
                num_days - 1
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> Simulator {
        Simulator::new(InitialState::SEED, OdeOptions::default())
    }

    #[test]
    fn conserves_population() {
        let params = SirParams::plain(100_000.0, 0.6, 0.1);
        let traj = simulator().simulate(&params, 90).unwrap();
        assert_eq!(traj.len(), 90);
        for t in 0..traj.len() {
            let total = traj.total(t);
            assert!((total - 100_000.0).abs() < 1e-6 * 100_000.0, "t={t} total={total}");
        }
    }

    #[test]
    fn first_day_is_the_initial_state() {
        let params = SirParams::plain(1_000.0, 0.3, 0.1);
        let traj = simulator().simulate(&params, 5).unwrap();
        assert_eq!(traj.susceptible[0], 999.0);
        assert_eq!(traj.infected[0], 1.0);
        assert_eq!(traj.removed[0], 0.0);
    }

    #[test]
    fn early_growth_is_exponential() {
        // With S ≈ N the infected count grows like exp((beta - gamma) t).
        let params = SirParams::plain(1e9, 0.3, 0.1);
        let traj = simulator().simulate(&params, 11).unwrap();
        let expected = (0.2_f64 * 10.0).exp();
        assert!((traj.infected[10] - expected).abs() / expected < 1e-4);
    }

    #[test]
    fn neutral_lockdown_reproduces_plain_run_exactly() {
        let sim = simulator();
        let plain = sim.simulate(&SirParams::plain(50_000.0, 0.5, 0.1), 60).unwrap();

        let window = LockdownWindow::new(10, 30).unwrap();
        let unit_delta = SirParams::with_lockdown(50_000.0, 0.5, 0.1, 1.0);
        assert_eq!(sim.simulate_lockdown(&unit_delta, window, 3, 60).unwrap(), plain);

        let empty = LockdownWindow::new(20, 20).unwrap();
        let strong = SirParams::with_lockdown(50_000.0, 0.5, 0.1, 0.2);
        assert_eq!(sim.simulate_lockdown(&strong, empty, 0, 60).unwrap(), plain);
    }

    #[test]
    fn lockdown_slows_transmission_inside_the_window() {
        let sim = simulator();
        let plain = sim.simulate(&SirParams::plain(1e6, 0.5, 0.1), 80).unwrap();
        let window = LockdownWindow::new(20, 50).unwrap();
        let locked = sim
            .simulate_lockdown(&SirParams::with_lockdown(1e6, 0.5, 0.1, 0.1), window, 0, 80)
            .unwrap();

        // Identical up to the start of the window.
        for t in 0..=20 {
            assert!((locked.infected[t] - plain.infected[t]).abs() <= 1e-9 * plain.infected[t].max(1.0));
        }
        // beta·delta < gamma: infections decline during lockdown.
        assert!(locked.infected[50] < locked.infected[20]);
        assert!(locked.infected[50] < plain.infected[50]);
        // Transmission resumes afterwards.
        assert!(locked.infected[79] > locked.infected[51]);
        for t in 0..80 {
            assert!((locked.total(t) - 1e6).abs() < 1.0);
        }
    }

    #[test]
    fn schedule_shifts_by_delay_and_clips_to_horizon() {
        let window = LockdownWindow::new(5, 12).unwrap();
        let segs = contact_schedule(Some(window), 0.5, 3, 30);
        assert_eq!(
            segs,
            vec![
                Segment { start_day: 0, end_day: 8, contact_multiplier: 1.0 },
                Segment { start_day: 8, end_day: 15, contact_multiplier: 0.5 },
                Segment { start_day: 15, end_day: 29, contact_multiplier: 1.0 },
            ]
        );

        // Window ends beyond the horizon: trailing full-rate segment disappears.
        let segs = contact_schedule(Some(window), 0.5, 0, 10);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1], Segment { start_day: 5, end_day: 9, contact_multiplier: 0.5 });

        // Window starts beyond the horizon: plain schedule.
        let segs = contact_schedule(Some(window), 0.5, 20, 10);
        assert_eq!(segs, vec![Segment { start_day: 0, end_day: 9, contact_multiplier: 1.0 }]);
    }

    #[test]
    fn window_starting_at_day_zero_has_no_leading_segment() {
        let window = LockdownWindow::new(0, 4).unwrap();
        let segs = contact_schedule(Some(window), 0.3, 0, 10);
        assert_eq!(segs[0], Segment { start_day: 0, end_day: 4, contact_multiplier: 0.3 });
    }

    #[test]
    fn aligned_drops_the_delay_prefix() {
        let sim = simulator();
        let params = SirParams::plain(10_000.0, 0.4, 0.1);
        let full = sim.simulate(&params, 25).unwrap();
        let aligned = sim.aligned(&params, None, 5, 20).unwrap();
        assert_eq!(aligned.infected, full.infected[5..].to_vec());
        assert_eq!(aligned.len(), 20);
    }

    #[test]
    fn degenerate_population_is_an_error() {
        let err = simulator().simulate(&SirParams::plain(0.0, 0.5, 0.1), 10).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn zero_and_single_day_runs() {
        let sim = simulator();
        let params = SirParams::plain(1_000.0, 0.5, 0.1);
        assert!(sim.simulate(&params, 0).unwrap().is_empty());
        assert_eq!(sim.simulate(&params, 1).unwrap().len(), 1);
    }

    #[test]
    fn rejects_gapped_schedules() {
        let gapped = [
            Segment { start_day: 0, end_day: 3, contact_multiplier: 1.0 },
            Segment { start_day: 4, end_day: 9, contact_multiplier: 1.0 },
        ];
        let err = simulator()
            .simulate_schedule(&SirParams::plain(1_000.0, 0.5, 0.1), &gapped, 10)
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
