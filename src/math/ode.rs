//! Adaptive explicit Runge–Kutta integration (Dormand–Prince 5(4)).
//!
//! The integrator advances a small fixed-size state vector and reports it at a
//! caller-supplied list of output times. Steps are clipped so that every output
//! time is hit exactly (no dense-output interpolation).
//!
//! Failure is explicit: a non-finite state, a step size underflow, or exhausting
//! the step budget returns an error instead of silently diverging.

use nalgebra::SVector;

use crate::error::AppError;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Relative slack used when deciding that an output time has been reached.
const TIME_EPS: f64 = 1e-12;

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// Fifth-order weights (also the last stage row, FSAL).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between fifth- and fourth-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Integration tolerances and step limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdeOptions {
    /// Relative tolerance per component.
    pub rtol: f64,
    /// Absolute tolerance per component.
    pub atol: f64,
    /// Initial trial step.
    pub first_step: f64,
    /// Steps below this size abort the integration.
    pub min_step: f64,
    /// Total attempted steps (accepted + rejected) per call.
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-6,
            first_step: 0.1,
            min_step: 1e-10,
            max_steps: 100_000,
        }
    }
}

impl OdeOptions {
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.rtol) && positive(self.atol)) {
            return Err(AppError::new(2, "ODE tolerances must be finite and > 0."));
        }
        if !(positive(self.first_step) && positive(self.min_step)) || self.min_step > self.first_step {
            return Err(AppError::new(
                2,
                "ODE step sizes must satisfy 0 < min_step <= first_step.",
            ));
        }
        if self.max_steps == 0 {
            return Err(AppError::new(2, "ODE max_steps must be >= 1."));
        }
        Ok(())
    }
}

/// Integrate `y' = rhs(t, y)` from `times[0]` and return the state at every entry of `times`.
///
/// The first returned state is `y0` itself. `times` must be finite and non-decreasing.
pub fn integrate<const D: usize, F>(
    rhs: F,
    y0: SVector<f64, D>,
    times: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<SVector<f64, D>>, AppError>
where
    F: Fn(f64, &SVector<f64, D>) -> SVector<f64, D>,
{
    let Some(&t0) = times.first() else {
        return Ok(Vec::new());
    };
    if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[1] < w[0]) {
        return Err(AppError::new(
            4,
            "ODE output times must be finite and non-decreasing.",
        ));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(AppError::new(4, "ODE initial state is not finite."));
    }

    let mut out = Vec::with_capacity(times.len());
    out.push(y0);

    let mut t = t0;
    let mut y = y0;
    let mut k1 = rhs(t, &y);
    let mut h = opts.first_step;
    let mut steps = 0usize;

    for &target in &times[1..] {
        while target - t > TIME_EPS * target.abs().max(1.0) {
            if steps >= opts.max_steps {
                return Err(AppError::new(
                    4,
                    format!("ODE step budget ({}) exhausted at t={t:.6}.", opts.max_steps),
                ));
            }
            steps += 1;

            let remaining = target - t;
            let clipped = h >= remaining;
            let h_try = if clipped { remaining } else { h };

            let (y_new, k7, err) = dopri_step(&rhs, t, &y, &k1, h_try, opts);

            if !(err.is_finite() && y_new.iter().all(|v| v.is_finite())) {
                h = h_try * MIN_FACTOR;
                if h < opts.min_step {
                    return Err(AppError::new(
                        4,
                        format!("ODE state became non-finite near t={t:.6}."),
                    ));
                }
                continue;
            }

            if err <= 1.0 {
                t = if clipped { target } else { t + h_try };
                y = y_new;
                k1 = k7;
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                // Landing on an output time must not permanently shrink the step.
                h = if clipped { h.max(h_try * factor) } else { h_try * factor };
                if h < opts.min_step {
                    return Err(AppError::new(
                        4,
                        format!("ODE step size underflow near t={t:.6} (h={h:.3e})."),
                    ));
                }
            } else {
                h = h_try * (SAFETY * err.powf(-0.2)).max(MIN_FACTOR);
                if h < opts.min_step {
                    return Err(AppError::new(
                        4,
                        format!("ODE step size underflow near t={t:.6} (h={h:.3e})."),
                    ));
                }
            }
        }
        out.push(y);
    }

    Ok(out)
}

/// One Dormand–Prince step. Returns the fifth-order solution, its derivative
/// (reused as the next step's first stage) and the scaled RMS error norm.
fn dopri_step<const D: usize, F>(
    rhs: &F,
    t: f64,
    y: &SVector<f64, D>,
    k1: &SVector<f64, D>,
    h: f64,
    opts: &OdeOptions,
) -> (SVector<f64, D>, SVector<f64, D>, f64)
where
    F: Fn(f64, &SVector<f64, D>) -> SVector<f64, D>,
{
    let k2 = rhs(t + C2 * h, &(y + k1 * (h * A21)));
    let k3 = rhs(t + C3 * h, &(y + (k1 * A31 + k2 * A32) * h));
    let k4 = rhs(t + C4 * h, &(y + (k1 * A41 + k2 * A42 + k3 * A43) * h));
    let k5 = rhs(
        t + C5 * h,
        &(y + (k1 * A51 + k2 * A52 + k3 * A53 + k4 * A54) * h),
    );
    let k6 = rhs(
        t + h,
        &(y + (k1 * A61 + k2 * A62 + k3 * A63 + k4 * A64 + k5 * A65) * h),
    );
    let y_new = y + (k1 * B1 + k3 * B3 + k4 * B4 + k5 * B5 + k6 * B6) * h;
    let k7 = rhs(t + h, &y_new);

    let err_vec = (k1 * E1 + k3 * E3 + k4 * E4 + k5 * E5 + k6 * E6 + k7 * E7) * h;

    let mut sum = 0.0;
    for i in 0..D {
        let scale = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
        let e = err_vec[i] / scale;
        sum += e * e;
    }
    let err = if D == 0 { 0.0 } else { (sum / D as f64).sqrt() };

    (y_new, k7, err)
}
