//! Derivative-free local minimization (Nelder–Mead simplex).
//!
//! The minimizer is deterministic: the initial simplex is built from the start
//! point with fixed relative offsets, ties are resolved by a stable sort, and
//! restarts (if enabled) rebuild the simplex around the best vertex rather than
//! drawing random points.
//!
//! Non-finite objective values are treated as `+∞`, so pathological regions of
//! the parameter space are simply never preferred.

use nalgebra::DVector;

use crate::error::AppError;

/// Reflection coefficient.
const RHO: f64 = 1.0;
/// Expansion coefficient.
const CHI: f64 = 2.0;
/// Contraction coefficient.
const PSI: f64 = 0.5;
/// Shrink coefficient.
const SIGMA: f64 = 0.5;

/// Convergence tolerances and safety limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexOptions {
    /// Absolute tolerance on vertex spread per coordinate.
    pub xatol: f64,
    /// Relative tolerance on vertex spread per coordinate (scaled by the best vertex).
    pub xrtol: f64,
    /// Absolute tolerance on objective spread.
    pub fatol: f64,
    /// Relative tolerance on objective spread (scaled by the best value).
    pub frtol: f64,
    /// Iteration ceiling per run; `None` means `1000 * dimension`.
    pub max_iterations: Option<usize>,
    /// Extra runs restarted from the best vertex while they keep improving.
    pub restarts: usize,
    /// Relative offset of the initial simplex vertices.
    pub initial_step: f64,
    /// Offset used for coordinates that start at exactly zero.
    pub zero_step: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            xatol: 1e-4,
            xrtol: 1e-6,
            fatol: 1e-4,
            frtol: 1e-10,
            max_iterations: None,
            restarts: 2,
            initial_step: 0.05,
            zero_step: 0.00025,
        }
    }
}

impl SimplexOptions {
    pub fn validate(&self) -> Result<(), AppError> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !(non_negative(self.xatol)
            && non_negative(self.xrtol)
            && non_negative(self.fatol)
            && non_negative(self.frtol))
        {
            return Err(AppError::new(
                2,
                "Simplex tolerances must be finite and >= 0.",
            ));
        }
        if !(self.initial_step.is_finite() && self.initial_step > 0.0)
            || !(self.zero_step.is_finite() && self.zero_step > 0.0)
        {
            return Err(AppError::new(2, "Simplex initial steps must be finite and > 0."));
        }
        if self.max_iterations == Some(0) {
            return Err(AppError::new(2, "Simplex max_iterations must be >= 1."));
        }
        Ok(())
    }

    fn iteration_limit(&self, dim: usize) -> usize {
        self.max_iterations.unwrap_or(1000 * dim.max(1))
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// Whether the tolerance criteria were met (as opposed to hitting the ceiling).
    pub converged: bool,
}

/// A gradient-free local minimizer.
pub trait Minimizer: Send + Sync {
    fn minimize(&self, objective: &dyn Fn(&[f64]) -> f64, start: &[f64]) -> Result<Minimum, AppError>;
}

/// Nelder–Mead with the standard coefficients (1, 2, 0.5, 0.5).
#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    options: SimplexOptions,
}

impl NelderMead {
    pub fn new(options: SimplexOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SimplexOptions {
        &self.options
    }

    fn run_once(&self, objective: &dyn Fn(&[f64]) -> f64, start: &[f64]) -> Minimum {
        let n = start.len();
        let max_iterations = self.options.iteration_limit(n);
        let mut f = Counted {
            objective,
            evaluations: 0,
        };

        let x0 = DVector::from_column_slice(start);
        let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
        let f0 = f.call(&x0);
        simplex.push((x0.clone(), f0));
        for k in 0..n {
            let mut y = x0.clone();
            y[k] = if y[k] != 0.0 {
                (1.0 + self.options.initial_step) * y[k]
            } else {
                self.options.zero_step
            };
            let fy = f.call(&y);
            simplex.push((y, fy));
        }
        sort_simplex(&mut simplex);

        let mut iterations = 0usize;
        let mut converged = false;

        while iterations < max_iterations {
            if self.has_converged(&simplex) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid = simplex[..n]
                .iter()
                .fold(DVector::zeros(n), |acc, (x, _)| acc + x)
                / n as f64;
            let (worst_x, worst_f) = simplex[n].clone();

            let xr = &centroid * (1.0 + RHO) - &worst_x * RHO;
            let fr = f.call(&xr);

            if fr < simplex[0].1 {
                let xe = &centroid * (1.0 + RHO * CHI) - &worst_x * (RHO * CHI);
                let fe = f.call(&xe);
                simplex[n] = if fe < fr { (xe, fe) } else { (xr, fr) };
            } else if fr < simplex[n - 1].1 {
                simplex[n] = (xr, fr);
            } else {
                let accepted = if fr < worst_f {
                    // Outside contraction.
                    let xc = &centroid * (1.0 + PSI * RHO) - &worst_x * (PSI * RHO);
                    let fc = f.call(&xc);
                    (fc <= fr).then_some((xc, fc))
                } else {
                    // Inside contraction.
                    let xcc = &centroid * (1.0 - PSI) + &worst_x * PSI;
                    let fcc = f.call(&xcc);
                    (fcc < worst_f).then_some((xcc, fcc))
                };

                match accepted {
                    Some(vertex) => simplex[n] = vertex,
                    None => {
                        let best = simplex[0].0.clone();
                        for vertex in simplex.iter_mut().skip(1) {
                            let x = &best + (&vertex.0 - &best) * SIGMA;
                            let fx = f.call(&x);
                            *vertex = (x, fx);
                        }
                    }
                }
            }

            sort_simplex(&mut simplex);
        }

        if !converged {
            converged = self.has_converged(&simplex);
        }

        let (x, value) = simplex.swap_remove(0);
        Minimum {
            x: x.as_slice().to_vec(),
            value,
            iterations,
            evaluations: f.evaluations,
            converged,
        }
    }

    fn has_converged(&self, simplex: &[(DVector<f64>, f64)]) -> bool {
        let (best_x, best_f) = &simplex[0];
        let f_tol = self.options.fatol + self.options.frtol * best_f.abs();
        simplex[1..].iter().all(|(x, fx)| {
            (fx - best_f).abs() <= f_tol
                && x.iter().zip(best_x.iter()).all(|(xi, bi)| {
                    (xi - bi).abs() <= self.options.xatol + self.options.xrtol * bi.abs()
                })
        })
    }
}

impl Minimizer for NelderMead {
    fn minimize(&self, objective: &dyn Fn(&[f64]) -> f64, start: &[f64]) -> Result<Minimum, AppError> {
        if start.is_empty() {
            return Err(AppError::new(2, "Cannot minimize over zero parameters."));
        }
        if start.iter().any(|v| !v.is_finite()) {
            return Err(AppError::new(2, "Minimizer start point must be finite."));
        }

        let mut best = self.run_once(objective, start);
        for _ in 0..self.options.restarts {
            let next = self.run_once(objective, &best.x);
            let improvement = best.value - next.value;
            let iterations = best.iterations + next.iterations;
            let evaluations = best.evaluations + next.evaluations;
            let significant =
                improvement > self.options.fatol + self.options.frtol * best.value.abs();

            if next.value < best.value {
                best = next;
            }
            best.iterations = iterations;
            best.evaluations = evaluations;

            if !significant {
                break;
            }
        }
        Ok(best)
    }
}

/// Objective wrapper that counts calls and maps NaN to `+∞`.
struct Counted<'a> {
    objective: &'a dyn Fn(&[f64]) -> f64,
    evaluations: usize,
}

impl Counted<'_> {
    fn call(&mut self, x: &DVector<f64>) -> f64 {
        self.evaluations += 1;
        let v = (self.objective)(x.as_slice());
        if v.is_nan() { f64::INFINITY } else { v }
    }
}

fn sort_simplex(simplex: &mut [(DVector<f64>, f64)]) {
    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &[f64]) -> f64 {
        (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
    }

    #[test]
    fn finds_rosenbrock_minimum() {
        let nm = NelderMead::default();
        let min = nm.minimize(&rosenbrock, &[-1.2, 1.0]).unwrap();
        assert!((min.x[0] - 1.0).abs() < 1e-3, "x={:?}", min.x);
        assert!((min.x[1] - 1.0).abs() < 1e-3, "x={:?}", min.x);
        assert!(min.value < 1e-6);
        assert!(min.converged);
    }

    #[test]
    fn handles_badly_scaled_coordinates() {
        // Population-sized and rate-sized coordinates in one problem.
        let f = |x: &[f64]| {
            ((x[0] - 1.0e5) / 1.0e4).powi(2) + ((x[1] - 0.6) / 0.1).powi(2) + ((x[2] - 0.1) / 0.01).powi(2)
        };
        let min = NelderMead::default().minimize(&f, &[8.0e4, 1.0, 0.3]).unwrap();
        assert!((min.x[0] - 1.0e5).abs() / 1.0e5 < 1e-3, "x={:?}", min.x);
        assert!((min.x[1] - 0.6).abs() < 1e-3, "x={:?}", min.x);
        assert!((min.x[2] - 0.1).abs() < 1e-3, "x={:?}", min.x);
    }

    #[test]
    fn is_deterministic() {
        let nm = NelderMead::default();
        let a = nm.minimize(&rosenbrock, &[-1.2, 1.0]).unwrap();
        let b = nm.minimize(&rosenbrock, &[-1.2, 1.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn avoids_non_finite_regions() {
        let f = |x: &[f64]| if x[0] <= 0.0 { f64::NAN } else { (x[0] - 0.5).powi(2) };
        let min = NelderMead::default().minimize(&f, &[3.0]).unwrap();
        assert!((min.x[0] - 0.5).abs() < 1e-3, "x={:?}", min.x);
        assert!(min.value.is_finite());
    }

    #[test]
    fn iteration_ceiling_stops_the_search() {
        let nm = NelderMead::new(SimplexOptions {
            max_iterations: Some(5),
            restarts: 0,
            ..SimplexOptions::default()
        });
        let min = nm.minimize(&rosenbrock, &[-1.2, 1.0]).unwrap();
        assert_eq!(min.iterations, 5);
        assert!(!min.converged);
    }

    #[test]
    fn zero_start_coordinates_still_move() {
        let f = |x: &[f64]| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2);
        let min = NelderMead::default().minimize(&f, &[0.0, 0.0]).unwrap();
        assert!((min.x[0] - 2.0).abs() < 1e-3);
        assert!((min.x[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_empty_or_non_finite_start() {
        let nm = NelderMead::default();
        assert!(nm.minimize(&rosenbrock, &[]).is_err());
        assert!(nm.minimize(&rosenbrock, &[f64::NAN, 1.0]).is_err());
    }
}
