// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # Non-negative least squares fit
//!
//! Solves `minimize ½‖M w − y‖²  subject to  w ≥ 0` with projected gradient
//! descent:
//!
//! 1. Trial step from the Barzilai–Borwein rule, alternating BB1 (`sᵀs / sᵀz`)
//!    and BB2 (`sᵀz / zᵀz`), clamped to `[1e-12, 1e12]`. The first step is
//!    the inverse Rayleigh quotient of `MᵀM` along the projected gradient.
//! 2. Projection onto the non-negative orthant, then Armijo backtracking along
//!    the projection arc. Accepted steps never increase the objective.
//! 3. Stop on a small projected gradient (relative to the starting one), a
//!    stalled objective, a failed line search, or the iteration cap.
//!
//! The iteration cap is the only cancellation mechanism. Non-convergence is a
//! diagnostic carried by [`FitResult`], not an error, unless the caller asks
//! for it through [`FitResult::ensure_converged`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use life_config::SolverConfig;
use life_structures::{LifeError, Result, TerminationReason};

use crate::sparse::ForwardMatrix;

const MIN_STEP: f64 = 1e-12;
const MAX_STEP: f64 = 1e12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub max_iterations: usize,
    pub projected_gradient_tolerance: f64,
    pub objective_tolerance: f64,
    pub armijo_sufficient_decrease: f64,
    pub backtrack_factor: f64,
    pub max_backtracks: usize,
    /// Record the objective after every iteration (index 0 = starting point)
    pub record_history: bool,
    /// Starting weights; all zero when absent. Negative entries are clipped.
    pub initial_weights: Option<Vec<f64>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            projected_gradient_tolerance: 1e-6,
            objective_tolerance: 1e-10,
            armijo_sufficient_decrease: 1e-4,
            backtrack_factor: 0.5,
            max_backtracks: 40,
            record_history: false,
            initial_weights: None,
        }
    }
}

impl SolverOptions {
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            projected_gradient_tolerance: config.projected_gradient_tolerance,
            objective_tolerance: config.objective_tolerance,
            armijo_sufficient_decrease: config.armijo_sufficient_decrease,
            backtrack_factor: config.backtrack_factor,
            max_backtracks: config.max_backtracks,
            record_history: config.record_history,
            initial_weights: None,
        }
    }

    pub fn with_history(mut self) -> Self {
        self.record_history = true;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(LifeError::InvalidInput(
                "solver needs at least one iteration".to_string(),
            ));
        }
        if !(self.projected_gradient_tolerance > 0.0) || !(self.objective_tolerance >= 0.0) {
            return Err(LifeError::InvalidInput(format!(
                "solver tolerances must be positive (projected gradient {}, objective {})",
                self.projected_gradient_tolerance, self.objective_tolerance
            )));
        }
        if !(self.armijo_sufficient_decrease > 0.0 && self.armijo_sufficient_decrease < 1.0)
            || !(self.backtrack_factor > 0.0 && self.backtrack_factor < 1.0)
        {
            return Err(LifeError::InvalidInput(format!(
                "line search constants must lie in (0, 1) (sufficient decrease {}, backtrack factor {})",
                self.armijo_sufficient_decrease, self.backtrack_factor
            )));
        }
        Ok(())
    }
}

/// Weights plus solver diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Raw non-negative weights, one per fascicle
    pub weights: Vec<f64>,
    pub iterations: usize,
    /// ½‖M w − y‖²
    pub objective: f64,
    /// ‖M w − y‖
    pub residual_norm: f64,
    pub projected_gradient_norm: f64,
    pub termination: TerminationReason,
    pub converged: bool,
    pub history: Option<Vec<f64>>,
}

impl FitResult {
    /// # Errors
    /// `SolverNonConvergence` if the solver stopped without converging.
    pub fn ensure_converged(&self) -> Result<()> {
        if self.converged {
            Ok(())
        } else {
            Err(LifeError::SolverNonConvergence {
                iterations: self.iterations,
                projected_gradient_norm: self.projected_gradient_norm,
                residual_norm: self.residual_norm,
            })
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Norm of the projected gradient: `g_i` where `w_i > 0`, `min(g_i, 0)` at the bound
fn projected_gradient_norm(w: &[f64], g: &[f64]) -> f64 {
    w.iter()
        .zip(g)
        .map(|(&wi, &gi)| {
            let p = if wi > 0.0 { gi } else { gi.min(0.0) };
            p * p
        })
        .sum::<f64>()
        .sqrt()
}

/// Residual `M w − y` into `r`, returning ½‖r‖²
fn residual_into(matrix: &ForwardMatrix, w: &[f64], y: &[f64], r: &mut [f64]) -> f64 {
    matrix.mul_vec_into(w, r);
    let mut sum = 0.0;
    for (ri, yi) in r.iter_mut().zip(y) {
        *ri -= yi;
        sum += *ri * *ri;
    }
    0.5 * sum
}

fn finish(
    weights: Vec<f64>,
    iterations: usize,
    objective: f64,
    pg_norm: f64,
    termination: TerminationReason,
    history: Option<Vec<f64>>,
) -> FitResult {
    FitResult {
        weights,
        iterations,
        objective,
        residual_norm: (2.0 * objective).sqrt(),
        projected_gradient_norm: pg_norm,
        converged: termination.is_converged(),
        termination,
        history,
    }
}

/// Fit non-negative weights for `matrix` against the observation `y`.
///
/// # Errors
/// - `DimensionMismatch` if `y` or the initial weights do not match the matrix
/// - `InvalidInput` for invalid options or non-finite data
pub fn solve_nnls(matrix: &ForwardMatrix, y: &[f64], options: &SolverOptions) -> Result<FitResult> {
    options.validate()?;
    if y.len() != matrix.n_rows() {
        return Err(LifeError::dimension("observation vector", matrix.n_rows(), y.len()));
    }
    let n = matrix.n_cols();

    let mut w = match &options.initial_weights {
        Some(init) => {
            if init.len() != n {
                return Err(LifeError::dimension("initial weights", n, init.len()));
            }
            if init.iter().any(|x| !x.is_finite()) {
                return Err(LifeError::InvalidInput(
                    "initial weights must be finite".to_string(),
                ));
            }
            init.iter().map(|&x| x.max(0.0)).collect()
        }
        None => vec![0.0; n],
    };

    let mut r = vec![0.0; matrix.n_rows()];
    let mut f = residual_into(matrix, &w, y, &mut r);
    if !f.is_finite() {
        return Err(LifeError::InvalidInput(
            "objective is not finite at the starting point".to_string(),
        ));
    }
    let mut g = vec![0.0; n];
    matrix.transpose_mul_vec_into(&r, &mut g);

    let mut history = options.record_history.then(|| vec![f]);
    let pg0 = projected_gradient_norm(&w, &g);
    if n == 0 || pg0 == 0.0 {
        debug!(fascicles = n, objective = f, "Starting point is already optimal");
        return Ok(finish(w, 0, f, pg0, TerminationReason::ProjectedGradient, history));
    }

    // First step: inverse Rayleigh quotient of MᵀM along the projected gradient
    let pg: Vec<f64> = w
        .iter()
        .zip(&g)
        .map(|(&wi, &gi)| if wi > 0.0 { gi } else { gi.min(0.0) })
        .collect();
    let mut mp = vec![0.0; matrix.n_rows()];
    matrix.mul_vec_into(&pg, &mut mp);
    let curvature = dot(&mp, &mp);
    let mut alpha = if curvature > 0.0 {
        (dot(&pg, &pg) / curvature).clamp(MIN_STEP, MAX_STEP)
    } else {
        1.0
    };

    let mut w_trial = vec![0.0; n];
    let mut r_trial = vec![0.0; matrix.n_rows()];
    let mut g_trial = vec![0.0; n];
    let mut pg_norm = pg0;
    let mut termination = TerminationReason::MaxIterations;
    let mut iterations = 0;

    for iter in 1..=options.max_iterations {
        // Armijo backtracking along the projection arc
        let mut step = alpha;
        let mut accepted = None;
        let mut best_trial = f64::INFINITY;
        for _ in 0..=options.max_backtracks {
            for ((wt, &wi), &gi) in w_trial.iter_mut().zip(&w).zip(&g) {
                *wt = (wi - step * gi).max(0.0);
            }
            let decrease: f64 = w_trial
                .iter()
                .zip(&w)
                .zip(&g)
                .map(|((&wt, &wi), &gi)| gi * (wt - wi))
                .sum();
            let f_trial = residual_into(matrix, &w_trial, y, &mut r_trial);
            best_trial = best_trial.min(f_trial);
            if f_trial <= f + options.armijo_sufficient_decrease * decrease {
                accepted = Some(f_trial);
                break;
            }
            step *= options.backtrack_factor;
        }

        let Some(f_new) = accepted else {
            // Rounding noise near the optimum looks like a failed search
            termination = if (best_trial - f).abs() <= options.objective_tolerance * f.max(f64::MIN_POSITIVE) {
                TerminationReason::ObjectiveStalled
            } else {
                TerminationReason::LineSearchStalled
            };
            break;
        };

        matrix.transpose_mul_vec_into(&r_trial, &mut g_trial);

        // Barzilai–Borwein step for the next iteration
        let mut sts = 0.0;
        let mut stz = 0.0;
        let mut ztz = 0.0;
        for i in 0..n {
            let s = w_trial[i] - w[i];
            let z = g_trial[i] - g[i];
            sts += s * s;
            stz += s * z;
            ztz += z * z;
        }
        if stz > 0.0 {
            let bb = if iter % 2 == 1 { sts / stz } else { stz / ztz };
            alpha = bb.clamp(MIN_STEP, MAX_STEP);
        }

        let relative_change = (f - f_new) / f.max(f64::MIN_POSITIVE);
        std::mem::swap(&mut w, &mut w_trial);
        std::mem::swap(&mut r, &mut r_trial);
        std::mem::swap(&mut g, &mut g_trial);
        f = f_new;
        iterations = iter;
        if let Some(h) = history.as_mut() {
            h.push(f);
        }

        pg_norm = projected_gradient_norm(&w, &g);
        trace!(iteration = iter, objective = f, projected_gradient = pg_norm, step, "NNLS iteration");

        if pg_norm <= options.projected_gradient_tolerance * pg0 {
            termination = TerminationReason::ProjectedGradient;
            break;
        }
        if relative_change < options.objective_tolerance {
            termination = TerminationReason::ObjectiveStalled;
            break;
        }
    }

    let result = finish(w, iterations, f, pg_norm, termination, history);
    if result.converged {
        debug!(
            iterations = result.iterations,
            residual_norm = result.residual_norm,
            termination = ?result.termination,
            "NNLS fit converged"
        );
    } else {
        warn!(
            iterations = result.iterations,
            residual_norm = result.residual_norm,
            projected_gradient = result.projected_gradient_norm,
            termination = ?result.termination,
            "NNLS fit did not converge"
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Two overlapping columns over 3 rows
    fn matrix() -> ForwardMatrix {
        ForwardMatrix::from_columns(
            3,
            3,
            vec![vec![(0, 1.0), (1, 1.0)], vec![(1, 1.0), (2, 2.0)]],
        )
    }

    #[test]
    fn test_recovers_exact_weights() {
        let m = matrix();
        let y = m.mul_vec(&[2.0, 0.5]).unwrap();
        let fit = solve_nnls(&m, &y, &SolverOptions::default()).unwrap();

        assert!(fit.converged);
        assert_relative_eq!(fit.weights[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(fit.weights[1], 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_negative_solution_is_clamped() {
        let m = matrix();
        // Unconstrained optimum has w1 < 0
        let y = m.mul_vec(&[1.0, -1.0]).unwrap();
        let fit = solve_nnls(&m, &y, &SolverOptions::default().with_history()).unwrap();

        assert!(fit.weights.iter().all(|&w| w >= 0.0));
        assert_eq!(fit.weights[1], 0.0);
        let history = fit.history.unwrap();
        for pair in history.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_zero_target_stops_immediately() {
        let m = matrix();
        let fit = solve_nnls(&m, &[0.0; 3], &SolverOptions::default()).unwrap();
        assert_eq!(fit.iterations, 0);
        assert!(fit.converged);
        assert_eq!(fit.weights, vec![0.0, 0.0]);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let m = matrix();
        let y = m.mul_vec(&[2.0, 0.5]).unwrap();
        let options = SolverOptions {
            max_iterations: 1,
            projected_gradient_tolerance: 1e-300,
            objective_tolerance: 0.0,
            ..SolverOptions::default()
        };
        let fit = solve_nnls(&m, &y, &options).unwrap();

        assert_eq!(fit.termination, TerminationReason::MaxIterations);
        assert!(!fit.converged);
        assert!(matches!(
            fit.ensure_converged(),
            Err(LifeError::SolverNonConvergence { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let m = matrix();
        assert!(matches!(
            solve_nnls(&m, &[0.0; 2], &SolverOptions::default()),
            Err(LifeError::DimensionMismatch { .. })
        ));
    }
}
