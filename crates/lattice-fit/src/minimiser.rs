//! Non-linear least squares
//!
//! The fit driver hands a minimiser a residual function that already
//! includes the whitening, so minimising `|r(p)|²` is minimising χ².

use lattice_core::{Error, Result};
use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Weighted residuals as a function of the free parameters
pub type ResidualFn<'a> = dyn Fn(&DVector<f64>) -> Result<DVector<f64>> + Sync + 'a;

/// Outcome of one minimisation
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub parameters: DVector<f64>,
    /// Residuals at `parameters`
    pub residuals: DVector<f64>,
    pub evaluations: usize,
    /// False when the evaluation budget ran out first
    pub converged: bool,
}

impl Minimum {
    pub fn chi_sq(&self) -> f64 {
        self.residuals.norm_squared()
    }
}

/// Pluggable least-squares routine
///
/// The residual function already carries the data, the whitening weights and
/// the parameter maps of the joint model, so an implementation only sees
/// parameters in and residuals out. Goodness of fit (χ², dof, p-value) is
/// computed by the fit driver from the returned residuals, see
/// [`goodness_of_fit`](crate::goodness::goodness_of_fit).
pub trait Minimiser: Send + Sync + fmt::Debug {
    /// Minimise `|residuals(p)|²` starting from `initial`
    fn minimise(&self, residuals: &ResidualFn<'_>, initial: &DVector<f64>) -> Result<Minimum>;
}

/// Levenberg–Marquardt with Marquardt diagonal scaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevenbergMarquardt {
    pub max_evaluations: usize,
    /// Relative reduction of χ² below which the fit has converged
    pub ftol: f64,
    /// Relative step size below which the fit has converged
    pub xtol: f64,
    /// Gradient infinity norm below which the fit has converged; 0 disables
    pub gtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_evaluations: 2000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 0.0,
        }
    }
}

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e16;

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }
}

fn all_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Forward-difference Jacobian (residuals × parameters)
fn jacobian(
    residuals: &ResidualFn<'_>,
    p: &DVector<f64>,
    r: &DVector<f64>,
    evaluations: &mut usize,
) -> Result<DMatrix<f64>> {
    let eps = f64::EPSILON.sqrt();
    let mut j = DMatrix::zeros(r.len(), p.len());
    for k in 0..p.len() {
        let h = if p[k] == 0.0 { eps } else { eps * p[k].abs() };
        let mut shifted = p.clone();
        shifted[k] += h;
        let rk = residuals(&shifted)?;
        *evaluations += 1;
        if rk.len() != r.len() {
            return Err(Error::ShapeMismatch(format!(
                "residual length changed from {} to {} between evaluations",
                r.len(),
                rk.len()
            )));
        }
        if !all_finite(&rk) {
            return Err(Error::Convergence(format!(
                "non-finite residuals while differentiating parameter {k} at {}",
                p[k]
            )));
        }
        j.set_column(k, &((rk - r) / h));
    }
    Ok(j)
}

/// Solve the damped normal equations, falling back to SVD when Cholesky fails
fn solve_step(a: DMatrix<f64>, rhs: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = Cholesky::new(a.clone()) {
        return Some(chol.solve(rhs));
    }
    let svd = a.svd(true, true);
    for tol in [1e-10, 1e-8, 1e-6] {
        if let Ok(step) = svd.solve(rhs, tol) {
            if all_finite(&step) {
                return Some(step);
            }
        }
    }
    None
}

impl Minimiser for LevenbergMarquardt {
    fn minimise(&self, residuals: &ResidualFn<'_>, initial: &DVector<f64>) -> Result<Minimum> {
        let mut p = initial.clone();
        let mut r = residuals(&p)?;
        let mut evaluations = 1;
        if !all_finite(&p) || !all_finite(&r) {
            return Err(Error::Convergence(format!(
                "non-finite residuals at the initial parameters {:?}",
                p.as_slice()
            )));
        }
        let mut cost = r.norm_squared();
        if p.is_empty() {
            return Ok(Minimum {
                parameters: p,
                residuals: r,
                evaluations,
                converged: true,
            });
        }

        let mut lambda = INITIAL_DAMPING;
        let mut converged = false;
        'outer: while evaluations < self.max_evaluations {
            if cost == 0.0 {
                converged = true;
                break;
            }
            let j = jacobian(residuals, &p, &r, &mut evaluations)?;
            let jtj = j.tr_mul(&j);
            let gradient = j.tr_mul(&r);
            if self.gtol > 0.0 && gradient.amax() <= self.gtol {
                converged = true;
                break;
            }
            let scale: DVector<f64> = jtj.diagonal().map(|d| if d > 0.0 { d } else { 1.0 });

            loop {
                if evaluations >= self.max_evaluations {
                    break 'outer;
                }
                let mut damped = jtj.clone();
                for i in 0..p.len() {
                    damped[(i, i)] += lambda * scale[i];
                }
                let Some(step) = solve_step(damped, &-&gradient) else {
                    lambda *= 10.0;
                    if lambda > MAX_DAMPING {
                        converged = true;
                        break 'outer;
                    }
                    continue;
                };

                let trial = &p + &step;
                let trial_r = residuals(&trial)?;
                evaluations += 1;
                let trial_cost = trial_r.norm_squared();

                if all_finite(&trial_r) && trial_cost < cost {
                    let reduction = (cost - trial_cost) / cost;
                    let small_step = step.norm() <= self.xtol * (self.xtol + p.norm());
                    p = trial;
                    r = trial_r;
                    cost = trial_cost;
                    lambda = (lambda / 10.0).max(f64::EPSILON);
                    if reduction <= self.ftol || small_step {
                        converged = true;
                        break 'outer;
                    }
                    break;
                }

                lambda *= 10.0;
                if lambda > MAX_DAMPING || step.norm() <= self.xtol * (self.xtol + p.norm()) {
                    // no downhill step left at this precision
                    converged = true;
                    break 'outer;
                }
            }
        }

        if !all_finite(&p) || !all_finite(&r) {
            return Err(Error::Convergence(format!(
                "minimisation ended at non-finite parameters {:?}",
                p.as_slice()
            )));
        }
        if !converged {
            warn!(
                "Levenberg-Marquardt stopped after {evaluations} evaluations without converging (chi^2 = {cost:.6e})"
            );
        }
        Ok(Minimum {
            parameters: p,
            residuals: r,
            evaluations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_problem_is_solved_exactly() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let residuals = |p: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_iterator(4, xs.iter().map(|&x| 1.0 + 2.0 * x - (p[0] + p[1] * x))))
        };
        let min = LevenbergMarquardt::default()
            .minimise(&residuals, &DVector::from_vec(vec![0.0, 0.0]))
            .unwrap();
        assert!(min.converged);
        assert_relative_eq!(min.parameters[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(min.parameters[1], 2.0, epsilon = 1e-6);
        assert!(min.chi_sq() < 1e-10);
    }

    #[test]
    fn exponential_decay_recovers_parameters() {
        let ts: Vec<f64> = (0..12).map(f64::from).collect();
        let data: Vec<f64> = ts.iter().map(|t| 2.5 * (-0.35 * t).exp()).collect();
        let residuals = |p: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_iterator(
                ts.len(),
                ts.iter().zip(&data).map(|(t, y)| (y - p[0] * (-p[1] * t).exp()) / (0.01 * y)),
            ))
        };
        let min = LevenbergMarquardt::default()
            .minimise(&residuals, &DVector::from_vec(vec![1.0, 0.2]))
            .unwrap();
        assert_relative_eq!(min.parameters[0], 2.5, max_relative = 1e-6);
        assert_relative_eq!(min.parameters[1], 0.35, max_relative = 1e-6);
    }

    #[test]
    fn non_finite_start_is_a_convergence_error() {
        let residuals = |p: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_vec(vec![1.0 / p[0]]))
        };
        let result = LevenbergMarquardt::default().minimise(&residuals, &DVector::from_vec(vec![0.0]));
        assert!(matches!(result, Err(Error::Convergence(_))));
    }

    #[test]
    fn evaluation_budget_is_respected() {
        let residuals = |p: &DVector<f64>| -> Result<DVector<f64>> {
            Ok(DVector::from_vec(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]]))
        };
        let lm = LevenbergMarquardt::default().with_max_evaluations(5);
        let min = lm.minimise(&residuals, &DVector::from_vec(vec![-1.2, 1.0])).unwrap();
        assert!(min.evaluations <= 5 + 2);
    }
}
