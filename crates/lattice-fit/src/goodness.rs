//! Goodness of fit

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoodnessOfFit {
    pub chi_sq: f64,
    pub dof: usize,
    pub chi_sq_per_dof: f64,
    /// Upper tail Q(dof/2, χ²/2)
    pub p_value: f64,
}

/// Degrees of freedom: fitted points minus free parameters
pub fn degrees_of_freedom(points: usize, free: usize) -> i64 {
    points as i64 - free as i64
}

/// χ² statistics of whitened residuals; `None` when dof ≤ 0
pub fn goodness_of_fit(residuals: &DVector<f64>, free: usize) -> Option<GoodnessOfFit> {
    let dof = degrees_of_freedom(residuals.len(), free);
    if dof <= 0 {
        return None;
    }
    let dof = dof as usize;
    let chi_sq = residuals.norm_squared();
    Some(GoodnessOfFit {
        chi_sq,
        dof,
        chi_sq_per_dof: chi_sq / dof as f64,
        p_value: p_value(dof, chi_sq),
    })
}

/// Probability of a χ² at least this large with `dof` degrees of freedom
pub fn p_value(dof: usize, chi_sq: f64) -> f64 {
    if chi_sq <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(dof as f64) {
        Ok(dist) => dist.sf(chi_sq),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn p_value_matches_closed_forms() {
        // dof = 2: Q = exp(-chi²/2)
        assert_relative_eq!(p_value(2, 3.0), (-1.5f64).exp(), epsilon = 1e-12);
        assert_eq!(p_value(5, 0.0), 1.0);
        assert!(p_value(1, 100.0) < 1e-20);
    }

    #[test]
    fn undefined_without_degrees_of_freedom() {
        let r = DVector::from_vec(vec![1.0, 2.0]);
        assert!(goodness_of_fit(&r, 2).is_none());
        assert!(goodness_of_fit(&r, 3).is_none());
        let g = goodness_of_fit(&r, 1).unwrap();
        assert_eq!(g.dof, 1);
        assert_relative_eq!(g.chi_sq, 5.0);
        assert_relative_eq!(g.chi_sq_per_dof, 5.0);
    }
}
