//! Fit results
//!
//! A [`FitResult`] is built once per completed joint fit and not mutated
//! afterwards. Each fitted function gets a [`SubFitResult`] that shares the
//! global parameter estimates but owns its residuals and metadata.

use crate::covariance::{JointWeights, ReplicaFailure};
use crate::functions::FitFunction;
use crate::goodness::GoodnessOfFit;
use crate::params::{fill_slots, Slot};
use crate::window::{combination_key, FitWindow};
use lattice_core::{Error, Resampler, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of a joint fit
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Free parameters in optimiser order
    pub parameter_names: Vec<String>,
    /// Central fit
    pub mean: DVector<f64>,
    /// One row per replica; rows of failed replicas are NaN
    pub replicas: DMatrix<f64>,
    pub std: DVector<f64>,
    /// Resampler covariance of the successful replica estimates
    pub cov: DMatrix<f64>,
    /// Fitted points minus free parameters; may be ≤ 0
    pub dof: i64,
    /// Absent when `dof` ≤ 0
    pub goodness: Option<GoodnessOfFit>,
    pub replica_goodness: Vec<Option<GoodnessOfFit>>,
    /// Whitened residuals of the central fit
    pub residuals: DVector<f64>,
    pub replica_residuals: Vec<Option<DVector<f64>>>,
    pub weights: JointWeights,
    pub windows: Vec<FitWindow>,
    /// Constants used, explicit and automatic
    pub constants: BTreeMap<String, f64>,
    pub replica_failures: Vec<ReplicaFailure>,
    /// Whether the central minimisation met its tolerances
    pub converged: bool,
    pub subresults: Vec<SubFitResult>,
    pub resampler: Arc<dyn Resampler>,
}

impl FitResult {
    pub fn replica_count(&self) -> usize {
        self.replicas.nrows()
    }

    pub fn parameter_index(&self, name: &str) -> Result<usize> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "'{name}' is not a fitted parameter; fitted: {}",
                    self.parameter_names.join(", ")
                ))
            })
    }

    /// Central value and error of one parameter
    pub fn parameter(&self, name: &str) -> Result<(f64, f64)> {
        let i = self.parameter_index(name)?;
        Ok((self.mean[i], self.std[i]))
    }

    /// Replica estimates of one parameter (NaN for failed replicas)
    pub fn parameter_replicas(&self, name: &str) -> Result<DVector<f64>> {
        let i = self.parameter_index(name)?;
        Ok(self.replicas.column(i).into_owned())
    }

    pub fn p_value(&self) -> Option<f64> {
        self.goodness.map(|g| g.p_value)
    }

    pub fn chi_sq_per_dof(&self) -> Option<f64> {
        self.goodness.map(|g| g.chi_sq_per_dof)
    }

    /// Window-combination key, as used by scans
    pub fn key(&self) -> String {
        combination_key(&self.windows)
    }

    pub fn summary(&self) -> FitSummary {
        let parameters = self
            .parameter_names
            .iter()
            .enumerate()
            .map(|(i, name)| ParameterSummary {
                name: name.clone(),
                mean: self.mean[i],
                std: self.std[i],
            })
            .collect();
        FitSummary {
            parameters,
            windows: self.windows.clone(),
            dof: self.dof,
            chi_sq_per_dof: self.chi_sq_per_dof(),
            p_value: self.p_value(),
            replicas: self.replica_count(),
            failed_replicas: self.replica_failures.len(),
            frozen: self.weights.frozen,
            converged: self.converged,
        }
    }
}

/// Per-function view of a joint fit
#[derive(Debug, Clone)]
pub struct SubFitResult {
    pub function: FitFunction,
    pub identities: Vec<String>,
    /// Free parameters this function takes, in optimiser order
    pub parameter_names: Vec<String>,
    /// Their positions in the global parameter vector
    pub parameter_indices: Vec<usize>,
    pub mean: DVector<f64>,
    pub replicas: DMatrix<f64>,
    pub std: DVector<f64>,
    pub cov: DMatrix<f64>,
    pub window: FitWindow,
    pub xs: Vec<f64>,
    /// Slice of the joint whitened residuals belonging to this function
    pub residuals: DVector<f64>,
    pub goodness: Option<GoodnessOfFit>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) global_mean: DVector<f64>,
}

impl SubFitResult {
    /// Evaluate the function at `xs` with a full global parameter vector
    pub fn evaluate(&self, xs: &[f64], params: &[f64]) -> Result<DVector<f64>> {
        if params.len() != self.global_mean.len() {
            return Err(Error::count_mismatch(
                "parameters given",
                params.len(),
                "fitted parameters",
                self.global_mean.len(),
            ));
        }
        self.function.evaluate(xs, &fill_slots(&self.slots, params))
    }

    /// Evaluate the function at `xs` with the central fit
    pub fn evaluate_central(&self, xs: &[f64]) -> Result<DVector<f64>> {
        self.evaluate(xs, self.global_mean.as_slice())
    }

    pub fn p_value(&self) -> Option<f64> {
        self.goodness.map(|g| g.p_value)
    }

    pub fn chi_sq_per_dof(&self) -> Option<f64> {
        self.goodness.map(|g| g.chi_sq_per_dof)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

/// Serialisable digest of a [`FitResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub parameters: Vec<ParameterSummary>,
    pub windows: Vec<FitWindow>,
    pub dof: i64,
    pub chi_sq_per_dof: Option<f64>,
    pub p_value: Option<f64>,
    pub replicas: usize,
    pub failed_replicas: usize,
    pub frozen: bool,
    pub converged: bool,
}
