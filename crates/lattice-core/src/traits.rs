//! Core traits for resampled statistics
//!
//! A [`Resampler`] is the policy object shared by every correlator built in an
//! analysis session. It turns raw samples into replicas and defines the
//! estimators (central value, covariance, variance, standard deviation) that
//! are consistent with its resampling scheme.

use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which resampling family a resampler belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplerKind {
    Jackknife,
    Bootstrap,
}

impl fmt::Display for ResamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jackknife => write!(f, "jackknife"),
            Self::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// Resampling policy and its matching estimators
///
/// Data layout throughout: rows are samples (or replicas), columns are the
/// variable axis (e.g. time slices).
pub trait Resampler: Send + Sync + fmt::Debug {
    /// The resampling family
    fn kind(&self) -> ResamplerKind;

    /// Map raw samples (samples × variables) to replicas (replicas × variables)
    fn resample(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Number of replicas produced for `samples` raw samples
    fn replica_count(&self, samples: usize) -> usize;

    /// Central value given the point estimate and the replica mean
    fn mean_definition(&self, point: &DVector<f64>, replica_mean: &DVector<f64>) -> DVector<f64>;

    /// Covariance of the replicas around a central value
    fn cov_definition(&self, central: &DVector<f64>, replicas: &DMatrix<f64>) -> DMatrix<f64>;

    /// Replica-of-replica ensembles, one matrix of (replicas - 1) rows per replica
    fn submean_double_definition(&self, replicas: &DMatrix<f64>) -> Result<Vec<DMatrix<f64>>> {
        let _ = replicas;
        Err(Error::Unsupported(format!(
            "{} resampling has no double-replica ensemble",
            self.kind()
        )))
    }

    /// Per-replica covariance built from the double-replica ensembles
    fn cov_double_definition(
        &self,
        replicas: &DMatrix<f64>,
        doubles: &[DMatrix<f64>],
    ) -> Result<Vec<DMatrix<f64>>> {
        let _ = (replicas, doubles);
        Err(Error::Unsupported(format!(
            "{} resampling has no per-replica covariance",
            self.kind()
        )))
    }

    /// Variance from a covariance matrix
    fn var_definition(&self, cov: &DMatrix<f64>) -> DVector<f64> {
        cov.diagonal()
    }

    /// Standard deviation from a variance vector
    fn std_definition(&self, var: &DVector<f64>) -> DVector<f64> {
        var.map(f64::sqrt)
    }

    /// Covariance, variance and standard deviation in one pass
    fn cov_var_std(
        &self,
        central: &DVector<f64>,
        replicas: &DMatrix<f64>,
    ) -> (DMatrix<f64>, DVector<f64>, DVector<f64>) {
        let cov = self.cov_definition(central, replicas);
        let var = self.var_definition(&cov);
        let std = self.std_definition(&var);
        (cov, var, std)
    }

    /// Reseed and/or resize the resampler, dropping any cached state
    fn configure(&self, seed: Option<u64>, resamples: Option<usize>) -> Result<()>;
}
