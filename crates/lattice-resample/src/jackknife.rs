//! Leave-one-out jackknife resampling
//!
//! Replica `i` is the mean of all samples except sample `i`. The central value
//! is the replica mean and the covariance carries the `(N-1)/N` jackknife
//! factor. Jackknife is the only scheme with a double-replica ensemble, which
//! unfrozen fits need for their per-replica covariances.

use lattice_core::matrix::{centred_outer_sum, column_sums, row_vector};
use lattice_core::{Error, Resampler, ResamplerKind, Result};
use nalgebra::{DMatrix, DVector};

/// Deterministic leave-one-out resampler
#[derive(Debug, Clone, Copy, Default)]
pub struct Jackknife;

impl Jackknife {
    pub fn new() -> Self {
        Self
    }
}

impl Resampler for Jackknife {
    fn kind(&self) -> ResamplerKind {
        ResamplerKind::Jackknife
    }

    fn resample(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let n = raw.nrows();
        if n < 2 {
            return Err(Error::InvalidInput(format!(
                "jackknife needs at least 2 samples, got {n}"
            )));
        }
        let sums = column_sums(raw);
        let norm = (n - 1) as f64;
        Ok(DMatrix::from_fn(n, raw.ncols(), |i, j| (sums[j] - raw[(i, j)]) / norm))
    }

    fn replica_count(&self, samples: usize) -> usize {
        samples
    }

    fn mean_definition(&self, _point: &DVector<f64>, replica_mean: &DVector<f64>) -> DVector<f64> {
        replica_mean.clone()
    }

    fn cov_definition(&self, central: &DVector<f64>, replicas: &DMatrix<f64>) -> DMatrix<f64> {
        let n = replicas.nrows();
        if n == 0 {
            return DMatrix::zeros(central.len(), central.len());
        }
        centred_outer_sum(replicas, central) * ((n as f64 - 1.0) / n as f64)
    }

    /// For replica `i`, the `N-1` ensembles with both `i` and `j ≠ i` removed.
    ///
    /// With `S = Σ_k r_k` (equal to the raw sample sum) the double removal is
    /// `r_ij = ((N-1)(r_i + r_j) - S) / (N-2)`.
    fn submean_double_definition(&self, replicas: &DMatrix<f64>) -> Result<Vec<DMatrix<f64>>> {
        let n = replicas.nrows();
        if n < 3 {
            return Err(Error::InvalidInput(format!(
                "double jackknife needs at least 3 replicas, got {n}"
            )));
        }
        let t = replicas.ncols();
        let total = column_sums(replicas);
        let scale = (n - 1) as f64;
        let norm = (n - 2) as f64;

        Ok((0..n)
            .map(|i| {
                let others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
                DMatrix::from_fn(n - 1, t, |row, col| {
                    let j = others[row];
                    (scale * (replicas[(i, col)] + replicas[(j, col)]) - total[col]) / norm
                })
            })
            .collect())
    }

    /// Covariance of each leave-`i`-out sub-ensemble around replica `i`.
    ///
    /// Scaled by `(N-1)/N` with `N` the full replica count, the same
    /// normalisation as the single-removal covariance.
    fn cov_double_definition(
        &self,
        replicas: &DMatrix<f64>,
        doubles: &[DMatrix<f64>],
    ) -> Result<Vec<DMatrix<f64>>> {
        if doubles.len() != replicas.nrows() {
            return Err(Error::count_mismatch(
                "double-replica ensembles",
                doubles.len(),
                "replicas",
                replicas.nrows(),
            ));
        }
        let n = replicas.nrows() as f64;
        let scale = (n - 1.0) / n;
        Ok(doubles
            .iter()
            .enumerate()
            .map(|(i, sub)| centred_outer_sum(sub, &row_vector(replicas, i)) * scale)
            .collect())
    }

    fn configure(&self, _seed: Option<u64>, _resamples: Option<usize>) -> Result<()> {
        Ok(())
    }
}
