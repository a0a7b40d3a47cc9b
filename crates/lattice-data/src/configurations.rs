//! Raw measurement container

use lattice_core::matrix::column_means;
use lattice_core::ops::{binary_scalar, broadcast_binary, scalar_binary, unary};
use lattice_core::{BinaryOp, Error, Result, StatCache, UnaryOp};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConfigStatistic {
    Mean,
}

/// Raw measurements, samples × variables
///
/// The container owns its data. The sample mean is computed on first access
/// and dropped by every mutation.
#[derive(Debug, Clone)]
pub struct Configurations {
    data: DMatrix<f64>,
    stats: StatCache<ConfigStatistic, Arc<DVector<f64>>>,
}

impl Configurations {
    /// Wrap raw measurements
    pub fn new(data: DMatrix<f64>) -> Self {
        Self {
            data,
            stats: StatCache::new(),
        }
    }

    /// Copy raw measurements from a borrowed array
    pub fn from_data(data: &DMatrix<f64>) -> Self {
        Self::new(data.clone())
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn into_data(self) -> DMatrix<f64> {
        self.data
    }

    /// Number of samples (rows)
    pub fn samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of variables (columns)
    pub fn variables(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    /// Average over the sample axis
    pub fn mean(&self) -> Arc<DVector<f64>> {
        self.stats
            .get_or_insert_with(ConfigStatistic::Mean, || Arc::new(column_means(&self.data)))
    }

    /// Whether the mean is currently cached
    pub fn is_mean_cached(&self) -> bool {
        self.stats.is_cached(ConfigStatistic::Mean)
    }

    /// Drop every cached statistic
    pub fn forget_stats(&self) {
        self.stats.forget();
    }

    /// Replace the data, invalidating cached statistics
    pub fn set_data(&mut self, data: DMatrix<f64>) {
        self.data = data;
        self.forget_stats();
    }

    /// `self op other`, element-wise with broadcasting
    pub fn combine(&self, op: BinaryOp, other: &Configurations) -> Result<Self> {
        let data = broadcast_binary(op, &self.data, &other.data)?;
        Ok(Self::new(data))
    }

    /// `self op other` against a plain array
    pub fn combine_array(&self, op: BinaryOp, other: &DMatrix<f64>) -> Result<Self> {
        Ok(Self::new(broadcast_binary(op, &self.data, other)?))
    }

    /// `self op x`
    pub fn combine_scalar(&self, op: BinaryOp, x: f64) -> Self {
        Self::new(binary_scalar(op, &self.data, x))
    }

    /// `x op self`
    pub fn scalar_combine(&self, x: f64, op: BinaryOp) -> Self {
        Self::new(scalar_binary(op, x, &self.data))
    }

    /// In-place `self op= other`
    pub fn combine_assign(&mut self, op: BinaryOp, other: &Configurations) -> Result<()> {
        let data = broadcast_binary(op, &self.data, &other.data)?;
        if data.shape() != self.data.shape() {
            return Err(Error::shape_mismatch(
                "in-place combination would change the configurations shape",
                self.data.shape(),
                data.shape(),
            ));
        }
        self.set_data(data);
        Ok(())
    }

    /// In-place `self op= x`
    pub fn combine_scalar_assign(&mut self, op: BinaryOp, x: f64) {
        let data = binary_scalar(op, &self.data, x);
        self.set_data(data);
    }

    /// New configurations with `op` applied element-wise
    pub fn apply(&self, op: UnaryOp) -> Self {
        Self::new(unary(op, &self.data))
    }

    /// Apply `op` element-wise in place
    pub fn apply_assign(&mut self, op: UnaryOp) {
        let data = unary(op, &self.data);
        self.set_data(data);
    }
}

impl From<DMatrix<f64>> for Configurations {
    fn from(data: DMatrix<f64>) -> Self {
        Self::new(data)
    }
}
