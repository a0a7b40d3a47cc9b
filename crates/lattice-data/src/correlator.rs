//! Resampled correlator container
//!
//! A [`Correlator`] pairs a point estimate with a replica ensemble and the
//! resampler that produced it. Every derived statistic is computed on first
//! access through the resampler's estimators and cached; the whole set is
//! dropped together by [`Correlator::forget_stats`].
//!
//! Treat cached statistics as read-only once a correlator is handed to a fit:
//! mutating methods take `&mut self`, so the borrow checker enforces this.

use crate::Configurations;
use lattice_core::matrix::{as_row, column_means};
use lattice_core::ops::{binary_scalar, broadcast_binary, scalar_binary, unary};
use lattice_core::{BinaryOp, Error, Resampler, Result, StatCache, UnaryOp};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::sync::Arc;

/// Names of the cached statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    SampleMean,
    Mean,
    SubmeanDouble,
    Cov,
    CovDouble,
    Var,
    Std,
}

impl Statistic {
    pub const ALL: [Statistic; 7] = [
        Statistic::SampleMean,
        Statistic::Mean,
        Statistic::SubmeanDouble,
        Statistic::Cov,
        Statistic::CovDouble,
        Statistic::Var,
        Statistic::Std,
    ];
}

#[derive(Debug, Clone)]
enum StatValue {
    Vector(Arc<DVector<f64>>),
    Matrix(Arc<DMatrix<f64>>),
    Stack(Arc<Vec<DMatrix<f64>>>),
}

impl StatValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Vector(_) => "vector",
            Self::Matrix(_) => "matrix",
            Self::Stack(_) => "matrix stack",
        }
    }
}

fn wrong_kind(stat: Statistic, value: &StatValue) -> Error {
    Error::Computation(format!("cached {stat:?} holds a {}", value.kind()))
}

/// Point estimate plus replica ensemble, sharing a resampler
#[derive(Clone)]
pub struct Correlator {
    data_mean: DVector<f64>,
    submean: DMatrix<f64>,
    resampler: Arc<dyn Resampler>,
    stats: StatCache<Statistic, StatValue>,
}

impl Correlator {
    /// Pair a point estimate (length T) with replicas (replicas × T)
    pub fn new(
        data_mean: DVector<f64>,
        submean: DMatrix<f64>,
        resampler: Arc<dyn Resampler>,
    ) -> Result<Self> {
        if data_mean.len() != submean.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "correlator point estimate has {} variables but replicas have {}",
                data_mean.len(),
                submean.ncols()
            )));
        }
        Ok(Self {
            data_mean,
            submean,
            resampler,
            stats: StatCache::new(),
        })
    }

    /// Resample raw configurations with `resampler`
    pub fn from_configurations(
        configurations: &Configurations,
        resampler: Arc<dyn Resampler>,
    ) -> Result<Self> {
        let submean = resampler.resample(configurations.data())?;
        Self::new(configurations.mean().as_ref().clone(), submean, resampler)
    }

    pub fn data_mean(&self) -> &DVector<f64> {
        &self.data_mean
    }

    pub fn submean(&self) -> &DMatrix<f64> {
        &self.submean
    }

    pub fn resampler(&self) -> &Arc<dyn Resampler> {
        &self.resampler
    }

    /// Number of replicas
    pub fn replicas(&self) -> usize {
        self.submean.nrows()
    }

    /// Number of variables (e.g. time slices)
    pub fn variables(&self) -> usize {
        self.data_mean.len()
    }

    fn vector_stat<F>(&self, stat: Statistic, compute: F) -> Result<Arc<DVector<f64>>>
    where
        F: FnOnce() -> Result<DVector<f64>>,
    {
        match self
            .stats
            .try_get_or_insert_with(stat, || Ok::<_, Error>(StatValue::Vector(Arc::new(compute()?))))?
        {
            StatValue::Vector(v) => Ok(v),
            other => Err(wrong_kind(stat, &other)),
        }
    }

    fn matrix_stat<F>(&self, stat: Statistic, compute: F) -> Result<Arc<DMatrix<f64>>>
    where
        F: FnOnce() -> Result<DMatrix<f64>>,
    {
        match self
            .stats
            .try_get_or_insert_with(stat, || Ok::<_, Error>(StatValue::Matrix(Arc::new(compute()?))))?
        {
            StatValue::Matrix(m) => Ok(m),
            other => Err(wrong_kind(stat, &other)),
        }
    }

    fn stack_stat<F>(&self, stat: Statistic, compute: F) -> Result<Arc<Vec<DMatrix<f64>>>>
    where
        F: FnOnce() -> Result<Vec<DMatrix<f64>>>,
    {
        match self
            .stats
            .try_get_or_insert_with(stat, || Ok::<_, Error>(StatValue::Stack(Arc::new(compute()?))))?
        {
            StatValue::Stack(s) => Ok(s),
            other => Err(wrong_kind(stat, &other)),
        }
    }

    /// Plain mean over replicas
    pub fn sample_mean(&self) -> Result<Arc<DVector<f64>>> {
        self.vector_stat(Statistic::SampleMean, || Ok(column_means(&self.submean)))
    }

    /// Resampler-defined central value
    pub fn mean(&self) -> Result<Arc<DVector<f64>>> {
        self.vector_stat(Statistic::Mean, || {
            let sample_mean = self.sample_mean()?;
            Ok(self.resampler.mean_definition(&self.data_mean, &sample_mean))
        })
    }

    /// Replica-of-replica ensembles, one per replica
    pub fn submean_double(&self) -> Result<Arc<Vec<DMatrix<f64>>>> {
        self.stack_stat(Statistic::SubmeanDouble, || {
            self.resampler.submean_double_definition(&self.submean)
        })
    }

    /// Covariance over the variable axis
    pub fn cov(&self) -> Result<Arc<DMatrix<f64>>> {
        self.matrix_stat(Statistic::Cov, || {
            let mean = self.mean()?;
            Ok(self.resampler.cov_definition(&mean, &self.submean))
        })
    }

    /// Per-replica covariances from the double-replica ensembles
    pub fn cov_double(&self) -> Result<Arc<Vec<DMatrix<f64>>>> {
        self.stack_stat(Statistic::CovDouble, || {
            let doubles = self.submean_double()?;
            self.resampler.cov_double_definition(&self.submean, &doubles)
        })
    }

    pub fn var(&self) -> Result<Arc<DVector<f64>>> {
        self.vector_stat(Statistic::Var, || {
            let cov = self.cov()?;
            Ok(self.resampler.var_definition(&cov))
        })
    }

    pub fn std(&self) -> Result<Arc<DVector<f64>>> {
        self.vector_stat(Statistic::Std, || {
            let var = self.var()?;
            Ok(self.resampler.std_definition(&var))
        })
    }

    /// Whether `stat` currently holds a value
    pub fn is_cached(&self, stat: Statistic) -> bool {
        self.stats.is_cached(stat)
    }

    /// Drop every cached statistic, including the sample mean
    pub fn forget_stats(&self) {
        self.stats.forget();
    }

    /// Replace point estimate and replicas, invalidating cached statistics
    pub fn set_data(&mut self, data_mean: DVector<f64>, submean: DMatrix<f64>) -> Result<()> {
        if data_mean.len() != submean.ncols() {
            return Err(Error::ShapeMismatch(format!(
                "correlator point estimate has {} variables but replicas have {}",
                data_mean.len(),
                submean.ncols()
            )));
        }
        self.data_mean = data_mean;
        self.submean = submean;
        self.forget_stats();
        Ok(())
    }

    fn check_same_shape(&self, other: &Correlator, op: BinaryOp) -> Result<()> {
        if self.submean.shape() != other.submean.shape() {
            return Err(Error::shape_mismatch(
                &format!("correlator replicas for '{op}'"),
                self.submean.shape(),
                other.submean.shape(),
            ));
        }
        Ok(())
    }

    fn combined_with(&self, op: BinaryOp, other: &Correlator) -> Result<(DVector<f64>, DMatrix<f64>)> {
        self.check_same_shape(other, op)?;
        let data_mean = self.data_mean.zip_map(&other.data_mean, |a, b| op.apply(a, b));
        let submean = broadcast_binary(op, &self.submean, &other.submean)?;
        Ok((data_mean, submean))
    }

    /// `self op other`: point estimates with point estimates, replicas with replicas
    pub fn combine(&self, op: BinaryOp, other: &Correlator) -> Result<Self> {
        let (data_mean, submean) = self.combined_with(op, other)?;
        Self::new(data_mean, submean, Arc::clone(&self.resampler))
    }

    /// `self op x`
    pub fn combine_scalar(&self, op: BinaryOp, x: f64) -> Self {
        Self {
            data_mean: self.data_mean.map(|v| op.apply(v, x)),
            submean: binary_scalar(op, &self.submean, x),
            resampler: Arc::clone(&self.resampler),
            stats: StatCache::new(),
        }
    }

    /// `x op self`
    pub fn scalar_combine(&self, x: f64, op: BinaryOp) -> Self {
        Self {
            data_mean: self.data_mean.map(|v| op.apply(x, v)),
            submean: scalar_binary(op, x, &self.submean),
            resampler: Arc::clone(&self.resampler),
            stats: StatCache::new(),
        }
    }

    /// `self op values`, one value per variable
    pub fn combine_vector(&self, op: BinaryOp, values: &DVector<f64>) -> Result<Self> {
        if values.len() != self.variables() {
            return Err(Error::count_mismatch(
                "values",
                values.len(),
                "correlator variables",
                self.variables(),
            ));
        }
        let row = as_row(values);
        let data_mean = self.data_mean.zip_map(values, |a, b| op.apply(a, b));
        let submean = broadcast_binary(op, &self.submean, &row)?;
        Self::new(data_mean, submean, Arc::clone(&self.resampler))
    }

    /// In-place `self op= other`
    pub fn combine_assign(&mut self, op: BinaryOp, other: &Correlator) -> Result<()> {
        let (data_mean, submean) = self.combined_with(op, other)?;
        self.set_data(data_mean, submean)
    }

    /// In-place `self op= x`
    pub fn combine_scalar_assign(&mut self, op: BinaryOp, x: f64) {
        self.data_mean = self.data_mean.map(|v| op.apply(v, x));
        self.submean = binary_scalar(op, &self.submean, x);
        self.forget_stats();
    }

    /// New correlator with `op` applied to point estimate and replicas
    pub fn apply(&self, op: UnaryOp) -> Self {
        Self {
            data_mean: self.data_mean.map(|v| op.apply(v)),
            submean: unary(op, &self.submean),
            resampler: Arc::clone(&self.resampler),
            stats: StatCache::new(),
        }
    }

    /// Apply `op` in place
    pub fn apply_assign(&mut self, op: UnaryOp) {
        self.data_mean = self.data_mean.map(|v| op.apply(v));
        self.submean = unary(op, &self.submean);
        self.forget_stats();
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("variables", &self.variables())
            .field("replicas", &self.replicas())
            .field("resampler", &self.resampler.kind())
            .field("stats", &self.stats)
            .finish()
    }
}
