//! Seeded bootstrap resampling
//!
//! Replica `r` averages `N` samples drawn with replacement according to a
//! pseudo-random index table. The table is generated lazily on first use and
//! locks the resampler to that sample count: every ensemble resampled
//! afterwards must have the same number of samples, so that all correlators of
//! a session share the same draws. [`Resampler::configure`] drops the table
//! and the lock.

use lattice_core::matrix::centred_outer_sum;
use lattice_core::{Error, Resampler, ResamplerKind, Result};
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Index table: `table[replica][draw]` is a sample index
pub type IndexTable = Vec<Vec<usize>>;

#[derive(Debug)]
struct BootstrapState {
    rng: ChaCha8Rng,
    resamples: usize,
    samples: Option<usize>,
    table: Option<Arc<IndexTable>>,
}

/// Bootstrap resampler with a cached, seeded index table
#[derive(Debug)]
pub struct Bootstrap {
    state: Mutex<BootstrapState>,
}

impl Bootstrap {
    /// Create a bootstrap producing `resamples` replicas from `seed`
    pub fn new(seed: u64, resamples: usize) -> Self {
        Self {
            state: Mutex::new(BootstrapState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                resamples,
                samples: None,
                table: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BootstrapState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of replicas per ensemble
    pub fn resamples(&self) -> usize {
        self.lock().resamples
    }

    /// Sample count the resampler is locked to, if it has been used
    pub fn locked_samples(&self) -> Option<usize> {
        self.lock().samples
    }

    /// The index table for `samples` raw samples, generating it on first use
    pub fn index_table(&self, samples: usize) -> Result<Arc<IndexTable>> {
        let mut state = self.lock();

        if let Some(expected) = state.samples {
            if expected != samples {
                return Err(Error::ConfigurationMismatch {
                    expected,
                    actual: samples,
                    context: "bootstrap resampling (reconfigure the resampler for the new ensemble)"
                        .to_string(),
                });
            }
        }
        if samples == 0 {
            return Err(Error::InvalidInput("bootstrap needs at least 1 sample".to_string()));
        }
        if state.resamples == 0 {
            return Err(Error::InvalidParameter(
                "bootstrap resample count must be positive".to_string(),
            ));
        }
        state.samples = Some(samples);

        if let Some(table) = &state.table {
            return Ok(Arc::clone(table));
        }

        debug!(
            "Generating bootstrap index table: {} resamples of {} samples",
            state.resamples, samples
        );
        let resamples = state.resamples;
        let rng = &mut state.rng;
        let table: IndexTable = (0..resamples)
            .map(|_| (0..samples).map(|_| rng.gen_range(0..samples)).collect())
            .collect();
        let table = Arc::new(table);
        state.table = Some(Arc::clone(&table));
        Ok(table)
    }
}

impl Resampler for Bootstrap {
    fn kind(&self) -> ResamplerKind {
        ResamplerKind::Bootstrap
    }

    fn resample(&self, raw: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let n = raw.nrows();
        let table = self.index_table(n)?;
        let t = raw.ncols();
        let mut out = DMatrix::zeros(table.len(), t);
        for (r, draws) in table.iter().enumerate() {
            for &k in draws {
                for j in 0..t {
                    out[(r, j)] += raw[(k, j)];
                }
            }
        }
        Ok(out / n as f64)
    }

    fn replica_count(&self, _samples: usize) -> usize {
        self.resamples()
    }

    fn mean_definition(&self, point: &DVector<f64>, _replica_mean: &DVector<f64>) -> DVector<f64> {
        point.clone()
    }

    fn cov_definition(&self, central: &DVector<f64>, replicas: &DMatrix<f64>) -> DMatrix<f64> {
        let n = replicas.nrows();
        if n == 0 {
            return DMatrix::zeros(central.len(), central.len());
        }
        centred_outer_sum(replicas, central) / n as f64
    }

    fn configure(&self, seed: Option<u64>, resamples: Option<usize>) -> Result<()> {
        let mut state = self.lock();
        if let Some(seed) = seed {
            state.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        if let Some(resamples) = resamples {
            if resamples == 0 {
                return Err(Error::InvalidParameter(
                    "bootstrap resample count must be positive".to_string(),
                ));
            }
            state.resamples = resamples;
        }
        state.table = None;
        state.samples = None;
        debug!("Bootstrap reconfigured: {} resamples", state.resamples);
        Ok(())
    }
}
