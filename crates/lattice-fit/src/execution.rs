//! Replica-loop execution
//!
//! Replica fits are independent once the central solution is known, so the
//! loop over replicas can run on the rayon thread pool when the `parallel`
//! feature is enabled. Results always come back in replica order.

use serde::{Deserialize, Serialize};

/// How the replica loop is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Sequential,
    /// Parallel when compiled with the `parallel` feature, else sequential
    #[default]
    Auto,
}

impl ExecutionStrategy {
    /// Whether `execute_batch` will actually use threads
    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "parallel") && matches!(self, Self::Auto)
    }

    /// Evaluate `f(0..count)` and collect the results in index order
    pub fn execute_batch<F, R>(&self, count: usize, f: F) -> Vec<R>
    where
        F: Fn(usize) -> R + Sync + Send,
        R: Send,
    {
        match self {
            Self::Sequential => (0..count).map(f).collect(),
            Self::Auto => auto_batch(count, f),
        }
    }
}

#[cfg(feature = "parallel")]
fn auto_batch<F, R>(count: usize, f: F) -> Vec<R>
where
    F: Fn(usize) -> R + Sync + Send,
    R: Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn auto_batch<F, R>(count: usize, f: F) -> Vec<R>
where
    F: Fn(usize) -> R + Sync + Send,
    R: Send,
{
    (0..count).map(f).collect()
}
