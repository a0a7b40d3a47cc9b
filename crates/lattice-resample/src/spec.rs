//! Resampler registry
//!
//! Resamplers are selected by a serialisable [`ResamplerSpec`] (or by name)
//! and built once per analysis session; the resulting `Arc<dyn Resampler>` is
//! shared by every correlator created in that session.

use crate::{Bootstrap, Jackknife};
use lattice_core::{Error, Resampler, ResamplerKind, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of bootstrap replicas when none is given
pub const DEFAULT_RESAMPLES: usize = 1000;

/// Selection and settings of a resampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResamplerSpec {
    Jackknife,
    Bootstrap { seed: u64, resamples: usize },
}

impl ResamplerSpec {
    /// Look up a resampler by registry name
    ///
    /// Names are case-insensitive. Bootstrap requires a seed; the resample
    /// count defaults to [`DEFAULT_RESAMPLES`].
    pub fn from_name(name: &str, seed: Option<u64>, resamples: Option<usize>) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jackknife" => Ok(Self::Jackknife),
            "bootstrap" => {
                let seed = seed.ok_or_else(|| {
                    Error::InvalidParameter("bootstrap resampler requires a seed".to_string())
                })?;
                let resamples = resamples.unwrap_or(DEFAULT_RESAMPLES);
                if resamples == 0 {
                    return Err(Error::InvalidParameter(
                        "bootstrap resample count must be positive".to_string(),
                    ));
                }
                Ok(Self::Bootstrap { seed, resamples })
            }
            other => Err(Error::InvalidParameter(format!(
                "unknown resampler '{other}'; available: jackknife, bootstrap"
            ))),
        }
    }

    /// Resampling family
    pub fn kind(&self) -> ResamplerKind {
        match self {
            Self::Jackknife => ResamplerKind::Jackknife,
            Self::Bootstrap { .. } => ResamplerKind::Bootstrap,
        }
    }

    /// Build the shared resampler
    pub fn build(&self) -> Arc<dyn Resampler> {
        match *self {
            Self::Jackknife => Arc::new(Jackknife::new()),
            Self::Bootstrap { seed, resamples } => Arc::new(Bootstrap::new(seed, resamples)),
        }
    }
}

impl Default for ResamplerSpec {
    fn default() -> Self {
        Self::Jackknife
    }
}
