//! Joint covariance and fit weights
//!
//! The joint covariance spans the concatenated variable axes of every
//! correlator in a fit. It is cut down to the fit windows, block by block,
//! and then turned into a whitening matrix: the lower Cholesky factor `L` of
//! the inverse covariance, so that `|Lᵀ r|² = rᵀ C⁻¹ r`.

use lattice_core::matrix::{concat_columns, concat_vectors};
use lattice_core::{Error, Result};
use lattice_data::Correlator;
use nalgebra::{Cholesky, DMatrix};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Which correlations enter the fit covariance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CorrelationPolicy {
    /// Every block, including cross-correlator blocks
    #[default]
    #[serde(rename = "full")]
    Full,
    /// Only the diagonal (per-correlator) blocks
    #[serde(rename = "block")]
    BlockDiagonal,
    /// Only the variances
    #[serde(rename = "none")]
    Uncorrelated,
}

impl fmt::Display for CorrelationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::BlockDiagonal => write!(f, "block"),
            Self::Uncorrelated => write!(f, "none"),
        }
    }
}

impl FromStr for CorrelationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "block" => Ok(Self::BlockDiagonal),
            "none" => Ok(Self::Uncorrelated),
            other => Err(Error::InvalidParameter(format!(
                "unknown correlation policy '{other}'; expected full, block or none"
            ))),
        }
    }
}

/// Cut a joint covariance down to the fit windows and apply `policy`
///
/// `offsets[k]` is where correlator `k` starts on the joint axis and
/// `windows[k]` are its selected indices, relative to that start.
pub fn cut_down_and_correlate(
    total: &DMatrix<f64>,
    offsets: &[usize],
    windows: &[Vec<usize>],
    policy: CorrelationPolicy,
) -> DMatrix<f64> {
    let positions: Vec<(usize, usize)> = windows
        .iter()
        .enumerate()
        .flat_map(|(k, w)| w.iter().map(move |&i| (k, i)))
        .collect();
    let n = positions.len();

    DMatrix::from_fn(n, n, |r, c| {
        let (kr, ir) = positions[r];
        let (kc, ic) = positions[c];
        let keep = match policy {
            CorrelationPolicy::Full => true,
            CorrelationPolicy::BlockDiagonal => kr == kc,
            CorrelationPolicy::Uncorrelated => r == c,
        };
        if keep {
            total[(offsets[kr] + ir, offsets[kc] + ic)]
        } else {
            0.0
        }
    })
}

/// Central covariance plus one per replica
///
/// Frozen covariances share the central matrix for every replica.
#[derive(Debug, Clone)]
pub struct JointCovariance {
    pub central: Arc<DMatrix<f64>>,
    pub replicas: Vec<Arc<DMatrix<f64>>>,
}

fn check_compatible(correlators: &[&Correlator]) -> Result<usize> {
    let first = correlators
        .first()
        .ok_or_else(|| Error::InvalidInput("joint covariance needs at least one correlator".to_string()))?;
    let replicas = first.replicas();
    let kind = first.resampler().kind();
    for (k, corr) in correlators.iter().enumerate().skip(1) {
        if corr.replicas() != replicas {
            return Err(Error::ShapeMismatch(format!(
                "correlator {k} has {} replicas but correlator 0 has {replicas}",
                corr.replicas()
            )));
        }
        if corr.resampler().kind() != kind {
            return Err(Error::InvalidInput(format!(
                "correlator {k} was resampled with {} but correlator 0 with {kind}",
                corr.resampler().kind()
            )));
        }
    }
    Ok(replicas)
}

/// Joint covariance of `correlators` restricted to `windows`
#[instrument(skip_all, fields(correlators = correlators.len(), policy = %policy, frozen = frozen))]
pub fn joint_cov(
    correlators: &[&Correlator],
    windows: &[Vec<usize>],
    policy: CorrelationPolicy,
    frozen: bool,
) -> Result<JointCovariance> {
    if correlators.len() != windows.len() {
        return Err(Error::count_mismatch(
            "correlators",
            correlators.len(),
            "fit windows",
            windows.len(),
        ));
    }
    let replicas = check_compatible(correlators)?;
    for (k, (corr, window)) in correlators.iter().zip(windows).enumerate() {
        if let Some(bad) = window.iter().find(|&&i| i >= corr.variables()) {
            return Err(Error::ShapeMismatch(format!(
                "window of correlator {k} selects index {bad} but it has {} variables",
                corr.variables()
            )));
        }
    }
    let resampler = correlators[0].resampler();

    let mut offsets = Vec::with_capacity(correlators.len());
    let mut offset = 0;
    for corr in correlators {
        offsets.push(offset);
        offset += corr.variables();
    }

    let means = correlators
        .iter()
        .map(|c| c.mean())
        .collect::<Result<Vec<_>>>()?;
    let joint_mean = concat_vectors(means.iter().map(|m| m.as_ref()));
    let submeans: Vec<&DMatrix<f64>> = correlators.iter().map(|c| c.submean()).collect();
    let joint_submean = concat_columns(&submeans)?;

    let total = resampler.cov_definition(&joint_mean, &joint_submean);
    let central = Arc::new(cut_down_and_correlate(&total, &offsets, windows, policy));
    debug!("Joint covariance: {} points over {} variables", central.nrows(), total.nrows());

    if frozen {
        return Ok(JointCovariance {
            replicas: vec![Arc::clone(&central); replicas],
            central,
        });
    }

    let doubles = correlators
        .iter()
        .map(|c| c.submean_double())
        .collect::<Result<Vec<_>>>()?;
    let joint_doubles = (0..replicas)
        .map(|r| {
            let parts: Vec<&DMatrix<f64>> = doubles.iter().map(|d| &d[r]).collect();
            concat_columns(&parts)
        })
        .collect::<Result<Vec<_>>>()?;
    let totals = resampler.cov_double_definition(&joint_submean, &joint_doubles)?;
    let replica_covs = totals
        .iter()
        .map(|t| Arc::new(cut_down_and_correlate(t, &offsets, windows, policy)))
        .collect();

    Ok(JointCovariance {
        central,
        replicas: replica_covs,
    })
}

/// Whitening matrix: lower Cholesky factor of the inverse covariance
pub fn cov_to_weights(cov: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (rows, cols) = cov.shape();
    if rows != cols || rows == 0 {
        return Err(Error::SingularCovariance(format!(
            "covariance must be square and non-empty, got {rows}x{cols}"
        )));
    }
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularCovariance(format!(
            "{rows}x{cols} covariance contains NaN or infinite values"
        )));
    }
    let inverse = cov.clone().try_inverse().ok_or_else(|| {
        Error::SingularCovariance(format!("{rows}x{cols} covariance is not invertible"))
    })?;
    let cholesky = Cholesky::new(inverse).ok_or_else(|| {
        Error::SingularCovariance(format!(
            "inverse of the {rows}x{cols} covariance is not positive definite"
        ))
    })?;
    Ok(cholesky.l())
}

/// A per-replica weight computation that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaFailure {
    pub replica: usize,
    pub reason: String,
}

/// User-supplied covariance replacing the one built from the data
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceOverride {
    pub central: DMatrix<f64>,
    /// Per-replica covariances, required for unfrozen fits
    pub replicas: Option<Vec<DMatrix<f64>>>,
}

impl CovarianceOverride {
    pub fn frozen(central: DMatrix<f64>) -> Self {
        Self {
            central,
            replicas: None,
        }
    }

    pub fn with_replicas(central: DMatrix<f64>, replicas: Vec<DMatrix<f64>>) -> Self {
        Self {
            central,
            replicas: Some(replicas),
        }
    }
}

/// Central and per-replica whitening matrices
///
/// Frozen weights hold the same `Arc` for every replica. An unfrozen replica
/// whose covariance cannot be inverted holds `None` and is listed in
/// [`failures`](Self::failures).
#[derive(Debug, Clone)]
pub struct JointWeights {
    pub central: Arc<DMatrix<f64>>,
    pub replicas: Vec<Option<Arc<DMatrix<f64>>>>,
    pub failures: Vec<ReplicaFailure>,
    pub frozen: bool,
}

impl JointWeights {
    /// Weights for a joint covariance; a singular central covariance is fatal
    pub fn from_covariance(cov: &JointCovariance, frozen: bool) -> Result<Self> {
        let central = Arc::new(cov_to_weights(&cov.central)?);
        if frozen {
            return Ok(Self {
                replicas: vec![Some(Arc::clone(&central)); cov.replicas.len()],
                central,
                failures: Vec::new(),
                frozen,
            });
        }

        let mut failures = Vec::new();
        let replicas = cov
            .replicas
            .iter()
            .enumerate()
            .map(|(r, c)| match cov_to_weights(c) {
                Ok(w) => Some(Arc::new(w)),
                Err(err) => {
                    warn!("Replica {r} covariance rejected: {err}");
                    failures.push(ReplicaFailure {
                        replica: r,
                        reason: err.to_string(),
                    });
                    None
                }
            })
            .collect();

        Ok(Self {
            central,
            replicas,
            failures,
            frozen,
        })
    }

    /// Weights from a user-supplied covariance
    pub fn from_override(
        custom: &CovarianceOverride,
        points: usize,
        replicas: usize,
        frozen: bool,
    ) -> Result<Self> {
        let check = |m: &DMatrix<f64>, what: &str| -> Result<()> {
            if m.shape() != (points, points) {
                return Err(Error::shape_mismatch(
                    &format!("{what} covariance override vs fit points"),
                    m.shape(),
                    (points, points),
                ));
            }
            Ok(())
        };
        check(&custom.central, "central")?;

        let cov = if frozen {
            let central = Arc::new(custom.central.clone());
            JointCovariance {
                replicas: vec![Arc::clone(&central); replicas],
                central,
            }
        } else {
            let subcovs = custom.replicas.as_ref().ok_or_else(|| {
                Error::InvalidInput(
                    "unfrozen fit with a custom covariance needs per-replica covariances".to_string(),
                )
            })?;
            if subcovs.len() != replicas {
                return Err(Error::count_mismatch(
                    "replica covariances",
                    subcovs.len(),
                    "replicas",
                    replicas,
                ));
            }
            for c in subcovs {
                check(c, "replica")?;
            }
            JointCovariance {
                central: Arc::new(custom.central.clone()),
                replicas: subcovs.iter().cloned().map(Arc::new).collect(),
            }
        };
        Self::from_covariance(&cov, frozen)
    }

    /// Whether every replica uses the central weights
    pub fn is_shared(&self) -> bool {
        self.replicas
            .iter()
            .all(|w| matches!(w, Some(w) if Arc::ptr_eq(w, &self.central)))
    }

    pub fn replica(&self, r: usize) -> Option<&Arc<DMatrix<f64>>> {
        self.replicas.get(r).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0])
    }

    #[test]
    fn weights_whiten() {
        let cov = spd();
        let l = cov_to_weights(&cov).unwrap();
        let product = &l * l.transpose() * &cov;
        assert_relative_eq!(product, DMatrix::identity(3, 3), epsilon = 1e-12);
        for r in 0..3 {
            for c in (r + 1)..3 {
                assert_eq!(l[(r, c)], 0.0);
            }
        }
    }

    #[test]
    fn singular_covariance_is_reported() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(cov_to_weights(&singular), Err(Error::SingularCovariance(_))));

        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(cov_to_weights(&indefinite), Err(Error::SingularCovariance(_))));
    }

    #[test]
    fn cut_down_policies() {
        let total = DMatrix::from_fn(6, 6, |r, c| 1.0 + (r * 6 + c) as f64);
        let offsets = [0, 3];
        let windows = vec![vec![1, 2], vec![0]];

        let full = cut_down_and_correlate(&total, &offsets, &windows, CorrelationPolicy::Full);
        assert_eq!(full.shape(), (3, 3));
        assert_eq!(full[(0, 2)], total[(1, 3)]);
        assert_eq!(full[(2, 1)], total[(3, 2)]);

        let block = cut_down_and_correlate(&total, &offsets, &windows, CorrelationPolicy::BlockDiagonal);
        assert_eq!(block[(0, 1)], total[(1, 2)]);
        assert_eq!(block[(0, 2)], 0.0);

        let none = cut_down_and_correlate(&total, &offsets, &windows, CorrelationPolicy::Uncorrelated);
        assert_eq!(none, DMatrix::from_diagonal(&full.diagonal()));
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("block".parse::<CorrelationPolicy>().unwrap(), CorrelationPolicy::BlockDiagonal);
        assert_eq!("None".parse::<CorrelationPolicy>().unwrap(), CorrelationPolicy::Uncorrelated);
        assert!("diag".parse::<CorrelationPolicy>().is_err());
    }

    #[test]
    fn unfrozen_override_requires_replicas() {
        let custom = CovarianceOverride::frozen(spd());
        assert!(matches!(
            JointWeights::from_override(&custom, 3, 4, false),
            Err(Error::InvalidInput(_))
        ));
        let frozen = JointWeights::from_override(&custom, 3, 4, true).unwrap();
        assert!(frozen.is_shared());
        assert_eq!(frozen.replicas.len(), 4);
        assert!(JointWeights::from_override(&custom, 2, 4, true).is_err());
    }
}
