//! Joint fit driver
//!
//! One minimisation for the central data, then one per replica. Replica fits
//! start from the central solution rather than the user's initial values;
//! they only need to move by about one standard error.

use crate::covariance::{joint_cov, CorrelationPolicy, CovarianceOverride, JointWeights, ReplicaFailure};
use crate::execution::ExecutionStrategy;
use crate::functions::FitFunction;
use crate::goodness::{degrees_of_freedom, goodness_of_fit};
use crate::minimiser::{LevenbergMarquardt, Minimiser, Minimum};
use crate::params::{resolve, ParameterResolution, ParameterTemplate, ResolutionRequest};
use crate::result::{FitResult, SubFitResult};
use crate::scan::{ScanFailure, ScanResult};
use crate::window::{combination_key, FitWindow, WindowScan};
use lattice_core::matrix::{concat_vectors, row_vector, select, select_block, select_columns};
use lattice_core::{Error, Result};
use lattice_data::{Correlator, CorrelatorLookup};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Covariance and execution settings of a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitOptions {
    pub correlation: CorrelationPolicy,
    /// Reuse the central covariance for every replica
    pub frozen: bool,
    pub execution: ExecutionStrategy,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            correlation: CorrelationPolicy::Full,
            frozen: true,
            execution: ExecutionStrategy::default(),
        }
    }
}

impl FitOptions {
    pub fn with_correlation(mut self, correlation: CorrelationPolicy) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn with_execution(mut self, execution: ExecutionStrategy) -> Self {
        self.execution = execution;
        self
    }
}

/// Everything a joint fit needs
///
/// `correlators[k]` is fitted by `functions[k]` over `windows[k]` with
/// argument identities `identities[k]`.
#[derive(Clone, Default)]
pub struct FitSpec<'a> {
    pub correlators: Vec<&'a Correlator>,
    pub functions: Vec<FitFunction>,
    pub windows: Vec<FitWindow>,
    pub identities: Vec<Vec<String>>,
    /// Free parameters with their initial values, in optimiser order
    pub free: Vec<(String, f64)>,
    pub constants: BTreeMap<String, f64>,
    /// Lookup for `{name}` data-series arguments
    pub series: Option<&'a (dyn CorrelatorLookup + Sync)>,
    pub covariance: Option<CovarianceOverride>,
    /// Coordinates per function; defaults to the window indices
    pub xs: Option<Vec<Vec<f64>>>,
    pub options: FitOptions,
}

impl<'a> FitSpec<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit `correlator` with `function` over `window`, naming its arguments after the function's parameters
    pub fn add(self, correlator: &'a Correlator, function: FitFunction, window: impl Into<FitWindow>) -> Self {
        let identities: Vec<String> = function.parameter_names().to_vec();
        self.add_with_identities(correlator, function, window, &identities)
    }

    pub fn add_with_identities<S: AsRef<str>>(
        mut self,
        correlator: &'a Correlator,
        function: FitFunction,
        window: impl Into<FitWindow>,
        identities: &[S],
    ) -> Self {
        self.correlators.push(correlator);
        self.functions.push(function);
        self.windows.push(window.into());
        self.identities
            .push(identities.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    pub fn free(mut self, name: impl Into<String>, initial: f64) -> Self {
        self.free.push((name.into(), initial));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.insert(name.into(), value);
        self
    }

    pub fn with_series(mut self, series: &'a (dyn CorrelatorLookup + Sync)) -> Self {
        self.series = Some(series);
        self
    }

    pub fn with_covariance(mut self, covariance: CovarianceOverride) -> Self {
        self.covariance = Some(covariance);
        self
    }

    pub fn with_xs(mut self, xs: Vec<Vec<f64>>) -> Self {
        self.xs = Some(xs);
        self
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationPolicy) -> Self {
        self.options.correlation = correlation;
        self
    }

    pub fn frozen(mut self, frozen: bool) -> Self {
        self.options.frozen = frozen;
        self
    }

    /// The same fit over different windows
    pub fn with_windows(&self, windows: Vec<FitWindow>) -> Self {
        Self {
            windows,
            ..self.clone()
        }
    }

    fn validate_counts(&self) -> Result<()> {
        let n = self.correlators.len();
        if n == 0 {
            return Err(Error::InvalidInput("a fit needs at least one correlator".to_string()));
        }
        let counts = [
            ("functions", self.functions.len()),
            ("fit windows", self.windows.len()),
            ("argument lists", self.identities.len()),
        ];
        for (what, count) in counts {
            if count != n {
                return Err(Error::count_mismatch("correlators", n, what, count));
            }
        }
        if let Some(xs) = &self.xs {
            if xs.len() != n {
                return Err(Error::count_mismatch("correlators", n, "coordinate lists", xs.len()));
            }
        }
        Ok(())
    }
}

/// Functions of a joint fit evaluated at their own coordinates and concatenated
struct JointModel<'m> {
    functions: &'m [FitFunction],
    xs: &'m [Vec<f64>],
}

impl JointModel<'_> {
    fn evaluate(&self, template: &ParameterTemplate, params: &[f64]) -> Result<DVector<f64>> {
        let parts = self
            .functions
            .iter()
            .zip(self.xs)
            .enumerate()
            .map(|(k, (f, xs))| f.evaluate(xs, &template.fill(k, params)))
            .collect::<Result<Vec<_>>>()?;
        Ok(concat_vectors(parts.iter()))
    }
}

/// Whitened residuals `Lᵀ (data − model)`
fn weighted_residuals(
    weight_t: &DMatrix<f64>,
    target: &DVector<f64>,
    model: &JointModel<'_>,
    template: &ParameterTemplate,
    params: &DVector<f64>,
) -> Result<DVector<f64>> {
    let prediction = model.evaluate(template, params.as_slice())?;
    Ok(weight_t * (target - prediction))
}

/// Runs joint fits with a pluggable minimiser
#[derive(Debug, Clone)]
pub struct Fitter {
    minimiser: Arc<dyn Minimiser>,
}

impl Default for Fitter {
    fn default() -> Self {
        Self::new(LevenbergMarquardt::default())
    }
}

impl Fitter {
    pub fn new<M: Minimiser + 'static>(minimiser: M) -> Self {
        Self {
            minimiser: Arc::new(minimiser),
        }
    }

    pub fn with_minimiser(minimiser: Arc<dyn Minimiser>) -> Self {
        Self { minimiser }
    }

    pub fn minimiser(&self) -> &Arc<dyn Minimiser> {
        &self.minimiser
    }

    /// Central fit followed by one fit per replica
    #[instrument(skip_all, fields(functions = spec.functions.len(), windows = %combination_key(&spec.windows)))]
    pub fn fit(&self, spec: &FitSpec<'_>) -> Result<FitResult> {
        spec.validate_counts()?;

        let indices = spec
            .windows
            .iter()
            .zip(&spec.correlators)
            .map(|(w, c)| w.checked_indices(c.variables()))
            .collect::<Result<Vec<_>>>()?;
        for (function, identities) in spec.functions.iter().zip(&spec.identities) {
            function.check_arity(identities.len())?;
        }
        let replicas = spec.correlators[0].replicas();
        if let Some((k, c)) = spec
            .correlators
            .iter()
            .enumerate()
            .find(|(_, c)| c.replicas() != replicas)
        {
            return Err(Error::ShapeMismatch(format!(
                "correlator {k} has {} replicas but correlator 0 has {replicas}",
                c.replicas()
            )));
        }

        let names: Vec<String> = spec.free.iter().map(|(n, _)| n.clone()).collect();
        let initial = DVector::from_iterator(spec.free.len(), spec.free.iter().map(|(_, v)| *v));
        let variables: Vec<usize> = spec.correlators.iter().map(|c| c.variables()).collect();
        let resolution = resolve(&ResolutionRequest {
            free: &names,
            identities: &spec.identities,
            constants: &spec.constants,
            variables: &variables,
            replicas,
            series: spec.series,
        })?;

        let points: usize = indices.iter().map(Vec::len).sum();
        let frozen = spec.options.frozen;
        let weights = match &spec.covariance {
            Some(custom) => JointWeights::from_override(custom, points, replicas, frozen)?,
            None => {
                let cov = joint_cov(&spec.correlators, &indices, spec.options.correlation, frozen)?;
                JointWeights::from_covariance(&cov, frozen)?
            }
        };

        let xs: Vec<Vec<f64>> = match &spec.xs {
            Some(xs) => {
                for (k, (x, idx)) in xs.iter().zip(&indices).enumerate() {
                    if x.len() != idx.len() {
                        return Err(Error::ShapeMismatch(format!(
                            "function {k} has {} coordinates for the {} points of window {}",
                            x.len(),
                            idx.len(),
                            spec.windows[k]
                        )));
                    }
                }
                xs.clone()
            }
            None => indices
                .iter()
                .map(|idx| idx.iter().map(|&i| i as f64).collect())
                .collect(),
        };
        let model = JointModel {
            functions: &spec.functions,
            xs: &xs,
        };

        let means = spec
            .correlators
            .iter()
            .map(|c| c.mean())
            .collect::<Result<Vec<_>>>()?;
        let central_target = concat_vectors(
            means
                .iter()
                .zip(&indices)
                .map(|(m, idx)| select(m, idx))
                .collect::<Vec<_>>()
                .iter(),
        );

        let central_weight_t = weights.central.transpose();
        let central_fn = |p: &DVector<f64>| {
            weighted_residuals(&central_weight_t, &central_target, &model, resolution.central(), p)
        };
        let central = self.minimiser.minimise(&central_fn, &initial)?;
        debug!(
            "Central fit: {} evaluations, chi^2 = {:.6e}, converged = {}",
            central.evaluations,
            central.chi_sq(),
            central.converged
        );
        if !central.converged {
            warn!("Central fit over {} did not converge", combination_key(&spec.windows));
        }

        let seed = central.parameters.clone();
        let outcomes = spec.options.execution.execute_batch(replicas, |r| {
            let weight = weights.replica(r).ok_or_else(|| {
                Error::SingularCovariance(format!("replica {r} has no usable covariance"))
            })?;
            let weight_t = weight.transpose();
            let target = concat_vectors(
                spec.correlators
                    .iter()
                    .zip(&indices)
                    .map(|(c, idx)| select(&row_vector(c.submean(), r), idx))
                    .collect::<Vec<_>>()
                    .iter(),
            );
            let template = resolution.template_for(r);
            let replica_fn =
                |p: &DVector<f64>| weighted_residuals(&weight_t, &target, &model, template, p);
            self.minimiser.minimise(&replica_fn, &seed)
        });

        Ok(assemble(spec, &indices, xs, &resolution, weights, central, outcomes))
    }

    /// Independent joint fits over every window combination of `scan`
    ///
    /// A combination whose covariance is singular, or whose central fit does
    /// not converge, is recorded in `failures`; the others still run.
    #[instrument(skip_all, fields(correlators = spec.correlators.len()))]
    pub fn fit_scan(&self, spec: &FitSpec<'_>, scan: &WindowScan) -> Result<ScanResult> {
        spec.validate_counts()?;
        let combinations = scan.combinations(&spec.windows)?;
        debug!("Scanning {} window combinations", combinations.len());

        let outcomes = spec
            .options
            .execution
            .execute_batch(combinations.len(), |i| {
                let fit = self.fit(&spec.with_windows(combinations[i].clone()))?;
                if fit.converged {
                    Ok(fit)
                } else {
                    Err(Error::Convergence(format!(
                        "central fit over {} did not converge",
                        fit.key()
                    )))
                }
            });

        let mut result = ScanResult::default();
        for (windows, outcome) in combinations.into_iter().zip(outcomes) {
            let key = combination_key(&windows);
            match outcome {
                Ok(fit) => {
                    result.results.insert(key, fit);
                }
                Err(err) if err.is_recoverable_in_scan() => {
                    warn!("Window combination {key} failed: {err}");
                    result.failures.push(ScanFailure {
                        key,
                        windows,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        debug!(
            "Scan finished: {} fits, {} failures",
            result.results.len(),
            result.failures.len()
        );
        Ok(result)
    }
}

fn assemble(
    spec: &FitSpec<'_>,
    indices: &[Vec<usize>],
    xs: Vec<Vec<f64>>,
    resolution: &ParameterResolution,
    weights: JointWeights,
    central: Minimum,
    outcomes: Vec<Result<Minimum>>,
) -> FitResult {
    let params = central.parameters.len();
    let replica_count = outcomes.len();
    let resampler = Arc::clone(spec.correlators[0].resampler());

    let mut replicas = DMatrix::from_element(replica_count, params, f64::NAN);
    let mut replica_goodness = Vec::with_capacity(replica_count);
    let mut replica_residuals = Vec::with_capacity(replica_count);
    let mut failures: Vec<ReplicaFailure> = weights.failures.clone();
    let mut succeeded = Vec::with_capacity(replica_count);

    for (r, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(min) => {
                replicas.set_row(r, &min.parameters.transpose());
                replica_goodness.push(goodness_of_fit(&min.residuals, params));
                replica_residuals.push(Some(min.residuals));
                succeeded.push(r);
            }
            Err(err) => {
                if weights.replica(r).is_some() {
                    warn!("Replica {r} fit failed: {err}");
                    failures.push(ReplicaFailure {
                        replica: r,
                        reason: err.to_string(),
                    });
                }
                replica_goodness.push(None);
                replica_residuals.push(None);
            }
        }
    }
    failures.sort_by_key(|f| f.replica);

    let (cov, std) = if succeeded.is_empty() {
        (
            DMatrix::from_element(params, params, f64::NAN),
            DVector::from_element(params, f64::NAN),
        )
    } else {
        let rows = replicas.select_rows(succeeded.iter());
        let cov = resampler.cov_definition(&central.parameters, &rows);
        let std = resampler.std_definition(&resampler.var_definition(&cov));
        (cov, std)
    };

    let points: usize = indices.iter().map(Vec::len).sum();
    let dof = degrees_of_freedom(points, params);
    let goodness = goodness_of_fit(&central.residuals, params);
    debug!(
        "Fit finished: dof = {dof}, chi^2/dof = {:?}, {} of {replica_count} replicas failed",
        goodness.map(|g| g.chi_sq_per_dof),
        failures.len()
    );

    let mut offset = 0;
    let mut subresults = Vec::with_capacity(spec.functions.len());
    for (k, function) in spec.functions.iter().enumerate() {
        let template = resolution.central();
        let mut local: Vec<usize> = template.parameter_map(k).into_iter().map(|(i, _)| i).collect();
        local.sort_unstable();
        local.dedup();
        let len = indices[k].len();
        let residuals = central.residuals.rows(offset, len).into_owned();
        offset += len;

        subresults.push(SubFitResult {
            function: function.clone(),
            identities: spec.identities[k].clone(),
            parameter_names: local.iter().map(|&i| resolution.names[i].clone()).collect(),
            parameter_indices: local.clone(),
            mean: select(&central.parameters, &local),
            replicas: select_columns(&replicas, &local),
            std: select(&std, &local),
            cov: select_block(&cov, &local, &local),
            window: spec.windows[k].clone(),
            xs: xs[k].clone(),
            goodness: goodness_of_fit(&residuals, local.len()),
            residuals,
            slots: template.slots(k).to_vec(),
            global_mean: central.parameters.clone(),
        });
    }

    FitResult {
        parameter_names: resolution.names.clone(),
        mean: central.parameters,
        replicas,
        std,
        cov,
        dof,
        goodness,
        replica_goodness,
        residuals: central.residuals,
        replica_residuals,
        weights,
        windows: spec.windows.clone(),
        constants: resolution.constants.clone(),
        replica_failures: failures,
        converged: central.converged,
        subresults,
        resampler,
    }
}
