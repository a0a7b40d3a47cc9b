//! Parameter resolution across jointly fitted functions
//!
//! Every function lists the identities of its arguments. An identity is
//! resolved, in order of precedence, as
//!
//! 1. an explicit constant,
//! 2. a free parameter (shared by every function that names it),
//! 3. an automatic constant: `T` (variable count of the function's own
//!    correlator) or `C` (replica count),
//! 4. a data series `{name}`: the named correlator's central value, or its
//!    replica row in replica fits.
//!
//! The result is a template per function with placeholder slots the
//! optimiser fills, plus the optimiser-index → slot mapping.

use crate::functions::ArgValue;
use lattice_core::matrix::row_vector;
use lattice_core::{Error, Result};
use lattice_data::CorrelatorLookup;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Automatic constant: variable count of the function's correlator
pub const AUTO_VARIABLES: &str = "T";
/// Automatic constant: replica count
pub const AUTO_REPLICAS: &str = "C";

/// One argument slot of a function
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Filled from the optimiser's parameter vector at this index
    Free(usize),
    Fixed(ArgValue),
}

/// Arguments from `slots` with the free ones taken from `params`
pub fn fill_slots(slots: &[Slot], params: &[f64]) -> Vec<ArgValue> {
    slots
        .iter()
        .map(|slot| match slot {
            Slot::Free(i) => ArgValue::Scalar(params[*i]),
            Slot::Fixed(value) => value.clone(),
        })
        .collect()
}

/// Argument slots for every function in a joint fit
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTemplate {
    slots: Vec<Vec<Slot>>,
}

impl ParameterTemplate {
    pub fn slots(&self, function: usize) -> &[Slot] {
        &self.slots[function]
    }

    pub fn functions(&self) -> usize {
        self.slots.len()
    }

    /// Arguments of `function` with the free slots taken from `params`
    pub fn fill(&self, function: usize, params: &[f64]) -> Vec<ArgValue> {
        fill_slots(&self.slots[function], params)
    }

    /// `(optimiser index, slot index)` pairs of `function`
    pub fn parameter_map(&self, function: usize) -> Vec<(usize, usize)> {
        self.slots[function]
            .iter()
            .enumerate()
            .filter_map(|(s, slot)| match slot {
                Slot::Free(i) => Some((*i, s)),
                Slot::Fixed(_) => None,
            })
            .collect()
    }
}

/// How one identity was resolved
#[derive(Debug, Clone, PartialEq)]
enum Resolved {
    Free(usize),
    Constant(f64),
    Series(String),
}

/// Central and per-replica templates of a joint fit
#[derive(Debug, Clone)]
pub struct ParameterResolution {
    /// Free-parameter names in optimiser order
    pub names: Vec<String>,
    /// Constants actually used, explicit and automatic
    pub constants: BTreeMap<String, f64>,
    /// Names of the correlators embedded as data series
    pub series: BTreeSet<String>,
    central: ParameterTemplate,
    /// Only built when some argument is a data series
    replicas: Option<Vec<ParameterTemplate>>,
}

impl ParameterResolution {
    pub fn central(&self) -> &ParameterTemplate {
        &self.central
    }

    /// Template for replica `r`; the central one when nothing varies per replica
    pub fn template_for(&self, r: usize) -> &ParameterTemplate {
        self.replicas
            .as_ref()
            .and_then(|t| t.get(r))
            .unwrap_or(&self.central)
    }

    pub fn varies_per_replica(&self) -> bool {
        self.replicas.is_some()
    }
}

/// Inputs to [`resolve`]
#[derive(Clone, Copy)]
pub struct ResolutionRequest<'a> {
    /// Free parameters in optimiser order
    pub free: &'a [String],
    /// Argument identities of every function
    pub identities: &'a [Vec<String>],
    pub constants: &'a BTreeMap<String, f64>,
    /// Variable count of each function's correlator
    pub variables: &'a [usize],
    pub replicas: usize,
    /// Where `{name}` data series are looked up
    pub series: Option<&'a (dyn CorrelatorLookup + Sync)>,
}

fn series_name(identity: &str) -> Option<&str> {
    identity
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|s| !s.is_empty())
}

fn known_identities(request: &ResolutionRequest<'_>) -> String {
    let mut known: Vec<String> = request.constants.keys().cloned().collect();
    known.extend(request.free.iter().cloned());
    known.push(AUTO_VARIABLES.to_string());
    known.push(AUTO_REPLICAS.to_string());
    if let Some(lookup) = request.series {
        known.extend(lookup.correlator_names().into_iter().map(|n| format!("{{{n}}}")));
    }
    known.join(", ")
}

/// Resolve every function's argument identities
pub fn resolve(request: &ResolutionRequest<'_>) -> Result<ParameterResolution> {
    if request.identities.len() != request.variables.len() {
        return Err(Error::count_mismatch(
            "argument lists",
            request.identities.len(),
            "functions",
            request.variables.len(),
        ));
    }
    let mut free_index = BTreeMap::new();
    for (i, name) in request.free.iter().enumerate() {
        if free_index.insert(name.as_str(), i).is_some() {
            return Err(Error::InvalidParameter(format!(
                "free parameter '{name}' is listed twice"
            )));
        }
    }

    let mut used_free = vec![false; request.free.len()];
    let mut constants = BTreeMap::new();
    let mut series = BTreeSet::new();
    let mut resolved = Vec::with_capacity(request.identities.len());

    for (f, identities) in request.identities.iter().enumerate() {
        let mut row = Vec::with_capacity(identities.len());
        for identity in identities {
            let value = if let Some(&c) = request.constants.get(identity) {
                constants.insert(identity.clone(), c);
                Resolved::Constant(c)
            } else if let Some(&i) = free_index.get(identity.as_str()) {
                used_free[i] = true;
                Resolved::Free(i)
            } else if identity == AUTO_VARIABLES {
                let t = request.variables[f] as f64;
                constants.insert(format!("{AUTO_VARIABLES}[{f}]"), t);
                Resolved::Constant(t)
            } else if identity == AUTO_REPLICAS {
                let c = request.replicas as f64;
                constants.insert(AUTO_REPLICAS.to_string(), c);
                Resolved::Constant(c)
            } else if let Some(name) = series_name(identity)
                .filter(|n| request.series.is_some_and(|l| l.lookup_correlator(n).is_some()))
            {
                series.insert(name.to_string());
                Resolved::Series(name.to_string())
            } else {
                return Err(Error::UnresolvedParameter {
                    identity: identity.clone(),
                    function: f,
                    known: known_identities(request),
                });
            };
            row.push(value);
        }
        resolved.push(row);
    }

    if let Some(i) = used_free.iter().position(|used| !used) {
        return Err(Error::InvalidParameter(format!(
            "free parameter '{}' is not an argument of any function",
            request.free[i]
        )));
    }

    let series_data = load_series(&series, request)?;
    let build = |replica: Option<usize>| -> ParameterTemplate {
        let slots = resolved
            .iter()
            .map(|row| {
                row.iter()
                    .map(|r| match r {
                        Resolved::Free(i) => Slot::Free(*i),
                        Resolved::Constant(c) => Slot::Fixed(ArgValue::Scalar(*c)),
                        Resolved::Series(name) => {
                            let (central, rows) = &series_data[name];
                            let value = match replica {
                                None => Arc::clone(central),
                                Some(r) => Arc::clone(&rows[r]),
                            };
                            Slot::Fixed(ArgValue::Series(value))
                        }
                    })
                    .collect()
            })
            .collect();
        ParameterTemplate { slots }
    };

    let central = build(None);
    let replicas = if series.is_empty() {
        None
    } else {
        Some((0..request.replicas).map(|r| build(Some(r))).collect())
    };

    Ok(ParameterResolution {
        names: request.free.to_vec(),
        constants,
        series,
        central,
        replicas,
    })
}

type SeriesData = BTreeMap<String, (Arc<nalgebra::DVector<f64>>, Vec<Arc<nalgebra::DVector<f64>>>)>;

fn load_series(names: &BTreeSet<String>, request: &ResolutionRequest<'_>) -> Result<SeriesData> {
    let mut out = BTreeMap::new();
    let Some(lookup) = request.series else {
        return Ok(out);
    };
    for name in names {
        let Some(corr) = lookup.lookup_correlator(name) else {
            continue;
        };
        if corr.replicas() != request.replicas {
            return Err(Error::ShapeMismatch(format!(
                "data series '{{{name}}}' has {} replicas but the fit has {}",
                corr.replicas(),
                request.replicas
            )));
        }
        let rows = (0..corr.replicas())
            .map(|r| Arc::new(row_vector(corr.submean(), r)))
            .collect();
        out.insert(name.clone(), (corr.mean()?, rows));
    }
    Ok(out)
}
