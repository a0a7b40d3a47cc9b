//! Model functions and their registry
//!
//! A [`FitFunction`] evaluates a model at a set of coordinates given its
//! resolved arguments. Arguments are scalars (free parameters and constants)
//! or whole data series (another correlator's central value or replica).
//! The registry maps names to descriptors and is filled at start-up; the
//! two-point library is available through [`FunctionRegistry::with_builtins`].

use lattice_core::{Error, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A resolved function argument
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Scalar(f64),
    /// A data series indexed by the variable axis
    Series(Arc<DVector<f64>>),
}

impl ArgValue {
    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Self::Scalar(v) => Ok(*v),
            Self::Series(s) => Err(Error::InvalidParameter(format!(
                "expected a scalar argument, got a series of length {}",
                s.len()
            ))),
        }
    }

    pub fn as_series(&self) -> Result<&DVector<f64>> {
        match self {
            Self::Series(s) => Ok(s),
            Self::Scalar(v) => Err(Error::InvalidParameter(format!(
                "expected a series argument, got the scalar {v}"
            ))),
        }
    }

    /// Value at coordinate `x`: the scalar itself, or the series entry at `x`
    pub fn at(&self, x: f64) -> Result<f64> {
        match self {
            Self::Scalar(v) => Ok(*v),
            Self::Series(s) => {
                let i = x.round();
                if i < 0.0 || i as usize >= s.len() {
                    return Err(Error::InvalidParameter(format!(
                        "coordinate {x} is outside a series of length {}",
                        s.len()
                    )));
                }
                Ok(s[i as usize])
            }
        }
    }
}

/// How many arguments a function takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    Exact(usize),
    /// `leading` fixed arguments followed by one or more (amplitude, energy) pairs
    Pairs { leading: usize },
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Self::Exact(n) => count == n,
            Self::Pairs { leading } => count > leading && (count - leading) % 2 == 0,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Pairs { leading } => write!(f, "{leading} + 2k (k >= 1)"),
        }
    }
}

/// Model callable: `(coordinates, arguments) -> values`
pub type ModelFn = dyn Fn(&[f64], &[ArgValue]) -> Result<DVector<f64>> + Send + Sync;

/// Named model function with its argument list
#[derive(Clone)]
pub struct FitFunction {
    name: String,
    parameters: Vec<String>,
    arity: Arity,
    function: Arc<ModelFn>,
}

impl FitFunction {
    /// A function with a fixed, named argument list
    pub fn new<F>(name: impl Into<String>, parameters: &[&str], function: F) -> Self
    where
        F: Fn(&[f64], &[ArgValue]) -> Result<DVector<f64>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            arity: Arity::Exact(parameters.len()),
            function: Arc::new(function),
        }
    }

    /// A function taking `leading` named arguments and then (amplitude, energy) pairs
    pub fn with_pairs<F>(name: impl Into<String>, leading: &[&str], function: F) -> Self
    where
        F: Fn(&[f64], &[ArgValue]) -> Result<DVector<f64>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: leading.iter().map(|p| p.to_string()).collect(),
            arity: Arity::Pairs {
                leading: leading.len(),
            },
            function: Arc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Fail unless `count` arguments fit this function
    pub fn check_arity(&self, count: usize) -> Result<()> {
        if self.arity.accepts(count) {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!(
                "function '{}' takes {} arguments, {count} given",
                self.name, self.arity
            )))
        }
    }

    /// Evaluate at `xs`; the output has one value per coordinate
    pub fn evaluate(&self, xs: &[f64], args: &[ArgValue]) -> Result<DVector<f64>> {
        self.check_arity(args.len())?;
        let values = (self.function)(xs, args)?;
        if values.len() != xs.len() {
            return Err(Error::ShapeMismatch(format!(
                "function '{}' returned {} values for {} coordinates",
                self.name,
                values.len(),
                xs.len()
            )));
        }
        Ok(values)
    }
}

impl fmt::Debug for FitFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitFunction")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Name → function descriptor
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FitFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the two-point function library
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for function in two_point::library() {
            registry.register(function);
        }
        registry
    }

    /// Add or replace a function under its own name
    pub fn register(&mut self, function: FitFunction) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Result<&FitFunction> {
        self.functions.get(name).ok_or_else(|| {
            Error::UnknownFunction(format!(
                "'{name}'; registered: {}",
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Two-point correlator models
///
/// `exp`: `Zsq / (2E) · e^{-E t}`; `cosh` adds the backward-propagating
/// image `e^{-E (T - t)}` on a lattice of temporal extent `T`.
pub mod two_point {
    use super::{ArgValue, FitFunction};
    use lattice_core::Result;
    use nalgebra::DVector;

    fn scalars(args: &[ArgValue]) -> Result<Vec<f64>> {
        args.iter().map(ArgValue::as_scalar).collect()
    }

    pub fn exp_term(t: f64, zsq: f64, energy: f64) -> f64 {
        zsq / (2.0 * energy) * (-energy * t).exp()
    }

    pub fn cosh_term(t: f64, extent: f64, zsq: f64, energy: f64) -> f64 {
        zsq / (2.0 * energy) * ((-energy * t).exp() + (-energy * (extent - t)).exp())
    }

    fn exp_series(xs: &[f64], pairs: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            xs.len(),
            xs.iter()
                .map(|&t| pairs.chunks_exact(2).map(|p| exp_term(t, p[0], p[1])).sum::<f64>()),
        )
    }

    fn cosh_series(xs: &[f64], extent: f64, pairs: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            xs.len(),
            xs.iter().map(|&t| {
                pairs
                    .chunks_exact(2)
                    .map(|p| cosh_term(t, extent, p[0], p[1]))
                    .sum::<f64>()
            }),
        )
    }

    pub fn exp_2pt() -> FitFunction {
        FitFunction::new("exp_2pt", &["Zsq", "E"], |xs, args| {
            Ok(exp_series(xs, &scalars(args)?))
        })
    }

    pub fn exp_2pt_excited() -> FitFunction {
        FitFunction::new("exp_2pt_excited", &["A0", "E0", "A1", "E1"], |xs, args| {
            Ok(exp_series(xs, &scalars(args)?))
        })
    }

    pub fn exp_2pt_series() -> FitFunction {
        FitFunction::with_pairs("exp_2pt_series", &[], |xs, args| {
            Ok(exp_series(xs, &scalars(args)?))
        })
    }

    pub fn cosh_2pt() -> FitFunction {
        FitFunction::new("cosh_2pt", &["T", "Zsq", "E"], |xs, args| {
            let v = scalars(args)?;
            Ok(cosh_series(xs, v[0], &v[1..]))
        })
    }

    pub fn cosh_2pt_excited() -> FitFunction {
        FitFunction::new("cosh_2pt_excited", &["T", "A0", "E0", "A1", "E1"], |xs, args| {
            let v = scalars(args)?;
            Ok(cosh_series(xs, v[0], &v[1..]))
        })
    }

    pub fn cosh_2pt_series() -> FitFunction {
        FitFunction::with_pairs("cosh_2pt_series", &["T"], |xs, args| {
            let v = scalars(args)?;
            Ok(cosh_series(xs, v[0], &v[1..]))
        })
    }

    pub fn library() -> Vec<FitFunction> {
        vec![
            exp_2pt(),
            exp_2pt_excited(),
            exp_2pt_series(),
            cosh_2pt(),
            cosh_2pt_excited(),
            cosh_2pt_series(),
        ]
    }
}
