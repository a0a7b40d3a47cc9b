//! Analysis session
//!
//! An [`Analysis`] owns the resampler shared by every correlator it creates,
//! plus two named databases (configurations and correlators) that combination
//! expressions refer to as `{name}`.

use crate::expression::{Bindings, Expression};
use crate::transforms::{apply_transforms, Transform};
use crate::{Configurations, Correlator, DataImporter};
use lattice_core::matrix::as_row;
use lattice_core::{Error, Resampler, Result};
use lattice_resample::ResamplerSpec;
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read access to named correlators
pub trait CorrelatorLookup {
    fn lookup_correlator(&self, name: &str) -> Option<&Correlator>;

    /// Known names, for error messages
    fn correlator_names(&self) -> Vec<String>;
}

impl CorrelatorLookup for BTreeMap<String, Correlator> {
    fn lookup_correlator(&self, name: &str) -> Option<&Correlator> {
        self.get(name)
    }

    fn correlator_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

impl CorrelatorLookup for HashMap<String, Correlator> {
    fn lookup_correlator(&self, name: &str) -> Option<&Correlator> {
        self.get(name)
    }

    fn correlator_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Result of an auto-detected combination
#[derive(Debug, Clone)]
pub enum Combined {
    Configurations(Configurations),
    Correlator(Correlator),
}

/// Resampler, named databases and the operations that create data
#[derive(Debug, Default)]
pub struct Analysis {
    resampler: Option<Arc<dyn Resampler>>,
    spec: Option<ResamplerSpec>,
    configurations: BTreeMap<String, Configurations>,
    correlators: BTreeMap<String, Correlator>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`init_resampler`](Self::init_resampler)
    pub fn with_resampler(mut self, spec: ResamplerSpec) -> Self {
        self.init_resampler(spec);
        self
    }

    /// Create the session resampler, replacing any previous one
    pub fn init_resampler(&mut self, spec: ResamplerSpec) {
        debug!("Initialising {} resampler", spec.kind());
        self.resampler = Some(spec.build());
        self.spec = Some(spec);
    }

    /// Reseed and/or resize the session resampler
    pub fn configure_resampler(&mut self, seed: Option<u64>, resamples: Option<usize>) -> Result<()> {
        self.resampler()?.configure(seed, resamples)
    }

    /// The shared resampler
    pub fn resampler(&self) -> Result<&Arc<dyn Resampler>> {
        self.resampler.as_ref().ok_or_else(|| {
            Error::InvalidInput("no resampler initialised; call init_resampler first".to_string())
        })
    }

    /// The settings the resampler was created from
    pub fn resampler_spec(&self) -> Option<ResamplerSpec> {
        self.spec
    }

    pub fn insert_configurations(&mut self, name: impl Into<String>, configurations: Configurations) {
        self.configurations.insert(name.into(), configurations);
    }

    pub fn insert_correlator(&mut self, name: impl Into<String>, correlator: Correlator) {
        self.correlators.insert(name.into(), correlator);
    }

    pub fn configurations(&self, name: &str) -> Option<&Configurations> {
        self.configurations.get(name)
    }

    pub fn correlator(&self, name: &str) -> Option<&Correlator> {
        self.correlators.get(name)
    }

    pub fn remove_configurations(&mut self, name: &str) -> Option<Configurations> {
        self.configurations.remove(name)
    }

    pub fn remove_correlator(&mut self, name: &str) -> Option<Correlator> {
        self.correlators.remove(name)
    }

    pub fn configuration_names(&self) -> impl Iterator<Item = &str> {
        self.configurations.keys().map(String::as_str)
    }

    pub fn correlators(&self) -> &BTreeMap<String, Correlator> {
        &self.correlators
    }

    /// Transform a copy of `raw` and wrap it
    pub fn build_configurations(
        &self,
        raw: &DMatrix<f64>,
        transforms: &[&dyn Transform],
    ) -> Result<Configurations> {
        let data = apply_transforms(raw.clone(), transforms)?;
        Ok(Configurations::new(data))
    }

    /// Transform a copy of `raw`, wrap it and resample it
    #[instrument(skip_all, fields(shape = ?raw.shape()))]
    pub fn build_correlator(&self, raw: &DMatrix<f64>, transforms: &[&dyn Transform]) -> Result<Correlator> {
        let configurations = self.build_configurations(raw, transforms)?;
        self.configs_to_correlator(&configurations)
    }

    /// Resample configurations with the session resampler
    pub fn configs_to_correlator(&self, configurations: &Configurations) -> Result<Correlator> {
        Correlator::from_configurations(configurations, Arc::clone(self.resampler()?))
    }

    /// Wrap an existing point estimate and replica ensemble
    pub fn add_correlator(&self, data_mean: DVector<f64>, submean: DMatrix<f64>) -> Result<Correlator> {
        Correlator::new(data_mean, submean, Arc::clone(self.resampler()?))
    }

    pub fn import_configurations(
        &self,
        path: &Path,
        importer: &dyn DataImporter,
        transforms: &[&dyn Transform],
    ) -> Result<Configurations> {
        debug!("Importing configurations from {}", path.display());
        let raw = importer.import(path)?;
        self.build_configurations(&raw, transforms)
    }

    pub fn import_correlator(
        &self,
        path: &Path,
        importer: &dyn DataImporter,
        transforms: &[&dyn Transform],
    ) -> Result<Correlator> {
        debug!("Importing correlator from {}", path.display());
        let raw = importer.import(path)?;
        self.build_correlator(&raw, transforms)
    }

    fn unknown_references(&self, expression: &Expression) -> Vec<String> {
        expression
            .references()
            .into_iter()
            .filter(|name| !self.configurations.contains_key(*name) && !self.correlators.contains_key(*name))
            .map(|name| format!("{{{name}}}"))
            .collect()
    }

    fn configurations_for<'a>(&'a self, names: &[&str]) -> Result<Vec<(&'a str, &'a Configurations)>> {
        names
            .iter()
            .map(|name| {
                self.configurations
                    .get_key_value(*name)
                    .map(|(k, v)| (k.as_str(), v))
                    .ok_or_else(|| Error::InvalidInput(format!("no configurations named '{name}'")))
            })
            .collect()
    }

    fn correlators_for<'a>(&'a self, names: &[&str]) -> Result<Vec<(&'a str, &'a Correlator)>> {
        names
            .iter()
            .map(|name| {
                self.correlators
                    .get_key_value(*name)
                    .map(|(k, v)| (k.as_str(), v))
                    .ok_or_else(|| Error::InvalidInput(format!("no correlator named '{name}'")))
            })
            .collect()
    }

    /// Evaluate `expression` over configurations; all referenced data must share one shape
    #[instrument(skip(self))]
    pub fn combine_configurations(&self, expression: &str) -> Result<Configurations> {
        let parsed = Expression::parse(expression)?;
        let unknown = self.unknown_references(&parsed);
        if !unknown.is_empty() {
            return Err(Error::expression(expression, format!("unknown identifiers {}", unknown.join(", "))));
        }
        let names: Vec<&str> = parsed.references().into_iter().collect();
        let inputs = self.configurations_for(&names)?;
        let (samples, variables) = common_shape(expression, inputs.iter().map(|(n, c)| (*n, c.shape())))?;

        let mut bindings = Bindings::new(variables, samples);
        for (name, configs) in &inputs {
            bindings.insert(name, configs.data());
        }
        let data = parsed.evaluate(&bindings)?;
        Ok(Configurations::new(data))
    }

    /// Evaluate `expression` separately over point estimates and replicas
    #[instrument(skip(self))]
    pub fn combine_correlators(&self, expression: &str) -> Result<Correlator> {
        let parsed = Expression::parse(expression)?;
        let unknown = self.unknown_references(&parsed);
        if !unknown.is_empty() {
            return Err(Error::expression(expression, format!("unknown identifiers {}", unknown.join(", "))));
        }
        let names: Vec<&str> = parsed.references().into_iter().collect();
        let inputs = self.correlators_for(&names)?;
        let (replicas, variables) =
            common_shape(expression, inputs.iter().map(|(n, c)| (*n, c.submean().shape())))?;

        let rows: Vec<DMatrix<f64>> = inputs.iter().map(|(_, c)| as_row(c.data_mean())).collect();
        let mut mean_bindings = Bindings::new(variables, replicas);
        let mut replica_bindings = Bindings::new(variables, replicas);
        for ((name, corr), row) in inputs.iter().zip(&rows) {
            mean_bindings.insert(name, row);
            replica_bindings.insert(name, corr.submean());
        }

        let mean = parsed.evaluate(&mean_bindings)?;
        let submean = parsed.evaluate(&replica_bindings)?;
        if mean.nrows() != 1 || submean.shape() != (replicas, mean.ncols()) {
            return Err(Error::expression(
                expression,
                format!(
                    "result shapes {}x{} (point) and {}x{} (replicas) do not form a correlator",
                    mean.nrows(),
                    mean.ncols(),
                    submean.nrows(),
                    submean.ncols()
                ),
            ));
        }
        let data_mean = DVector::from_iterator(mean.ncols(), mean.row(0).iter().copied());
        self.add_correlator(data_mean, submean)
    }

    /// Combine whichever database the expression refers to
    pub fn combine(&self, expression: &str) -> Result<Combined> {
        let parsed = Expression::parse(expression)?;
        let refs = parsed.references();
        let configs: BTreeSet<&str> = refs
            .iter()
            .copied()
            .filter(|name| self.configurations.contains_key(*name))
            .collect();
        let corrs: BTreeSet<&str> = refs
            .iter()
            .copied()
            .filter(|name| self.correlators.contains_key(*name))
            .collect();

        match (configs.is_empty(), corrs.is_empty()) {
            (false, true) => self.combine_configurations(expression).map(Combined::Configurations),
            (true, false) => self.combine_correlators(expression).map(Combined::Correlator),
            (false, false) => Err(Error::expression(
                expression,
                format!(
                    "both configurations ({}) and correlators ({}) referenced; combine only one kind",
                    configs.into_iter().collect::<Vec<_>>().join(", "),
                    corrs.into_iter().collect::<Vec<_>>().join(", ")
                ),
            )),
            (true, true) => Err(Error::expression(
                expression,
                "no configurations or correlators referenced",
            )),
        }
    }

    /// Apply `function` to the named configurations' data
    pub fn combine_configurations_with<F>(&self, names: &[&str], function: F) -> Result<Configurations>
    where
        F: Fn(&[&DMatrix<f64>]) -> Result<DMatrix<f64>>,
    {
        let inputs = self.configurations_for(names)?;
        common_shape("custom combination", inputs.iter().map(|(n, c)| (*n, c.shape())))?;
        let data: Vec<&DMatrix<f64>> = inputs.iter().map(|(_, c)| c.data()).collect();
        Ok(Configurations::new(function(&data)?))
    }

    /// Apply `function` to the named correlators' point estimates (as rows) and replicas
    pub fn combine_correlators_with<F>(&self, names: &[&str], function: F) -> Result<Correlator>
    where
        F: Fn(&[&DMatrix<f64>]) -> Result<DMatrix<f64>>,
    {
        let inputs = self.correlators_for(names)?;
        common_shape("custom combination", inputs.iter().map(|(n, c)| (*n, c.submean().shape())))?;

        let rows: Vec<DMatrix<f64>> = inputs.iter().map(|(_, c)| as_row(c.data_mean())).collect();
        let row_refs: Vec<&DMatrix<f64>> = rows.iter().collect();
        let replica_refs: Vec<&DMatrix<f64>> = inputs.iter().map(|(_, c)| c.submean()).collect();

        let mean = function(&row_refs)?;
        let submean = function(&replica_refs)?;
        if mean.nrows() != 1 {
            return Err(Error::ShapeMismatch(format!(
                "custom combination returned {} rows for the point estimate, expected 1",
                mean.nrows()
            )));
        }
        let data_mean = DVector::from_iterator(mean.ncols(), mean.row(0).iter().copied());
        self.add_correlator(data_mean, submean)
    }
}

impl CorrelatorLookup for Analysis {
    fn lookup_correlator(&self, name: &str) -> Option<&Correlator> {
        self.correlators.get(name)
    }

    fn correlator_names(&self) -> Vec<String> {
        self.correlators.keys().cloned().collect()
    }
}

/// The single (rows, columns) shape shared by all inputs
fn common_shape<'a, I>(context: &str, shapes: I) -> Result<(usize, usize)>
where
    I: IntoIterator<Item = (&'a str, (usize, usize))>,
{
    let shapes: Vec<(&str, (usize, usize))> = shapes.into_iter().collect();
    let Some(&(_, first)) = shapes.first() else {
        return Err(Error::InvalidInput(format!("{context}: no data referenced")));
    };
    if shapes.iter().any(|(_, s)| *s != first) {
        let listing: Vec<String> = shapes
            .iter()
            .map(|(name, (r, c))| format!("{name}: {r}x{c}"))
            .collect();
        return Err(Error::ShapeMismatch(format!(
            "{context}: inputs do not share one shape ({})",
            listing.join(", ")
        )));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::BuiltinTransform;
    use approx::assert_relative_eq;

    fn raw(scale: f64) -> DMatrix<f64> {
        DMatrix::from_fn(6, 4, |r, c| scale * (1.0 + 0.1 * r as f64) * (-(c as f64)).exp())
    }

    fn session() -> Analysis {
        let mut analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
        let a = analysis.build_configurations(&raw(1.0), &[]).unwrap();
        let b = analysis.build_configurations(&raw(2.0), &[]).unwrap();
        analysis.insert_correlator("ca", analysis.configs_to_correlator(&a).unwrap());
        analysis.insert_correlator("cb", analysis.configs_to_correlator(&b).unwrap());
        analysis.insert_configurations("a", a);
        analysis.insert_configurations("b", b);
        analysis
    }

    #[test]
    fn resampler_required() {
        let analysis = Analysis::new();
        assert!(matches!(
            analysis.build_correlator(&raw(1.0), &[]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn build_applies_transforms_to_a_copy() {
        let analysis = session();
        let source = raw(1.0);
        let corr = analysis.build_correlator(&source, &[&BuiltinTransform::Flip]).unwrap();
        assert_relative_eq!(corr.data_mean()[0], source.column(3).mean(), epsilon = 1e-12);
        assert_eq!(source, raw(1.0));
    }

    #[test]
    fn combine_detects_database() {
        let analysis = session();
        match analysis.combine("{b} / {a}").unwrap() {
            Combined::Configurations(c) => assert_relative_eq!(c.mean()[2], 2.0, epsilon = 1e-12),
            other => panic!("expected configurations, got {other:?}"),
        }
        match analysis.combine("({ca} + {cb}) / 3").unwrap() {
            Combined::Correlator(c) => {
                let expected = analysis.correlator("ca").unwrap().data_mean();
                for j in 0..4 {
                    assert_relative_eq!(c.data_mean()[j], expected[j], epsilon = 1e-12);
                }
                assert_eq!(c.replicas(), 6);
            }
            other => panic!("expected correlator, got {other:?}"),
        }
        assert!(analysis.combine("{a} + {ca}").is_err());
        assert!(analysis.combine("{nothing} * 2").is_err());
    }

    #[test]
    fn combine_correlator_replicas_follow_expression() {
        let analysis = session();
        let ratio = analysis.combine_correlators("{cb} / {ca}").unwrap();
        assert_relative_eq!(ratio.std().unwrap()[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn combine_with_function() {
        let analysis = session();
        let diff = analysis
            .combine_correlators_with(&["cb", "ca"], |xs| Ok(xs[0] - xs[1]))
            .unwrap();
        let ca = analysis.correlator("ca").unwrap();
        let (got, expected) = (diff.mean().unwrap(), ca.mean().unwrap());
        for j in 0..4 {
            assert_relative_eq!(got[j], expected[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn import_uses_importer() {
        let analysis = session();
        let importer = |_: &Path| -> Result<DMatrix<f64>> { Ok(raw(3.0)) };
        let configs = analysis
            .import_configurations(Path::new("unused.dat"), &importer, &[])
            .unwrap();
        assert_eq!(configs.shape(), (6, 4));
    }
}
