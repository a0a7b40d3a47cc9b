//! Data import seam
//!
//! File formats live outside this crate. An importer turns a path into a raw
//! samples × variables array; closures with that signature work directly.

use lattice_core::Result;
use nalgebra::DMatrix;
use std::path::Path;

pub trait DataImporter {
    fn import(&self, path: &Path) -> Result<DMatrix<f64>>;
}

impl<F> DataImporter for F
where
    F: Fn(&Path) -> Result<DMatrix<f64>>,
{
    fn import(&self, path: &Path) -> Result<DMatrix<f64>> {
        self(path)
    }
}
