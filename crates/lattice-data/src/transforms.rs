//! Transforms applied to raw arrays before they are wrapped
//!
//! A transform consumes a samples × variables array and returns a new one.
//! Built-in transforms are addressable by name; any closure
//! `Fn(DMatrix<f64>) -> Result<DMatrix<f64>>` is a transform as well.

use lattice_core::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Array axis a transform acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Rows: samples
    Configurations,
    /// Columns: time slices
    Timeslices,
}

impl Axis {
    fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Configurations),
            1 => Ok(Self::Timeslices),
            other => Err(Error::InvalidParameter(format!(
                "axis must be 0 (configurations) or 1 (timeslices), got {other}"
            ))),
        }
    }

    fn length(self, data: &DMatrix<f64>) -> usize {
        match self {
            Self::Configurations => data.nrows(),
            Self::Timeslices => data.ncols(),
        }
    }
}

/// A pure array-to-array step of a transform pipeline
pub trait Transform: Send + Sync {
    fn apply(&self, data: DMatrix<f64>) -> Result<DMatrix<f64>>;

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> Transform for F
where
    F: Fn(DMatrix<f64>) -> Result<DMatrix<f64>> + Send + Sync,
{
    fn apply(&self, data: DMatrix<f64>) -> Result<DMatrix<f64>> {
        self(data)
    }
}

/// Apply `transforms` in order
pub fn apply_transforms(mut data: DMatrix<f64>, transforms: &[&dyn Transform]) -> Result<DMatrix<f64>> {
    for transform in transforms {
        debug!("Applying transform '{}' to {:?} array", transform.name(), data.shape());
        data = transform.apply(data)?;
    }
    Ok(data)
}

/// Cyclic shift along `axis`: element `i` moves to `i + shift`
pub fn roll(data: &DMatrix<f64>, shift: i64, axis: Axis) -> DMatrix<f64> {
    let n = axis.length(data);
    if n == 0 {
        return data.clone();
    }
    let source = |i: usize| (i as i64 - shift).rem_euclid(n as i64) as usize;
    match axis {
        Axis::Configurations => DMatrix::from_fn(data.nrows(), data.ncols(), |r, c| data[(source(r), c)]),
        Axis::Timeslices => DMatrix::from_fn(data.nrows(), data.ncols(), |r, c| data[(r, source(c))]),
    }
}

/// Reverse the time-slice axis
pub fn flip(data: &DMatrix<f64>) -> DMatrix<f64> {
    let t = data.ncols();
    DMatrix::from_fn(data.nrows(), t, |r, c| data[(r, t - 1 - c)])
}

/// Average a slice of time slices with its time reverse
///
/// The slice is `[cutoff - backshift, T - backshift)`. With the defaults
/// (`cutoff = 1`, `backshift = 0`) this is the usual periodic fold that leaves
/// `t = 0` alone and symmetrises `t ↔ T - t`.
pub fn fold(data: &DMatrix<f64>, cutoff: usize, backshift: usize) -> Result<DMatrix<f64>> {
    if cutoff < backshift {
        return Err(Error::InvalidParameter(format!(
            "fold backshift {backshift} is larger than the cutoff {cutoff}"
        )));
    }
    let t = data.ncols();
    if backshift > t || cutoff > t {
        return Err(Error::InvalidParameter(format!(
            "fold cutoff {cutoff} / backshift {backshift} exceed {t} timeslices"
        )));
    }
    let lo = cutoff - backshift;
    let hi = t - backshift;

    let mut out = data.clone();
    for r in 0..data.nrows() {
        for c in lo..hi {
            let mirror = lo + hi - 1 - c;
            out[(r, c)] = 0.5 * (data[(r, c)] + data[(r, mirror)]);
        }
    }
    Ok(out)
}

/// Average `binsize` consecutive entries along `axis`
pub fn bin(data: &DMatrix<f64>, binsize: usize, axis: Axis) -> Result<DMatrix<f64>> {
    let length = axis.length(data);
    if binsize == 0 || length % binsize != 0 {
        return Err(Error::InvalidParameter(format!(
            "binsize {binsize} is not an integer divisor of the {axis:?} length {length}"
        )));
    }
    let bins = length / binsize;
    let norm = binsize as f64;
    let out = match axis {
        Axis::Configurations => DMatrix::from_fn(bins, data.ncols(), |b, c| {
            (0..binsize).map(|k| data[(b * binsize + k, c)]).sum::<f64>() / norm
        }),
        Axis::Timeslices => DMatrix::from_fn(data.nrows(), bins, |r, b| {
            (0..binsize).map(|k| data[(r, b * binsize + k)]).sum::<f64>() / norm
        }),
    };
    Ok(out)
}

/// Name-addressable built-in transforms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum BuiltinTransform {
    Roll { shift: i64, axis: Axis },
    Fold { cutoff: usize, backshift: usize },
    Flip,
    Bin { binsize: usize, axis: Axis },
}

fn integer_arg(name: &str, position: usize, value: f64) -> Result<i64> {
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "argument {position} of transform '{name}' must be an integer, got {value}"
        )));
    }
    Ok(value as i64)
}

fn count_arg(name: &str, position: usize, value: f64) -> Result<usize> {
    let v = integer_arg(name, position, value)?;
    usize::try_from(v).map_err(|_| {
        Error::InvalidParameter(format!(
            "argument {position} of transform '{name}' must be non-negative, got {v}"
        ))
    })
}

impl BuiltinTransform {
    pub fn roll_timeslices(shift: i64) -> Self {
        Self::Roll { shift, axis: Axis::Timeslices }
    }

    pub fn roll_configurations(shift: i64) -> Self {
        Self::Roll { shift, axis: Axis::Configurations }
    }

    pub fn bin_timeslices(binsize: usize) -> Self {
        Self::Bin { binsize, axis: Axis::Timeslices }
    }

    pub fn bin_configurations(binsize: usize) -> Self {
        Self::Bin { binsize, axis: Axis::Configurations }
    }

    /// Fold with the default cutoff of 1 and no backshift
    pub fn fold() -> Self {
        Self::Fold { cutoff: 1, backshift: 0 }
    }

    /// Look up a transform by name with positional arguments
    pub fn from_name(name: &str, args: &[f64]) -> Result<Self> {
        let arity = |expected: std::ops::RangeInclusive<usize>| -> Result<()> {
            if expected.contains(&args.len()) {
                Ok(())
            } else {
                Err(Error::InvalidParameter(format!(
                    "transform '{name}' takes {}..={} arguments, got {}",
                    expected.start(),
                    expected.end(),
                    args.len()
                )))
            }
        };

        match name {
            "roll" => {
                arity(2..=2)?;
                Ok(Self::Roll {
                    shift: integer_arg(name, 0, args[0])?,
                    axis: Axis::from_index(integer_arg(name, 1, args[1])?)?,
                })
            }
            "roll_timeslices" => {
                arity(1..=1)?;
                Ok(Self::roll_timeslices(integer_arg(name, 0, args[0])?))
            }
            "roll_configurations" => {
                arity(1..=1)?;
                Ok(Self::roll_configurations(integer_arg(name, 0, args[0])?))
            }
            "fold" => {
                arity(0..=2)?;
                let cutoff = args.first().map(|&v| count_arg(name, 0, v)).transpose()?.unwrap_or(1);
                let backshift = args.get(1).map(|&v| count_arg(name, 1, v)).transpose()?.unwrap_or(0);
                Ok(Self::Fold { cutoff, backshift })
            }
            "flip" => {
                arity(0..=0)?;
                Ok(Self::Flip)
            }
            "bin" => {
                arity(2..=2)?;
                Ok(Self::Bin {
                    binsize: count_arg(name, 0, args[0])?,
                    axis: Axis::from_index(integer_arg(name, 1, args[1])?)?,
                })
            }
            "bin_timeslices" => {
                arity(1..=1)?;
                Ok(Self::bin_timeslices(count_arg(name, 0, args[0])?))
            }
            "bin_configurations" => {
                arity(1..=1)?;
                Ok(Self::bin_configurations(count_arg(name, 0, args[0])?))
            }
            other => Err(Error::UnknownFunction(format!(
                "transform '{other}'; available: roll, roll_timeslices, roll_configurations, \
                 fold, flip, bin, bin_timeslices, bin_configurations"
            ))),
        }
    }
}

impl Transform for BuiltinTransform {
    fn apply(&self, data: DMatrix<f64>) -> Result<DMatrix<f64>> {
        match *self {
            Self::Roll { shift, axis } => Ok(roll(&data, shift, axis)),
            Self::Fold { cutoff, backshift } => fold(&data, cutoff, backshift),
            Self::Flip => Ok(flip(&data)),
            Self::Bin { binsize, axis } => bin(&data, binsize, axis),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Roll { .. } => "roll",
            Self::Fold { .. } => "fold",
            Self::Flip => "flip",
            Self::Bin { .. } => "bin",
        }
    }
}
