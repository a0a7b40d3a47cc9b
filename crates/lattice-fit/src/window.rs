//! Fit windows and window scanning
//!
//! A fit window selects part of a correlator's variable axis: either an
//! inclusive range `[lo, hi]` or an explicit list of indices. Scanning
//! generates every admissible sub-range of a base range and takes the
//! Cartesian product across correlators.

use lattice_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Part of the variable axis used in a fit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitWindow {
    /// Inclusive range `[lo, hi]`
    Range { lo: usize, hi: usize },
    /// Explicit indices, used in the order given
    Indices(Vec<usize>),
}

impl FitWindow {
    pub fn range(lo: usize, hi: usize) -> Self {
        Self::Range { lo, hi }
    }

    pub fn indices(indices: Vec<usize>) -> Self {
        Self::Indices(indices)
    }

    /// Explicit index form
    pub fn to_indices(&self) -> Result<Vec<usize>> {
        match self {
            Self::Range { lo, hi } if lo > hi => Err(Error::InvalidParameter(format!(
                "fit window {self} has its lower edge above its upper edge"
            ))),
            Self::Range { lo, hi } => Ok((*lo..=*hi).collect()),
            Self::Indices(indices) if indices.is_empty() => {
                Err(Error::InvalidParameter("fit window has no indices".to_string()))
            }
            Self::Indices(indices) => Ok(indices.clone()),
        }
    }

    /// Number of selected points
    pub fn len(&self) -> usize {
        match self {
            Self::Range { lo, hi } => (hi + 1).saturating_sub(*lo),
            Self::Indices(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicit indices, checked against a correlator with `variables` entries
    pub fn checked_indices(&self, variables: usize) -> Result<Vec<usize>> {
        let indices = self.to_indices()?;
        if let Some(bad) = indices.iter().find(|&&i| i >= variables) {
            return Err(Error::ShapeMismatch(format!(
                "fit window {self} selects index {bad} but the correlator has {variables} variables"
            )));
        }
        Ok(indices)
    }
}

impl fmt::Display for FitWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { lo, hi } => write!(f, "[{lo}, {hi}]"),
            Self::Indices(indices) => {
                let parts: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<(usize, usize)> for FitWindow {
    fn from((lo, hi): (usize, usize)) -> Self {
        Self::Range { lo, hi }
    }
}

impl From<Vec<usize>> for FitWindow {
    fn from(indices: Vec<usize>) -> Self {
        Self::Indices(indices)
    }
}

/// Canonical key of a window combination, e.g. `"[4, 12], [6, 10]"`
pub fn combination_key(windows: &[FitWindow]) -> String {
    windows
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Scan settings for one correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAxis {
    /// Smallest sub-window width; `None` or 1 keeps the base window only
    pub min_width: Option<usize>,
    /// Largest lower edge; defaults to the upper edge of the base window
    pub max_low: Option<usize>,
    pub enabled: bool,
}

impl Default for ScanAxis {
    fn default() -> Self {
        Self {
            min_width: None,
            max_low: None,
            enabled: true,
        }
    }
}

impl ScanAxis {
    pub fn with_min_width(min_width: usize) -> Self {
        Self {
            min_width: Some(min_width),
            ..Self::default()
        }
    }

    pub fn max_low(mut self, max_low: usize) -> Self {
        self.max_low = Some(max_low);
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    fn scans(&self) -> bool {
        self.enabled && matches!(self.min_width, Some(m) if m > 1)
    }
}

/// Window-scan configuration: one axis per correlator plus an upper-edge stride
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowScan {
    pub axes: Vec<ScanAxis>,
    /// Step between successive upper edges ("thinning")
    pub stride: usize,
}

impl WindowScan {
    /// The same minimum width for `correlators` correlators
    pub fn uniform(correlators: usize, min_width: usize) -> Self {
        Self {
            axes: vec![ScanAxis::with_min_width(min_width); correlators],
            stride: 1,
        }
    }

    pub fn from_axes(axes: Vec<ScanAxis>) -> Self {
        Self { axes, stride: 1 }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Sub-windows of `base` admitted by `axis`
    pub fn sub_windows(&self, base: &FitWindow, axis: &ScanAxis) -> Result<Vec<FitWindow>> {
        if !axis.scans() {
            return Ok(vec![base.clone()]);
        }
        if self.stride == 0 {
            return Err(Error::InvalidParameter("scan stride must be positive".to_string()));
        }
        let FitWindow::Range { lo, hi } = *base else {
            return Err(Error::InvalidParameter(format!(
                "cannot scan the explicit-index window {base}; use a range"
            )));
        };
        let min_width = axis.min_width.unwrap_or(1);
        let max_low = axis.max_low.unwrap_or(hi).min(hi);

        let mut windows = Vec::new();
        for low in lo..=max_low {
            let first_high = low + min_width - 1;
            windows.extend((first_high..=hi).step_by(self.stride).map(|high| FitWindow::range(low, high)));
        }
        Ok(windows)
    }

    /// Cartesian product of every correlator's sub-windows
    pub fn combinations(&self, bases: &[FitWindow]) -> Result<Vec<Vec<FitWindow>>> {
        if self.axes.len() != bases.len() {
            return Err(Error::count_mismatch(
                "scan axes",
                self.axes.len(),
                "fit windows",
                bases.len(),
            ));
        }
        let mut combos: Vec<Vec<FitWindow>> = vec![Vec::new()];
        for (base, axis) in bases.iter().zip(&self.axes) {
            let options = self.sub_windows(base, axis)?;
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    options.iter().map(move |w| {
                        let mut next = prefix.clone();
                        next.push(w.clone());
                        next
                    })
                })
                .collect();
        }
        Ok(combos)
    }
}
