//! Results of a fit-window scan

use crate::result::FitResult;
use crate::window::FitWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A window combination whose fit failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub key: String,
    pub windows: Vec<FitWindow>,
    pub reason: String,
}

/// Successful fits keyed by window combination, plus the failures
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub results: BTreeMap<String, FitResult>,
    pub failures: Vec<ScanFailure>,
}

impl ScanResult {
    /// Combinations attempted
    pub fn attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn get(&self, key: &str) -> Option<&FitResult> {
        self.results.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }
}
