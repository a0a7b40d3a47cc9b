//! Error types for resampled ensemble analysis
//!
//! Provides a unified error type for all lattice-stats crates. Every variant
//! that can be triggered by user input carries the offending values (shapes,
//! names, windows) in its message.

use thiserror::Error;

/// Core error type for resampling, data handling and fitting
#[derive(Error, Debug)]
pub enum Error {
    /// A resampler was reused on data it was not configured for
    #[error("Configuration mismatch in {context}: resampler was initialised for {expected} samples, got {actual}")]
    ConfigurationMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// Inconsistent counts or shapes across jointly used inputs
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// An argument identity matched no free parameter, constant or data series
    #[error("Unresolved parameter '{identity}' in function {function}; known identities: [{known}]")]
    UnresolvedParameter {
        identity: String,
        function: usize,
        known: String,
    },

    /// Covariance inversion or Cholesky factorisation failed
    #[error("Singular covariance: {0}")]
    SingularCovariance(String),

    /// A combination expression could not be parsed or evaluated
    #[error("Invalid combination expression '{expression}': {reason}")]
    InvalidCombinationExpression { expression: String, reason: String },

    /// No registered function under this name
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Invalid parameter provided to a function
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The minimiser could not produce a finite solution
    #[error("Convergence failure: {0}")]
    Convergence(String),

    /// Operation not provided by this implementation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// IO error (for data import)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for two counts that must agree
    pub fn count_mismatch(what: &str, expected: usize, other: &str, actual: usize) -> Self {
        Self::ShapeMismatch(format!(
            "number of {what} ({expected}) does not match number of {other} ({actual})"
        ))
    }

    /// Create an error for matrix shapes that must agree
    pub fn shape_mismatch(context: &str, lhs: (usize, usize), rhs: (usize, usize)) -> Self {
        Self::ShapeMismatch(format!(
            "{context}: {}x{} vs {}x{}",
            lhs.0, lhs.1, rhs.0, rhs.1
        ))
    }

    /// Create an error for a bad combination expression
    pub fn expression(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCombinationExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an error for NaN/Inf values
    pub fn non_finite(context: &str) -> Self {
        Self::Computation(format!("{context} contains NaN or infinite values"))
    }

    /// Whether a fit-window scan records this error and moves on
    pub fn is_recoverable_in_scan(&self) -> bool {
        matches!(self, Self::SingularCovariance(_) | Self::Convergence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_offending_values() {
        let err = Error::ConfigurationMismatch {
            expected: 50,
            actual: 25,
            context: "bootstrap".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("50") && msg.contains("25"));

        let err = Error::count_mismatch("correlators", 2, "fit windows", 3);
        assert!(err.to_string().contains("(2)"));
        assert!(err.to_string().contains("(3)"));
    }

    #[test]
    fn scan_recoverable_classification() {
        assert!(Error::SingularCovariance("x".into()).is_recoverable_in_scan());
        assert!(Error::Convergence("x".into()).is_recoverable_in_scan());
        assert!(!Error::ShapeMismatch("x".into()).is_recoverable_in_scan());
        assert!(!Error::UnresolvedParameter {
            identity: "A".into(),
            function: 0,
            known: String::new(),
        }
        .is_recoverable_in_scan());
    }
}
