//! Shared element-wise arithmetic for data containers
//!
//! Configurations, correlators and the combination-expression evaluator all
//! route their arithmetic through the explicit operator enums in this module
//! instead of each carrying its own operator plumbing.
//!
//! Broadcasting rules for two arrays:
//! - equal shapes combine element-wise
//! - a `1 × n` row combines with every row of an `r × n` array
//! - a `1 × 1` array acts as a scalar

use crate::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary element-wise operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    /// Apply to a pair of scalars
    #[inline]
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Rem => lhs % rhs,
            Self::Pow => lhs.powf(rhs),
        }
    }

    /// Infix symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Pow => "^",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary element-wise operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Ln,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Acosh,
    Asinh,
}

impl UnaryOp {
    /// Apply to a scalar
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Neg => -x,
            Self::Abs => x.abs(),
            Self::Exp => x.exp(),
            Self::Ln => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Acosh => x.acosh(),
            Self::Asinh => x.asinh(),
        }
    }

    /// Function-call name used by combination expressions
    pub fn name(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Abs => "abs",
            Self::Exp => "exp",
            Self::Ln => "log",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Acosh => "arccosh",
            Self::Asinh => "arcsinh",
        }
    }

    /// Look up a function-call name
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [UnaryOp; 13] = [
            UnaryOp::Neg,
            UnaryOp::Abs,
            UnaryOp::Exp,
            UnaryOp::Ln,
            UnaryOp::Sqrt,
            UnaryOp::Sin,
            UnaryOp::Cos,
            UnaryOp::Tan,
            UnaryOp::Sinh,
            UnaryOp::Cosh,
            UnaryOp::Tanh,
            UnaryOp::Acosh,
            UnaryOp::Asinh,
        ];
        ALL.into_iter().find(|op| op.name() == name)
    }
}

/// Apply a unary operator to every element
pub fn unary(op: UnaryOp, data: &DMatrix<f64>) -> DMatrix<f64> {
    data.map(|x| op.apply(x))
}

/// `data ∘ scalar`, element-wise
pub fn binary_scalar(op: BinaryOp, data: &DMatrix<f64>, scalar: f64) -> DMatrix<f64> {
    data.map(|x| op.apply(x, scalar))
}

/// `scalar ∘ data`, element-wise
pub fn scalar_binary(op: BinaryOp, scalar: f64, data: &DMatrix<f64>) -> DMatrix<f64> {
    data.map(|x| op.apply(scalar, x))
}

/// `lhs ∘ rhs` with row and scalar broadcasting
pub fn broadcast_binary(op: BinaryOp, lhs: &DMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (lr, lc) = lhs.shape();
    let (rr, rc) = rhs.shape();

    if (lr, lc) == (rr, rc) {
        return Ok(lhs.zip_map(rhs, |a, b| op.apply(a, b)));
    }
    if (rr, rc) == (1, 1) {
        return Ok(binary_scalar(op, lhs, rhs[(0, 0)]));
    }
    if (lr, lc) == (1, 1) {
        return Ok(scalar_binary(op, lhs[(0, 0)], rhs));
    }
    if lc == rc && lr == 1 {
        return Ok(DMatrix::from_fn(rr, rc, |i, j| op.apply(lhs[(0, j)], rhs[(i, j)])));
    }
    if lc == rc && rr == 1 {
        return Ok(DMatrix::from_fn(lr, lc, |i, j| op.apply(lhs[(i, j)], rhs[(0, j)])));
    }

    Err(Error::shape_mismatch(
        &format!("cannot broadcast operands of '{op}'"),
        (lr, lc),
        (rr, rc),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn row_broadcasts_over_rows() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let row = DMatrix::from_row_slice(1, 3, &[10.0, 20.0, 30.0]);

        let out = broadcast_binary(BinaryOp::Add, &m, &row).unwrap();
        assert_eq!(out, DMatrix::from_row_slice(2, 3, &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]));

        let out = broadcast_binary(BinaryOp::Sub, &row, &m).unwrap();
        assert_eq!(out, DMatrix::from_row_slice(2, 3, &[9.0, 18.0, 27.0, 6.0, 15.0, 24.0]));
    }

    #[test]
    fn incompatible_shapes_are_reported() {
        let a = DMatrix::<f64>::zeros(2, 3);
        let b = DMatrix::<f64>::zeros(2, 4);
        let err = broadcast_binary(BinaryOp::Mul, &a, &b).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2x3") && msg.contains("2x4"), "{msg}");
    }

    #[test]
    fn scalar_forms() {
        let m = DMatrix::from_row_slice(1, 2, &[2.0, 4.0]);
        assert_eq!(binary_scalar(BinaryOp::Div, &m, 2.0), DMatrix::from_row_slice(1, 2, &[1.0, 2.0]));
        assert_eq!(scalar_binary(BinaryOp::Div, 8.0, &m), DMatrix::from_row_slice(1, 2, &[4.0, 2.0]));
        let pow = broadcast_binary(BinaryOp::Pow, &m, &DMatrix::from_element(1, 1, 2.0)).unwrap();
        assert_eq!(pow, DMatrix::from_row_slice(1, 2, &[4.0, 16.0]));
    }

    #[test]
    fn unary_names_round_trip() {
        for name in ["exp", "log", "sqrt", "abs", "cosh", "arccosh", "arcsinh"] {
            let op = UnaryOp::from_name(name).unwrap();
            assert_eq!(op.name(), name);
        }
        assert!(UnaryOp::from_name("system").is_none());
        assert_relative_eq!(UnaryOp::Acosh.apply(1.0_f64.cosh()), 1.0, epsilon = 1e-12);
    }
}
