//! Small matrix helpers shared across crates
//!
//! Rows are samples or replicas, columns are the variable axis.

use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Mean over rows: one value per column
pub fn column_means(data: &DMatrix<f64>) -> DVector<f64> {
    let rows = data.nrows().max(1) as f64;
    DVector::from_iterator(data.ncols(), data.column_iter().map(|c| c.sum() / rows))
}

/// Sum over rows: one value per column
pub fn column_sums(data: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(data.ncols(), data.column_iter().map(|c| c.sum()))
}

/// Entries of `v` at `indices`, in order
pub fn select(v: &DVector<f64>, indices: &[usize]) -> DVector<f64> {
    DVector::from_iterator(indices.len(), indices.iter().map(|&i| v[i]))
}

/// Columns of `m` at `indices`, in order
pub fn select_columns(m: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), indices.len(), |r, c| m[(r, indices[c])])
}

/// Sub-matrix with the given row and column index sets
pub fn select_block(m: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |r, c| m[(rows[r], cols[c])])
}

/// Row `i` as a column vector
pub fn row_vector(m: &DMatrix<f64>, i: usize) -> DVector<f64> {
    DVector::from_iterator(m.ncols(), m.row(i).iter().copied())
}

/// A vector as a `1 × n` matrix
pub fn as_row(v: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_row_slice(1, v.len(), v.as_slice())
}

/// Concatenate vectors end to end
pub fn concat_vectors<'a, I>(parts: I) -> DVector<f64>
where
    I: IntoIterator<Item = &'a DVector<f64>>,
{
    let values: Vec<f64> = parts
        .into_iter()
        .flat_map(|v| v.iter().copied())
        .collect();
    DVector::from_vec(values)
}

/// Concatenate matrices along the variable (column) axis
pub fn concat_columns(parts: &[&DMatrix<f64>]) -> Result<DMatrix<f64>> {
    let Some(first) = parts.first() else {
        return Ok(DMatrix::zeros(0, 0));
    };
    let rows = first.nrows();
    if let Some(bad) = parts.iter().find(|m| m.nrows() != rows) {
        return Err(Error::ShapeMismatch(format!(
            "cannot join along the variable axis: {} rows vs {} rows",
            rows,
            bad.nrows()
        )));
    }
    let total: usize = parts.iter().map(|m| m.ncols()).sum();
    let mut out = DMatrix::zeros(rows, total);
    let mut offset = 0;
    for part in parts {
        for c in 0..part.ncols() {
            out.set_column(offset + c, &part.column(c));
        }
        offset += part.ncols();
    }
    Ok(out)
}

/// Covariance-style outer product sum `Σ_i (x_i - c)(x_i - c)^T` over rows
pub fn centred_outer_sum(rows: &DMatrix<f64>, centre: &DVector<f64>) -> DMatrix<f64> {
    let n = rows.ncols();
    let mut d = rows.clone();
    for mut row in d.row_iter_mut() {
        for j in 0..n {
            row[j] -= centre[j];
        }
    }
    d.tr_mul(&d)
}
