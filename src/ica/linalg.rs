//! ndarray ↔ nalgebra bridging for the few dense decompositions ICA needs.
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2};

use crate::error::{PipelineError, Result};

pub(crate) fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (r, c) = a.dim();
    DMatrix::from_fn(r, c, |i, j| a[[i, j]])
}

pub(crate) fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Eigen-decomposition of a symmetric matrix, eigenvalues descending.
///
/// Returns `(values [n], vectors [n, n])` with eigenvectors as columns.
pub(crate) fn eigh_desc(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let eig = SymmetricEigen::new(to_dmatrix(a));
    let n = eig.eigenvalues.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eig.eigenvalues[j].total_cmp(&eig.eigenvalues[i]));

    let values = Array1::from_iter(order.iter().map(|&i| eig.eigenvalues[i]));
    let vectors = Array2::from_shape_fn((n, n), |(r, c)| eig.eigenvectors[(r, order[c])]);
    (values, vectors)
}

/// `(W Wᵀ)^{-1/2} W` — symmetric decorrelation used by parallel FastICA.
pub(crate) fn sym_decorrelation(w: &Array2<f64>) -> Result<Array2<f64>> {
    let (d, e) = eigh_desc(&w.dot(&w.t()));
    if d.iter().any(|&v| !(v > 0.0)) {
        return Err(PipelineError::Decomposition(
            "unmixing matrix became singular during iteration".into(),
        ));
    }
    let inv_sqrt = Array2::from_diag(&d.mapv(|v| 1.0 / v.sqrt()));
    Ok(e.dot(&inv_sqrt).dot(&e.t()).dot(w))
}

/// Moore–Penrose pseudo-inverse of a full-row-rank matrix: `Aᵀ (A Aᵀ)⁻¹`.
pub(crate) fn pinv_rows(a: &Array2<f64>) -> Result<Array2<f64>> {
    let gram = to_dmatrix(&a.dot(&a.t()));
    let inv = gram
        .try_inverse()
        .ok_or_else(|| PipelineError::Decomposition("unmixing matrix is not invertible".into()))?;
    Ok(a.t().dot(&from_dmatrix(&inv)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn eigh_sorted_descending() {
        let a = array![[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 1.0]];
        let (d, e) = eigh_desc(&a);
        assert_eq!(d.to_vec(), vec![5.0, 2.0, 1.0]);
        approx::assert_abs_diff_eq!(e[[1, 0]].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn decorrelated_rows_are_orthonormal() {
        let w = array![[1.0, 0.3, 0.1], [0.2, 1.5, -0.4], [0.0, 0.7, 0.9]];
        let d = sym_decorrelation(&w).unwrap();
        let g = d.dot(&d.t());
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                approx::assert_abs_diff_eq!(g[[i, j]], expect, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn pinv_of_square_is_inverse() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let p = pinv_rows(&a).unwrap();
        let i = a.dot(&p);
        approx::assert_abs_diff_eq!(i[[0, 0]], 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(i[[0, 1]], 0.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(i[[1, 1]], 1.0, epsilon = 1e-12);
    }
}
