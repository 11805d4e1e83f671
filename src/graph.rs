//! Graph kernel construction
//!
//! Turns the weighted road-sensor adjacency matrix into the convolution
//! kernels the network was trained with: scaled graph Laplacian and its
//! Chebyshev polynomial approximation.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

use crate::dataset::{read_csv_matrix, DataError};

/// Default width of the Gaussian distance kernel
pub const DEFAULT_SIGMA2: f64 = 0.1;

/// Default sparsity threshold applied after the kernel transform
pub const DEFAULT_EPSILON: f64 = 0.5;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("adjacency matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Chebyshev kernel order must be at least 1, got {0}")]
    BadKernelOrder(usize),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Load the weighted adjacency matrix from a headerless CSV.
///
/// A matrix that is already binary is treated as a connectivity matrix and
/// passed through untouched. Otherwise the raw pairwise distances are mapped
/// to edge weights with a thresholded Gaussian kernel: distances are scaled
/// by 1/10000, weights below `epsilon` and the diagonal are zeroed.
pub fn weight_matrix(
    path: &Path,
    sigma2: f64,
    epsilon: f64,
    scaling: bool,
) -> Result<Array2<f64>, GraphError> {
    let w = read_csv_matrix(path)?;
    if w.nrows() != w.ncols() {
        return Err(GraphError::NotSquare {
            rows: w.nrows(),
            cols: w.ncols(),
        });
    }

    let binary = w.iter().all(|&v| v == 0.0 || v == 1.0);
    if !scaling || binary {
        return Ok(w);
    }

    let n = w.nrows();
    let w = w / 10_000.0;
    let w2 = &w * &w;
    let mut kernel = w2.mapv(|v| (-v / sigma2).exp());
    for i in 0..n {
        kernel[(i, i)] = 0.0;
    }
    kernel.mapv_inplace(|v| if v >= epsilon { v } else { 0.0 });
    Ok(kernel)
}

/// Scaled graph Laplacian `2L/lambda_max - I`.
///
/// `L = D - W` is symmetrically normalized by `1/sqrt(d_i d_j)` wherever both
/// degrees are positive, then rescaled so its spectrum lands in [-1, 1] for
/// the Chebyshev recurrence.
pub fn scaled_laplacian(w: &Array2<f64>) -> Array2<f64> {
    let n = w.nrows();
    let d: Array1<f64> = w.sum_axis(Axis(1));

    let mut l = -w.clone();
    for i in 0..n {
        l[(i, i)] = d[i];
    }
    for i in 0..n {
        for j in 0..n {
            if d[i] > 0.0 && d[j] > 0.0 {
                l[(i, j)] /= (d[i] * d[j]).sqrt();
            }
        }
    }

    let lambda_max = largest_eigenvalue(&l, 1e-8, 1000).max(f64::EPSILON);
    2.0 * &l / lambda_max - Array2::<f64>::eye(n)
}

/// Chebyshev polynomial approximation of the graph convolution kernel.
///
/// `T0 = I`, `T1 = L`, `Tk = 2L·Tk-1 - Tk-2`, concatenated horizontally into
/// an `n x (ks·n)` matrix. `ks = 1` degenerates to the identity.
pub fn cheb_poly_approx(l: &Array2<f64>, ks: usize) -> Result<Array2<f64>, GraphError> {
    let n = l.nrows();
    match ks {
        0 => Err(GraphError::BadKernelOrder(ks)),
        1 => Ok(Array2::eye(n)),
        _ => {
            let mut terms: Vec<Array2<f64>> = vec![Array2::eye(n), l.clone()];
            for k in 2..ks {
                let next = 2.0 * l.dot(&terms[k - 1]) - &terms[k - 2];
                terms.push(next);
            }
            let views: Vec<_> = terms.iter().map(|t| t.view()).collect();
            Ok(ndarray::concatenate(Axis(1), &views).expect("kernel blocks share a shape"))
        }
    }
}

/// First-order approximation `I + D^-1/2 (W + I) D^-1/2` for single-kernel
/// configurations.
pub fn first_approx(w: &Array2<f64>) -> Array2<f64> {
    let n = w.nrows();
    let a = w + &Array2::<f64>::eye(n);
    let d = a.sum_axis(Axis(1));
    let sinv = d.mapv(|v| if v > 0.0 { v.powf(-0.5) } else { 0.0 });

    let mut out = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            out[(i, j)] = sinv[i] * a[(i, j)] * sinv[j];
        }
    }
    out + Array2::<f64>::eye(n)
}

/// Dominant eigenvalue by power iteration. The normalized Laplacian is
/// symmetric with a non-negative spectrum, so the dominant eigenvalue is the
/// largest real one.
fn largest_eigenvalue(m: &Array2<f64>, tol: f64, max_iter: usize) -> f64 {
    let n = m.nrows();
    if n == 0 {
        return 0.0;
    }

    // Non-uniform start so we never begin orthogonal to the dominant
    // eigenvector of a regular graph.
    let mut v = Array1::from_shape_fn(n, |i| 1.0 + i as f64);
    let norm = v.dot(&v).sqrt();
    v /= norm;

    let mut lambda = 0.0;
    for _ in 0..max_iter {
        let mv = m.dot(&v);
        let norm = mv.dot(&mv).sqrt();
        if norm == 0.0 {
            return lambda;
        }
        let next = mv / norm;
        let next_lambda = next.dot(&m.dot(&next));
        if (next_lambda - lambda).abs() < tol {
            return next_lambda;
        }
        lambda = next_lambda;
        v = next;
    }
    lambda
}
