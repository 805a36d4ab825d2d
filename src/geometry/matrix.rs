//! Dense matrix primitives shared by the pose and gaze math.
//!
//! Every operation checks operand shapes up front and reports a
//! [`Error::DimensionMismatch`] instead of panicking inside `nalgebra`.

use crate::{constants::EPSILON, Error, Result};
use nalgebra::DMatrix;

/// Transpose a matrix
#[must_use]
pub fn transpose(a: &DMatrix<f64>) -> DMatrix<f64> {
    a.transpose()
}

/// Generalized multiply-accumulate: `alpha * a * b + beta * c`
///
/// `c` may be omitted, in which case `beta` is ignored.
///
/// # Errors
///
/// Returns an error if:
/// - The inner dimensions of `a` and `b` differ
/// - `c` is given and its shape differs from the product shape
pub fn gemm(a: &DMatrix<f64>, b: &DMatrix<f64>, alpha: f64, c: Option<&DMatrix<f64>>, beta: f64) -> Result<DMatrix<f64>> {
    if a.ncols() != b.nrows() {
        return Err(Error::DimensionMismatch {
            operation: "gemm",
            left: a.shape(),
            right: b.shape(),
        });
    }

    let mut product = a * b;
    if alpha != 1.0 {
        product *= alpha;
    }

    if let Some(c) = c {
        if c.shape() != product.shape() {
            return Err(Error::DimensionMismatch {
                operation: "gemm accumulate",
                left: product.shape(),
                right: c.shape(),
            });
        }
        product += c * beta;
    }

    Ok(product)
}

/// Plain matrix product `a * b`
///
/// # Errors
///
/// Returns an error if the inner dimensions differ
pub fn matmul(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    gemm(a, b, 1.0, None, 0.0)
}

/// Invert a square matrix through its singular value decomposition
///
/// Singular values below a relative tolerance are treated as zero, so
/// rank-deficient input yields the Moore-Penrose pseudo-inverse rather
/// than infinities.
///
/// # Errors
///
/// Returns an error if:
/// - The matrix is not square
/// - The decomposition fails to produce its factors
pub fn invert(a: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if a.nrows() != a.ncols() {
        return Err(Error::DimensionMismatch {
            operation: "invert",
            left: a.shape(),
            right: (a.ncols(), a.nrows()),
        });
    }
    if a.is_empty() {
        return Ok(a.clone());
    }

    let svd = a.clone().svd(true, true);
    let largest = svd.singular_values.max();
    let tolerance = (largest * EPSILON).max(f64::MIN_POSITIVE);

    svd.pseudo_inverse(tolerance)
        .map_err(|e| Error::Decomposition(format!("SVD inversion failed: {e}")))
}

/// Least-squares solution `A` of `X * A = Y` via the normal equations
///
/// # Errors
///
/// Returns an error if `x` and `y` have a different number of rows
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if x.nrows() != y.nrows() {
        return Err(Error::DimensionMismatch {
            operation: "least squares",
            left: x.shape(),
            right: y.shape(),
        });
    }

    let xt = transpose(x);
    let xtx = matmul(&xt, x)?;
    let xtx_inv = invert(&xtx)?;
    let xty = matmul(&xt, y)?;
    matmul(&xtx_inv, &xty)
}
