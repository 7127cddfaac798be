/* ************************************************************************ **
** This file is part of fcfit, and is licensed under EITHER the MIT license **
** or the Apache 2.0 license, at your option.                               **
**                                                                          **
**     http://www.apache.org/licenses/LICENSE-2.0                           **
**     http://opensource.org/licenses/MIT                                   **
**                                                                          **
** Be aware that not all of fcfit is provided under this permissive license,**
** and that the project as a whole is licensed under the GPL 3.0.           **
** ************************************************************************ */

#[macro_use]
extern crate failure;
extern crate nalgebra;
extern crate ndarray;
#[cfg(feature = "lapack")]
extern crate lapacke;
#[cfg(feature = "lapack")]
extern crate lapack_src;
#[cfg(test)]
#[macro_use]
extern crate fcfit_assert_close;
#[cfg(test)]
extern crate rand;

pub type FailResult<T> = Result<T, ::failure::Error>;

pub use self::col_matrix::ColMatrix;
mod col_matrix;

pub use self::qr::{householder_qr, pivoted_qr_diagonal};
mod qr;

pub use self::native::Native;
mod native;

#[cfg(feature = "lapack")]
pub use self::lapack::Lapack;
#[cfg(feature = "lapack")]
mod lapack;

/// A dense factorization failed outright (as opposed to merely being rank-deficient).
#[derive(Debug, Fail)]
#[fail(display = "{} failed (info = {})", routine, info)]
pub struct SolverError {
    pub routine: &'static str,
    pub info: i32,
}

/// Output of an SVD-based least squares solve.
#[derive(Debug, Clone)]
pub struct SvdSolution {
    pub x: Vec<f64>,
    /// Number of singular values above `eps * s_max`.
    pub rank: usize,
    pub singular_values: Vec<f64>,
}

/// The dense kernels the fitter needs.
///
/// All matrices are column-major; the layout is part of the contract with
/// the LAPACK-style routines behind this trait.
pub trait LinearAlgebra: Sync {
    /// Minimizes `||A x - b||` using the SVD, treating singular values below
    /// machine precision (relative to the largest) as zero.
    ///
    /// Rank deficiency is not an error; the minimum-norm solution is returned.
    fn least_squares_svd(&self, a: &ColMatrix, b: &[f64]) -> FailResult<SvdSolution>;

    /// Minimizes `||A x - b||` subject to `C x = d`.
    ///
    /// Requires `rows(C) <= cols(A) <= rows(A) + rows(C)` and `C` of full row rank.
    fn constrained_least_squares(
        &self,
        a: &ColMatrix,
        b: &[f64],
        c: &ColMatrix,
        d: &[f64],
    ) -> FailResult<Vec<f64>>;

    /// Rank revealed by column-pivoted QR: the number of `|R_ii| > tol * |R_00|`.
    fn rank_qr(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize>;

    /// Rank from singular values: the number of `s_i > tol * s_0`.
    fn rank_svd(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize>;
}

impl<'a, L: LinearAlgebra + ?Sized> LinearAlgebra for &'a L {
    fn least_squares_svd(&self, a: &ColMatrix, b: &[f64]) -> FailResult<SvdSolution>
    { (**self).least_squares_svd(a, b) }

    fn constrained_least_squares(&self, a: &ColMatrix, b: &[f64], c: &ColMatrix, d: &[f64]) -> FailResult<Vec<f64>>
    { (**self).constrained_least_squares(a, b, c, d) }

    fn rank_qr(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize>
    { (**self).rank_qr(mat, tol) }

    fn rank_svd(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize>
    { (**self).rank_svd(mat, tol) }
}

/// Squared 2-norm of `A x - b`.
pub fn residual_norm2(a: &ColMatrix, x: &[f64], b: &[f64]) -> f64 {
    let ax = a.dot_vec(x);
    ax.iter().zip(b).map(|(p, q)| (p - q) * (p - q)).sum()
}

pub fn norm2(v: &[f64]) -> f64 { v.iter().map(|x| x * x).sum() }

// `ndarray` matrices in tests are easier to write row by row.
#[cfg(test)]
pub(crate) fn from_rows(rows: &[&[f64]]) -> ColMatrix {
    let ncols = rows.first().map_or(0, |r| r.len());
    let arr = ::ndarray::Array2::from_shape_fn((rows.len(), ncols), |(i, j)| rows[i][j]);
    ColMatrix::from(arr)
}
