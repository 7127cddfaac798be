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

use ::ndarray::Array2;
use ::rayon::prelude::*;

pub(crate) fn vdot(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn vsqnorm(a: &[f64]) -> f64 { vdot(a, a) }

pub(crate) fn vsum_abs(a: &[f64]) -> f64 { a.iter().map(|x| x.abs()).sum() }

/// `||a - b||^2`
pub(crate) fn vsqdist(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Dense symmetric `q x`, rows in parallel.
pub(crate) fn sym_dot(q: &Array2<f64>, x: &[f64]) -> Vec<f64> {
    let n = x.len();
    assert_eq!(q.dim(), (n, n));
    (0..n).into_par_iter()
        .map(|i| q.row(i).iter().zip(x).map(|(a, b)| a * b).sum())
        .collect()
}

/// Whether the (1-based) `iteration` gets a periodic report.
pub(crate) fn report_due(iteration: u64, frequency: u64) -> bool {
    frequency > 0 && iteration % frequency == 0
}

/// `A^T A` for a column-major `A`, columns in parallel.
pub(crate) fn par_gram(a: &::fcfit_linalg::ColMatrix) -> Array2<f64> {
    let n = a.cols();
    let rows: Vec<Vec<f64>> = (0..n).into_par_iter()
        .map(|i| gram_column(a, i))
        .collect();

    let mut out = Array2::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, x) in row.into_iter().enumerate() {
            out[(i, j)] = x;
        }
    }
    out
}

/// Column `i` of `A^T A`.
pub(crate) fn gram_column(a: &::fcfit_linalg::ColMatrix, i: usize) -> Vec<f64> {
    let col_i = a.column(i);
    (0..a.cols()).map(|j| vdot(a.column(j), col_i)).collect()
}
