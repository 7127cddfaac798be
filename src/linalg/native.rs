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

use crate::{ColMatrix, FailResult, LinearAlgebra, SolverError, SvdSolution};
use crate::qr::{householder_qr, pivoted_qr_diagonal};
use crate::col_matrix::dot;

use ::nalgebra::{DMatrix, DVector};

/// Below this, the leading pivot of a QR factorization counts as zero.
const ZERO_PIVOT: f64 = 1e-12;

/// Pure-rust backend (nalgebra SVD, Householder QR).
#[derive(Debug, Copy, Clone, Default)]
pub struct Native;

fn to_nalgebra(mat: &ColMatrix) -> DMatrix<f64>
{ DMatrix::from_column_slice(mat.rows(), mat.cols(), mat.col_major_data()) }

impl LinearAlgebra for Native {
    fn least_squares_svd(&self, a: &ColMatrix, b: &[f64]) -> FailResult<SvdSolution> {
        ensure!(a.rows() == b.len(), "least squares: {} rows but {} right-hand sides", a.rows(), b.len());
        if a.rows() == 0 || a.cols() == 0 {
            bail!("least squares on an empty {}x{} matrix", a.rows(), a.cols());
        }

        let svd = to_nalgebra(a).svd(true, true);
        let singular_values: Vec<f64> = svd.singular_values.iter().cloned().collect();
        let s_max = singular_values.iter().cloned().fold(0.0, f64::max);

        // same cutoff as dgelss with rcond = -1
        let cutoff = ::std::f64::EPSILON * s_max;
        let rank = singular_values.iter().filter(|&&s| s > cutoff).count();

        let x = svd.solve(&DVector::from_column_slice(b), cutoff)
            .map_err(|e| format_err!("SVD solve failed: {}", e))?;

        Ok(SvdSolution {
            x: x.iter().cloned().collect(),
            rank,
            singular_values,
        })
    }

    // Null-space method: with C^T = Q R, write x = Q1 y1 + Q2 y2.  The constraint
    // fixes y1 through R1^T y1 = d, and y2 solves an ordinary least squares problem
    // in the remaining N - P directions.
    fn constrained_least_squares(
        &self,
        a: &ColMatrix,
        b: &[f64],
        c: &ColMatrix,
        d: &[f64],
    ) -> FailResult<Vec<f64>> {
        let (m, n, p) = (a.rows(), a.cols(), c.rows());
        ensure!(c.cols() == n, "constraint matrix has {} columns, expected {}", c.cols(), n);
        ensure!(b.len() == m && d.len() == p, "constrained least squares: right-hand side length mismatch");
        ensure!(
            p <= n && n <= m + p,
            "constrained least squares requires P <= N <= M + P (M = {}, N = {}, P = {})", m, n, p
        );
        if p == 0 {
            return Ok(self.least_squares_svd(a, b)?.x);
        }

        let ct = c.view().t().to_owned();
        let (q, r) = householder_qr(ct.view());

        let r_max = (0..p).map(|i| r[(i, i)].abs()).fold(0.0, f64::max);
        let mut y1 = vec![0.0; p];
        for i in 0..p {
            let mut s = d[i];
            for k in 0..i {
                s -= r[(k, i)] * y1[k];
            }
            let r_ii = r[(i, i)];
            if r_ii.abs() <= ::std::f64::EPSILON * r_max * n as f64 {
                // same meaning as dgglse's info = 1
                return Err(SolverError { routine: "constrained_least_squares", info: 1 }.into());
            }
            y1[i] = s / r_ii;
        }

        let mut x: Vec<f64> = (0..n)
            .map(|i| (0..p).map(|k| q[(i, k)] * y1[k]).sum())
            .collect();
        if p == n {
            return Ok(x);
        }

        let ax1 = a.dot_vec(&x);
        let rhs: Vec<f64> = b.iter().zip(&ax1).map(|(bi, ai)| bi - ai).collect();

        let mut a_q2 = ColMatrix::zeros(m, n - p);
        for j in 0..n - p {
            let q_col: Vec<f64> = q.column(p + j).iter().cloned().collect();
            let col = a.dot_vec(&q_col);
            a_q2.column_mut(j).copy_from_slice(&col);
        }
        let y2 = self.least_squares_svd(&a_q2, &rhs)?.x;

        for i in 0..n {
            let q2_row: Vec<f64> = (0..n - p).map(|j| q[(i, p + j)]).collect();
            x[i] += dot(&q2_row, &y2);
        }
        Ok(x)
    }

    fn rank_qr(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize> {
        let diag = pivoted_qr_diagonal(mat.view());
        match diag.first() {
            None => Ok(0),
            Some(&r00) if r00 < ZERO_PIVOT => Ok(0),
            Some(&r00) => Ok(diag.iter().filter(|&&r| r > tol * r00).count()),
        }
    }

    fn rank_svd(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize> {
        if mat.is_empty() {
            return Ok(0);
        }
        let s = to_nalgebra(mat).singular_values();
        let s0 = s.iter().cloned().fold(0.0, f64::max);
        Ok(s.iter().filter(|&&x| x > s0 * tol).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_rows, residual_norm2};
    use ::rand::Rng;

    #[test]
    fn overdetermined_matches_normal_equations() {
        let mut rng = ::rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(1, 6);
            let m = rng.gen_range(n, 12);
            let data = (0..m * n).map(|_| 1.0 - 2.0 * rng.gen::<f64>()).collect();
            let a = ColMatrix::from_col_major(m, n, data);
            let b: Vec<f64> = (0..m).map(|_| rng.gen::<f64>()).collect();

            let sol = Native.least_squares_svd(&a, &b).unwrap();
            assert_eq!(sol.rank, n);

            // the residual is orthogonal to the column space
            let ax = a.dot_vec(&sol.x);
            let r: Vec<f64> = b.iter().zip(&ax).map(|(p, q)| p - q).collect();
            let atr = a.t_dot_vec(&r);
            assert_close!(abs=1e-9, atr, vec![0.0; n]);
        }
    }

    #[test]
    fn rank_deficient_is_not_an_error() {
        let a = from_rows(&[
            &[1.0, 0.0],
            &[2.0, 0.0],
            &[3.0, 0.0],
        ]);
        let sol = Native.least_squares_svd(&a, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(sol.rank, 1);
        // minimum norm solution has nothing along the unused direction
        assert_close!(abs=1e-12, sol.x, vec![1.0, 0.0]);
    }

    #[test]
    fn equality_constrained() {
        let a = from_rows(&[
            &[1.0, 0.0, 0.0],
            &[0.0, 1.0, 0.0],
            &[0.0, 0.0, 1.0],
        ]);
        let c = from_rows(&[&[1.0, 1.0, 1.0]]);
        let x = Native.constrained_least_squares(&a, &[1.0, 2.0, 3.0], &c, &[3.0]).unwrap();
        assert_close!(abs=1e-10, x, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn equality_constrained_random() {
        let mut rng = ::rand::thread_rng();
        for _ in 0..20 {
            let n = rng.gen_range(2, 7);
            let p = rng.gen_range(1, n);
            let m = rng.gen_range(n, 15);
            let a = ColMatrix::from_col_major(m, n, (0..m * n).map(|_| rng.gen::<f64>() - 0.5).collect());
            let c = ColMatrix::from_col_major(p, n, (0..p * n).map(|_| rng.gen::<f64>() - 0.5).collect());
            let b: Vec<f64> = (0..m).map(|_| rng.gen::<f64>()).collect();
            let d: Vec<f64> = (0..p).map(|_| rng.gen::<f64>()).collect();

            let x = Native.constrained_least_squares(&a, &b, &c, &d).unwrap();
            assert_close!(abs=1e-9, c.dot_vec(&x), d.clone());

            // no feasible perturbation along the null space of C improves the fit
            let base = residual_norm2(&a, &x, &b);
            let ct = c.view().t().to_owned();
            let (q, _) = householder_qr(ct.view());
            for j in p..n {
                for &h in &[1e-4, -1e-4] {
                    let x2: Vec<f64> = x.iter().enumerate().map(|(i, xi)| xi + h * q[(i, j)]).collect();
                    assert!(residual_norm2(&a, &x2, &b) >= base - 1e-14);
                }
            }
        }
    }

    #[test]
    fn ranks() {
        let a = from_rows(&[
            &[1.0, 0.0, 1.0],
            &[2.0, 1.0, 3.0],
            &[0.0, 1.0, 1.0],
        ]);
        assert_eq!(Native.rank_qr(&a, 1e-12).unwrap(), 2);
        assert_eq!(Native.rank_svd(&a, 1e-12).unwrap(), 2);
        assert_eq!(Native.rank_qr(&ColMatrix::zeros(3, 2), 1e-12).unwrap(), 0);
    }

    #[test]
    fn rank_never_decreases_when_rows_are_added() {
        let mut rng = ::rand::thread_rng();
        let n = 5;
        let mut a = ColMatrix::zeros(0, n);
        let mut last = 0;
        for _ in 0..8 {
            let row = ColMatrix::from_col_major(1, n, (0..n).map(|_| rng.gen::<f64>()).collect());
            a = a.vstack(&row);
            let rank = Native.rank_qr(&a, 1e-12).unwrap();
            assert!(rank >= last);
            last = rank;
        }
        assert_eq!(last, n);
    }
}
