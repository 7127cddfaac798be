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

//! LAPACKe backend (dgelss, dgglse, dgeqp3, dgesdd).

use crate::{ColMatrix, FailResult, LinearAlgebra, SolverError, SvdSolution};
use ::lapacke::Layout;

const ZERO_PIVOT: f64 = 1e-12;

#[derive(Debug, Copy, Clone, Default)]
pub struct Lapack;

fn check_info(routine: &'static str, info: i32) -> FailResult<()> {
    match info {
        0 => Ok(()),
        info if info < 0 => panic!("bad arg number {} to {}", -info, routine),
        info => Err(SolverError { routine, info }.into()),
    }
}

impl LinearAlgebra for Lapack {
    fn least_squares_svd(&self, a: &ColMatrix, b: &[f64]) -> FailResult<SvdSolution> {
        ensure!(a.rows() == b.len(), "least squares: {} rows but {} right-hand sides", a.rows(), b.len());
        // lapacke hates size-zero arrays.
        if a.rows() == 0 || a.cols() == 0 {
            bail!("least squares on an empty {}x{} matrix", a.rows(), a.cols());
        }

        let m = a.rows() as i32;
        let n = a.cols() as i32;
        let ldb = i32::max(m, n);

        let mut a_data = a.col_major_data().to_vec();
        let mut b_data = b.to_vec();
        b_data.resize(ldb as usize, 0.0);

        let mut s = vec![0.0; i32::min(m, n) as usize];
        let mut rank = 0;
        let rcond = -1.0; // use machine precision

        let info = unsafe {
            ::lapacke::dgelss(Layout::ColumnMajor, m, n, 1, &mut a_data, m, &mut b_data, ldb, &mut s, rcond, &mut rank)
        };
        check_info("dgelss", info)?;

        b_data.truncate(n as usize);
        Ok(SvdSolution { x: b_data, rank: rank as usize, singular_values: s })
    }

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

        let mut a_data = a.col_major_data().to_vec();
        let mut c_data = c.col_major_data().to_vec();
        let mut b_data = b.to_vec();
        let mut d_data = d.to_vec();
        let mut x = vec![0.0; n];

        let info = unsafe {
            ::lapacke::dgglse(
                Layout::ColumnMajor, m as i32, n as i32, p as i32,
                &mut a_data, i32::max(m as i32, 1),
                &mut c_data, p as i32,
                &mut b_data, &mut d_data, &mut x,
            )
        };
        check_info("dgglse", info)?;
        Ok(x)
    }

    fn rank_qr(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize> {
        if mat.is_empty() {
            return Ok(0);
        }
        let (m, n) = (mat.rows(), mat.cols());
        let mut data = mat.col_major_data().to_vec();
        let mut jpvt = vec![0; n];
        let mut tau = vec![0.0; usize::min(m, n)];

        let info = unsafe {
            ::lapacke::dgeqp3(Layout::ColumnMajor, m as i32, n as i32, &mut data, m as i32, &mut jpvt, &mut tau)
        };
        check_info("dgeqp3", info)?;

        let r00 = data[0].abs();
        if r00 < ZERO_PIVOT {
            return Ok(0);
        }
        Ok((0..usize::min(m, n)).filter(|&i| data[i * m + i].abs() > tol * r00).count())
    }

    fn rank_svd(&self, mat: &ColMatrix, tol: f64) -> FailResult<usize> {
        if mat.is_empty() {
            return Ok(0);
        }
        let (m, n) = (mat.rows(), mat.cols());
        let mut data = mat.col_major_data().to_vec();
        let mut s = vec![0.0; usize::min(m, n)];
        let (mut u, mut vt) = ([0.0], [0.0]);

        let info = unsafe {
            ::lapacke::dgesdd(Layout::ColumnMajor, b'N', m as i32, n as i32, &mut data, m as i32, &mut s, &mut u, 1, &mut vt, 1)
        };
        check_info("dgesdd", info)?;
        Ok(s.iter().filter(|&&x| x > s[0] * tol).count())
    }
}
