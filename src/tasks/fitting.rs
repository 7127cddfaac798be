/* ********************************************************************** **
**  This file is part of fcfit.                                           **
**                                                                        **
**  fcfit is free software: you can redistribute it and/or modify it     **
**  under the terms of the GNU General Public License as published by    **
**  the Free Software Foundation, either version 3 of the License, or    **
**  (at your option) any later version.                                   **
**                                                                        **
**      http://www.gnu.org/licenses/                                      **
**                                                                        **
** Do note that, while the whole of fcfit is licensed under the GPL, many **
** parts of it are licensed under more permissive terms.                  **
** ********************************************************************** */

//! Least-squares solves of an assembled system.

use crate::FailResult;
use crate::assemble::LinearSystem;
use fcfit_linalg::{ColMatrix, LinearAlgebra, residual_norm2};

/// Tolerance of the QR rank diagnostic on `[A; C]`.
const RANK_TOL_QR: f64 = 1e-12;

/// How well a solution reproduces the forces.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct FitReport {
    pub rank: usize,
    pub num_params: usize,
    /// `sqrt(||A x - b||^2)`
    pub residual: f64,
    /// `100 * sqrt(||A x - b||^2 / ||f||^2)`
    pub fitting_error_percent: f64,
}

impl FitReport {
    fn new(system: &LinearSystem, x: &[f64], rank: usize) -> Self {
        let res2 = match x.is_empty() {
            true => system.b.iter().map(|b| b * b).sum(),
            false => residual_norm2(&system.a, x, &system.b),
        };
        let out = FitReport {
            rank,
            num_params: x.len(),
            residual: res2.sqrt(),
            fitting_error_percent: (res2 / system.f2norm).sqrt() * 100.0,
        };
        info!("  Residual sum of squares for the solution: {:e}", out.residual);
        info!("  Fitting error (%) : {:e}", out.fitting_error_percent);
        out
    }

    pub fn is_unique(&self) -> bool { self.rank == self.num_params }
}

/// `min ||A x - b||` by SVD.
///
/// A rank-deficient matrix is reported, not rejected; the minimum-norm
/// solution is returned.
pub fn fit_svd<L: LinearAlgebra>(
    la: &L,
    system: &LinearSystem,
) -> FailResult<(Vec<f64>, FitReport)> {
    let n = system.ncols();
    if n == 0 {
        info!("  Nothing to fit (every parameter is fixed).");
        return Ok((vec![], FitReport::new(system, &[], 0)));
    }

    let solution = la.least_squares_svd(&system.a, &system.b)?;
    info!("  RANK of the matrix = {}", solution.rank);
    warn_rank(solution.rank, n);

    let report = FitReport::new(system, &solution.x, solution.rank);
    Ok((solution.x, report))
}

/// `min ||A x - b||` subject to `C x = d`.
///
/// The rank of `[A; C]` is reported as a diagnostic.
pub fn fit_constrained<L: LinearAlgebra>(
    la: &L,
    system: &LinearSystem,
    c: &ColMatrix,
    d: &[f64],
) -> FailResult<(Vec<f64>, FitReport)> {
    let n = system.ncols();
    assert_eq!(c.cols(), n, "(BUG) constraint matrix does not match the design matrix");

    let rank = la.rank_qr(&system.a.vstack(c), RANK_TOL_QR)?;
    info!("  Rank of the matrix = {}", rank);
    warn_rank(rank, n);

    let x = la.constrained_least_squares(&system.a, &system.b, c, d)?;
    let report = FitReport::new(system, &x, rank);
    Ok((x, report))
}

fn warn_rank(rank: usize, n: usize) {
    if rank < n {
        warn!(
            "Matrix is rank-deficient (rank {} < {} parameters). \
             Force constants could not be determined uniquely.",
            rank, n,
        );
    } else {
        info!("  Unique solution of the fitting was obtained.");
    }
}
