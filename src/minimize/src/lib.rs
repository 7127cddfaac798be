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

//! Solvers for L1-penalized linear least squares.
//!
//! Two algorithms are provided: [`CoordinateDescent`], which works on a
//! (possibly standardized) design matrix and lazily caches column products,
//! and [`split_bregman`], which alternates a quadratic subproblem (solved by
//! conjugate gradient) with a soft-thresholding step.

extern crate fcfit_linalg;
extern crate ndarray;
extern crate rayon;
extern crate serde;
#[macro_use] extern crate serde_derive;
#[macro_use] extern crate log;

#[cfg(test)] #[macro_use] extern crate fcfit_assert_close;
#[cfg(test)] extern crate rand;
#[cfg(test)] extern crate serde_json;

pub(crate) mod util;

pub mod cg;
pub use crate::cg::{conjugate_gradient, Preconditioner, IncompleteCholesky};

pub mod coordinate_descent;
pub use crate::coordinate_descent::CoordinateDescent;

pub mod split_bregman;
pub use crate::split_bregman::{split_bregman, BregmanState, Initialization};

/// The soft-thresholding operator, `sign(x) * max(|x| - a, 0)`.
///
/// This is the proximal operator of `a * |x|`.
pub fn shrink(x: f64, a: f64) -> f64 {
    let excess = x.abs() - a;
    if excess > 0.0 {
        excess.copysign(x)
    } else {
        0.0
    }
}

/// `||A x - f||^2 / f2norm`.
pub fn calculate_residual(
    a: &fcfit_linalg::ColMatrix,
    x: &[f64],
    f: &[f64],
    f2norm: f64,
) -> f64 {
    fcfit_linalg::residual_norm2(a, x, f) / f2norm
}

/// Outcome of an iterative solve, for reporting.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Convergence {
    /// Iterations performed (counting the final one).
    pub iterations: u64,
    pub converged: bool,
    /// `sqrt(||x_k - x_{k-1}||^2 / N)` at the last iteration.
    pub final_diff: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrink_values() {
        assert_eq!(shrink(3.0, 1.0), 2.0);
        assert_eq!(shrink(-3.0, 1.0), -2.0);
        assert_eq!(shrink(0.5, 1.0), 0.0);
        assert_eq!(shrink(-1.0, 1.0), 0.0);
        assert_eq!(shrink(0.0, 1.0), 0.0);
        assert_eq!(shrink(2.5, 0.0), 2.5);
    }

    #[test]
    fn shrink_fixed_point() {
        for &t in &[0.1, 1.0, 3.5] {
            for &z in &[-10.0, -t, -0.5 * t, 0.0, 0.5 * t, t, 10.0] {
                let once = shrink(z, t);
                if once == 0.0 {
                    assert_eq!(shrink(once, t), 0.0);
                } else {
                    // moves toward zero by exactly t
                    assert_close!(abs=1e-14, (z - once).abs(), t);
                    assert_close!(abs=1e-14, shrink(once + t.copysign(once), t), once);
                }
            }
        }
    }
}
