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

//! Conjugate gradient for the symmetric positive definite systems that
//! appear in the quadratic step of split-Bregman.

use crate::util::{vdot, vsqnorm, sym_dot};
use ::ndarray::Array2;

/// Stop once `||r|| / ||b||` drops below this.
pub const CG_TOLERANCE: f64 = 1e-10;

/// Entries of the matrix below this are dropped from the IC(0) factor.
const IC_ZERO_CRITERION: f64 = 1e-8;

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Preconditioner {
    None,
    /// Incomplete Cholesky without fill-in.
    IncompleteCholesky,
}

impl Preconditioner {
    /// Decodes the numeric selector used in input files (`0` or `1`).
    ///
    /// # Panics
    ///
    /// On any other value; settings validation rejects those long before here.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Preconditioner::None,
            1 => Preconditioner::IncompleteCholesky,
            _ => panic!("(BUG) preconditioner selector must be 0 or 1, got {}", code),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Preconditioner::None => 0,
            Preconditioner::IncompleteCholesky => 1,
        }
    }
}

/// IC(0) factorization `A ~ L diag(d) L^T` with `d_i = 1 / L_ii`,
/// keeping the sparsity pattern of `A`.
#[derive(Debug, Clone)]
pub struct IncompleteCholesky {
    l: Array2<f64>,
    d: Vec<f64>,
}

impl IncompleteCholesky {
    pub fn factorize(a: &Array2<f64>) -> Self {
        let n = a.nrows();
        assert_eq!(a.dim(), (n, n), "IC(0) requires a square matrix");

        let mut l = Array2::zeros((n, n));
        let mut d = vec![0.0; n];
        if n == 0 {
            return IncompleteCholesky { l, d };
        }

        l[(0, 0)] = a[(0, 0)];
        d[0] = 1.0 / l[(0, 0)];

        for i in 1..n {
            for j in 0..=i {
                if a[(i, j)].abs() < IC_ZERO_CRITERION {
                    continue;
                }
                let mut lld = a[(i, j)];
                for k in 0..j {
                    lld -= l[(i, k)] * l[(j, k)] * d[k];
                }
                l[(i, j)] = lld;
            }
            d[i] = 1.0 / l[(i, i)];
        }
        IncompleteCholesky { l, d }
    }

    /// Applies the inverse of the factorization to `v`.
    pub fn solve(&self, v: &[f64]) -> Vec<f64> {
        let (l, d) = (&self.l, &self.d);
        let n = d.len();
        assert_eq!(v.len(), n);

        let mut tmp = vec![0.0; n];
        for i in 0..n {
            let mut acc = v[i];
            for j in 0..i {
                acc -= l[(i, j)] * tmp[j];
            }
            tmp[i] = acc / l[(i, i)];
        }

        let mut out = vec![0.0; n];
        for i in (0..n).rev() {
            let acc: f64 = (i + 1..n).map(|j| l[(j, i)] * out[j]).sum();
            out[i] = tmp[i] - d[i] * acc;
        }
        out
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CgOutput {
    pub iterations: u64,
    /// `||b - Q x|| / ||b||` on exit.
    pub relative_residual: f64,
}

/// Improves `x` toward the solution of `q x = b` (`q` symmetric positive definite),
/// starting from its current value, for at most `max_iter` steps.
///
/// `ic` must be `Some` exactly when `preconditioner` asks for IC(0).
pub fn conjugate_gradient(
    q: &Array2<f64>,
    b: &[f64],
    x: &mut [f64],
    max_iter: u64,
    preconditioner: Preconditioner,
    ic: Option<&IncompleteCholesky>,
    verbose: bool,
) -> CgOutput {
    let n = b.len();
    assert_eq!(x.len(), n);

    let apply_preconditioner = |r: &[f64]| -> Vec<f64> {
        match (preconditioner, ic) {
            (Preconditioner::None, _) => r.to_vec(),
            (Preconditioner::IncompleteCholesky, Some(ic)) => ic.solve(r),
            (Preconditioner::IncompleteCholesky, None) => {
                panic!("(BUG) IC(0) preconditioning requested without a factorization")
            },
        }
    };

    let bnorm2 = vsqnorm(b);
    if bnorm2 == 0.0 {
        x.iter_mut().for_each(|x| *x = 0.0);
        return CgOutput { iterations: 0, relative_residual: 0.0 };
    }

    let qx = sym_dot(q, x);
    let mut r: Vec<f64> = b.iter().zip(&qx).map(|(b, qx)| b - qx).collect();
    let mut rel = (vsqnorm(&r) / bnorm2).sqrt();
    if rel < CG_TOLERANCE {
        return CgOutput { iterations: 0, relative_residual: rel };
    }

    let mut z = apply_preconditioner(&r);
    let mut p = z.clone();
    let mut rz = vdot(&r, &z);

    let mut iterations = 0;
    while iterations < max_iter {
        iterations += 1;

        let qp = sym_dot(q, &p);
        let pqp = vdot(&p, &qp);
        if pqp == 0.0 {
            break;
        }
        let alpha = rz / pqp;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * qp[i];
        }

        rel = (vsqnorm(&r) / bnorm2).sqrt();
        if verbose {
            debug!("    CG {:5}: DIFF = {:e}", iterations, rel);
        }
        if rel < CG_TOLERANCE {
            break;
        }

        z = apply_preconditioner(&r);
        let rz_new = vdot(&r, &z);
        let beta = rz_new / rz;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
        rz = rz_new;
    }
    CgOutput { iterations, relative_residual: rel }
}
