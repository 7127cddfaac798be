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

#![allow(non_snake_case)]

//! Cyclic coordinate descent for `(1/2M) ||A x - b||^2 + alpha ||x||_1`.
//!
//! The solver object keeps the gradient `A^T (b - A x)` and the iterate
//! between calls, so that a decreasing sequence of `alpha` can be swept
//! with warm starts.  Columns of `A^T A` are computed on demand, the first
//! time the corresponding coefficient changes.

use crate::{shrink, Convergence};
use crate::util::{vsqnorm, vsum_abs, gram_column, report_due};
use ::fcfit_linalg::ColMatrix;
use ::rayon::prelude::*;

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Stop when `sqrt(||x_k - x_{k-1}||^2 / N)` drops below this.
    #[serde(default = "settings__tolerance")] pub tolerance: f64,
    #[serde(default = "settings__max_iter")] pub max_iter: u64,
    /// Emit a progress report every this many iterations (0 = never).
    #[serde(default = "settings__output_frequency")] pub output_frequency: u64,
}

fn settings__tolerance() -> f64 { 1e-7 }
fn settings__max_iter() -> u64 { 100_000 }
fn settings__output_frequency() -> u64 { 1000 }

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tolerance: settings__tolerance(),
            max_iter: settings__max_iter(),
            output_frequency: settings__output_frequency(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinateDescent {
    /// Design matrix, standardized if requested.
    a: ColMatrix,
    /// Target, centered if standardized.
    b: Vec<f64>,
    /// `A^T b`
    c: Vec<f64>,
    grad: Vec<f64>,
    /// Lazily computed columns of `A^T A`.
    prod: Vec<Option<Vec<f64>>>,
    /// Maps standardized coefficients back to the original columns.
    factor_std: Vec<f64>,
    /// `M / ||A_i||^2`, only used without standardization.
    scale_beta: Vec<f64>,
    /// Columns with zero spread never move away from zero.
    active: Vec<bool>,
    standardize: bool,
    x: Vec<f64>,
    f2norm: f64,
}

impl CoordinateDescent {
    /// `f2norm` is only used to report relative residuals.
    pub fn new(amat: &ColMatrix, fvec: &[f64], f2norm: f64, standardize: bool) -> Self {
        let (m, n) = (amat.rows(), amat.cols());
        assert_eq!(fvec.len(), m);
        let minv = 1.0 / m as f64;

        let mut a = amat.clone();
        let mut b = fvec.to_vec();
        let mut factor_std = vec![1.0; n];
        let mut scale_beta = vec![1.0; n];
        let mut active = vec![true; n];

        if standardize {
            info!("Standardizing the design matrix and target vector; dnorm is not used for scaling.");
            for j in 0..n {
                let col = a.column_mut(j);
                let mean = col.iter().sum::<f64>() * minv;
                let sqmean = vsqnorm(col) * minv;
                let std = (sqmean - mean * mean).max(0.0).sqrt();
                if std == 0.0 {
                    col.iter_mut().for_each(|x| *x = 0.0);
                    factor_std[j] = 0.0;
                    active[j] = false;
                    continue;
                }
                col.iter_mut().for_each(|x| *x = (*x - mean) / std);
                factor_std[j] = 1.0 / std;
            }
            let mean = b.iter().sum::<f64>() * minv;
            b.iter_mut().for_each(|x| *x -= mean);
        } else {
            info!("No standardization; columns keep the scale set by dnorm.");
            for j in 0..n {
                let sqmean = vsqnorm(a.column(j)) * minv;
                if sqmean == 0.0 {
                    active[j] = false;
                    continue;
                }
                scale_beta[j] = 1.0 / sqmean;
            }
        }

        let c = a.t_dot_vec(&b);
        let grad = c.clone();
        let out = CoordinateDescent {
            a, b, c, grad,
            prod: vec![None; n],
            factor_std, scale_beta, active, standardize,
            x: vec![0.0; n],
            f2norm,
        };
        info!("Recommended max alpha = {}", out.recommended_max_alpha());
        out
    }

    /// `max |A^T b| / M`; every coefficient is zero at or above this alpha.
    pub fn recommended_max_alpha(&self) -> f64 {
        let m = self.a.rows() as f64;
        self.c.iter().cloned().map(f64::abs).fold(0.0, f64::max) / m
    }

    /// Runs coordinate descent for one value of `alpha`.
    ///
    /// With `warm_start`, continues from the iterate and gradient of the previous run.
    pub fn run(&mut self, alpha: f64, warm_start: bool, settings: &Settings) -> Convergence {
        let n = self.x.len();
        let minv = 1.0 / self.a.rows() as f64;

        if !warm_start {
            self.x = vec![0.0; n];
            self.grad = self.c.clone();
        }
        if n == 0 {
            return Convergence { iterations: 0, converged: true, final_diff: 0.0 };
        }

        let CoordinateDescent {
            ref a, ref mut grad, ref mut prod, ref scale_beta, ref active,
            standardize, ref mut x, ..
        } = *self;

        let mut iterations = 0;
        let mut diff = 0.0;
        let mut converged = false;
        while iterations < settings.max_iter {
            let mut delta = x.clone();
            for i in 0..n {
                if !active[i] {
                    continue;
                }
                x[i] = match standardize {
                    true => shrink(minv * grad[i] + x[i], alpha),
                    false => shrink(minv * grad[i] + x[i] / scale_beta[i], alpha) * scale_beta[i],
                };
                delta[i] -= x[i];
                if delta[i] != 0.0 {
                    let col = prod[i].get_or_insert_with(|| gram_column(a, i));
                    let d = delta[i];
                    grad.par_iter_mut()
                        .zip(col.par_iter())
                        .for_each(|(g, p)| *g += p * d);
                }
            }
            iterations += 1;
            diff = (vsqnorm(&delta) / n as f64).sqrt();

            if diff < settings.tolerance {
                converged = true;
                break;
            }
            if report_due(iterations, settings.output_frequency) {
                debug!("Coordinate descent: {:5}", iterations);
                report(a, &self.b, x, diff, self.f2norm);
            }
        }

        match converged {
            true => info!("Convergence achieved in {} iterations.", iterations),
            false => warn!("Convergence NOT achieved within {} coordinate descent iterations.", settings.max_iter),
        }
        report(&self.a, &self.b, &self.x, diff, self.f2norm);

        Convergence { iterations, converged, final_diff: diff }
    }

    /// The current iterate, mapped back to the columns of the original matrix.
    pub fn solution(&self) -> Vec<f64> {
        self.x.iter().zip(&self.factor_std).map(|(x, f)| x * f).collect()
    }
}

fn report(a: &ColMatrix, b: &[f64], x: &[f64], diff: f64, f2norm: f64) {
    let n = x.len() as f64;
    let xnorm2 = vsqnorm(x);
    let rel_diff = match xnorm2 {
        x if x.abs() < 1e-12 => 0.0,
        x => diff * (n / x).sqrt(),
    };
    let res2 = ::fcfit_linalg::residual_norm2(a, x, b);
    debug!("    1: ||u_k - u_(k-1)||_2 = {:15e} {:15e}", diff, rel_diff);
    debug!("    2: ||u_k||_1           = {:15e}", vsum_abs(x));
    debug!("    3: ||A u_k - f||_2     = {:15e} {:15e}", res2.sqrt(), (res2 / f2norm).sqrt());
}
