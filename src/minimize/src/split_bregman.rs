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

//! Split-Bregman iteration for `(1/2) ||A x - f||^2 + alpha ||x||_1`.
//!
//! Each iteration solves the quadratic subproblem
//! `(A^T A + alpha^2 lambda I) x = A^T f + alpha lambda (d - b)`
//! approximately by conjugate gradient, then updates the auxiliary
//! variable `d = shrink(alpha x + b, 1/lambda)` and the Bregman variable
//! `b += alpha x - d`.

use crate::{shrink, Convergence};
use crate::cg::{conjugate_gradient, Preconditioner, IncompleteCholesky};
use crate::util::{vsqnorm, vsqdist, vsum_abs, par_gram, report_due};
use ::fcfit_linalg::ColMatrix;

/// Iterations that always run before convergence is checked.
const MIN_ITER: u64 = 5;

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Weight of the splitting penalty (the L2 term of the subproblem).
    #[serde(default = "settings__lambda")] pub lambda: f64,
    #[serde(default = "settings__tolerance")] pub tolerance: f64,
    #[serde(default = "settings__max_iter")] pub max_iter: u64,
    /// CG steps per outer iteration.
    #[serde(default = "settings__max_iter_cg")] pub max_iter_cg: u64,
    #[serde(default = "settings__output_frequency")] pub output_frequency: u64,
    #[serde(default = "settings__preconditioner")] pub preconditioner: Preconditioner,
}

fn settings__lambda() -> f64 { 10.0 }
fn settings__tolerance() -> f64 { 1e-7 }
fn settings__max_iter() -> u64 { 100_000 }
fn settings__max_iter_cg() -> u64 { 5 }
fn settings__output_frequency() -> u64 { 1000 }
fn settings__preconditioner() -> Preconditioner { Preconditioner::None }

impl Default for Settings {
    fn default() -> Self {
        Settings {
            lambda: settings__lambda(),
            tolerance: settings__tolerance(),
            max_iter: settings__max_iter(),
            max_iter_cg: settings__max_iter_cg(),
            output_frequency: settings__output_frequency(),
            preconditioner: settings__preconditioner(),
        }
    }
}

/// How the iterate and the auxiliary variables start out.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Initialization {
    /// `x = b = d = 0`
    Zero,
    /// Continue from the state left by a previous run.
    WarmStart,
    /// `b = d = 0`, and `x` from a long CG solve of the unpenalized subproblem.
    LeastSquares,
}

/// Iterate `x` plus the Bregman (`b`) and auxiliary (`d`) variables.
#[derive(Debug, Clone, PartialEq)]
pub struct BregmanState {
    pub x: Vec<f64>,
    pub b: Vec<f64>,
    pub d: Vec<f64>,
}

impl BregmanState {
    pub fn zeros(n: usize) -> Self {
        BregmanState { x: vec![0.0; n], b: vec![0.0; n], d: vec![0.0; n] }
    }
}

/// Runs split-Bregman for one value of `alpha`, leaving the result in `state`.
///
/// `f2norm` is only used to report relative residuals.
pub fn split_bregman(
    a: &ColMatrix,
    f: &[f64],
    f2norm: f64,
    alpha: f64,
    settings: &Settings,
    init: Initialization,
    state: &mut BregmanState,
) -> Convergence {
    let n = a.cols();
    assert_eq!(f.len(), a.rows());
    info!("Start LASSO minimization with the split-Bregman algorithm");

    let lambda = settings.lambda;
    let invlambda = 1.0 / lambda;
    let al = alpha * lambda;

    let mut q = par_gram(a);
    for i in 0..n {
        q[(i, i)] += alpha * alpha * lambda;
    }
    let bvec_cg = a.t_dot_vec(f);

    let ic = match settings.preconditioner {
        Preconditioner::None => None,
        Preconditioner::IncompleteCholesky => {
            info!("Preparing the IC(0) preconditioner");
            Some(IncompleteCholesky::factorize(&q))
        },
    };
    let cg = |rhs: &[f64], x: &mut [f64], max_iter: u64, verbose: bool| {
        conjugate_gradient(&q, rhs, x, max_iter, settings.preconditioner, ic.as_ref(), verbose)
    };

    match init {
        Initialization::Zero => {
            info!("Start with b = 0 and d = 0");
            *state = BregmanState::zeros(n);
        },
        Initialization::WarmStart => {
            info!("Start from b, d and x of the previous run");
            assert_eq!(state.x.len(), n, "(BUG) warm start from a state of the wrong size");
        },
        Initialization::LeastSquares => {
            info!("Start with b = 0 and d = 0; x is initialized by solving the LS equation");
            *state = BregmanState::zeros(n);
            // with b = d = 0 the right-hand side is just A^T f
            cg(&bvec_cg[..], &mut state.x[..], 20 * n as u64, true);
        },
    }
    if n == 0 {
        return Convergence { iterations: 0, converged: true, final_diff: 0.0 };
    }

    let mut x = state.x.clone();
    let mut rhs = vec![0.0; n];
    let mut iterations = 0;
    let mut diff = 0.0;
    let mut converged = false;
    while iterations < settings.max_iter {
        iterations += 1;
        let verbose = report_due(iterations, settings.output_frequency);
        if verbose {
            debug!("Split-Bregman: {:5}", iterations);
        }

        for i in 0..n {
            rhs[i] = bvec_cg[i] + al * (state.d[i] - state.b[i]);
        }
        cg(&rhs[..], &mut x[..], settings.max_iter_cg, verbose);

        for i in 0..n {
            state.d[i] = shrink(alpha * x[i] + state.b[i], invlambda);
            state.b[i] += alpha * x[i] - state.d[i];
        }

        let dx2 = vsqdist(&state.x, &x);
        diff = (dx2 / n as f64).sqrt();
        state.x.copy_from_slice(&x);

        let done = diff < settings.tolerance && iterations > MIN_ITER;
        if verbose || done {
            report(a, f, f2norm, alpha, state, dx2);
        }
        if done {
            converged = true;
            break;
        }
    }

    match converged {
        true => info!("Convergence achieved in {} iterations.", iterations),
        false => warn!("Convergence NOT achieved within {} split-Bregman iterations.", iterations),
    }
    Convergence { iterations, converged, final_diff: diff }
}

fn report(a: &ColMatrix, f: &[f64], f2norm: f64, alpha: f64, state: &BregmanState, dx2: f64) {
    let n = state.x.len() as f64;
    let res2 = ::fcfit_linalg::residual_norm2(a, &state.x, f);
    let split: Vec<f64> = state.d.iter().zip(&state.x).map(|(d, x)| d - alpha * x).collect();
    debug!("    1: ||u_k - u_(k-1)||_2     = {:15e} {:15e}", (dx2 / n).sqrt(), (dx2 / vsqnorm(&state.x)).sqrt());
    debug!("    2: ||u_k||_1               = {:15e}", vsum_abs(&state.x));
    debug!("    3: ||A u_k - f||_2         = {:15e} {:15e}", res2.sqrt(), (res2 / f2norm).sqrt());
    debug!("    4: ||d_k - alpha u_k||_2   = {:15e}", vsqnorm(&split).sqrt());
    debug!("    5: ||d_k||_1               = {:15e}", vsum_abs(&state.d));
    debug!("    6: ||b_k||_2               = {:15e}", vsqnorm(&state.b).sqrt());
}
