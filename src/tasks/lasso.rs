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

//! The L1-regularized fit.
//!
//! Displacements are measured in units of `dnorm` while the problem is
//! solved, so that parameters of different orders have comparable size.
//! A parameter of order `n` is therefore `dnorm^(n+1)` times larger inside
//! the solver than outside of it.

use crate::FailResult;
use crate::symmetry::Symmetry;
use crate::fcs::ParameterTable;
use crate::constraint::ReducedBasis;
use crate::assemble::{assemble, gamma, Dataset, LinearSystem};
use crate::cluster::order_name;
use fcfit_tasks_config::{self as config, LassoAlgorithm, LassoInit, Threading};
use fcfit_linalg::LinearAlgebra;
use fcfit_minimize::{
    CoordinateDescent, Convergence, BregmanState, Initialization,
    split_bregman, calculate_residual,
};

use itertools::Itertools;

/// Parameters below this are counted as zero.
const ZERO_EPS: f64 = 1e-12;

/// Thresholds of the sparse-representation scan, `1e-20 * (1e21^0.01)^k`.
const SCAN_STEPS: i32 = 100;

/// Relative singular-value cutoff of the design-matrix rank.
const RANK_TOL_SVD: f64 = 1e-12;

/// The data a fit needs, passed in explicitly.
#[derive(Debug, Clone, Copy)]
pub struct LassoProblem<'a> {
    pub tables: &'a [ParameterTable],
    pub bases: &'a [ReducedBasis],
    pub symmetry: &'a Symmetry,
    /// Already multiplied by translations.
    pub train: &'a Dataset,
    pub validation: Option<&'a Dataset>,
    pub threading: Threading,
}

/// One point of an alpha sweep.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct AlphaPoint {
    pub alpha: f64,
    /// `sqrt(||A x - b||^2 / ||f||^2)` on the training set.
    pub fitting_error: f64,
    pub validation_error: Option<f64>,
    pub num_zeros: Vec<usize>,
    pub convergence: Convergence,
}

/// Sparsity obtained by discarding small parameters of a solution.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SparsityPoint {
    pub threshold: f64,
    pub num_zeros: Vec<usize>,
    pub fitting_error_percent: f64,
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct LassoReport {
    pub algorithm: LassoAlgorithm,
    /// Numerical rank of the scaled training matrix.
    pub rank: usize,
    /// Coordinate descent only.
    pub recommended_max_alpha: Option<f64>,
    pub path: Vec<AlphaPoint>,
    /// Only for a single split-Bregman run.
    pub sparsity_scan: Vec<SparsityPoint>,
}

impl LassoReport {
    /// The point that produced the returned parameters.
    pub fn last(&self) -> &AlphaPoint {
        self.path.last().expect("(BUG) empty lasso path")
    }
}

// One system, in solver units.
struct ScaledSystem {
    system: LinearSystem,
    f2norm: f64,
}

impl<'a> LassoProblem<'a> {
    fn scaled_system(&self, data: &Dataset, dnorm: f64) -> ScaledSystem {
        let mut data = data.clone();
        data.scale_displacements(1.0 / dnorm);

        let bases: Vec<ReducedBasis> = self.bases.iter()
            .enumerate()
            .map(|(order, basis)| basis.scaled(dnorm.powi(order as i32 + 1)))
            .collect();
        let system = assemble(self.tables, Some(&bases), self.symmetry, &data, self.threading);
        let f2norm = system.f2norm;
        ScaledSystem { system, f2norm }
    }

    /// Order of each free parameter.
    fn free_orders(&self) -> Vec<usize> {
        self.bases.iter()
            .enumerate()
            .flat_map(|(order, basis)| ::std::iter::repeat(order).take(basis.num_free()))
            .collect()
    }

    /// Symmetrization prefactor of the first member of each free parameter's group.
    fn prefactors(&self) -> Vec<f64> {
        let mut out = vec![];
        for (table, basis) in self.tables.iter().zip(self.bases) {
            let reps = table.representatives();
            out.extend(basis.free().iter().map(|&j| gamma(&reps[j].elems)));
        }
        out
    }

    fn count_zeros(&self, x: &[f64], threshold: impl Fn(usize) -> f64) -> Vec<usize> {
        let mut counts = vec![0; self.bases.len()];
        for (i, &order) in self.free_orders().iter().enumerate() {
            if x[i].abs() < threshold(i) {
                counts[order] += 1;
            }
        }
        counts
    }
}

/// Runs the L1 fit described by `settings`.
///
/// Returns the free parameters of all orders in physical units, and the
/// per-alpha diagnostics.
pub fn fit_lasso<L: LinearAlgebra>(
    la: &L,
    problem: &LassoProblem<'_>,
    settings: &config::Lasso,
) -> FailResult<(Vec<f64>, LassoReport)> {
    let dnorm = settings.dnorm;
    let train = problem.scaled_system(problem.train, dnorm);
    let validation = problem.validation.map(|data| problem.scaled_system(data, dnorm));
    let n = train.system.ncols();
    let orders = problem.free_orders();
    assert_eq!(orders.len(), n);

    info!("LASSO");
    info!("  Total number of free parameters : {}", n);
    // rank deficiency is not an error for the L1 fit
    let rank = la.rank_svd(&train.system.a, RANK_TOL_SVD)?;
    info!("  RANK of the matrix = {}", rank);
    if rank < n {
        info!("  The training matrix is rank-deficient ({} < {}).", rank, n);
    }
    log_parameters(settings);

    let alphas = match &settings.cv {
        Some(cv) => cv.alphas(),
        None => vec![settings.alpha],
    };

    let evaluate = |alpha: f64, x: &[f64], convergence: Convergence| -> AlphaPoint {
        let fitting_error = calculate_residual(&train.system.a, x, &train.system.b, train.f2norm).sqrt();
        let validation_error = validation.as_ref().map(|v| {
            calculate_residual(&v.system.a, x, &v.system.b, v.f2norm).sqrt()
        });
        let num_zeros = problem.count_zeros(x, |_| ZERO_EPS);

        info!("  L1_ALPHA = {:e}", alpha);
        info!("  RESIDUAL (%): {}", fitting_error * 100.0);
        if let Some(err) = validation_error {
            info!("  VALIDATION RESIDUAL (%): {}", err * 100.0);
        }
        for (order, &nzero) in num_zeros.iter().enumerate() {
            info!(
                "  Number of non-zero {:>9} FCs : {}",
                order_name(order), problem.bases[order].num_free() - nzero,
            );
        }
        AlphaPoint { alpha, fitting_error, validation_error, num_zeros, convergence }
    };

    let mut path = vec![];
    let mut recommended_max_alpha = None;
    let mut sparsity_scan = vec![];
    let x = match settings.algorithm {
        LassoAlgorithm::CoordinateDescent => {
            let cd_settings = settings.coordinate_descent_settings();
            let mut cd = CoordinateDescent::new(
                &train.system.a, &train.system.b, train.f2norm, settings.standardize,
            );
            recommended_max_alpha = Some(cd.recommended_max_alpha());

            for (i, &alpha) in alphas.iter().enumerate() {
                let convergence = cd.run(alpha, i > 0, &cd_settings);
                path.push(evaluate(alpha, &cd.solution(), convergence));
            }
            cd.solution()
        },
        LassoAlgorithm::SplitBregman => {
            let sb_settings = settings.split_bregman_settings();
            let mut state = BregmanState::zeros(n);

            for (i, &alpha) in alphas.iter().enumerate() {
                let init = match (i, settings.init) {
                    (0, LassoInit::Zero) => Initialization::Zero,
                    (0, LassoInit::LeastSquares) => Initialization::LeastSquares,
                    _ => Initialization::WarmStart,
                };
                let convergence = split_bregman(
                    &train.system.a, &train.system.b, train.f2norm,
                    alpha, &sb_settings, init, &mut state,
                );
                path.push(evaluate(alpha, &state.x, convergence));
            }
            if settings.cv.is_none() {
                sparsity_scan = sparse_scan(problem, &train, &state.x);
            }
            state.x
        },
    };

    let x = x.iter().zip(&orders)
        .map(|(&x, &order)| x / dnorm.powi(order as i32 + 1))
        .collect();

    let report = LassoReport {
        algorithm: settings.algorithm,
        rank,
        recommended_max_alpha,
        path,
        sparsity_scan,
    };
    Ok((x, report))
}

fn log_parameters(settings: &config::Lasso) {
    match &settings.cv {
        Some(cv) => {
            info!("  Lasso validation with the following parameters:");
            info!("   min-alpha = {:e}, max-alpha = {:e}, num-alpha = {}", cv.min_alpha, cv.max_alpha, cv.num_alpha);
        },
        None => {
            info!("  Lasso minimization with the following parameters:");
            info!("   alpha (L1) = {:e}", settings.alpha);
        },
    }
    info!("   tolerance = {:e}", settings.tolerance);
    info!("   max-iter = {}", settings.max_iter);
    info!("   dnorm = {:e}", settings.dnorm);
    if settings.algorithm == LassoAlgorithm::SplitBregman {
        info!("   lambda (L2) = {:e}", settings.lambda);
        info!("   zero-threshold = {:e}", settings.zero_threshold);
    }
}

/// Zeros progressively larger parameters of `x` and reports what is lost.
///
/// A parameter is discarded once `|x_i| * prefactor_i` is below the threshold;
/// discarded parameters stay discarded at larger thresholds.
fn sparse_scan(problem: &LassoProblem<'_>, train: &ScaledSystem, x: &[f64]) -> Vec<SparsityPoint> {
    let prefactor = problem.prefactors();
    let step = 1e21f64.powf(0.01);
    let mut x = x.to_vec();

    info!(" zero-threshold, Number of zero parameters, fitting error (%)");
    (0..=SCAN_STEPS).map(|k| {
        let threshold = 1e-20 * step.powi(k);
        for (xi, &p) in x.iter_mut().zip(&prefactor) {
            if xi.abs() * p < threshold {
                *xi = 0.0;
            }
        }
        let num_zeros = problem.count_zeros(&x, |i| threshold / prefactor[i]);
        let res = calculate_residual(&train.system.a, &x, &train.system.b, train.f2norm);
        let fitting_error_percent = res.sqrt() * 100.0;

        debug!("{:15e} {} {:15}", threshold, num_zeros.iter().join(" "), fitting_error_percent);
        SparsityPoint { threshold, num_zeros, fitting_error_percent }
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use crate::fcs::generate_table;
    use fcfit_linalg::Native;
    use fcfit_tasks_config::{Basis, CrossValidation};

    const K: f64 = 2.5;

    // F = -K u on a single atom with cubic symmetry.
    fn cubic_onsite(samples: &[[f64; 3]]) -> (Symmetry, Vec<ParameterTable>, Vec<ReducedBasis>, Dataset) {
        let symmetry = test_util::cubic_single_atom();
        let clusters = test_util::harmonic_clusters(&[0], &[]);
        let tables = vec![generate_table(0, &clusters, &symmetry, Basis::Cartesian, true)];
        let bases = vec![ReducedBasis::identity(1)];
        let data = Dataset::new(
            samples.iter().map(|u| u.to_vec()).collect(),
            samples.iter().map(|u| u.iter().map(|x| -K * x).collect()).collect(),
        ).unwrap();
        (symmetry, tables, bases, data)
    }

    const TRAIN: &[[f64; 3]] = &[
        [0.010, -0.020, 0.005],
        [-0.015, 0.003, 0.020],
        [0.007, 0.011, -0.013],
    ];
    const VALIDATION: &[[f64; 3]] = &[[0.002, -0.009, 0.017]];

    fn settings(algorithm: LassoAlgorithm) -> config::Lasso {
        let mut settings = config::Lasso::default();
        settings.algorithm = algorithm;
        settings.alpha = 1e-9;
        settings.dnorm = 0.01;
        settings.tolerance = 1e-12;
        settings.output_frequency = 0;
        settings
    }

    #[test]
    fn small_alpha_recovers_least_squares() {
        let (symmetry, tables, bases, train) = cubic_onsite(TRAIN);
        let problem = LassoProblem {
            tables: &tables, bases: &bases, symmetry: &symmetry,
            train: &train, validation: None, threading: Threading::Serial,
        };

        for &algorithm in &[LassoAlgorithm::CoordinateDescent, LassoAlgorithm::SplitBregman] {
            let (x, report) = fit_lasso(&Native, &problem, &settings(algorithm)).unwrap();
            assert_close!(rel=1e-5, x[0], K, "{:?}", algorithm);
            assert_eq!(report.path.len(), 1);
            assert_eq!(report.rank, 1);
            assert!(report.last().fitting_error < 1e-5);
            assert!(report.last().validation_error.is_none());
            assert_eq!(report.recommended_max_alpha.is_some(), algorithm == LassoAlgorithm::CoordinateDescent);
        }
    }

    #[test]
    fn unstandardized_coordinate_descent() {
        let (symmetry, tables, bases, train) = cubic_onsite(TRAIN);
        let problem = LassoProblem {
            tables: &tables, bases: &bases, symmetry: &symmetry,
            train: &train, validation: None, threading: Threading::Rayon,
        };
        let mut settings = settings(LassoAlgorithm::CoordinateDescent);
        settings.standardize = false;

        let (x, _) = fit_lasso(&Native, &problem, &settings).unwrap();
        assert_close!(rel=1e-5, x[0], K);
    }

    #[test]
    fn sparse_scan_discards_everything_eventually() {
        let (symmetry, tables, bases, train) = cubic_onsite(TRAIN);
        let problem = LassoProblem {
            tables: &tables, bases: &bases, symmetry: &symmetry,
            train: &train, validation: None, threading: Threading::Serial,
        };
        let (_, report) = fit_lasso(&Native, &problem, &settings(LassoAlgorithm::SplitBregman)).unwrap();

        let scan = &report.sparsity_scan;
        assert_eq!(scan.len(), 101);
        assert_close!(rel=1e-12, scan[0].threshold, 1e-20);
        assert_close!(rel=1e-10, scan[100].threshold, 10.0);
        // in solver units the parameter is K * dnorm^1 = 0.025
        assert_eq!(scan[0].num_zeros, vec![0]);
        assert_eq!(scan[100].num_zeros, vec![1]);
        assert_close!(rel=1e-12, scan[100].fitting_error_percent, 100.0);
    }

    #[test]
    fn cross_validation_path() {
        let (symmetry, tables, bases, train) = cubic_onsite(TRAIN);
        let (_, _, _, validation) = cubic_onsite(VALIDATION);

        let problem = LassoProblem {
            tables: &tables, bases: &bases, symmetry: &symmetry,
            train: &train, validation: Some(&validation), threading: Threading::Serial,
        };

        for &algorithm in &[LassoAlgorithm::CoordinateDescent, LassoAlgorithm::SplitBregman] {
            let mut settings = settings(algorithm);
            settings.cv = Some(CrossValidation { min_alpha: 1e-9, max_alpha: 1e-3, num_alpha: 4 });

            let (x, report) = fit_lasso(&Native, &problem, &settings).unwrap();
            assert_eq!(report.path.len(), 5);
            assert_close!(rel=1e-12, report.path[0].alpha, 1e-3);
            assert_close!(rel=1e-12, report.last().alpha, 1e-9);
            assert!(report.sparsity_scan.is_empty());
            for point in &report.path {
                assert!(point.validation_error.is_some());
            }
            assert!(report.last().validation_error.unwrap() < 1e-4, "{:?}", algorithm);
            assert_close!(rel=1e-5, x[0], K, "{:?}", algorithm);
        }
    }

    #[test]
    fn report_serializes() {
        let report = LassoReport {
            algorithm: LassoAlgorithm::SplitBregman,
            rank: 0,
            recommended_max_alpha: None,
            path: vec![],
            sparsity_scan: vec![],
        };
        let json = ::serde_json::to_value(&report).unwrap();
        assert_eq!(json["algorithm"], "split-bregman");
        assert!(json["sparsity-scan"].as_array().unwrap().is_empty());
        assert_eq!(json["rank"], 0);
    }
}
