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

//! A fit, start to finish.

use crate::FailResult;
use crate::symmetry::Symmetry;
use crate::cluster::ClusterList;
use crate::fcs::{build_tables, FcValue, ParameterTable};
use crate::constraint::{Constraints, ReducedBasis};
use crate::assemble::{assemble, Dataset};
use crate::fitting::{fit_svd, fit_constrained, FitReport};
use crate::lasso::{fit_lasso, LassoProblem, LassoReport};
use fcfit_tasks_config::{Settings, ConstraintMode, Solver, LassoAlgorithm};
use fcfit_linalg::LinearAlgebra;

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    Svd,
    Qr,
    CoordinateDescent,
    SplitBregman,
}

/// Progress of a [`FitSession`].
///
/// `Idle -> Assembling -> Solving -> Expanding -> Done`, never backwards.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Idle,
    Assembling,
    Solving(SolverKind),
    Expanding,
    Done,
}

#[derive(Serialize)]
#[derive(Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FitResult {
    pub solver: SolverKind,
    /// Value of every mother parameter, per order.
    pub params: Vec<Vec<f64>>,
    /// Every symmetry-equivalent component, per order.
    pub force_constants: Vec<Vec<FcValue>>,
    /// Least squares only.
    pub report: Option<FitReport>,
    /// Lasso only.
    pub lasso: Option<LassoReport>,
}

/// Owns everything derived from the symmetry and the clusters,
/// and runs a single fit against it.
pub struct FitSession<'a, L> {
    settings: Settings,
    symmetry: &'a Symmetry,
    tables: Vec<ParameterTable>,
    constraints: Constraints,
    linalg: L,
    stage: Stage,
}

impl<'a, L: LinearAlgebra> FitSession<'a, L> {
    /// Validates `settings`, then builds the parameter tables and constraints.
    pub fn new(
        settings: &Settings,
        symmetry: &'a Symmetry,
        clusters: &ClusterList,
        linalg: L,
    ) -> FailResult<Self> {
        let settings = settings.clone().validate()?.0;
        if let Some(atom) = clusters.max_atom() {
            ensure!(
                atom < symmetry.nat(),
                "cluster refers to atom {}, but the supercell only has {}", atom, symmetry.nat()
            );
        }
        for order in 0..clusters.maxorder() {
            for cluster in clusters.clusters(order) {
                ensure!(
                    symmetry.is_in_prim(cluster.atoms[0]),
                    "cluster {:?} does not start in the primitive cell", cluster.atoms
                );
            }
        }

        let tables = build_tables(clusters, symmetry, settings.basis, settings.store_zeros);
        let constraints = Constraints::build(&tables, symmetry, &settings)?;
        Ok(FitSession { settings, symmetry, tables, constraints, linalg, stage: Stage::Idle })
    }

    pub fn stage(&self) -> Stage { self.stage }
    pub fn tables(&self) -> &[ParameterTable] { &self.tables }
    pub fn constraints(&self) -> &Constraints { &self.constraints }

    pub fn solver_kind(&self) -> SolverKind {
        match self.settings.fitting.solver {
            Solver::Lasso => match self.settings.lasso.algorithm {
                LassoAlgorithm::CoordinateDescent => SolverKind::CoordinateDescent,
                LassoAlgorithm::SplitBregman => SolverKind::SplitBregman,
            },
            Solver::LeastSquares => {
                let explicit = self.constraints.mode() == ConstraintMode::Explicit;
                match explicit && self.constraints.num_rows() > 0 {
                    true => SolverKind::Qr,
                    false => SolverKind::Svd,
                }
            },
        }
    }

    fn advance(&mut self, next: Stage) {
        let ok = match (self.stage, next) {
            (Stage::Idle, Stage::Assembling) => true,
            (Stage::Assembling, Stage::Solving(_)) => true,
            (Stage::Solving(_), Stage::Expanding) => true,
            (Stage::Expanding, Stage::Done) => true,
            _ => false,
        };
        assert!(ok, "(BUG) fit session cannot go from {:?} to {:?}", self.stage, next);
        debug!("fit session: {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    /// Fits the parameters to `train`.
    ///
    /// `validation` is only used by a lasso sweep, to report the error of each
    /// point on held-out data.
    ///
    /// # Panics
    ///
    /// A session fits only once.
    pub fn fit(&mut self, train: &Dataset, validation: Option<&Dataset>) -> FailResult<FitResult> {
        self.advance(Stage::Assembling);
        let symmetry = self.symmetry;
        let threading = self.settings.threading;
        let train = train.prepare(self.settings.fitting.ndata, symmetry)?;
        let validation = match validation {
            Some(data) => Some(data.prepare(None, symmetry)?),
            None => None,
        };

        let kind = self.solver_kind();
        let algebraic = self.constraints.mode() == ConstraintMode::Algebraic;
        let bases: Vec<ReducedBasis> = self.constraints.bases().to_vec();

        let (free, report, lasso) = match kind {
            SolverKind::Svd | SolverKind::Qr => {
                let system = assemble(
                    &self.tables, if algebraic { Some(&bases[..]) } else { None },
                    symmetry, &train, threading,
                );
                self.advance(Stage::Solving(kind));
                let (x, report) = match kind {
                    SolverKind::Qr => {
                        info!("  Entering fitting routine: QR decomposition with constraints");
                        let (c, d) = self.constraints.explicit_system();
                        fit_constrained(&self.linalg, &system, &c, &d)?
                    },
                    _ => {
                        match (algebraic, self.constraints.num_rows()) {
                            (_, 0) => info!("  Entering fitting routine: SVD without constraints"),
                            (true, _) => info!("  Entering fitting routine: SVD with constraints considered algebraically"),
                            (false, _) => unreachable!(),
                        }
                        fit_svd(&self.linalg, &system)?
                    },
                };
                (x, Some(report), None)
            },
            SolverKind::CoordinateDescent | SolverKind::SplitBregman => {
                self.advance(Stage::Solving(kind));
                let problem = LassoProblem {
                    tables: &self.tables,
                    bases: &bases,
                    symmetry,
                    train: &train,
                    validation: validation.as_ref(),
                    threading,
                };
                let (x, report) = fit_lasso(&self.linalg, &problem, &self.settings.lasso)?;
                (x, None, Some(report))
            },
        };

        self.advance(Stage::Expanding);
        let mut params = vec![];
        let mut rest = &free[..];
        for basis in &bases {
            let (head, tail) = rest.split_at(basis.num_free());
            params.push(basis.expand(head));
            rest = tail;
        }
        assert!(rest.is_empty(), "(BUG) solver returned {} values too many", rest.len());

        let force_constants = self.tables.iter()
            .zip(&params)
            .map(|(table, values)| table.expand_values(values))
            .collect();

        self.advance(Stage::Done);
        Ok(FitResult { solver: kind, params, force_constants, report, lasso })
    }
}
