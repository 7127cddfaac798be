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

//! All of the post-processing that occurs after deserialization is written here.
//!
//! It rejects combinations of options that would only fail much later,
//! in the middle of a fit.

use crate::config::*;
use failure::Error;

impl Settings {
    pub fn validate(self) -> Result<ValidatedSettings, Error> {
        check_constraint(&self.constraint)?;
        check_lasso(&self.lasso)?;

        if self.fitting.solver == Solver::Lasso && self.constraint.mode == ConstraintMode::Explicit {
            bail!("\
                `fitting.solver: lasso` requires `constraint.mode: algebraic`; \
                the L1 solvers cannot handle explicit constraint equations.\
            ");
        }
        if self.fitting.ndata == Some(0) {
            bail!("`fitting.ndata` must be at least 1.");
        }

        Ok(ValidatedSettings(self))
    }
}

fn check_constraint(constraint: &Constraint) -> Result<(), Error> {
    if !(constraint.tolerance > 0.0) {
        bail!("`constraint.tolerance: {}` is invalid. (must be positive)", constraint.tolerance);
    }
    if constraint.mode == ConstraintMode::Algebraic && !constraint.rref {
        bail!("`constraint.mode: algebraic` requires `constraint.rref: true`.");
    }
    Ok(())
}

fn check_lasso(lasso: &Lasso) -> Result<(), Error> {
    if !(lasso.dnorm > 0.0) {
        bail!("`lasso.dnorm: {}` is invalid. (must be positive)", lasso.dnorm);
    }
    if !(lasso.tolerance > 0.0) {
        bail!("`lasso.tolerance: {}` is invalid. (must be positive)", lasso.tolerance);
    }
    if !(lasso.lambda > 0.0) {
        bail!("`lasso.lambda: {}` is invalid. (must be positive)", lasso.lambda);
    }
    if !(lasso.alpha >= 0.0) {
        bail!("`lasso.alpha: {}` is invalid. (must be non-negative)", lasso.alpha);
    }
    if lasso.preconditioner > 1 {
        bail!("`lasso.preconditioner: {}` is invalid. (0 = none, 1 = incomplete Cholesky)", lasso.preconditioner);
    }

    if let Some(cv) = &lasso.cv {
        if !(cv.min_alpha > 0.0) {
            bail!("`lasso.cv.min-alpha: {}` is invalid. (must be positive)", cv.min_alpha);
        }
        if !(cv.max_alpha >= cv.min_alpha) {
            bail!("`lasso.cv.max-alpha` ({}) must be at least `min-alpha` ({}).", cv.max_alpha, cv.min_alpha);
        }
        if cv.num_alpha == 0 {
            bail!("`lasso.cv.num-alpha` must be at least 1.");
        }
    }
    Ok(())
}
