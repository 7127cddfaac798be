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

//! The force-constant fitting engine.
//!
//! Stages run strictly in order:
//!
//! * [`fcs`] enumerates the symmetry-distinct parameters of each order,
//! * [`constraint`] derives linear relations between them,
//! * [`assemble`] builds the design matrix from displacement/force samples,
//! * [`fitting`] and [`lasso`] solve it,
//!
//! and [`FitSession`] drives them from a [`Settings`].

extern crate fcfit_tasks_config;
extern crate fcfit_minimize;
extern crate fcfit_linalg;

extern crate rayon;
extern crate ndarray;
extern crate slice_of_array;
extern crate serde;
extern crate ansi_term;
extern crate fern;
extern crate itertools;
#[macro_use] extern crate serde_derive;
#[macro_use] extern crate log;
#[macro_use] extern crate failure;

#[cfg(test)] #[macro_use] extern crate fcfit_assert_close;
#[cfg(test)] #[macro_use] extern crate pretty_assertions;
#[cfg(test)] extern crate rand;
#[cfg(test)] extern crate serde_json;

// `return Err(e.into())`, until failure ships its own
macro_rules! throw {
    ($e:expr) => {
        return Err(::std::convert::Into::into($e));
    }
}

pub use crate::errors::{FailResult, FailOk, InsufficientDataError, NoDataError};
pub use fcfit_tasks_config::{Settings, ValidatedSettings, Basis, InvalidBasisError, Threading};
pub use fcfit_linalg::{LinearAlgebra, Native, SolverError};

mod errors;

pub mod logging;
pub mod symmetry;
pub mod cluster;
pub mod fcs;
pub mod constraint;
pub mod assemble;
pub mod fitting;
pub mod lasso;
pub mod session;

pub use crate::symmetry::{Symmetry, SymmetryOperation};
pub use crate::cluster::{Cluster, ClusterList};
pub use crate::fcs::{FcProperty, ParameterTable};
pub use crate::constraint::{ConstraintRow, Constraints, ReducedBasis};
pub use crate::assemble::{Dataset, LinearSystem};
pub use crate::session::{FitSession, FitResult, Stage, SolverKind};

#[cfg(test)]
pub(crate) mod test_util;
