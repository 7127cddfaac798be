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

//! Symmetry-reduced fitting of interatomic force constants.
//!
//! This crate only gathers the workspace members under one roof.
//! See [`FitSession`] for the usual entry point.

pub use fcfit_tasks::*;

/// Settings, as read from YAML.
pub mod config {
    pub use fcfit_tasks_config::*;
}

/// L1-regularized solvers.
pub mod minimize {
    pub use fcfit_minimize::*;
}

/// Dense linear algebra backends.
pub mod linalg {
    pub use fcfit_linalg::*;
}
