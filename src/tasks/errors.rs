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

pub type FailResult<T> = Result<T, ::failure::Error>;

#[allow(bad_style)]
pub fn FailOk<T>(x: T) -> FailResult<T> { Ok(x) }

/// More samples were requested than the dataset holds.
#[derive(Debug, Fail)]
#[fail(display = "Number of data sets is insufficient: {} requested, but only {} provided (see `fitting.ndata`)", needed, found)]
pub struct InsufficientDataError {
    pub needed: usize,
    pub found: usize,
}

/// There is nothing to fit against.
#[derive(Debug, Fail)]
#[fail(display = "No displacement/force samples were provided")]
pub struct NoDataError;
