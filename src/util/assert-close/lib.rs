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

//! `assert_close!` for scalars and parameter vectors.
//!
//! ```text
//! assert_close!(a, b);
//! assert_close!(abs=1e-8, a, b);
//! assert_close!(rel=1e-6, abs=1e-12, a, b, "while fitting {}", name);
//! ```

#[macro_use]
extern crate failure;
use std::fmt;

/// Relative tolerance used when none is given.
pub const DEFAULT_REL_TOL: f64 = 1e-9;

#[macro_export]
macro_rules! assert_close {
    ($($t:tt)*) => {
        $crate::__assert_close_parse!{[$($t)*] rel=($crate::DEFAULT_REL_TOL) abs=(0.0)}
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __assert_close_parse {
    ([rel=$tol:expr, $($rest:tt)*] rel=$_old:tt abs=$abs:tt) => {
        $crate::__assert_close_parse!{[$($rest)*] rel=($tol) abs=$abs}
    };
    ([abs=$tol:expr, $($rest:tt)*] rel=$rel:tt abs=$_old:tt) => {
        $crate::__assert_close_parse!{[$($rest)*] rel=$rel abs=($tol)}
    };
    ([$a:expr, $b:expr $(,)*] rel=$rel:tt abs=$abs:tt) => {
        $crate::__assert_close_parse!{@go $a, $b, rel=$rel abs=$abs ["not nearly equal!"]}
    };
    ([$a:expr, $b:expr, $($fmt:tt)+] rel=$rel:tt abs=$abs:tt) => {
        $crate::__assert_close_parse!{@go $a, $b, rel=$rel abs=$abs [$($fmt)+]}
    };
    (@go $a:expr, $b:expr, rel=($rel:expr) abs=($abs:expr) [$($fmt:tt)+]) => {{
        let tol = $crate::Tolerances { rel: $rel, abs: $abs };
        match $crate::CheckClose::check_close(&$a, &$b, tol) {
            Ok(()) => {},
            Err(e) => panic!("{} (tolerances: rel={}, abs={})\n{}", format!($($fmt)+), tol.rel, tol.abs, e),
        }
    }};
}

/// Same as Python 3.5's `math.isclose`.
#[inline]
pub fn is_close(a: f64, b: f64, Tolerances { rel, abs }: Tolerances) -> bool {
    assert!(rel >= 0.0 && abs >= 0.0);
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    (a - b).abs() <= f64::max(abs, rel * f64::max(a.abs(), b.abs()))
}

#[derive(Debug, Copy, Clone)]
pub struct Tolerances {
    pub rel: f64,
    pub abs: f64,
}

#[derive(Debug, Fail)]
pub struct CheckCloseError {
    pub values: (f64, f64),
    /// Position of the first mismatch, for vectors.
    pub index: Option<usize>,
    pub len: Option<(usize, usize)>,
}

impl fmt::Display for CheckCloseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some((a, b)) = self.len {
            return write!(f, "length mismatch: {} vs {}", a, b);
        }
        let (left, right) = self.values;
        match self.index {
            Some(i) => write!(f, "first mismatch at index {}\n  left: {:?}\n right: {:?}", i, left, right),
            None => write!(f, "  left: {:?}\n right: {:?}", left, right),
        }
    }
}

pub trait CheckClose<Rhs: ?Sized = Self> {
    fn check_close(&self, other: &Rhs, tol: Tolerances) -> Result<(), CheckCloseError>;
}

impl CheckClose for f64 {
    fn check_close(&self, other: &f64, tol: Tolerances) -> Result<(), CheckCloseError> {
        match is_close(*self, *other, tol) {
            true => Ok(()),
            false => Err(CheckCloseError { values: (*self, *other), index: None, len: None }),
        }
    }
}

impl<'a, T: ?Sized + CheckClose> CheckClose for &'a T {
    fn check_close(&self, other: &Self, tol: Tolerances) -> Result<(), CheckCloseError> {
        (**self).check_close(*other, tol)
    }
}

impl CheckClose for [f64] {
    fn check_close(&self, other: &[f64], tol: Tolerances) -> Result<(), CheckCloseError> {
        if self.len() != other.len() {
            return Err(CheckCloseError { values: (0.0, 0.0), index: None, len: Some((self.len(), other.len())) });
        }
        for (i, (&a, &b)) in self.iter().zip(other).enumerate() {
            if !is_close(a, b, tol) {
                return Err(CheckCloseError { values: (a, b), index: Some(i), len: None });
            }
        }
        Ok(())
    }
}

impl CheckClose for Vec<f64> {
    fn check_close(&self, other: &Self, tol: Tolerances) -> Result<(), CheckCloseError> {
        self[..].check_close(&other[..], tol)
    }
}

impl CheckClose<[f64]> for Vec<f64> {
    fn check_close(&self, other: &[f64], tol: Tolerances) -> Result<(), CheckCloseError> {
        self[..].check_close(other, tol)
    }
}

impl<const N: usize> CheckClose for [f64; N] {
    fn check_close(&self, other: &Self, tol: Tolerances) -> Result<(), CheckCloseError> {
        self[..].check_close(&other[..], tol)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn forms_compile() {
        assert_close!(1.0, 1.0);
        assert_close!(abs=1e-8, 1.0, 1.0 + 1e-9);
        assert_close!(rel=1e-8, abs=1e-8, 1.0, 1.0,);
        assert_close!(abs=1e-8, vec![1.0, 2.0], vec![1.0, 2.0], "{}", "vectors");
        assert_close!([0.5; 3], [0.5; 3]);
    }

    #[test]
    #[should_panic(expected = "first mismatch at index 1")]
    fn reports_index() {
        assert_close!(abs=1e-12, vec![1.0, 2.0, 3.0], vec![1.0, 2.5, 3.0]);
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn reports_length() {
        assert_close!(vec![1.0], vec![1.0, 2.0]);
    }
}
