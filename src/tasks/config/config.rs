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

// NOTE: Please make sure to use the YamlRead trait when deserializing these types!
//
//       DO NOT USE serde_yaml::from_{reader,value,etc.} OUTSIDE THIS CRATE
//       or else you defeat the entire reason for YamlRead's existence.

use serde::de;
use std::fmt;
use std::str::FromStr;

use fcfit_minimize::{coordinate_descent, split_bregman, Preconditioner};

/// Root settings object.
///
/// This is what you should deserialize.
#[derive(Serialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSettings(pub Settings);

/// Raw deserialized form of settings.
///
/// You shouldn't deserialize this type directly; deserialize `ValidatedSettings` instead,
/// so that incompatible combinations of options are caught up front.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Coordinate basis in which symmetry operations are judged compatible.
    ///
    /// The parameter table is built from the operations compatible with this
    /// basis; the operations incompatible with it produce constraints.
    #[serde(default)]
    pub basis: Basis,

    /// Keep the entries of groups that symmetry forces to zero
    /// (with a sentinel mother index) instead of discarding them.
    #[serde(default = "settings__store_zeros")]
    pub store_zeros: bool,

    #[serde(default)]
    pub constraint: Constraint,

    #[serde(default)]
    pub fitting: Fitting,

    #[serde(default)]
    pub lasso: Lasso,

    #[serde(default)]
    pub threading: Threading,
}
fn settings__store_zeros() -> bool { true }

derive_yaml_read!{ValidatedSettings}

impl<'de> de::Deserialize<'de> for ValidatedSettings {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cereal: Settings = de::Deserialize::deserialize(deserializer)?;

        cereal.validate().map_err(de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Basis {
    Cartesian,
    Lattice,
}

#[derive(Debug, Fail)]
#[fail(display = "Invalid basis input: {:?} (the `basis` parameter must be \"Cartesian\" or \"Lattice\")", _0)]
pub struct InvalidBasisError(pub String);

impl FromStr for Basis {
    type Err = InvalidBasisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase()[..] {
            "cartesian" => Ok(Basis::Cartesian),
            "lattice" => Ok(Basis::Lattice),
            _ => Err(InvalidBasisError(s.to_string())),
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Cartesian => write!(f, "Cartesian"),
            Basis::Lattice => write!(f, "Lattice"),
        }
    }
}

impl Default for Basis {
    fn default() -> Self { Basis::Cartesian }
}

impl serde::Serialize for Basis {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: serde::Serializer,
    { self.to_string().serialize(serializer) }
}

impl<'de> serde::Deserialize<'de> for Basis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: serde::Deserializer<'de>,
    {
        let s: String = serde::Deserialize::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Constraint {
    /// How symmetry constraints enter the fit.
    #[serde(default = "constraint__mode")]
    pub mode: ConstraintMode,

    /// Reduce the constraint rows to row-reduced echelon form.
    ///
    /// Required by `mode: algebraic`. `mode: explicit` reduces the rows
    /// regardless of this flag before they reach the solver.
    #[serde(default = "constraint__rref")]
    pub rref: bool,

    /// Coefficients below this are treated as zero during row reduction.
    #[serde(default = "constraint__tolerance")]
    pub tolerance: f64,

    /// Mother parameters with user-supplied values.
    #[serde(default)]
    pub fix: Vec<FixedParameter>,
}
fn constraint__mode() -> ConstraintMode { ConstraintMode::Algebraic }
fn constraint__rref() -> bool { true }
fn constraint__tolerance() -> f64 { 1e-8 }

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintMode {
    /// Eliminate constrained parameters from the design matrix.
    Algebraic,
    /// Keep all parameters and solve with the constraints as equations.
    Explicit,
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct FixedParameter {
    /// Interaction order (0 = harmonic).
    pub order: usize,
    /// Mother index within that order.
    pub index: usize,
    pub value: f64,
}

//--------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Fitting {
    #[serde(default = "fitting__solver")]
    pub solver: Solver,

    /// Only use this many of the leading displacement/force samples.
    /// (default: all of them)
    #[serde(default)]
    pub ndata: Option<usize>,
}
fn fitting__solver() -> Solver { Solver::LeastSquares }

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Solver {
    /// SVD without constraints, or equality-constrained least squares with them.
    LeastSquares,
    /// L1-penalized least squares.
    Lasso,
}

//--------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Lasso {
    #[serde(default = "lasso__algorithm")]
    pub algorithm: LassoAlgorithm,

    /// Displacements are divided by this before fitting.
    #[serde(default = "lasso__dnorm")]
    pub dnorm: f64,

    /// Strength of the L1 penalty for a single run.
    #[serde(default = "lasso__alpha")]
    pub alpha: f64,

    /// Split-Bregman only: weight of the splitting term.
    #[serde(default = "lasso__lambda")]
    pub lambda: f64,

    #[serde(default = "lasso__tolerance")]
    pub tolerance: f64,

    #[serde(default = "lasso__max_iter")]
    pub max_iter: u64,

    /// Split-Bregman only: CG iterations per outer iteration.
    #[serde(default = "lasso__max_iter_cg")]
    pub max_iter_cg: u64,

    #[serde(default = "lasso__output_frequency")]
    pub output_frequency: u64,

    /// Split-Bregman only: echoed with the run parameters.
    #[serde(default = "lasso__zero_threshold")]
    pub zero_threshold: f64,

    /// Coordinate descent only.
    #[serde(default = "lasso__standardize")]
    pub standardize: bool,

    /// Split-Bregman only: `0` for plain CG, `1` for IC(0)-preconditioned CG.
    #[serde(default)]
    pub preconditioner: u32,

    /// Split-Bregman only: starting point of a single run.
    #[serde(default = "lasso__init")]
    pub init: LassoInit,

    /// Sweep over a geometric grid of `alpha` instead of a single run.
    #[serde(default)]
    pub cv: Option<CrossValidation>,
}
fn lasso__algorithm() -> LassoAlgorithm { LassoAlgorithm::CoordinateDescent }
fn lasso__dnorm() -> f64 { 1.0 }
fn lasso__alpha() -> f64 { 1.0 }
fn lasso__lambda() -> f64 { 10.0 }
fn lasso__tolerance() -> f64 { 1e-7 }
fn lasso__max_iter() -> u64 { 100_000 }
fn lasso__max_iter_cg() -> u64 { 5 }
fn lasso__output_frequency() -> u64 { 1000 }
fn lasso__zero_threshold() -> f64 { 1e-50 }
fn lasso__standardize() -> bool { true }
fn lasso__init() -> LassoInit { LassoInit::Zero }

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LassoAlgorithm {
    CoordinateDescent,
    SplitBregman,
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LassoInit {
    Zero,
    LeastSquares,
}

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct CrossValidation {
    #[serde(default = "cross_validation__min_alpha")]
    pub min_alpha: f64,
    #[serde(default = "cross_validation__max_alpha")]
    pub max_alpha: f64,
    /// The grid has `num_alpha + 1` points, from `max_alpha` down to `min_alpha`.
    #[serde(default = "cross_validation__num_alpha")]
    pub num_alpha: usize,
}
fn cross_validation__min_alpha() -> f64 { 1e-3 }
fn cross_validation__max_alpha() -> f64 { 1.0 }
fn cross_validation__num_alpha() -> usize { 100 }

impl CrossValidation {
    /// `alpha_i = min * (max / min)^((n - i) / n)` for `i = 0..=n`.
    pub fn alphas(&self) -> Vec<f64> {
        let CrossValidation { min_alpha, max_alpha, num_alpha } = *self;
        (0..=num_alpha).map(|i| {
            let t = (num_alpha - i) as f64 / num_alpha as f64;
            min_alpha * (max_alpha / min_alpha).powf(t)
        }).collect()
    }
}

impl Lasso {
    pub fn coordinate_descent_settings(&self) -> coordinate_descent::Settings {
        coordinate_descent::Settings {
            tolerance: self.tolerance,
            max_iter: self.max_iter,
            output_frequency: self.output_frequency,
        }
    }

    pub fn split_bregman_settings(&self) -> split_bregman::Settings {
        split_bregman::Settings {
            lambda: self.lambda,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
            max_iter_cg: self.max_iter_cg,
            output_frequency: self.output_frequency,
            preconditioner: Preconditioner::from_code(self.preconditioner),
        }
    }
}

//--------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Threading {
    /// Parallelize the constraint search and the assembly of the design matrix.
    Rayon,
    Serial,
}

// --------------------------------------------------------

impl Default for Threading {
    fn default() -> Self { Threading::Rayon }
}

impl Default for Constraint {
    fn default() -> Self { from_empty_mapping().unwrap() }
}

impl Default for Fitting {
    fn default() -> Self { from_empty_mapping().unwrap() }
}

impl Default for Lasso {
    fn default() -> Self { from_empty_mapping().unwrap() }
}

impl Default for CrossValidation {
    fn default() -> Self { from_empty_mapping().unwrap() }
}

impl Default for Settings {
    fn default() -> Self { from_empty_mapping().unwrap() }
}

#[test]
fn test_defaults()
{
    // NOTE: This simply checks that `from_empty_mapping` can succeed
    //       for each type that uses it.
    let _ = Threading::default();
    let _ = Constraint::default();
    let _ = Fitting::default();
    let _ = Lasso::default();
    let _ = CrossValidation::default();
    let _ = Settings::default();
}

fn from_empty_mapping<T: for<'de> serde::Deserialize<'de>>() -> serde_yaml::Result<T> {
    use serde_yaml::{from_value, Value, Mapping};
    from_value(Value::Mapping(Mapping::new()))
}
