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

//! Linear relations between the mother parameters.
//!
//! Operations that are not compatible with the basis cannot be used to merge
//! components into one parameter, but the force constants must still be
//! invariant under them. Each such operation gives one row per component.
//! User-fixed values add rows of their own.
//!
//! In algebraic mode the rows are solved up front. Each parameter becomes
//! fixed, free, or a linear function of the free ones ([`ReducedBasis`]).
//! In explicit mode they are handed to the solver as `C x = d`.

use crate::FailResult;
use crate::symmetry::Symmetry;
use crate::fcs::{ParameterTable, FcProperty, xyz_components, coef_sym, canonicalize};
use crate::cluster::order_name;
use fcfit_tasks_config::{Settings, Basis, ConstraintMode, Threading};
use fcfit_linalg::ColMatrix;

use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Entries below this are dropped from a freshly generated row.
const EPS8: f64 = 1e-8;

/// The equation `sum(terms[j] * p[j]) = rhs` over the mothers of one order.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    pub terms: BTreeMap<usize, f64>,
    pub rhs: f64,
}

impl ConstraintRow {
    /// `p[index] = value`
    pub fn fix(index: usize, value: f64) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(index, 1.0);
        ConstraintRow { terms, rhs: value }
    }

    /// Value of the left-hand side minus the right-hand side.
    pub fn violation(&self, params: &[f64]) -> f64 {
        self.terms.iter().map(|(&j, &c)| c * params[j]).sum::<f64>() - self.rhs
    }

    fn leading(&self) -> Option<(usize, f64)> {
        self.terms.iter().next().map(|(&j, &c)| (j, c))
    }

    fn divide(&mut self, d: f64) {
        self.terms.values_mut().for_each(|c| *c /= d);
        self.rhs /= d;
    }

    // self += a * other
    fn axpy(&mut self, a: f64, other: &ConstraintRow) {
        for (&j, &c) in &other.terms {
            *self.terms.entry(j).or_insert(0.0) += a * c;
        }
        self.rhs += a * other.rhs;
    }

    fn prune(&mut self, tolerance: f64) {
        let small: Vec<usize> = self.terms.iter()
            .filter(|&(_, &c)| c.abs() < tolerance)
            .map(|(&j, _)| j)
            .collect();
        for j in small {
            self.terms.remove(&j);
        }
    }
}

/// Constraints from the operations that are *not* compatible with `basis`.
///
/// Rows are normalized so that their leading coefficient is 1, and deduplicated.
/// With `do_rref` they are further reduced to a minimal set.
pub fn symmetry_constraints(
    table: &ParameterTable,
    symmetry: &Symmetry,
    basis: Basis,
    tolerance: f64,
    do_rref: bool,
    threading: Threading,
) -> FailResult<Vec<ConstraintRow>> {
    let nparams = table.num_mothers();
    if nparams == 0 {
        return Ok(vec![]);
    }

    let n = table.order() + 2;
    let components = xyz_components(n);
    let ops = symmetry.available_operations(basis, false);

    let lookup: HashMap<&[usize], &FcProperty> = {
        let mut map = HashMap::new();
        for p in table.entries() {
            map.entry(&p.elems[..]).or_insert(p);
        }
        map
    };

    let rows_from = |p: &FcProperty| -> Vec<Vec<(usize, f64)>> {
        let atoms: Vec<usize> = p.atoms().collect();
        let xyz: Vec<usize> = p.xyz().collect();
        let mut out = vec![];
        let mut row = vec![0.0; nparams];

        for op in &ops {
            let mapped_atoms: Vec<usize> = atoms.iter().map(|&a| op.atom_map[a]).collect();
            if !mapped_atoms.iter().any(|&a| symmetry.is_in_prim(a)) {
                continue;
            }

            row.iter_mut().for_each(|x| *x = 0.0);
            row[p.mother] = -p.sign;

            for comp in &components {
                let mut ind: Vec<usize> = mapped_atoms.iter().zip(comp).map(|(&a, &x)| 3 * a + x).collect();
                canonicalize(&mut ind, symmetry);
                if let Some(found) = lookup.get(&ind[..]) {
                    row[found.mother] += found.sign * coef_sym(&op.rotation, &xyz, comp);
                }
            }

            if let Some(loc) = row.iter().position(|x| x.abs() > EPS8) {
                let flip = if row[loc] < 0.0 { -1.0 } else { 1.0 };
                out.push({
                    row.iter().enumerate()
                        .filter(|&(_, x)| x.abs() >= EPS8)
                        .map(|(j, &x)| (j, flip * x))
                        .collect()
                });
            }
        }
        out
    };

    let mut all: Vec<Vec<(usize, f64)>> = match threading {
        Threading::Rayon => {
            table.entries().par_iter()
                .fold(Vec::new, |mut acc, p| { acc.extend(rows_from(p)); acc })
                .reduce(Vec::new, |mut a, b| { a.extend(b); a })
        },
        Threading::Serial => table.entries().iter().flat_map(|p| rows_from(p)).collect(),
    };

    all.sort_by(|a, b| cmp_sparse(a, b));
    all.dedup();

    let rows = all.into_iter().map(|entries| {
        let lead = entries[0].1;
        ConstraintRow {
            terms: entries.into_iter().map(|(j, c)| (j, c / lead)).collect(),
            rhs: 0.0,
        }
    }).collect();

    match do_rref {
        true => rref_sparse(rows, tolerance),
        false => Ok(rows),
    }
}

fn cmp_sparse(a: &[(usize, f64)], b: &[(usize, f64)]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.0.cmp(&y.0).then(x.1.partial_cmp(&y.1).unwrap_or(Ordering::Equal));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Gauss-Jordan elimination to reduced row echelon form.
///
/// Coefficients below `tolerance` are treated as zero. Rows that reduce to
/// `0 = 0` are dropped; a row reducing to `0 = c` with `c != 0` is an error.
/// The output is sorted by pivot column, and each pivot has coefficient 1 and
/// appears in no other row.
pub fn rref_sparse(rows: Vec<ConstraintRow>, tolerance: f64) -> FailResult<Vec<ConstraintRow>> {
    let mut reduced: Vec<(usize, ConstraintRow)> = vec![];

    for mut row in rows {
        for (pivot, prev) in &reduced {
            if let Some(c) = row.terms.get(pivot).cloned() {
                row.axpy(-c, prev);
            }
        }
        row.prune(tolerance);

        let (pivot, lead) = match row.leading() {
            Some(x) => x,
            None => {
                ensure!(
                    row.rhs.abs() <= tolerance,
                    "constraints are inconsistent (a combination of them reads 0 = {:e})", row.rhs
                );
                continue;
            },
        };
        row.divide(lead);
        row.terms.insert(pivot, 1.0);

        for (_, prev) in &mut reduced {
            if let Some(c) = prev.terms.get(&pivot).cloned() {
                prev.axpy(-c, &row);
                prev.prune(tolerance);
            }
        }
        reduced.push((pivot, row));
    }

    reduced.sort_by_key(|&(pivot, _)| pivot);
    Ok(reduced.into_iter().map(|(_, row)| row).collect())
}

//--------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct FixedValue {
    pub index: usize,
    pub value: f64,
}

/// `p[index] = offset + sum(c * free[k] for (k, c) in terms)`
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct Dependent {
    pub index: usize,
    pub offset: f64,
    /// Indices here are into the free parameters.
    pub terms: Vec<(usize, f64)>,
}

/// Parameterization of the mothers of one order by a smaller set of free values.
///
/// Every mother is exactly one of free, fixed, or dependent.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ReducedBasis {
    nparams: usize,
    free: Vec<usize>,
    fixed: Vec<FixedValue>,
    dependent: Vec<Dependent>,
}

impl ReducedBasis {
    /// Every parameter is free.
    pub fn identity(nparams: usize) -> Self {
        ReducedBasis { nparams, free: (0..nparams).collect(), fixed: vec![], dependent: vec![] }
    }

    /// Reads off the parameterization from rows in reduced row echelon form.
    ///
    /// A pivot alone in its row is fixed, a pivot with company depends on the
    /// non-pivot columns, and every non-pivot column is free.
    ///
    /// # Panics
    ///
    /// If the rows are not in reduced row echelon form (see [`rref_sparse`]).
    pub fn from_rref(nparams: usize, rows: &[ConstraintRow]) -> Self {
        let mut is_pivot = vec![false; nparams];
        for row in rows {
            let (pivot, lead) = row.leading().expect("(BUG) empty row in reduced echelon form");
            assert_eq!(lead, 1.0, "(BUG) pivot of a reduced row is not 1");
            assert!(!is_pivot[pivot], "(BUG) two reduced rows share pivot {}", pivot);
            is_pivot[pivot] = true;
        }

        let free: Vec<usize> = (0..nparams).filter(|&j| !is_pivot[j]).collect();
        let mut free_index = vec![None; nparams];
        for (k, &j) in free.iter().enumerate() {
            free_index[j] = Some(k);
        }

        let mut fixed = vec![];
        let mut dependent = vec![];
        for row in rows {
            let mut terms = row.terms.iter();
            let index = match terms.next() {
                Some((&j, _)) => j,
                None => unreachable!(),
            };
            let terms: Vec<(usize, f64)> = terms.map(|(&j, &c)| {
                let k = free_index[j].unwrap_or_else(|| {
                    panic!("(BUG) pivot column {} appears in another reduced row", j)
                });
                (k, -c)
            }).collect();

            match terms.is_empty() {
                true => fixed.push(FixedValue { index, value: row.rhs }),
                false => dependent.push(Dependent { index, offset: row.rhs, terms }),
            }
        }
        ReducedBasis { nparams, free, fixed, dependent }
    }

    pub fn nparams(&self) -> usize { self.nparams }
    pub fn num_free(&self) -> usize { self.free.len() }
    /// Mother index of each free parameter.
    pub fn free(&self) -> &[usize] { &self.free }
    pub fn fixed(&self) -> &[FixedValue] { &self.fixed }
    pub fn dependent(&self) -> &[Dependent] { &self.dependent }

    /// All mother parameters from the free ones.
    pub fn expand(&self, free_values: &[f64]) -> Vec<f64> {
        assert_eq!(free_values.len(), self.num_free());
        let mut out = vec![0.0; self.nparams];
        for f in &self.fixed {
            out[f.index] = f.value;
        }
        for (&j, &x) in self.free.iter().zip(free_values) {
            out[j] = x;
        }
        for dep in &self.dependent {
            out[dep.index] = dep.offset + dep.terms.iter().map(|&(k, c)| c * free_values[k]).sum::<f64>();
        }
        out
    }

    /// The free parameters of a full parameter vector.
    pub fn project(&self, params: &[f64]) -> Vec<f64> {
        assert_eq!(params.len(), self.nparams);
        self.free.iter().map(|&j| params[j]).collect()
    }

    /// The same relations with fixed values and offsets multiplied by `factor`.
    ///
    /// (used when parameters are measured in different units during a fit)
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        out.fixed.iter_mut().for_each(|f| f.value *= factor);
        out.dependent.iter_mut().for_each(|d| d.offset *= factor);
        out
    }
}

//--------------------------------------------------------------------------------------------------

/// All constraints of a fit, per order.
#[derive(Serialize)]
#[derive(Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Constraints {
    mode: ConstraintMode,
    rows: Vec<Vec<ConstraintRow>>,
    bases: Vec<ReducedBasis>,
}

impl Constraints {
    pub fn build(
        tables: &[ParameterTable],
        symmetry: &Symmetry,
        settings: &Settings,
    ) -> FailResult<Self> {
        let config = &settings.constraint;
        info!("CONSTRAINT");

        let mut fixed_rows = vec![vec![]; tables.len()];
        for fix in &config.fix {
            ensure!(
                fix.order < tables.len(),
                "`constraint.fix`: order {} is out of range (maxorder = {})", fix.order, tables.len()
            );
            let nparams = tables[fix.order].num_mothers();
            ensure!(
                fix.index < nparams,
                "`constraint.fix`: {} has only {} parameters (index {} given)",
                order_name(fix.order), nparams, fix.index
            );
            fixed_rows[fix.order].push(ConstraintRow::fix(fix.index, fix.value));
        }

        let mut rows = vec![];
        let mut bases = vec![];
        for (table, fixed) in tables.iter().zip(fixed_rows) {
            let nparams = table.num_mothers();
            let mut order_rows = symmetry_constraints(
                table, symmetry, settings.basis, config.tolerance, false, settings.threading,
            )?;
            order_rows.extend(fixed);
            // the explicit solver needs independent rows (P <= N)
            if config.rref || config.mode == ConstraintMode::Explicit {
                order_rows = rref_sparse(order_rows, config.tolerance)?;
            }

            let basis = match config.mode {
                ConstraintMode::Algebraic => ReducedBasis::from_rref(nparams, &order_rows),
                ConstraintMode::Explicit => ReducedBasis::identity(nparams),
            };
            info!(
                "  {:>9}: {} constraints, {} free parameters out of {}",
                order_name(table.order()), order_rows.len(), basis.num_free(), nparams,
            );
            rows.push(order_rows);
            bases.push(basis);
        }

        Ok(Constraints { mode: config.mode, rows, bases })
    }

    pub fn mode(&self) -> ConstraintMode { self.mode }
    pub fn rows(&self, order: usize) -> &[ConstraintRow] { &self.rows[order] }
    pub fn num_rows(&self) -> usize { self.rows.iter().map(|r| r.len()).sum() }

    /// One per order. All parameters are free in explicit mode.
    pub fn bases(&self) -> &[ReducedBasis] { &self.bases }

    /// The rows of all orders as `C x = d`, with the mothers of all orders as columns.
    pub fn explicit_system(&self) -> (ColMatrix, Vec<f64>) {
        let ncols: usize = self.bases.iter().map(|b| b.nparams()).sum();
        let mut c = ColMatrix::zeros(self.num_rows(), ncols);
        let mut d = Vec::with_capacity(self.num_rows());

        let mut shift = 0;
        for (rows, basis) in self.rows.iter().zip(&self.bases) {
            for row in rows {
                for (&j, &coeff) in &row.terms {
                    c[(d.len(), shift + j)] = coeff;
                }
                d.push(row.rhs);
            }
            shift += basis.nparams();
        }
        (c, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use crate::fcs::generate_table;
    use fcfit_tasks_config::FixedParameter;

    fn row(terms: &[(usize, f64)], rhs: f64) -> ConstraintRow {
        ConstraintRow { terms: terms.iter().cloned().collect(), rhs }
    }

    fn hexagonal_table() -> (Symmetry, ParameterTable) {
        let symmetry = test_util::hexagonal_single_atom();
        let clusters = test_util::harmonic_clusters(&[0], &[]);
        let table = generate_table(0, &clusters, &symmetry, Basis::Cartesian, true);
        (symmetry, table)
    }

    #[test]
    fn hexagonal_rows_admit_uniaxial_tensors() {
        let (symmetry, table) = hexagonal_table();
        // mothers: xx, xy, xz, yy, yz, zz
        let (a, b) = (1.3, -0.4);
        let uniaxial = [a, 0.0, 0.0, a, 0.0, b];
        let skewed = [a, 0.0, 0.0, a + 0.1, 0.0, b];

        for &do_rref in &[false, true] {
            let rows = symmetry_constraints(&table, &symmetry, Basis::Cartesian, 1e-8, do_rref, Threading::Rayon).unwrap();
            assert!(!rows.is_empty());
            for r in &rows {
                assert!(r.violation(&uniaxial).abs() < 1e-8, "{:?}", r);
                assert_eq!(r.leading().unwrap().1, 1.0);
            }
            assert!(rows.iter().any(|r| r.violation(&skewed).abs() > 1e-3));
        }
    }

    #[test]
    fn hexagonal_reduced_basis() {
        let (symmetry, table) = hexagonal_table();
        let rows = symmetry_constraints(&table, &symmetry, Basis::Cartesian, 1e-8, true, Threading::Serial).unwrap();
        assert_eq!(rows.len(), 4);

        let basis = ReducedBasis::from_rref(6, &rows);
        assert_eq!(basis.free(), &[3, 5]);
        assert_eq!(basis.fixed().len(), 3);
        assert_eq!(basis.dependent().len(), 1);
        assert_close!(abs=1e-12, basis.expand(&[2.0, 7.0]), vec![2.0, 0.0, 0.0, 2.0, 0.0, 7.0]);
    }

    #[test]
    fn no_incompatible_operations() {
        let symmetry = test_util::cubic_single_atom();
        let clusters = test_util::harmonic_clusters(&[0], &[]);
        let table = generate_table(0, &clusters, &symmetry, Basis::Cartesian, true);
        let rows = symmetry_constraints(&table, &symmetry, Basis::Cartesian, 1e-8, true, Threading::Rayon).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn threading_does_not_change_rows() {
        let (symmetry, table) = hexagonal_table();
        let serial = symmetry_constraints(&table, &symmetry, Basis::Cartesian, 1e-8, false, Threading::Serial).unwrap();
        let rayon = symmetry_constraints(&table, &symmetry, Basis::Cartesian, 1e-8, false, Threading::Rayon).unwrap();
        assert_eq!(serial, rayon);
    }

    #[test]
    fn rref_with_right_hand_side() {
        let rows = vec![
            row(&[(0, 2.0), (1, -2.0)], 0.0),
            row(&[(1, 1.0)], 2.0),
            row(&[(0, 1.0)], 2.0), // redundant
        ];
        let reduced = rref_sparse(rows, 1e-8).unwrap();
        assert_eq!(reduced, vec![row(&[(0, 1.0)], 2.0), row(&[(1, 1.0)], 2.0)]);
    }

    #[test]
    fn rref_rejects_contradictions() {
        let rows = vec![row(&[(0, 1.0)], 1.0), row(&[(0, 1.0)], 2.0)];
        assert!(rref_sparse(rows, 1e-8).is_err());
    }

    #[test]
    fn rref_leaves_pivots_alone_in_their_columns() {
        let rows = vec![
            row(&[(2, 1.0), (3, 1.0)], 0.0),
            row(&[(0, 1.0), (2, 1.0)], 1.0),
            row(&[(1, 3.0), (3, 3.0), (4, 6.0)], 3.0),
        ];
        let reduced = rref_sparse(rows, 1e-8).unwrap();
        let pivots: Vec<usize> = reduced.iter().map(|r| r.leading().unwrap().0).collect();
        assert_eq!(pivots, vec![0, 1, 2]);
        for (i, r) in reduced.iter().enumerate() {
            for (k, &p) in pivots.iter().enumerate() {
                assert_eq!(r.terms.contains_key(&p), i == k);
            }
        }
        assert_eq!(reduced[0], row(&[(0, 1.0), (3, -1.0)], 1.0));
        assert_eq!(reduced[1], row(&[(1, 1.0), (3, 1.0), (4, 2.0)], 1.0));
    }

    #[test]
    fn basis_round_trip() {
        let rows = vec![
            row(&[(0, 1.0), (2, -0.5), (4, 2.0)], 1.0),
            row(&[(1, 1.0)], 3.0),
            row(&[(3, 1.0), (4, 1.0)], 0.0),
        ];
        let basis = ReducedBasis::from_rref(5, &rows);
        assert_eq!(basis.free(), &[2, 4]);

        let free = vec![0.1234567, -9.87654321];
        let full = basis.expand(&free);
        assert_eq!(basis.project(&full), free);
        for r in &rows {
            assert!(r.violation(&full).abs() < 1e-14);
        }
        assert_eq!(full[1], 3.0);

        let scaled = basis.scaled(10.0).expand(&free);
        assert_eq!(scaled[1], 30.0);
        assert_eq!(ReducedBasis::identity(3).expand(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn user_fixed_parameters() {
        let symmetry = test_util::translated_pair();
        let clusters = test_util::harmonic_clusters(&[0], &[(0, 1)]);
        let tables = vec![generate_table(0, &clusters, &symmetry, Basis::Cartesian, true)];

        let mut settings = Settings::default();
        settings.constraint.fix = vec![FixedParameter { order: 0, index: 4, value: -1.5 }];
        let constraints = Constraints::build(&tables, &symmetry, &settings).unwrap();
        let basis = &constraints.bases()[0];
        assert_eq!(basis.num_free(), 11);
        assert_eq!(basis.fixed(), &[FixedValue { index: 4, value: -1.5 }]);

        settings.constraint.fix[0].index = 12;
        assert!(Constraints::build(&tables, &symmetry, &settings).is_err());
    }

    #[test]
    fn explicit_system_layout() {
        let (symmetry, table) = hexagonal_table();
        let onsite = table.clone();
        let mut settings = Settings::default();
        settings.constraint.mode = ConstraintMode::Explicit;
        settings.constraint.fix = vec![FixedParameter { order: 0, index: 5, value: 4.0 }];

        let constraints = Constraints::build(&[onsite], &symmetry, &settings).unwrap();
        assert_eq!(constraints.bases()[0].num_free(), 6);

        let (c, d) = constraints.explicit_system();
        assert_eq!((c.rows(), c.cols()), (5, 6));
        assert_eq!(d, vec![0.0, 0.0, 0.0, 0.0, 4.0]);
        assert_eq!(c[(4, 5)], 1.0);
    }
}
