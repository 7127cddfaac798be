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

//! The design matrix.
//!
//! Each sample contributes `3 * natmin` rows, one per force component of a
//! primitive-cell atom. Row `3 * i + xyz + 3 * natmin * sample`, column `j`
//! holds the derivative of that force with respect to free parameter `j`.

use crate::{FailResult, InsufficientDataError, NoDataError};
use crate::symmetry::Symmetry;
use crate::fcs::ParameterTable;
use crate::constraint::ReducedBasis;
use fcfit_tasks_config::Threading;
use fcfit_linalg::{ColMatrix, norm2};

use itertools::Itertools;
use ndarray::Array2;
use rayon::prelude::*;
use slice_of_array::prelude::*;

/// Displacement/force samples of the supercell.
///
/// Both are indexed `[sample][3 * atom + xyz]`.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub displacements: Vec<Vec<f64>>,
    pub forces: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn new(displacements: Vec<Vec<f64>>, forces: Vec<Vec<f64>>) -> FailResult<Self> {
        ensure!(
            displacements.len() == forces.len(),
            "{} displacement samples but {} force samples", displacements.len(), forces.len()
        );
        for (i, (u, f)) in displacements.iter().zip(&forces).enumerate() {
            ensure!(u.len() == f.len(), "sample {}: displacements and forces differ in length", i);
            ensure!(u.len() % 3 == 0, "sample {}: length {} is not a multiple of 3", i, u.len());
        }
        Ok(Dataset { displacements, forces })
    }

    pub fn len(&self) -> usize { self.displacements.len() }
    pub fn is_empty(&self) -> bool { self.displacements.is_empty() }

    /// The first `ndata` samples, or all of them.
    pub fn take(&self, ndata: Option<usize>) -> FailResult<Dataset> {
        if self.is_empty() {
            throw!(NoDataError);
        }
        let ndata = ndata.unwrap_or(self.len());
        if ndata > self.len() {
            throw!(InsufficientDataError { needed: ndata, found: self.len() });
        }
        if ndata == 0 {
            throw!(NoDataError);
        }
        Ok(Dataset {
            displacements: self.displacements[..ndata].to_vec(),
            forces: self.forces[..ndata].to_vec(),
        })
    }

    /// Every sample seen from each translated copy of the primitive cell.
    ///
    /// Copy `t` of sample `i` lands at index `i * ntran + t`.
    pub fn multiply_by_translations(&self, symmetry: &Symmetry) -> FailResult<Dataset> {
        let nat = symmetry.nat();
        let ntran = symmetry.ntran();
        for (i, u) in self.displacements.iter().enumerate() {
            ensure!(u.len() == 3 * nat, "sample {} has {} components; expected {}", i, u.len(), 3 * nat);
        }

        let translate = |data: &[Vec<f64>]| -> Vec<Vec<f64>> {
            let mut out = Vec::with_capacity(data.len() * ntran);
            for row in data {
                let row: &[[f64; 3]] = row.nest();
                for &isym in symmetry.symnum_tran() {
                    let mut moved = vec![[0.0; 3]; nat];
                    for (j, v) in row.iter().enumerate() {
                        moved[symmetry.map_sym(j, isym)] = *v;
                    }
                    out.push(moved.flat().to_vec());
                }
            }
            out
        };

        Ok(Dataset {
            displacements: translate(&self.displacements),
            forces: translate(&self.forces),
        })
    }

    /// Truncation to `ndata` followed by [`Dataset::multiply_by_translations`].
    pub fn prepare(&self, ndata: Option<usize>, symmetry: &Symmetry) -> FailResult<Dataset> {
        let taken = self.take(ndata)?;
        let out = taken.multiply_by_translations(symmetry)?;
        info!("  Number of data sets used: {} (x{} translations = {})", taken.len(), symmetry.ntran(), out.len());
        Ok(out)
    }

    /// All displacements multiplied by `factor`.
    pub fn scale_displacements(&mut self, factor: f64) {
        self.displacements.iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|u| *u *= factor);
    }
}

//--------------------------------------------------------------------------------------------------

/// `A x ≈ b`, ready for a least-squares or L1 solver.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub a: ColMatrix,
    pub b: Vec<f64>,
    /// `||b||^2` before fixed parameters were moved to the right-hand side.
    pub f2norm: f64,
}

impl LinearSystem {
    pub fn nrows(&self) -> usize { self.a.rows() }
    pub fn ncols(&self) -> usize { self.a.cols() }

    /// `sqrt(||A x - b||^2 / f2norm)`
    pub fn relative_residual(&self, x: &[f64]) -> f64 {
        (fcfit_linalg::residual_norm2(&self.a, x, &self.b) / self.f2norm).sqrt()
    }
}

/// Symmetrization prefactor of a Taylor expansion term with these indices.
///
/// The number of positions equal to the first index, over the product of the
/// factorials of the multiplicity of each distinct index.
pub fn gamma(elems: &[usize]) -> f64 {
    let nsame_to_front = elems.iter().filter(|&&e| e == elems[0]).count();
    let sorted: Vec<usize> = elems.iter().cloned().sorted();
    let denom: u64 = sorted.iter()
        .group_by(|&&e| e)
        .into_iter()
        .map(|(_, run)| factorial(run.count()))
        .product();
    nsame_to_front as f64 / denom as f64
}

fn factorial(n: usize) -> u64 {
    (1..=n as u64).product()
}

/// Row of `3 * atom + xyz` within the block of one sample.
fn inprim_index(elem: usize, symmetry: &Symmetry) -> usize {
    match symmetry.prim_index(elem / 3) {
        Some(prim) => 3 * prim + elem % 3,
        None => panic!("(BUG) leading index {} does not belong to the primitive cell", elem),
    }
}

/// Builds the design matrix.
///
/// `data` must already be multiplied by translations. With `bases`, columns
/// are the free parameters of each order (fixed and dependent parts move to
/// the right-hand side); without, every mother of every order is a column.
pub fn assemble(
    tables: &[ParameterTable],
    bases: Option<&[ReducedBasis]>,
    symmetry: &Symmetry,
    data: &Dataset,
    threading: Threading,
) -> LinearSystem {
    if let Some(bases) = bases {
        assert_eq!(bases.len(), tables.len(), "(BUG) one reduced basis per order is required");
    }

    let natmin3 = 3 * symmetry.nat_prim();
    let ncycle = data.len();
    let ncols = match bases {
        Some(bases) => bases.iter().map(|b| b.num_free()).sum(),
        None => tables.iter().map(|t| t.num_mothers()).sum(),
    };
    debug!("Assembling a {} x {} design matrix", natmin3 * ncycle, ncols);

    let prim_atoms: Vec<usize> = symmetry.prim_atoms().collect();
    let compute = |irow: usize| -> (Array2<f64>, Vec<f64>, Vec<f64>) {
        let forces = &data.forces[irow];
        let b_orig: Vec<f64> = prim_atoms.iter()
            .flat_map(|&iat| (0..3).map(move |k| forces[3 * iat + k]))
            .collect();

        let orig = original_block(tables, symmetry, &data.displacements[irow], natmin3);
        match bases {
            None => (orig, b_orig.clone(), b_orig),
            Some(bases) => {
                let mut b = b_orig.clone();
                let reduced = reduce_block(&orig, bases, &mut b, ncols);
                (reduced, b, b_orig)
            },
        }
    };

    let blocks: Vec<_> = match threading {
        Threading::Rayon => (0..ncycle).into_par_iter().map(compute).collect(),
        Threading::Serial => (0..ncycle).map(compute).collect(),
    };

    let mut a = ColMatrix::zeros(natmin3 * ncycle, ncols);
    let mut b = Vec::with_capacity(natmin3 * ncycle);
    let mut f2norm = 0.0;
    for (irow, (block, block_b, block_b_orig)) in blocks.into_iter().enumerate() {
        let offset = natmin3 * irow;
        for j in 0..ncols {
            let col = &mut a.column_mut(j)[offset..offset + natmin3];
            for (dest, &x) in col.iter_mut().zip(block.column(j)) {
                *dest = x;
            }
        }
        b.extend(block_b);
        f2norm += norm2(&block_b_orig);
    }
    LinearSystem { a, b, f2norm }
}

// Contribution of one sample, with one column per mother of every order.
fn original_block(
    tables: &[ParameterTable],
    symmetry: &Symmetry,
    u: &[f64],
    natmin3: usize,
) -> Array2<f64> {
    let ncols: usize = tables.iter().map(|t| t.num_mothers()).sum();
    let mut block = Array2::zeros((natmin3, ncols));

    let mut shift = 0;
    for table in tables {
        for p in table.entries() {
            let k = inprim_index(p.elems[0], symmetry);
            let prod: f64 = p.elems[1..].iter().map(|&e| u[e]).product();
            block[(k, shift + p.mother)] -= gamma(&p.elems) * p.sign * prod;
        }
        shift += table.num_mothers();
    }
    block
}

fn reduce_block(
    orig: &Array2<f64>,
    bases: &[ReducedBasis],
    b: &mut [f64],
    ncols: usize,
) -> Array2<f64> {
    let mut out = Array2::zeros((orig.nrows(), ncols));

    let mut shift = 0;
    let mut free_shift = 0;
    for basis in bases {
        for fixed in basis.fixed() {
            let col = orig.column(shift + fixed.index);
            for (bi, &x) in b.iter_mut().zip(col.iter()) {
                *bi -= fixed.value * x;
            }
        }
        for (k, &j) in basis.free().iter().enumerate() {
            out.column_mut(free_shift + k).assign(&orig.column(shift + j));
        }
        for dep in basis.dependent() {
            let col = orig.column(shift + dep.index);
            for (bi, &x) in b.iter_mut().zip(col.iter()) {
                *bi -= dep.offset * x;
            }
            for &(k, c) in &dep.terms {
                out.column_mut(free_shift + k).scaled_add(c, &col);
            }
        }
        shift += basis.nparams();
        free_shift += basis.num_free();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use crate::fcs::generate_table;
    use crate::constraint::ConstraintRow;
    use fcfit_tasks_config::Basis;

    #[test]
    fn gamma_values() {
        assert_eq!(gamma(&[0, 0]), 1.0);
        assert_eq!(gamma(&[0, 3]), 1.0);
        assert_eq!(gamma(&[0, 0, 0]), 0.5);
        assert_eq!(gamma(&[0, 0, 1]), 1.0);
        assert_eq!(gamma(&[0, 1, 1]), 0.5);
        assert_eq!(gamma(&[2, 0, 2, 2]), 3.0 / 6.0);
    }

    #[test]
    fn sample_selection() {
        let data = Dataset::new(vec![vec![0.0; 3]; 2], vec![vec![0.0; 3]; 2]).unwrap();
        assert_eq!(data.take(None).unwrap().len(), 2);
        assert_eq!(data.take(Some(1)).unwrap().len(), 1);

        let err = data.take(Some(3)).unwrap_err();
        let err = err.downcast_ref::<InsufficientDataError>().unwrap();
        assert_eq!((err.needed, err.found), (3, 2));

        let empty = Dataset::new(vec![], vec![]).unwrap();
        assert!(empty.take(None).unwrap_err().downcast_ref::<NoDataError>().is_some());
        assert!(Dataset::new(vec![vec![0.0; 3]], vec![]).is_err());
    }

    #[test]
    fn translation_copies() {
        let symmetry = test_util::translated_pair();
        let data = Dataset::new(
            vec![vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]],
            vec![vec![-1.0, -2.0, -3.0, -4.0, -5.0, -6.0]],
        ).unwrap();

        let out = data.multiply_by_translations(&symmetry).unwrap();
        assert_eq!(out.displacements, vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            vec![4.0, 5.0, 6.0, 1.0, 2.0, 3.0],
        ]);
        assert_eq!(out.forces[1], vec![-4.0, -5.0, -6.0, -1.0, -2.0, -3.0]);

        let wrong = Dataset::new(vec![vec![0.0; 3]], vec![vec![0.0; 3]]).unwrap();
        assert!(wrong.multiply_by_translations(&symmetry).is_err());
    }

    #[test]
    fn cubic_onsite_columns() {
        let symmetry = test_util::cubic_single_atom();
        let clusters = test_util::harmonic_clusters(&[0], &[]);
        let tables = vec![generate_table(0, &clusters, &symmetry, Basis::Cartesian, true)];
        let data = Dataset::new(vec![vec![0.1, -0.2, 0.3]], vec![vec![1.0, 2.0, 3.0]]).unwrap();

        let sys = assemble(&tables, None, &symmetry, &data, Threading::Serial);
        assert_eq!((sys.nrows(), sys.ncols()), (3, 1));
        assert_close!(abs=1e-15, sys.a.column(0).to_vec(), vec![-0.1, 0.2, -0.3]);
        assert_eq!(sys.b, vec![1.0, 2.0, 3.0]);
        assert_eq!(sys.f2norm, 14.0);
        assert_eq!(sys.relative_residual(&[0.0]), 1.0);
    }

    fn pair_problem() -> (Symmetry, Vec<ParameterTable>, Dataset) {
        let symmetry = test_util::translated_pair();
        let clusters = test_util::harmonic_clusters(&[0], &[(0, 1)]);
        let tables = vec![generate_table(0, &clusters, &symmetry, Basis::Cartesian, true)];
        let data = Dataset::new(
            vec![
                vec![0.01, -0.02, 0.03, 0.015, 0.0, -0.01],
                vec![-0.03, 0.01, 0.02, -0.02, 0.025, 0.005],
            ],
            vec![
                vec![0.1, 0.2, -0.3, 0.05, 0.0, 0.4],
                vec![-0.2, 0.1, 0.0, 0.3, -0.1, 0.2],
            ],
        ).unwrap();
        let data = data.multiply_by_translations(&symmetry).unwrap();
        (symmetry, tables, data)
    }

    #[test]
    fn reduced_system_matches_substitution() {
        let (symmetry, tables, data) = pair_problem();
        let nparams = tables[0].num_mothers();
        let rows = vec![
            ConstraintRow { terms: vec![(0, 1.0), (3, -1.0), (7, 0.5)].into_iter().collect(), rhs: 0.5 },
            ConstraintRow::fix(1, 2.0),
        ];
        let basis = ReducedBasis::from_rref(nparams, &rows);
        assert_eq!(basis.num_free(), nparams - 2);

        let full = assemble(&tables, None, &symmetry, &data, Threading::Serial);
        let reduced = assemble(&tables, Some(&[basis.clone()]), &symmetry, &data, Threading::Serial);
        assert_eq!(reduced.ncols(), nparams - 2);
        assert_eq!(full.f2norm, reduced.f2norm);

        let x: Vec<f64> = (0..basis.num_free()).map(|i| 0.3 * i as f64 - 1.0).collect();
        let lhs = full.a.dot_vec(&basis.expand(&x));
        let rhs = reduced.a.dot_vec(&x);
        for i in 0..full.nrows() {
            let via_full = lhs[i] - full.b[i];
            let via_reduced = rhs[i] - reduced.b[i];
            assert_close!(abs=1e-13, via_full, via_reduced);
        }
    }

    #[test]
    fn threading_does_not_change_the_matrix() {
        let (symmetry, tables, data) = pair_problem();
        let serial = assemble(&tables, None, &symmetry, &data, Threading::Serial);
        let rayon = assemble(&tables, None, &symmetry, &data, Threading::Rayon);
        assert_eq!(serial.a, rayon.a);
        assert_eq!(serial.b, rayon.b);
    }
}
