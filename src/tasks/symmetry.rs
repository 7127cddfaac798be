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

//! Symmetry information about the supercell, as consumed by the fitter.
//!
//! Discovering the operations is somebody else's job; this only stores
//! them and answers the questions the parameter search asks.

use crate::FailResult;
use fcfit_tasks_config::Basis;

pub type Matrix3 = [[f64; 3]; 3];

/// One space group operation of the supercell.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SymmetryOperation {
    /// Rotation in the lattice basis.
    pub rotation: [[i32; 3]; 3],
    /// The same rotation in Cartesian coordinates.
    pub rotation_cart: Matrix3,
    /// Whether the operation leaves the lattice-basis components
    /// of a force constant tensor within the chosen parameterization.
    pub compatible_with_lattice: bool,
    pub compatible_with_cartesian: bool,
}

/// Symmetry operations together with their action on the atoms of the supercell.
#[derive(Debug, Clone)]
pub struct Symmetry {
    operations: Vec<SymmetryOperation>,
    // [atom][op]
    map_sym: Vec<Vec<usize>>,
    // [prim][tran]
    map_p2s: Vec<Vec<usize>>,
    symnum_tran: Vec<usize>,
    // supercell atom -> primitive index, for atoms of the primitive cell
    prim_index: Vec<Option<usize>>,
}

/// An operation selected for a basis, ready for use in the parameter search.
#[derive(Debug, Clone)]
pub struct AvailableOp {
    /// `rotation[mapped][original]`
    pub rotation: Matrix3,
    /// Image of each supercell atom.
    pub atom_map: Vec<usize>,
}

impl Symmetry {
    /// * `map_sym[atom][op]` is the image of `atom` under operation `op`.
    /// * `map_p2s[prim][tran]` is the supercell atom that the primitive atom `prim`
    ///   is moved to by the `tran`th pure translation. Column 0 holds the
    ///   representatives that make up "the" primitive cell.
    /// * `symnum_tran[tran]` is the index of the `tran`th pure translation in `operations`.
    pub fn new(
        operations: Vec<SymmetryOperation>,
        map_sym: Vec<Vec<usize>>,
        map_p2s: Vec<Vec<usize>>,
        symnum_tran: Vec<usize>,
    ) -> FailResult<Self> {
        let nat = map_sym.len();
        let nsym = operations.len();
        let ntran = symnum_tran.len();

        ensure!(nsym > 0, "at least one symmetry operation (the identity) is required");
        ensure!(!map_p2s.is_empty(), "the primitive cell has no atoms");
        ensure!(ntran > 0, "at least one pure translation (the identity) is required");
        for (atom, row) in map_sym.iter().enumerate() {
            ensure!(row.len() == nsym, "map_sym[{}] has {} entries; expected one per operation ({})", atom, row.len(), nsym);
            ensure!(row.iter().all(|&x| x < nat), "map_sym[{}] maps outside of the supercell", atom);
        }
        for (prim, row) in map_p2s.iter().enumerate() {
            ensure!(row.len() == ntran, "map_p2s[{}] has {} entries; expected one per translation ({})", prim, row.len(), ntran);
            ensure!(row.iter().all(|&x| x < nat), "map_p2s[{}] refers to an atom outside of the supercell", prim);
        }
        ensure!(
            map_p2s.len() * ntran == nat,
            "{} primitive atoms times {} translations does not cover the {} atoms of the supercell",
            map_p2s.len(), ntran, nat
        );
        ensure!(symnum_tran.iter().all(|&s| s < nsym), "symnum_tran refers to a nonexistent operation");

        // parameter tables rely on every component being its own image under operation 0
        let first = &operations[0];
        ensure!(
            first.rotation == [[1, 0, 0], [0, 1, 0], [0, 0, 1]]
                && first.compatible_with_lattice
                && first.compatible_with_cartesian
                && map_sym.iter().enumerate().all(|(atom, row)| row[0] == atom),
            "the first symmetry operation must be the identity",
        );

        let mut prim_index = vec![None; nat];
        for (prim, row) in map_p2s.iter().enumerate() {
            ensure!(prim_index[row[0]].is_none(), "atom {} appears twice in the primitive cell", row[0]);
            prim_index[row[0]] = Some(prim);
        }

        Ok(Symmetry { operations, map_sym, map_p2s, symnum_tran, prim_index })
    }

    pub fn nat(&self) -> usize { self.map_sym.len() }
    pub fn nat_prim(&self) -> usize { self.map_p2s.len() }
    pub fn ntran(&self) -> usize { self.symnum_tran.len() }
    pub fn operations(&self) -> &[SymmetryOperation] { &self.operations }

    /// Image of `atom` under operation `op`.
    pub fn map_sym(&self, atom: usize, op: usize) -> usize { self.map_sym[atom][op] }

    /// Supercell index of each primitive atom.
    pub fn prim_atoms(&self) -> impl Iterator<Item=usize> + '_ { self.map_p2s.iter().map(|row| row[0]) }

    /// Operation index of each pure translation.
    pub fn symnum_tran(&self) -> &[usize] { &self.symnum_tran }

    /// Position of `atom` in the primitive cell, if it belongs to it.
    pub fn prim_index(&self, atom: usize) -> Option<usize> { self.prim_index[atom] }

    pub fn is_in_prim(&self, atom: usize) -> bool { self.prim_index[atom].is_some() }

    /// The operations (in)compatible with `basis`, with their rotation in that basis.
    ///
    /// `compatible = true` selects the group used to enumerate parameters;
    /// `compatible = false` selects the operations that produce constraints.
    pub fn available_operations(&self, basis: Basis, compatible: bool) -> Vec<AvailableOp> {
        self.operations.iter().enumerate()
            .filter(|(_, op)| match basis {
                Basis::Cartesian => op.compatible_with_cartesian == compatible,
                Basis::Lattice => op.compatible_with_lattice == compatible,
            })
            .map(|(isym, op)| {
                let rotation = match basis {
                    Basis::Cartesian => op.rotation_cart,
                    Basis::Lattice => {
                        let mut out = [[0.0; 3]; 3];
                        for i in 0..3 {
                            for j in 0..3 {
                                out[i][j] = f64::from(op.rotation[i][j]);
                            }
                        }
                        out
                    },
                };
                let atom_map = self.map_sym.iter().map(|row| row[isym]).collect();
                AvailableOp { rotation, atom_map }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn basis_selection() {
        let symmetry = test_util::hexagonal_single_atom();

        let compatible = symmetry.available_operations(Basis::Cartesian, true);
        assert_eq!(compatible.len(), 1);
        assert_eq!(compatible[0].rotation, test_util::IDENTITY);

        let incompatible = symmetry.available_operations(Basis::Cartesian, false);
        assert_eq!(incompatible.len(), 2);
        assert_eq!(incompatible[0].atom_map, vec![0]);

        // every operation of this lattice is an integer matrix in the lattice basis
        let lattice = symmetry.available_operations(Basis::Lattice, true);
        assert_eq!(lattice.len(), 3);
        assert_eq!(lattice[1].rotation, [[0.0, -1.0, 0.0], [1.0, -1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(symmetry.available_operations(Basis::Lattice, false).is_empty());
    }

    #[test]
    fn primitive_lookup() {
        let symmetry = test_util::translated_pair();
        assert_eq!(symmetry.nat(), 2);
        assert_eq!(symmetry.nat_prim(), 1);
        assert_eq!(symmetry.ntran(), 2);
        assert_eq!(symmetry.prim_index(0), Some(0));
        assert_eq!(symmetry.prim_index(1), None);
        assert_eq!(symmetry.prim_atoms().collect::<Vec<_>>(), vec![0]);
        assert_eq!(symmetry.map_sym(0, 1), 1);
    }

    #[test]
    fn inconsistent_tables() {
        let op = test_util::operation(test_util::IDENTITY, true);
        // map_sym row of the wrong length
        assert!(Symmetry::new(vec![op.clone()], vec![vec![0, 0]], vec![vec![0]], vec![0]).is_err());
        // primitive cell times translations does not match the atom count
        assert!(Symmetry::new(vec![op.clone()], vec![vec![0], vec![1]], vec![vec![0]], vec![0]).is_err());
        // translation refers to a missing operation
        assert!(Symmetry::new(vec![op.clone()], vec![vec![0]], vec![vec![0]], vec![3]).is_err());
        // the first operation must be the identity
        let swapped = vec![vec![1, 0], vec![0, 1]];
        let two = vec![op.clone(), op.clone()];
        assert!(Symmetry::new(two, swapped, vec![vec![0, 1]], vec![0, 1]).is_err());
        let inversion = test_util::operation([[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]], true);
        assert!(Symmetry::new(vec![inversion, op.clone()], vec![vec![0, 0]], vec![vec![0]], vec![1]).is_err());
        assert!(Symmetry::new(vec![op], vec![vec![0]], vec![vec![0]], vec![0]).is_ok());
    }
}
