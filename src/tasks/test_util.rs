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

//! Small crystals shared by the unit tests.

use crate::symmetry::{Symmetry, SymmetryOperation, Matrix3};
use crate::cluster::ClusterList;

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub fn operation(rotation_cart: Matrix3, compatible_with_cartesian: bool) -> SymmetryOperation {
    let mut rotation = [[0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            rotation[i][j] = rotation_cart[i][j].round() as i32;
        }
    }
    SymmetryOperation {
        rotation,
        rotation_cart,
        compatible_with_lattice: true,
        compatible_with_cartesian,
    }
}

/// The 48 operations of the cube, identity first.
pub fn signed_permutations() -> Vec<Matrix3> {
    let perms = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut out = vec![];
    for perm in &perms {
        for signs in 0..8 {
            let mut rot = [[0.0; 3]; 3];
            for row in 0..3 {
                let sign = if signs & (1 << row) == 0 { 1.0 } else { -1.0 };
                rot[row][perm[row]] = sign;
            }
            out.push(rot);
        }
    }
    out
}

fn single_atom(ops: Vec<SymmetryOperation>) -> Symmetry {
    let nsym = ops.len();
    Symmetry::new(ops, vec![vec![0; nsym]], vec![vec![0]], vec![0]).unwrap()
}

/// Simple cubic, one atom per cell, full point group.
pub fn cubic_single_atom() -> Symmetry {
    single_atom(signed_permutations().into_iter().map(|rot| operation(rot, true)).collect())
}

/// One atom with a threefold axis along z.
///
/// Only the identity is compatible with the Cartesian basis; both rotations
/// mix x and y and therefore produce constraints.
pub fn hexagonal_single_atom() -> Symmetry {
    let (c, s) = (-0.5, 0.75f64.sqrt());
    let c3 = [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]];
    let c3_inv = [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]];

    let mut op1 = operation(c3, false);
    op1.rotation = [[0, -1, 0], [1, -1, 0], [0, 0, 1]];
    let mut op2 = operation(c3_inv, false);
    op2.rotation = [[-1, 1, 0], [-1, 0, 0], [0, 0, 1]];

    single_atom(vec![operation(IDENTITY, true), op1, op2])
}

/// Two atoms related only by a pure translation (a doubled cell with no point group).
pub fn translated_pair() -> Symmetry {
    let ops = vec![operation(IDENTITY, true), operation(IDENTITY, true)];
    Symmetry::new(ops, vec![vec![0, 1], vec![1, 0]], vec![vec![0, 1]], vec![0, 1]).unwrap()
}

/// Harmonic clusters: the onsite term of each listed atom of the primitive cell,
/// plus the listed pairs.
pub fn harmonic_clusters(onsite: &[usize], pairs: &[(usize, usize)]) -> ClusterList {
    let mut clusters = ClusterList::new(1);
    for &a in onsite {
        clusters.insert(0, vec![a, a]).unwrap();
    }
    for &(a, b) in pairs {
        clusters.insert(0, vec![a, b]).unwrap();
    }
    clusters
}
