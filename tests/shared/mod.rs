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

//! Crystals and synthetic samples shared by the integration tests.

#![allow(dead_code)]

use fcfit::{ClusterList, Dataset, Symmetry, SymmetryOperation};
use fcfit::symmetry::Matrix3;
use rand::Rng;

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// An operation whose lattice rotation is its (integral) Cartesian rotation.
pub fn operation(rotation_cart: Matrix3) -> SymmetryOperation {
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
        compatible_with_cartesian: true,
    }
}

/// The point group of the cube, identity first.
pub fn cubic_point_group() -> Vec<Matrix3> {
    let perms = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut out = vec![];
    for perm in &perms {
        for signs in 0..8 {
            let mut rot = [[0.0; 3]; 3];
            for row in 0..3 {
                rot[row][perm[row]] = if signs & (1 << row) == 0 { 1.0 } else { -1.0 };
            }
            out.push(rot);
        }
    }
    out
}

/// One atom, full cubic symmetry.
pub fn simple_cubic() -> Symmetry {
    let ops: Vec<_> = cubic_point_group().into_iter().map(operation).collect();
    let nsym = ops.len();
    Symmetry::new(ops, vec![vec![0; nsym]], vec![vec![0]], vec![0]).unwrap()
}

/// A doubled cell of a one-atom crystal without point symmetry.
pub fn translated_pair() -> Symmetry {
    Symmetry::new(
        vec![operation(IDENTITY), operation(IDENTITY)],
        vec![vec![0, 1], vec![1, 0]],
        vec![vec![0, 1]],
        vec![0, 1],
    ).unwrap()
}

pub fn harmonic_clusters(onsite: &[usize], pairs: &[(usize, usize)]) -> ClusterList {
    let mut lists = vec![vec![]];
    lists[0].extend(onsite.iter().map(|&a| vec![a, a]));
    lists[0].extend(pairs.iter().map(|&(a, b)| vec![a, b]));
    ClusterList::from_lists(lists).unwrap()
}

pub fn random_displacements(nsamples: usize, nat: usize) -> Vec<Vec<f64>> {
    let mut rng = ::rand::thread_rng();
    (0..nsamples)
        .map(|_| (0..3 * nat).map(|_| rng.gen_range(-0.02, 0.02)).collect())
        .collect()
}

/// Samples of `F_e = -sum_f phi(e, f) u_f`, indexed by `3 * atom + xyz`.
pub fn harmonic_dataset(u: Vec<Vec<f64>>, phi: impl Fn(usize, usize) -> f64) -> Dataset {
    let forces = u.iter().map(|u| {
        (0..u.len()).map(|e| -(0..u.len()).map(|f| phi(e, f) * u[f]).sum::<f64>()).collect()
    }).collect();
    Dataset::new(u, forces).unwrap()
}
