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

//! Enumeration of the symmetry-distinct force constants of each order.
//!
//! Every Cartesian component of every cluster is pushed through the operations
//! compatible with the basis. The images found this way form one group, headed
//! by a "mother" parameter; each member records the coefficient relating it
//! to the mother. A group that some operation maps onto its own negative is
//! forced to zero and gets no mother.

use crate::symmetry::{Symmetry, Matrix3};
use crate::cluster::{ClusterList, order_name};
use fcfit_tasks_config::Basis;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// `mother` of entries in a group that symmetry forces to zero.
pub const ZERO_MOTHER: usize = ::std::usize::MAX;

/// Coupling coefficients below this are dropped.
const EPS12: f64 = 1e-12;
/// Tolerance on a coefficient of exactly `-1` in zero detection.
const EPS8: f64 = 1e-8;

/// One Cartesian component of a force constant.
///
/// Equality, hashing and ordering only look at `elems`.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone)]
pub struct FcProperty {
    /// `3 * atom + xyz` for each index, primitive-cell atom first, remainder sorted.
    pub elems: Vec<usize>,
    /// Coefficient relating this component to its mother parameter.
    pub sign: f64,
    /// Index of the mother parameter, or [`ZERO_MOTHER`].
    pub mother: usize,
}

impl PartialEq for FcProperty {
    fn eq(&self, other: &Self) -> bool { self.elems == other.elems }
}
impl Eq for FcProperty {}

impl Hash for FcProperty {
    fn hash<H: Hasher>(&self, state: &mut H) { self.elems.hash(state) }
}

impl PartialOrd for FcProperty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for FcProperty {
    fn cmp(&self, other: &Self) -> Ordering { self.elems.cmp(&other.elems) }
}

impl FcProperty {
    pub fn atoms(&self) -> impl Iterator<Item=usize> + '_ { self.elems.iter().map(|e| e / 3) }
    pub fn xyz(&self) -> impl Iterator<Item=usize> + '_ { self.elems.iter().map(|e| e % 3) }
    pub fn is_zero(&self) -> bool { self.mother == ZERO_MOTHER }
}

/// All force constant components of one order, grouped by mother.
#[derive(Serialize)]
#[derive(Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ParameterTable {
    order: usize,
    /// Members of mother 0, then mother 1, and so on; each block sorted.
    entries: Vec<FcProperty>,
    /// Size of each block in `entries`.
    nequiv: Vec<usize>,
    /// Members of zero-forced groups (only when they are stored).
    zeros: Vec<FcProperty>,
}

/// A single component, resolved to a number.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct FcValue {
    pub elems: Vec<usize>,
    pub value: f64,
}

impl ParameterTable {
    pub fn order(&self) -> usize { self.order }
    pub fn entries(&self) -> &[FcProperty] { &self.entries }
    pub fn nequiv(&self) -> &[usize] { &self.nequiv }
    pub fn zeros(&self) -> &[FcProperty] { &self.zeros }
    pub fn num_mothers(&self) -> usize { self.nequiv.len() }

    /// The member blocks, one per mother.
    pub fn groups(&self) -> impl Iterator<Item=&[FcProperty]> + '_ {
        let mut rest = &self.entries[..];
        self.nequiv.iter().map(move |&n| {
            let (group, tail) = rest.split_at(n);
            rest = tail;
            group
        })
    }

    /// The first member of each block.
    pub fn representatives(&self) -> Vec<&FcProperty> {
        self.groups().map(|group| &group[0]).collect()
    }

    /// Every component, given one value per mother.
    pub fn expand_values(&self, values: &[f64]) -> Vec<FcValue> {
        assert_eq!(values.len(), self.num_mothers());
        self.entries.iter()
            .map(|p| FcValue { elems: p.elems.clone(), value: p.sign * values[p.mother] })
            .collect()
    }
}

/// Every assignment of `n` Cartesian axes, in lexicographic order.
pub fn xyz_components(n: usize) -> Vec<Vec<usize>> {
    let mut out = vec![vec![]];
    for _ in 0..n {
        out = out.into_iter()
            .flat_map(|prefix| (0..3).map(move |x| {
                let mut v = prefix.clone();
                v.push(x);
                v
            }))
            .collect();
    }
    out
}

/// Coefficient with which component `to` of the image picks up component `from`.
pub fn coef_sym(rotation: &Matrix3, from: &[usize], to: &[usize]) -> f64 {
    from.iter().zip(to).map(|(&a, &b)| rotation[b][a]).product()
}

fn is_ascending(elems: &[usize]) -> bool {
    elems.windows(2).all(|w| w[0] <= w[1])
}

/// Position of the smallest index belonging to the primitive cell (0 if there is none).
fn min_index_in_prim(elems: &[usize], symmetry: &Symmetry) -> usize {
    let outside = 3 * symmetry.nat();
    let key = |e: usize| match symmetry.is_in_prim(e / 3) {
        true => e,
        false => outside,
    };

    let mut loc = 0;
    let mut min = key(elems[0]);
    for (i, &e) in elems.iter().enumerate().skip(1) {
        if key(e) < min {
            min = key(e);
            loc = i;
        }
    }
    loc
}

/// Brings a primitive-cell index to the front and sorts the rest.
pub fn canonicalize(elems: &mut [usize], symmetry: &Symmetry) {
    let loc = min_index_in_prim(elems, symmetry);
    elems.swap(0, loc);
    elems[1..].sort();
}

/// Builds the table for one order from the operations compatible with `basis`.
pub fn generate_table(
    order: usize,
    clusters: &ClusterList,
    symmetry: &Symmetry,
    basis: Basis,
    store_zeros: bool,
) -> ParameterTable {
    let n = order + 2;
    let ops = symmetry.available_operations(basis, true);
    let components = xyz_components(n);

    let mut entries = vec![];
    let mut nequiv = vec![];
    let mut zeros = vec![];
    let mut found = HashSet::new();

    for cluster in clusters.clusters(order) {
        let atoms = &cluster.atoms;

        for comp in &components {
            let mut ind: Vec<usize> = atoms.iter().zip(comp).map(|(&a, &x)| 3 * a + x).collect();
            if !is_ascending(&ind) {
                continue;
            }
            canonicalize(&mut ind, symmetry);
            if found.contains(&ind) {
                continue;
            }

            let mother = nequiv.len();
            let mut ndeps = 0;
            let mut is_zero = false;

            for op in &ops {
                let mapped_atoms: Vec<usize> = atoms.iter().map(|&a| op.atom_map[a]).collect();
                if !mapped_atoms.iter().any(|&a| symmetry.is_in_prim(a)) {
                    continue;
                }

                for comp2 in &components {
                    let c = coef_sym(&op.rotation, comp, comp2);
                    if c.abs() <= EPS12 {
                        continue;
                    }

                    let mut mapped: Vec<usize> = mapped_atoms.iter().zip(comp2).map(|(&a, &x)| 3 * a + x).collect();
                    canonicalize(&mut mapped, symmetry);

                    if !is_zero {
                        is_zero = mapped == ind && (c + 1.0).abs() < EPS8;
                    }

                    if !found.insert(mapped.clone()) {
                        continue;
                    }

                    entries.push(FcProperty { elems: mapped.clone(), sign: c, mother });
                    ndeps += 1;

                    // Fitting also needs this component seen from every other
                    // primitive-cell atom that it involves.
                    let mut searched = vec![mapped[0]];
                    for i in 1..n {
                        let e = mapped[i];
                        if searched.contains(&e) || !symmetry.is_in_prim(e / 3) {
                            continue;
                        }
                        let mut permuted = mapped.clone();
                        permuted.swap(0, i);
                        permuted[1..].sort();
                        entries.push(FcProperty { elems: permuted, sign: c, mother });
                        searched.push(e);
                        ndeps += 1;
                    }
                }
            }

            if is_zero {
                let dropped = entries.split_off(entries.len() - ndeps);
                if store_zeros {
                    zeros.extend(dropped.into_iter().rev().map(|mut p| {
                        p.mother = ZERO_MOTHER;
                        p
                    }));
                }
            } else {
                // operation 0 is the identity and maps `ind` onto itself
                debug_assert!(ndeps > 0, "(BUG) group of {:?} has no members", ind);
                nequiv.push(ndeps);
            }
        }
    }

    let mut start = 0;
    for &n in &nequiv {
        entries[start..start + n].sort();
        start += n;
    }

    check_unique(&entries);
    ParameterTable { order, entries, nequiv, zeros }
}

fn check_unique(entries: &[FcProperty]) {
    let mut seen = HashMap::new();
    for p in entries {
        if let Some(other) = seen.insert(&p.elems[..], p.mother) {
            panic!(
                "(BUG) component {:?} was assigned to both mother {} and mother {}",
                p.elems, other, p.mother,
            );
        }
    }
}

/// Builds the tables of all orders (`0..clusters.maxorder()`).
pub fn build_tables(
    clusters: &ClusterList,
    symmetry: &Symmetry,
    basis: Basis,
    store_zeros: bool,
) -> Vec<ParameterTable> {
    info!("FORCE CONSTANT");
    let tables: Vec<_> = (0..clusters.maxorder())
        .map(|order| generate_table(order, clusters, symmetry, basis, store_zeros))
        .collect();

    for table in &tables {
        info!("  Number of {:>9} FCs : {}", order_name(table.order()), table.num_mothers());
        if !table.zeros().is_empty() {
            debug!("  ({} components of {} FCs are zero by symmetry)", table.zeros().len(), order_name(table.order()));
        }
    }
    tables
}
