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

//! Interaction clusters, grouped by order.
//!
//! Finding them (neighbor shells, cutoffs) happens elsewhere.

use crate::FailResult;
use std::collections::BTreeSet;

/// Atoms taking part in one interaction term: `order + 2` supercell indices,
/// the first of which belongs to the primitive cell.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cluster {
    pub atoms: Vec<usize>,
}

#[derive(Serialize)]
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterList {
    by_order: Vec<BTreeSet<Cluster>>,
}

/// Display name of an interaction order (`0` is the harmonic term).
pub fn order_name(order: usize) -> String {
    match order {
        0 => "HARMONIC".to_string(),
        _ => format!("ANHARM{}", order + 2),
    }
}

impl ClusterList {
    /// An empty list for orders `0..maxorder`.
    pub fn new(maxorder: usize) -> Self
    { ClusterList { by_order: vec![BTreeSet::new(); maxorder] } }

    /// Build from per-order lists of atom tuples.
    pub fn from_lists(lists: Vec<Vec<Vec<usize>>>) -> FailResult<Self> {
        let mut out = ClusterList::new(lists.len());
        for (order, list) in lists.into_iter().enumerate() {
            for atoms in list {
                out.insert(order, atoms)?;
            }
        }
        Ok(out)
    }

    pub fn maxorder(&self) -> usize { self.by_order.len() }

    /// Returns `false` if the cluster was already present.
    pub fn insert(&mut self, order: usize, atoms: Vec<usize>) -> FailResult<bool> {
        ensure!(order < self.maxorder(), "order {} is out of range (maxorder = {})", order, self.maxorder());
        ensure!(
            atoms.len() == order + 2,
            "a cluster of order {} needs {} atoms, got {:?}", order, order + 2, atoms
        );
        Ok(self.by_order[order].insert(Cluster { atoms }))
    }

    /// Clusters of one order, in sorted order.
    pub fn clusters(&self, order: usize) -> impl ExactSizeIterator<Item=&Cluster> + '_
    { self.by_order[order].iter() }

    /// Largest atom index mentioned anywhere.
    pub fn max_atom(&self) -> Option<usize> {
        self.by_order.iter()
            .flat_map(|set| set.iter())
            .flat_map(|c| c.atoms.iter().cloned())
            .max()
    }
}
