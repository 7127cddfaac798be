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

//! Householder QR, written against ndarray so that it works on any layout.

use ::ndarray::{Array2, ArrayView2, Axis};

/// Full QR factorization `a = q r` with `q` square (m x m) and orthogonal.
pub fn householder_qr(a: ArrayView2<'_, f64>) -> (Array2<f64>, Array2<f64>) {
    let (m, n) = a.dim();
    let mut r = a.to_owned();
    let mut q = Array2::eye(m);

    for k in 0..usize::min(m, n) {
        let v = match reflector(&r, k, k) {
            Some(v) => v,
            None => continue,
        };
        apply_left(&mut r, &v, k, k);

        // q <- q H
        for i in 0..m {
            let s: f64 = v.iter().enumerate().map(|(l, vl)| q[(i, k + l)] * vl).sum();
            for (l, vl) in v.iter().enumerate() {
                q[(i, k + l)] -= 2.0 * s * vl;
            }
        }
    }
    (q, r)
}

/// `|R_ii|` from a QR factorization with column pivoting (largest remaining
/// column norm first), in the order the pivots were chosen.
///
/// This is the diagonal `dgeqp3` would produce, up to signs.
pub fn pivoted_qr_diagonal(a: ArrayView2<'_, f64>) -> Vec<f64> {
    let (m, n) = a.dim();
    let mut r = a.to_owned();
    let mut diag = Vec::with_capacity(usize::min(m, n));

    for k in 0..usize::min(m, n) {
        let pivot = (k..n)
            .map(|j| (j, (k..m).map(|i| r[(i, j)] * r[(i, j)]).sum::<f64>()))
            .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best })
            .0;
        if pivot != k {
            swap_columns(&mut r, k, pivot);
        }
        if let Some(v) = reflector(&r, k, k) {
            apply_left(&mut r, &v, k, k);
        }
        diag.push(r[(k, k)].abs());
    }
    diag
}

// Unit Householder vector that zeros out r[k+1.., col], or None if that part is already zero.
fn reflector(r: &Array2<f64>, k: usize, col: usize) -> Option<Vec<f64>> {
    let x: Vec<f64> = r.column(col).iter().skip(k).cloned().collect();
    let norm = x.iter().map(|a| a * a).sum::<f64>().sqrt();
    if norm == 0.0 {
        return None;
    }
    let alpha = if x[0] > 0.0 { -norm } else { norm };
    let mut v = x;
    v[0] -= alpha;
    let vnorm = v.iter().map(|a| a * a).sum::<f64>().sqrt();
    if vnorm == 0.0 {
        return None;
    }
    v.iter_mut().for_each(|a| *a /= vnorm);
    Some(v)
}

// r[k.., j] <- (I - 2 v v^T) r[k.., j]   for j >= first_col
fn apply_left(r: &mut Array2<f64>, v: &[f64], k: usize, first_col: usize) {
    for j in first_col..r.len_of(Axis(1)) {
        let s: f64 = v.iter().enumerate().map(|(l, vl)| r[(k + l, j)] * vl).sum();
        for (l, vl) in v.iter().enumerate() {
            r[(k + l, j)] -= 2.0 * s * vl;
        }
    }
}

fn swap_columns(r: &mut Array2<f64>, a: usize, b: usize) {
    for i in 0..r.nrows() {
        r.swap((i, a), (i, b));
    }
}
