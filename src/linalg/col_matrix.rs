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

use ::ndarray::{Array2, ArrayView2, ShapeBuilder};

/// Owned, contiguous, column-major matrix data.
///
/// This is the layout LAPACK's Fortran routines expect with `lda == rows`,
/// and the layout in which the design matrix is assembled (one column per
/// free parameter).
#[derive(Debug, Clone, PartialEq)]
pub struct ColMatrix(
    // invariant: .strides[0] == 1
    // invariant: .strides[1] == .rows()
    Array2<f64>
);

impl ColMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self
    { ColMatrix(Array2::zeros((rows, cols).f())) }

    /// `data` is read column by column.
    pub fn from_col_major(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "(BUG) bad data length for {}x{} matrix", rows, cols);
        match Array2::from_shape_vec((rows, cols).f(), data) {
            Ok(arr) => ColMatrix(arr),
            Err(e) => panic!("(BUG) {}", e),
        }
    }

    pub fn rows(&self) -> usize { self.0.nrows() }
    pub fn cols(&self) -> usize { self.0.ncols() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn col_major_data(&self) -> &[f64]
    { self.0.as_slice_memory_order().expect("(BUG) not contiguous!!") }

    pub fn col_major_data_mut(&mut self) -> &mut [f64]
    { self.0.as_slice_memory_order_mut().expect("(BUG) not contiguous!!") }

    pub fn into_col_major_data(self) -> Vec<f64> { self.0.into_raw_vec() }

    pub fn column(&self, j: usize) -> &[f64] {
        let m = self.rows();
        &self.col_major_data()[m * j..m * (j + 1)]
    }

    pub fn column_mut(&mut self, j: usize) -> &mut [f64] {
        let m = self.rows();
        &mut self.col_major_data_mut()[m * j..m * (j + 1)]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> { self.0.view() }
    pub fn into_inner(self) -> Array2<f64> { self.0 }

    /// `A x`
    pub fn dot_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.cols());
        let mut out = vec![0.0; self.rows()];
        for (j, &xj) in x.iter().enumerate() {
            if xj == 0.0 {
                continue;
            }
            for (o, &a) in out.iter_mut().zip(self.column(j)) {
                *o += a * xj;
            }
        }
        out
    }

    /// `A^T y`
    pub fn t_dot_vec(&self, y: &[f64]) -> Vec<f64> {
        assert_eq!(y.len(), self.rows());
        (0..self.cols())
            .map(|j| dot(self.column(j), y))
            .collect()
    }

    /// `A^T A`, symmetric.
    pub fn gram(&self) -> Array2<f64> {
        let n = self.cols();
        let mut out = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let v = dot(self.column(i), self.column(j));
                out[(i, j)] = v;
                out[(j, i)] = v;
            }
        }
        out
    }

    /// Stack `other` below `self`.
    pub fn vstack(&self, other: &ColMatrix) -> ColMatrix {
        assert_eq!(self.cols(), other.cols());
        let (m1, m2) = (self.rows(), other.rows());
        let mut data = Vec::with_capacity((m1 + m2) * self.cols());
        for j in 0..self.cols() {
            data.extend_from_slice(self.column(j));
            data.extend_from_slice(other.column(j));
        }
        ColMatrix::from_col_major(m1 + m2, self.cols(), data)
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl ::std::ops::Deref for ColMatrix {
    type Target = Array2<f64>;

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl ::std::ops::Index<(usize, usize)> for ColMatrix {
    type Output = f64;

    fn index(&self, idx: (usize, usize)) -> &f64 { &self.0[idx] }
}

impl ::std::ops::IndexMut<(usize, usize)> for ColMatrix {
    fn index_mut(&mut self, idx: (usize, usize)) -> &mut f64 { &mut self.0[idx] }
}

impl From<Array2<f64>> for ColMatrix {
    fn from(arr: Array2<f64>) -> Self {
        if arr.t().is_standard_layout() {
            ColMatrix(arr)
        } else {
            arr.view().into()
        }
    }
}

impl<'a> From<ArrayView2<'a, f64>> for ColMatrix {
    fn from(arr: ArrayView2<'a, f64>) -> Self {
        let mut out = Array2::zeros(arr.raw_dim().f());
        out.assign(&arr);
        ColMatrix(out)
    }
}

impl From<ColMatrix> for Array2<f64> {
    fn from(mat: ColMatrix) -> Self { mat.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        // [[1 2 3]
        //  [4 5 6]]
        let arr = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert!(arr.is_standard_layout());

        let mat = ColMatrix::from(arr.clone());
        assert_eq!(mat.col_major_data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(mat.column(1), &[2.0, 5.0]);
        assert_eq!(mat[(1, 2)], 6.0);

        let from_view = ColMatrix::from(arr.view());
        assert_eq!(from_view, mat);

        // already column-major; must not be copied into a different order
        let f_arr = Array2::from_shape_vec((2, 3).f(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]).unwrap();
        assert_eq!(ColMatrix::from(f_arr), mat);
        assert_eq!(mat.clone().into_col_major_data(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn products() {
        let mat = ColMatrix::from_col_major(2, 3, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(mat.dot_vec(&[1.0, 0.0, -1.0]), vec![-2.0, -2.0]);
        assert_eq!(mat.t_dot_vec(&[1.0, 1.0]), vec![5.0, 7.0, 9.0]);

        let gram = mat.gram();
        assert_eq!(gram[(0, 0)], 17.0);
        assert_eq!(gram[(0, 2)], 27.0);
        assert_eq!(gram[(2, 0)], 27.0);

        let stacked = mat.vstack(&ColMatrix::from_col_major(1, 3, vec![7.0, 8.0, 9.0]));
        assert_eq!(stacked.rows(), 3);
        assert_eq!(stacked.column(2), &[3.0, 6.0, 9.0]);
    }
}
