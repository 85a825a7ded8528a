#![allow(non_snake_case)]

use crate::algebra::{CscMatrix, FloatT, SparseFormatError, SymMatrixVectorMultiply, Tag, VectorMath};
use itertools::izip;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sparse matrix in triplet (coordinate) format.
///
/// Entries are stored as independent `(row, column, value)` triplets with
/// zero-based indices.  Repeated positions are allowed, and their values
/// are summed.   This is the input format for
/// [dependent row detection](crate::solver::TSymLinearSolver::determine_dependent_rows).

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TripletMatrix<T = f64> {
    /// number of rows
    pub m: usize,
    /// number of columns
    pub n: usize,
    /// row index of each entry
    pub rowval: Vec<usize>,
    /// column index of each entry
    pub colval: Vec<usize>,
    /// value of each entry
    pub nzval: Vec<T>,
}

impl<T> TripletMatrix<T>
where
    T: FloatT,
{
    /// `TripletMatrix` constructor.
    ///
    /// # Panics
    /// Panics if the index and value vectors have different lengths.
    pub fn new(m: usize, n: usize, rowval: Vec<usize>, colval: Vec<usize>, nzval: Vec<T>) -> Self {
        assert_eq!(rowval.len(), nzval.len());
        assert_eq!(colval.len(), nzval.len());
        TripletMatrix {
            m,
            n,
            rowval,
            colval,
            nzval,
        }
    }

    /// number of stored triplets (including repeated positions)
    pub fn nnz(&self) -> usize {
        self.nzval.len()
    }

    /// Check that all indices are within the matrix dimensions.
    pub fn check_format(&self) -> Result<(), SparseFormatError> {
        if self.rowval.len() != self.nzval.len() || self.colval.len() != self.nzval.len() {
            return Err(SparseFormatError::IncompatibleDimension);
        }
        if !self.rowval.iter().all(|&r| r < self.m) {
            return Err(SparseFormatError::BadRowval);
        }
        if !self.colval.iter().all(|&c| c < self.n) {
            return Err(SparseFormatError::BadColval);
        }
        Ok(())
    }

    /// Compressed column copy of the matrix.  Repeated positions are
    /// summed into a single entry, and rows are sorted within each column.
    pub fn to_csc(&self) -> CscMatrix<T> {
        let mut order: Vec<usize> = (0..self.nnz()).collect();
        order.sort_by_key(|&k| (self.colval[k], self.rowval[k]));

        let mut colptr = vec![0; self.n + 1];
        let mut rowval = Vec::with_capacity(self.nnz());
        let mut nzval: Vec<T> = Vec::with_capacity(self.nnz());
        let mut last = None;

        for k in order {
            let (row, col) = (self.rowval[k], self.colval[k]);
            if last == Some((row, col)) {
                if let Some(v) = nzval.last_mut() {
                    *v += self.nzval[k];
                }
            } else {
                rowval.push(row);
                nzval.push(self.nzval[k]);
                colptr[col + 1] += 1;
                last = Some((row, col));
            }
        }

        for col in 0..self.n {
            colptr[col + 1] += colptr[col];
        }

        CscMatrix::new(self.m, self.n, colptr, rowval, nzval)
    }
}

/// Symmetric sparse matrix in triplet format.
///
/// Only one triangle is stored.  Each triplet `(i, j, v)` contributes `v`
/// to both `A[i,j]` and `A[j,i]`, so `(i, j)` and `(j, i)` address the
/// same structural position and repeated positions are summed.
///
/// The matrix carries two [`Tag`]s.  The structure tag changes if and only
/// if the nonzero pattern is replaced via [`set_structure`](Self::set_structure).
/// The values tag changes on every mutation, including value-only updates
/// through [`values_mut`](Self::values_mut) or [`set_values`](Self::set_values).
/// Linear solvers use the tags to decide which cached data can be reused.
///
/// __Example usage__ : To construct the symmetric matrix
/// ```text
/// A = [ 4.  1.  0.]
///     [ 1. -3.  2.]
///     [ 0.  2.  5.]
/// ```
///
/// ```no_run
/// use symsolve::algebra::SymTripletMatrix;
///
/// let A = SymTripletMatrix::new(
///     3,
///     vec![0, 1, 1, 2, 2],
///     vec![0, 0, 1, 1, 2],
///     vec![4., 1., -3., 2., 5.],
/// ).unwrap();
/// ```

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymTripletMatrix<T = f64> {
    n: usize,
    rowval: Vec<usize>,
    colval: Vec<usize>,
    nzval: Vec<T>,
    #[cfg_attr(feature = "serde", serde(skip, default = "Tag::fresh"))]
    structure_tag: Tag,
    #[cfg_attr(feature = "serde", serde(skip, default = "Tag::fresh"))]
    values_tag: Tag,
}

impl<T> SymTripletMatrix<T>
where
    T: FloatT,
{
    /// `SymTripletMatrix` constructor for an `n x n` symmetric matrix.
    pub fn new(
        n: usize,
        rowval: Vec<usize>,
        colval: Vec<usize>,
        nzval: Vec<T>,
    ) -> Result<Self, SparseFormatError> {
        _check_sym_triplets(n, &rowval, &colval, &nzval)?;
        Ok(Self {
            n,
            rowval,
            colval,
            nzval,
            structure_tag: Tag::fresh(),
            values_tag: Tag::fresh(),
        })
    }

    /// Symmetric matrix from the lower triangle of a dense
    /// array, keeping only the nonzero entries.
    pub fn from_dense_lower<const N: usize>(rows: &[[T; N]; N]) -> Self {
        let (mut rowval, mut colval, mut nzval) = (vec![], vec![], vec![]);
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate().take(i + 1) {
                if v != T::zero() {
                    rowval.push(i);
                    colval.push(j);
                    nzval.push(v);
                }
            }
        }
        Self {
            n: N,
            rowval,
            colval,
            nzval,
            structure_tag: Tag::fresh(),
            values_tag: Tag::fresh(),
        }
    }

    /// matrix dimension
    pub fn dim(&self) -> usize {
        self.n
    }

    /// number of stored triplets (including repeated positions)
    pub fn nnz(&self) -> usize {
        self.nzval.len()
    }

    /// row index of each triplet
    pub fn rowval(&self) -> &[usize] {
        &self.rowval
    }

    /// column index of each triplet
    pub fn colval(&self) -> &[usize] {
        &self.colval
    }

    /// value of each triplet
    pub fn values(&self) -> &[T] {
        &self.nzval
    }

    /// tag identifying the current nonzero pattern
    pub fn structure_tag(&self) -> Tag {
        self.structure_tag
    }

    /// tag identifying the current values
    pub fn values_tag(&self) -> Tag {
        self.values_tag
    }

    /// Mutable access to the values.  The pattern is unchanged, so only
    /// the values tag is renewed.
    pub fn values_mut(&mut self) -> &mut [T] {
        self.values_tag = Tag::fresh();
        &mut self.nzval
    }

    /// Overwrite all values, keeping the nonzero pattern.
    pub fn set_values(&mut self, values: &[T]) -> Result<(), SparseFormatError> {
        if values.len() != self.nzval.len() {
            return Err(SparseFormatError::IncompatibleDimension);
        }
        self.values_mut().copy_from(values);
        Ok(())
    }

    /// Replace the nonzero pattern and values.  Both tags are renewed.
    pub fn set_structure(
        &mut self,
        rowval: Vec<usize>,
        colval: Vec<usize>,
        nzval: Vec<T>,
    ) -> Result<(), SparseFormatError> {
        _check_sym_triplets(self.n, &rowval, &colval, &nzval)?;
        self.rowval = rowval;
        self.colval = colval;
        self.nzval = nzval;
        self.structure_tag = Tag::fresh();
        self.values_tag = Tag::fresh();
        Ok(())
    }

    /// Check that all indices are within the matrix dimension.
    pub fn check_format(&self) -> Result<(), SparseFormatError> {
        _check_sym_triplets(self.n, &self.rowval, &self.colval, &self.nzval)
    }
}

fn _check_sym_triplets<T>(
    n: usize,
    rowval: &[usize],
    colval: &[usize],
    nzval: &[T],
) -> Result<(), SparseFormatError> {
    if rowval.len() != nzval.len() || colval.len() != nzval.len() {
        return Err(SparseFormatError::IncompatibleDimension);
    }
    if !rowval.iter().all(|&r| r < n) {
        return Err(SparseFormatError::BadRowval);
    }
    if !colval.iter().all(|&c| c < n) {
        return Err(SparseFormatError::BadColval);
    }
    Ok(())
}

impl<T: FloatT> SymMatrixVectorMultiply for SymTripletMatrix<T> {
    type T = T;

    fn symv(&self, y: &mut [T], x: &[T], a: T, b: T) {
        assert_eq!(x.len(), self.n);
        assert_eq!(y.len(), self.n);

        y.scale(b);
        for (&i, &j, &v) in izip!(&self.rowval, &self.colval, &self.nzval) {
            y[i] += a * v * x[j];
            if i != j {
                y[j] += a * v * x[i];
            }
        }
    }
}
