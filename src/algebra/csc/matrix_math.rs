use crate::algebra::{CscMatrix, FloatT, SymMatrixVectorMultiply, VectorMath};
use std::iter::zip;

impl<T: FloatT> SymMatrixVectorMultiply for CscMatrix<T> {
    type T = T;

    // the matrix data should be triu or tril, but not both
    fn symv(&self, y: &mut [T], x: &[T], a: T, b: T) {
        _csc_symv(self, y, x, a, b);
    }
}

#[allow(non_snake_case)]
fn _csc_symv<T: FloatT>(A: &CscMatrix<T>, y: &mut [T], x: &[T], a: T, b: T) {
    y.scale(b);

    assert!(x.len() == A.n);
    assert!(y.len() == A.n);
    assert!(A.n == A.m);

    for (col, &xcol) in x.iter().enumerate() {
        let first = A.colptr[col];
        let last = A.colptr[col + 1];
        let rows = &A.rowval[first..last];
        let nzvals = &A.nzval[first..last];

        for (&row, &Aij) in zip(rows, nzvals) {
            y[row] += a * Aij * xcol;

            if row != col {
                //don't double up on the diagonal
                y[col] += a * Aij * x[row];
            }
        }
    }
}

#[test]
fn test_csc_symv() {
    // A =
    //[ 4.0  1.0  ⋅ ]
    //[ 1.0  3.0 2.0]
    //[  ⋅   2.0 5.0]   (triu storage)
    let A = CscMatrix::new(
        3,
        3,
        vec![0, 1, 3, 5],
        vec![0, 0, 1, 1, 2],
        vec![4., 1., 3., 2., 5.],
    );
    let x = vec![1., 2., 3.];
    let mut y = vec![1., 1., 1.];
    A.symv(&mut y, &x, 1.0, -1.0);
    assert_eq!(y, vec![5., 12., 18.]);
}
