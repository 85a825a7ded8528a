//! Factorization backends for the linear solver driver.
//!
//! A backend implements [`SymLinearBackend`] on the storage format it
//! declares through [`matrix_format`](SymLinearBackend::matrix_format).
//! The shipped backends are collected in the [`LinearBackend`] enum and
//! selected by the `linear_solver` setting.

use crate::algebra::*;
use crate::solver::{LinearSolverError, LinearSolverSettings, SettingsError, SymSolverStatus};
use enum_dispatch::*;

mod dense;
mod qdldl;
pub use dense::*;
pub use qdldl::*;

/// Maximum number of times a factorization is repeated for a
/// backend that returns [`CallAgain`](SymSolverStatus::CallAgain).
pub const MAX_CALL_AGAIN: usize = 10;

/// Matrix storage format required by a backend
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum MatrixFormat {
    /// symmetric triplets exactly as supplied by the caller
    Triplet,
    /// upper triangular CSC, one entry per symmetric position
    CscTriu,
    /// full CSC, off-diagonal positions stored in both triangles
    CscFull,
}

impl MatrixFormat {
    /// the compressed shape for this format, if it is compressed
    pub fn compressed_shape(&self) -> Option<CompressedShape> {
        match self {
            MatrixFormat::Triplet => None,
            MatrixFormat::CscTriu => Some(CompressedShape::Triu),
            MatrixFormat::CscFull => Some(CompressedShape::Full),
        }
    }
}

/// Nonzero pattern handed to a backend for symbolic setup.  Values
/// handed to [`factorize`](SymLinearBackend::factorize) follow the
/// same ordering.
#[derive(Debug, Clone, Copy)]
pub enum SparsityPattern<'a> {
    Triplet {
        dim: usize,
        irow: &'a [usize],
        jcol: &'a [usize],
    },
    Csc {
        dim: usize,
        colptr: &'a [usize],
        rowval: &'a [usize],
    },
}

impl<'a> SparsityPattern<'a> {
    pub fn dim(&self) -> usize {
        match self {
            SparsityPattern::Triplet { dim, .. } => *dim,
            SparsityPattern::Csc { dim, .. } => *dim,
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            SparsityPattern::Triplet { irow, .. } => irow.len(),
            SparsityPattern::Csc { rowval, .. } => rowval.len(),
        }
    }
}

/// Rectangular matrix handed to a backend for dependent row detection.
#[derive(Debug, Clone, Copy)]
pub enum RectangularMatrix<'a, T> {
    Triplet(&'a TripletMatrix<T>),
    Csc(&'a CscMatrix<T>),
}

impl<'a, T: FloatT> RectangularMatrix<'a, T> {
    pub fn size(&self) -> (usize, usize) {
        match self {
            RectangularMatrix::Triplet(mat) => (mat.m, mat.n),
            RectangularMatrix::Csc(mat) => mat.size(),
        }
    }

    /// Dense row major copy.  Repeated triplets are summed.
    pub(crate) fn to_dense_rows(&self) -> Vec<Vec<T>> {
        let (m, n) = self.size();
        let mut rows = vec![vec![T::zero(); n]; m];
        match self {
            RectangularMatrix::Triplet(mat) => {
                for k in 0..mat.nnz() {
                    rows[mat.rowval[k]][mat.colval[k]] += mat.nzval[k];
                }
            }
            RectangularMatrix::Csc(mat) => {
                for col in 0..mat.n {
                    for k in mat.colptr[col]..mat.colptr[col + 1] {
                        rows[mat.rowval[k]][col] += mat.nzval[k];
                    }
                }
            }
        }
        rows
    }
}

/// Capability surface of a symmetric indefinite factorization routine.
///
/// Calls arrive in the order `initialize_structure` (once per nonzero
/// pattern), `factorize` (once per set of values) and `solve` (any
/// number of times per factorization).
#[enum_dispatch]
pub trait SymLinearBackend<T: FloatT> {
    /// storage format expected by `initialize_structure` and `factorize`
    fn matrix_format(&self) -> MatrixFormat;

    /// one-time symbolic setup for a nonzero pattern
    fn initialize_structure(&mut self, pattern: SparsityPattern<'_>) -> SymSolverStatus;

    /// numeric factorization of values ordered as in the pattern.
    /// May return `CallAgain` to receive the values a second time.
    fn factorize(&mut self, values: &[T]) -> SymSolverStatus;

    /// Solves in place for `nrhs` right-hand sides stored contiguously
    /// in `rhs`, each of the dimension given to `initialize_structure`.
    fn solve(&mut self, rhs: &mut [T], nrhs: usize) -> SymSolverStatus;

    /// negative eigenvalues found by the last successful factorization
    fn number_of_neg_evals(&self) -> usize;

    /// Request more accurate factorizations.  Returns false if no
    /// further increase is possible.
    fn increase_quality(&mut self) -> bool;

    /// true if `number_of_neg_evals` is meaningful
    fn provides_inertia(&self) -> bool;

    /// true if `determine_dependent_rows` is implemented
    fn provides_degeneracy_detection(&self) -> bool {
        false
    }

    /// Row indices of rows that depend linearly on others
    fn determine_dependent_rows(
        &mut self,
        _matrix: RectangularMatrix<'_, T>,
    ) -> Result<Vec<usize>, LinearSolverError> {
        Err(LinearSolverError::UnsupportedCapability(
            "degeneracy detection",
        ))
    }
}

/// Backends selectable through the `linear_solver` setting
#[enum_dispatch(SymLinearBackend<T>)]
#[derive(Debug)]
pub enum LinearBackend<T: FloatT> {
    Qdldl(QdldlBackend<T>),
    Dense(DenseLdlBackend<T>),
}

impl<T: FloatT> LinearBackend<T> {
    pub fn new(settings: &LinearSolverSettings<T>) -> Result<Self, SettingsError> {
        match settings.linear_solver.as_str() {
            "qdldl" => Ok(QdldlBackend::new(settings).into()),
            "dense" => Ok(DenseLdlBackend::new(settings).into()),
            other => Err(SettingsError::UnknownOption {
                field: "linear_solver",
                value: other.to_string(),
            }),
        }
    }
}

/// Next zero pivot tolerance in a quality increase, or None
/// once the maximum has been reached.
pub(crate) fn next_pivot_tolerance<T: FloatT>(tol: T, tol_max: T) -> Option<T> {
    if tol >= tol_max {
        return None;
    }
    Some(T::min(tol_max, tol.powf((0.75).as_T())))
}

#[test]
fn test_next_pivot_tolerance() {
    let tol = next_pivot_tolerance(1e-12, 1e-4).unwrap();
    assert!((tol - 1e-9f64).abs() < 1e-20);
    assert_eq!(next_pivot_tolerance(1e-5, 1e-4), Some(1e-4));
    assert_eq!(next_pivot_tolerance(1e-4, 1e-4), None);
}
