use super::dense::BunchKaufmanFactors;
use super::{next_pivot_tolerance, MatrixFormat, SparsityPattern, SymLinearBackend};
use crate::algebra::*;
use crate::qdldl::*;
use crate::solver::{LinearSolverSettings, SymSolverStatus};
use std::iter::zip;

// factorization currently available for solves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveFactors {
    None,
    Sparse,
    Dense,
}

/// Sparse $LDL^T$ backend on an AMD ordering.
///
/// Expects upper triangular CSC data.  The diagonal is always part of the
/// stored pattern, with explicit zeros where the matrix has none.  The
/// sparse factorization does not pivot, so a pivot with magnitude at most
/// `pivot_tolerance` times the largest matrix entry rejects the ordering.
/// The same values are then factored by a dense Bunch-Kaufman
/// factorization with interchanges, for dimensions up to
/// `dense_fallback_max_dim`.  Only a failure of the pivoted factorization,
/// or a rejected ordering above that dimension, reports
/// [`Singular`](SymSolverStatus::Singular).
///
/// A quality increase raises the rejection tolerance, so that more
/// systems with small pivots go through the pivoted factorization.

#[derive(Debug)]
pub struct QdldlBackend<T> {
    // None until a structure has been given
    factors: Option<QDLDLFactorisation<T>>,
    // dense factors, allocated on first use
    dense: Option<BunchKaufmanFactors<T>>,
    active: ActiveFactors,
    dim: usize,
    // upper triangular pattern including the full diagonal
    colptr: Vec<usize>,
    rowval: Vec<usize>,
    // slot in the pattern above of each entry of the supplied pattern
    slots: Vec<usize>,
    values: Vec<T>,
    neg_evals: usize,
    pivot_tolerance: T,
    pivot_tolerance_max: T,
    singular_tolerance: T,
    dense_fallback_max_dim: usize,
}

impl<T> QdldlBackend<T>
where
    T: FloatT,
{
    pub fn new(settings: &LinearSolverSettings<T>) -> Self {
        Self {
            factors: None,
            dense: None,
            active: ActiveFactors::None,
            dim: 0,
            colptr: vec![],
            rowval: vec![],
            slots: vec![],
            values: vec![],
            neg_evals: 0,
            pivot_tolerance: settings.pivot_tolerance,
            pivot_tolerance_max: settings.pivot_tolerance_max,
            singular_tolerance: settings.pivot_tolerance,
            dense_fallback_max_dim: settings.dense_fallback_max_dim,
        }
    }

    /// current relative pivot rejection tolerance
    pub fn pivot_tolerance(&self) -> T {
        self.pivot_tolerance
    }

    /// true if the last successful factorization is the pivoted dense one
    pub fn uses_dense_fallback(&self) -> bool {
        self.active == ActiveFactors::Dense
    }

    // Factors the current values with interchanges
    fn factorize_dense(&mut self) -> SymSolverStatus {
        let n = self.dim;
        if n > self.dense_fallback_max_dim {
            return SymSolverStatus::Singular;
        }

        let dense = self
            .dense
            .get_or_insert_with(|| BunchKaufmanFactors::new(n));
        let W = dense.matrix_mut();
        for col in 0..n {
            for p in self.colptr[col]..self.colptr[col + 1] {
                let (row, v) = (self.rowval[p], self.values[p]);
                W[row + col * n] += v;
                if row != col {
                    W[col + row * n] += v;
                }
            }
        }

        match dense.factor(self.singular_tolerance) {
            Some(neg_evals) => {
                self.neg_evals = neg_evals;
                self.active = ActiveFactors::Dense;
                SymSolverStatus::Success
            }
            None => SymSolverStatus::Singular,
        }
    }
}

impl<T> SymLinearBackend<T> for QdldlBackend<T>
where
    T: FloatT,
{
    fn matrix_format(&self) -> MatrixFormat {
        MatrixFormat::CscTriu
    }

    fn initialize_structure(&mut self, pattern: SparsityPattern<'_>) -> SymSolverStatus {
        self.factors = None;
        self.dense = None;
        self.active = ActiveFactors::None;
        self.slots.clear();

        let (dim, colptr, rowval) = match pattern {
            SparsityPattern::Csc {
                dim,
                colptr,
                rowval,
            } => (dim, colptr, rowval),
            SparsityPattern::Triplet { .. } => return SymSolverStatus::StructuralError,
        };

        if colptr.len() != dim + 1
            || colptr[dim] != rowval.len()
            || colptr.windows(2).any(|c| c[0] > c[1])
            || rowval.iter().any(|&r| r >= dim)
        {
            return SymSolverStatus::StructuralError;
        }

        let (colptr_full, rowval_full, slots) = _with_full_diagonal(dim, colptr, rowval);
        let nnz_full = rowval_full.len();

        // a pattern with zero values, so that the logical
        // factorization fixes all memory allocations
        let pattern = CscMatrix::new(
            dim,
            dim,
            colptr_full,
            rowval_full,
            vec![T::zero(); nnz_full],
        );

        let opts = QDLDLSettingsBuilder::default()
            .logical(true)
            .pivot_tolerance(self.pivot_tolerance)
            .build();
        let Ok(opts) = opts else {
            return SymSolverStatus::FatalError;
        };

        match QDLDLFactorisation::new(&pattern, Some(opts)) {
            Ok(factors) => {
                self.factors = Some(factors);
                self.dim = dim;
                self.values = vec![T::zero(); nnz_full];
                self.colptr = pattern.colptr;
                self.rowval = pattern.rowval;
                self.slots = slots;
                SymSolverStatus::Success
            }
            // not reachable with the diagonal in place
            Err(QDLDLError::EmptyColumn) => SymSolverStatus::Singular,
            Err(_) => SymSolverStatus::StructuralError,
        }
    }

    fn factorize(&mut self, values: &[T]) -> SymSolverStatus {
        self.active = ActiveFactors::None;

        let Some(factors) = self.factors.as_mut() else {
            return SymSolverStatus::FatalError;
        };
        if values.len() != self.slots.len() || !values.is_finite() {
            return SymSolverStatus::FatalError;
        }

        self.values.fill(T::zero());
        for (&slot, &v) in zip(&self.slots, values) {
            self.values[slot] = v;
        }

        //QDLDL maintains its own permuted copy of the data
        factors.set_values(&self.values);
        factors.set_pivot_tolerance(self.pivot_tolerance);

        match factors.refactor() {
            Ok(()) => {
                self.neg_evals = factors.negative_inertia();
                self.active = ActiveFactors::Sparse;
                SymSolverStatus::Success
            }
            Err(QDLDLError::ZeroPivot) => self.factorize_dense(),
            Err(_) => SymSolverStatus::FatalError,
        }
    }

    fn solve(&mut self, rhs: &mut [T], nrhs: usize) -> SymSolverStatus {
        let n = self.dim;
        if self.active == ActiveFactors::None || rhs.len() != n * nrhs {
            return SymSolverStatus::FatalError;
        }
        if n == 0 {
            return SymSolverStatus::Success;
        }

        match (self.active, self.factors.as_mut(), self.dense.as_mut()) {
            // NB: QDLDL solves in place
            (ActiveFactors::Sparse, Some(factors), _) => {
                rhs.chunks_exact_mut(n).for_each(|x| factors.solve(x));
            }
            (ActiveFactors::Dense, _, Some(dense)) => {
                rhs.chunks_exact_mut(n).for_each(|x| dense.solve(x));
            }
            _ => return SymSolverStatus::FatalError,
        }

        if rhs.is_finite() {
            SymSolverStatus::Success
        } else {
            SymSolverStatus::FatalError
        }
    }

    fn number_of_neg_evals(&self) -> usize {
        self.neg_evals
    }

    fn increase_quality(&mut self) -> bool {
        match next_pivot_tolerance(self.pivot_tolerance, self.pivot_tolerance_max) {
            Some(tol) => {
                self.pivot_tolerance = tol;
                true
            }
            None => false,
        }
    }

    fn provides_inertia(&self) -> bool {
        true
    }
}

// Upper triangular pattern with every diagonal entry present.  Returns
// the new column pointers and row indices, and the slot of each of the
// supplied entries in the new pattern.  Added diagonals go to the end of
// their column, which keeps sorted columns sorted.
fn _with_full_diagonal(
    dim: usize,
    colptr: &[usize],
    rowval: &[usize],
) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let mut colptr_full = Vec::with_capacity(dim + 1);
    let mut rowval_full = Vec::with_capacity(rowval.len() + dim);
    let mut slots = Vec::with_capacity(rowval.len());

    colptr_full.push(0);
    for col in 0..dim {
        let rows = &rowval[colptr[col]..colptr[col + 1]];
        for &row in rows {
            slots.push(rowval_full.len());
            rowval_full.push(row);
        }
        if !rows.contains(&col) {
            rowval_full.push(col);
        }
        colptr_full.push(rowval_full.len());
    }
    (colptr_full, rowval_full, slots)
}
