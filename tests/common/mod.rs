#![allow(dead_code)]
#![allow(non_snake_case)]

// instrumented backends and scaling methods shared by the integration tests

use symsolve::algebra::*;
use symsolve::solver::backends::*;
use symsolve::solver::scaling::*;
use symsolve::solver::*;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub structure_inits: usize,
    pub factorizations: usize,
    pub solves: usize,
    pub quality_increases: usize,
}

/// Wraps a real backend, counting calls.  Can report a fixed inertia
/// and answer `CallAgain` a given number of times before factoring.
#[derive(Debug)]
pub struct CountingBackend<B> {
    pub inner: B,
    pub counts: CallCounts,
    pub fixed_neg_evals: Option<usize>,
    pub call_again: usize,
    // values passed to the most recent factorization
    pub last_values: Vec<f64>,
}

impl<B> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            counts: CallCounts::default(),
            fixed_neg_evals: None,
            call_again: 0,
            last_values: vec![],
        }
    }

    pub fn with_neg_evals(mut self, neg_evals: usize) -> Self {
        self.fixed_neg_evals = Some(neg_evals);
        self
    }

    pub fn with_call_again(mut self, call_again: usize) -> Self {
        self.call_again = call_again;
        self
    }
}

impl<B: SymLinearBackend<f64>> SymLinearBackend<f64> for CountingBackend<B> {
    fn matrix_format(&self) -> MatrixFormat {
        self.inner.matrix_format()
    }

    fn initialize_structure(&mut self, pattern: SparsityPattern<'_>) -> SymSolverStatus {
        self.counts.structure_inits += 1;
        self.inner.initialize_structure(pattern)
    }

    fn factorize(&mut self, values: &[f64]) -> SymSolverStatus {
        self.counts.factorizations += 1;
        self.last_values = values.to_vec();
        if self.call_again > 0 {
            self.call_again -= 1;
            return SymSolverStatus::CallAgain;
        }
        self.inner.factorize(values)
    }

    fn solve(&mut self, rhs: &mut [f64], nrhs: usize) -> SymSolverStatus {
        self.counts.solves += 1;
        self.inner.solve(rhs, nrhs)
    }

    fn number_of_neg_evals(&self) -> usize {
        self.fixed_neg_evals
            .unwrap_or_else(|| self.inner.number_of_neg_evals())
    }

    fn increase_quality(&mut self) -> bool {
        self.counts.quality_increases += 1;
        self.inner.increase_quality()
    }

    fn provides_inertia(&self) -> bool {
        self.inner.provides_inertia()
    }

    fn provides_degeneracy_detection(&self) -> bool {
        self.inner.provides_degeneracy_detection()
    }

    fn determine_dependent_rows(
        &mut self,
        matrix: RectangularMatrix<'_, f64>,
    ) -> Result<Vec<usize>, LinearSolverError> {
        self.inner.determine_dependent_rows(matrix)
    }
}

/// A backend that always asks for the values again
#[derive(Debug, Default)]
pub struct CallAgainForever {
    pub factorizations: usize,
}

impl SymLinearBackend<f64> for CallAgainForever {
    fn matrix_format(&self) -> MatrixFormat {
        MatrixFormat::Triplet
    }
    fn initialize_structure(&mut self, _pattern: SparsityPattern<'_>) -> SymSolverStatus {
        SymSolverStatus::Success
    }
    fn factorize(&mut self, _values: &[f64]) -> SymSolverStatus {
        self.factorizations += 1;
        SymSolverStatus::CallAgain
    }
    fn solve(&mut self, _rhs: &mut [f64], _nrhs: usize) -> SymSolverStatus {
        SymSolverStatus::FatalError
    }
    fn number_of_neg_evals(&self) -> usize {
        0
    }
    fn increase_quality(&mut self) -> bool {
        false
    }
    fn provides_inertia(&self) -> bool {
        false
    }
}

/// Degeneracy detection on compressed input.  Reports the rows of
/// all stored entries with value zero, unsorted and repeated, and
/// records the kind of matrix it was given.
#[derive(Debug, Default)]
pub struct CompressedDegeneracyBackend {
    pub received_csc: Option<bool>,
}

impl SymLinearBackend<f64> for CompressedDegeneracyBackend {
    fn matrix_format(&self) -> MatrixFormat {
        MatrixFormat::CscFull
    }
    fn initialize_structure(&mut self, _pattern: SparsityPattern<'_>) -> SymSolverStatus {
        SymSolverStatus::Success
    }
    fn factorize(&mut self, _values: &[f64]) -> SymSolverStatus {
        SymSolverStatus::Success
    }
    fn solve(&mut self, _rhs: &mut [f64], _nrhs: usize) -> SymSolverStatus {
        SymSolverStatus::Success
    }
    fn number_of_neg_evals(&self) -> usize {
        0
    }
    fn increase_quality(&mut self) -> bool {
        false
    }
    fn provides_inertia(&self) -> bool {
        false
    }
    fn provides_degeneracy_detection(&self) -> bool {
        true
    }
    fn determine_dependent_rows(
        &mut self,
        matrix: RectangularMatrix<'_, f64>,
    ) -> Result<Vec<usize>, LinearSolverError> {
        match matrix {
            RectangularMatrix::Csc(csc) => {
                self.received_csc = Some(true);
                let mut rows: Vec<usize> = csc
                    .rowval
                    .iter()
                    .zip(&csc.nzval)
                    .filter(|(_, v)| **v == 0.)
                    .map(|(&r, _)| r)
                    .collect();
                rows.reverse();
                Ok(rows)
            }
            RectangularMatrix::Triplet(_) => {
                self.received_csc = Some(false);
                Ok(vec![])
            }
        }
    }
}

/// Returns a fixed factor vector, valid or not
#[derive(Debug, Clone)]
pub struct FixedScaling {
    pub factors: Vec<f64>,
    pub calls: usize,
}

impl FixedScaling {
    pub fn new(factors: Vec<f64>) -> Self {
        Self { factors, calls: 0 }
    }
}

impl SymScalingMethod<f64> for FixedScaling {
    fn compute_scaling_factors(
        &mut self,
        dim: usize,
        _irow: &[usize],
        _jcol: &[usize],
        _values: &[f64],
        factors: &mut [f64],
    ) -> Result<(), ScalingError> {
        self.calls += 1;
        if dim != self.factors.len() {
            return Err(ScalingError::DimensionMismatch);
        }
        factors.copy_from_slice(&self.factors);
        Ok(())
    }
}

pub fn qdldl_backend() -> QdldlBackend<f64> {
    QdldlBackend::new(&LinearSolverSettings::default())
}

pub fn dense_backend() -> DenseLdlBackend<f64> {
    DenseLdlBackend::new(&LinearSolverSettings::default())
}

/// infinity norm of A x - b
pub fn residual(A: &SymTripletMatrix<f64>, x: &[f64], b: &[f64]) -> f64 {
    let mut r = b.to_vec();
    A.symv(&mut r, x, 1.0, -1.0);
    r.norm_inf()
}

/// quasidefinite KKT-like matrix with one negative eigenvalue
///
/// [ 4  1  .  . ]
/// [ 1  3  .  1 ]
/// [ .  .  2  1 ]
/// [ .  1  1 -1 ]
pub fn kkt4() -> SymTripletMatrix<f64> {
    SymTripletMatrix::new(
        4,
        vec![0, 1, 1, 2, 3, 3, 3],
        vec![0, 0, 1, 2, 1, 2, 3],
        vec![4., 1., 3., 2., 1., 1., -1.],
    )
    .unwrap()
}
