use super::SettingsError;
use crate::algebra::{FloatT, SparseFormatError};
use thiserror::Error;

// ---------------------------------
// Linear solver status type
// ---------------------------------

/// Status of a factorization or solve.
///
/// Statuses are plain return values.  All remediation (regularization,
/// restarts etc) is left to the caller.

#[repr(u32)]
#[derive(PartialEq, Eq, Clone, Debug, Copy, Default)]
pub enum SymSolverStatus {
    /// Factorization and solves completed.
    #[default]
    Success,
    /// The matrix is exactly or numerically singular.
    Singular,
    /// The number of negative eigenvalues does not match the expected count.
    WrongInertia,
    /// The backend requests its matrix values again, then a repeated call.
    /// Never returned from the driver.
    CallAgain,
    /// The backend could not set up the nonzero structure.
    StructuralError,
    /// Scaling factors could not be computed.
    ScalingFailure,
    /// Unrecoverable backend error.
    FatalError,
}

impl std::fmt::Display for SymSolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error type for driver operations that can be misused, as opposed to
/// numerical outcomes, which are reported as a [`SymSolverStatus`].
#[derive(Error, Debug)]
pub enum LinearSolverError {
    /// The backend does not provide the requested capability
    #[error("Backend does not provide {0}")]
    UnsupportedCapability(&'static str),
    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    /// A warm start was requested before any structure was seen
    #[error("Warm start requested without a previously initialized structure")]
    WarmStartWithoutStructure,
    /// Incompatible array dimensions
    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Badly formatted sparse matrix input
    #[error("Bad matrix format: {0}")]
    Format(#[from] SparseFormatError),
    /// The backend failed with the given status
    #[error("Backend failed with status {0}")]
    Backend(SymSolverStatus),
}

/// Position in the quality escalation sequence
#[repr(u32)]
#[derive(PartialEq, Eq, Clone, Debug, Copy, Default)]
pub enum QualityState {
    /// No quality increase requested since initialization
    #[default]
    Normal,
    /// At least one quality increase has been applied
    Escalated,
    /// A quality increase was requested but none was possible
    Exhausted,
}

/// Result of a [`multi_solve`](crate::solver::TSymLinearSolver::multi_solve) call
#[derive(Debug, Clone, Default)]
pub struct SolveReport<T> {
    /// terminal status
    pub status: SymSolverStatus,
    /// solutions in the order of the right-hand sides.  Empty
    /// unless `status` is `Success`
    pub solutions: Vec<Vec<T>>,
    /// negative eigenvalue count of the last factorization, if the
    /// backend reports inertia and a factorization succeeded
    pub neg_evals: Option<usize>,
}

impl<T: FloatT> SolveReport<T> {
    pub(crate) fn failed(status: SymSolverStatus, neg_evals: Option<usize>) -> Self {
        Self {
            status,
            solutions: vec![],
            neg_evals,
        }
    }

    /// true if the solve completed
    pub fn is_ok(&self) -> bool {
        self.status == SymSolverStatus::Success
    }
}

/// Counters and state of a [`TSymLinearSolver`](crate::solver::TSymLinearSolver)
#[derive(Debug, Clone, Default)]
pub struct LinearSolverInfo {
    /// symbolic structure initializations in the backend
    pub structure_inits: u32,
    /// numeric factorization calls to the backend
    pub factorizations: u32,
    /// solve calls to the backend
    pub solves: u32,
    /// scale factor computations
    pub scaling_computations: u32,
    /// automatic quality retries after an inertia mismatch
    pub quality_retries: u32,
    /// current quality state
    pub quality: QualityState,
    /// true if scaling is currently applied
    pub scaling_active: bool,
}
