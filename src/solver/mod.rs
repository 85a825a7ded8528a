//! Linear solver driver module.
//!
//! This module contains the [`TSymLinearSolver`] driver, its
//! [settings](LinearSolverSettings) and status types, and the two
//! capability surfaces the driver is generic over: the factorization
//! [backends](crate::solver::backends) and the
//! [scaling methods](crate::solver::scaling).
//!
//! Both capabilities come with shipped variants, selected through the
//! settings.  A custom backend or scaling method is supplied by
//! implementing [`SymLinearBackend`] or [`SymScalingMethod`] and
//! constructing the driver with
//! [`with_components`](TSymLinearSolver::with_components).

pub mod backends;
mod driver;
pub mod scaling;
mod settings;
mod status;

#[cfg(feature = "serde")]
mod json;

pub use backends::{
    LinearBackend, MatrixFormat, RectangularMatrix, SparsityPattern, SymLinearBackend,
    MAX_CALL_AGAIN,
};
pub use driver::*;
pub use scaling::{ScalingError, ScalingMethod, SymScalingMethod};
pub use settings::*;
pub use status::*;

#[cfg(feature = "serde")]
pub use json::*;
