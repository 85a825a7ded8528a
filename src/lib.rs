//! __Symsolve__ is a Rust driver for sparse symmetric indefinite linear
//! systems of the kind that arise in the Newton steps of interior point
//! methods for nonlinear optimization.  It solves
//!
//! $$ A x = b $$
//!
//! for one or more right-hand sides $b$, where $A = A^\top$ is sparse,
//! possibly indefinite, and supplied as a set of triplets from one triangle.
//!
//! The driver decouples the calling algorithm from the factorization
//! routine.  It takes care of
//!
//! * __Structure caching__: symbolic analysis and the triplet to compressed
//!   conversion are only repeated when the nonzero pattern of $A$ changes.
//!   Patterns and values are tracked with [tags](crate::algebra::Tag).
//!
//! * __Scaling__: an optional symmetric scaling $DAD$ that can be switched
//!   on when the calling algorithm asks for better solution quality.
//!
//! * __Inertia__: the number of negative eigenvalues of $A$ is reported,
//!   and a mismatch against an expected count triggers a single automatic
//!   attempt at improving the factorization quality.
//!
//! * __Degeneracy detection__: linearly dependent rows of a rectangular
//!   matrix can be identified by backends that support it.
//!
//! # Example
//!
//! ```no_run
//! use symsolve::algebra::*;
//! use symsolve::solver::*;
//!
//! // A = [ 4.  1.  0.]
//! //     [ 1. -3.  2.]
//! //     [ 0.  2.  5.]
//! let A = SymTripletMatrix::new(
//!     3,
//!     vec![0, 1, 1, 2, 2],
//!     vec![0, 0, 1, 1, 2],
//!     vec![4., 1., -3., 2., 5.],
//! ).unwrap();
//!
//! let settings = LinearSolverSettings::default();
//! let mut solver = TSymLinearSolver::new(settings).unwrap();
//!
//! let b = [1., 2., 3.];
//! let report = solver.solve(&A, &b, true, 1);
//! assert_eq!(report.status, SymSolverStatus::Success);
//! ```
//!
//! # License
//!
//! Licensed under Apache License, Version 2.0.

//Rust hates greek characters
#![allow(confusable_idents)]

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod algebra;
pub mod io;
pub mod qdldl;
pub mod solver;
