//! Sparse $LDL^T$ factorization on an AMD ordering.
//!
//! This is the factorization engine behind the default
//! [`QdldlBackend`](crate::solver::QdldlBackend).  It performs no pivoting,
//! so the ordering is fixed at construction and numeric refactorizations
//! with new values reuse all symbolic data.

#[allow(clippy::module_inception)]
mod qdldl;
pub use qdldl::*;
