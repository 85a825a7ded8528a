//! Symsolve algebra module.
//!
//! __NB__: Users will not ordinarily need to interact with this crate except for defining
//! sparse matrix inputs in [`SymTripletMatrix`] or [`TripletMatrix`] format.
//!
//! Symsolve comes with its own minimal set of vector and sparse matrix
//! operations, implemented generically on [`FloatT`].  The crate only needs
//! what a factorization driver needs: symmetric products for checking
//! solutions, conversion between triplet and compressed formats, and a
//! handful of vector norms for the scaling methods.

mod csc;
mod converter;
mod error_types;
mod floats;
mod math_traits;
mod scalarmath;
mod tags;
mod triplet;
mod vecmath;

pub use csc::*;
pub use converter::*;
pub use error_types::*;
pub use floats::*;
pub use math_traits::*;
pub use tags::*;
pub use triplet::*;
