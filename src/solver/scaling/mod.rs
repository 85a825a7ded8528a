//! Symmetric diagonal scaling of linear systems.
//!
//! A scaling method computes a strictly positive factor vector `d` for a
//! symmetric matrix `A`.  The driver then factors `D A D` with `D = diag(d)`,
//! scales right-hand sides as `D b` and recovers solutions as `D x`.

use crate::algebra::*;
use crate::solver::{LinearSolverSettings, SettingsError};
use enum_dispatch::*;
use thiserror::Error;

mod ruiz;
pub use ruiz::*;

/// Error type returned by scaling methods
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScalingError {
    #[error("Scaling factor {index} is not positive and finite")]
    InvalidFactor { index: usize },
    #[error("Scaling inputs have inconsistent dimensions")]
    DimensionMismatch,
    #[error("Scaling failed: {0}")]
    Failed(String),
}

/// Capability surface of a scaling factor computation.
#[enum_dispatch]
pub trait SymScalingMethod<T: FloatT> {
    /// Computes scaling factors for the symmetric triplet matrix
    /// `(dim, irow, jcol, values)`, writing them to `factors`.
    fn compute_scaling_factors(
        &mut self,
        dim: usize,
        irow: &[usize],
        jcol: &[usize],
        values: &[T],
        factors: &mut [T],
    ) -> Result<(), ScalingError>;

    /// true if the method always produces unit factors
    fn is_identity(&self) -> bool {
        false
    }
}

/// Identity scaling
#[derive(Debug, Clone, Default)]
pub struct NoScaling;

impl<T: FloatT> SymScalingMethod<T> for NoScaling {
    fn compute_scaling_factors(
        &mut self,
        dim: usize,
        _irow: &[usize],
        _jcol: &[usize],
        _values: &[T],
        factors: &mut [T],
    ) -> Result<(), ScalingError> {
        if factors.len() != dim {
            return Err(ScalingError::DimensionMismatch);
        }
        factors.set(T::one());
        Ok(())
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Scaling methods selectable through the `linear_system_scaling` setting
#[enum_dispatch(SymScalingMethod<T>)]
#[derive(Debug, Clone)]
pub enum ScalingMethod<T: FloatT> {
    NoScaling(NoScaling),
    Ruiz(RuizScaling<T>),
}

impl<T: FloatT> ScalingMethod<T> {
    pub fn new(settings: &LinearSolverSettings<T>) -> Result<Self, SettingsError> {
        match settings.linear_system_scaling.as_str() {
            "none" => Ok(NoScaling.into()),
            "ruiz" => Ok(RuizScaling::new(settings).into()),
            other => Err(SettingsError::UnknownOption {
                field: "linear_system_scaling",
                value: other.to_string(),
            }),
        }
    }
}

/// Checks that every factor is strictly positive and finite,
/// reporting the first one that is not.
pub fn validate_scaling_factors<T: FloatT>(factors: &[T]) -> Result<(), ScalingError> {
    match factors
        .iter()
        .position(|&d| !(d.is_finite() && d > T::zero()))
    {
        Some(index) => Err(ScalingError::InvalidFactor { index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::LinearSolverSettingsBuilder;

    #[test]
    fn test_validate_scaling_factors() {
        assert!(validate_scaling_factors(&[1., 0.5, 2.]).is_ok());
        assert!(validate_scaling_factors::<f64>(&[]).is_ok());
        assert_eq!(
            validate_scaling_factors(&[1., 0., 2.]),
            Err(ScalingError::InvalidFactor { index: 1 })
        );
        assert_eq!(
            validate_scaling_factors(&[1., 1., f64::NAN, -1.]),
            Err(ScalingError::InvalidFactor { index: 2 })
        );
        assert_eq!(
            validate_scaling_factors(&[f64::INFINITY]),
            Err(ScalingError::InvalidFactor { index: 0 })
        );
    }

    #[test]
    fn test_scaling_method_new() {
        let settings = LinearSolverSettings::<f64>::default();
        let method = ScalingMethod::new(&settings).unwrap();
        assert!(matches!(method, ScalingMethod::Ruiz(_)));
        assert!(!method.is_identity());

        let settings = LinearSolverSettingsBuilder::<f64>::default()
            .linear_system_scaling("none".to_string())
            .build()
            .unwrap();
        let mut method = ScalingMethod::new(&settings).unwrap();
        assert!(method.is_identity());

        let mut d = vec![0.; 2];
        method
            .compute_scaling_factors(2, &[0], &[1], &[3.], &mut d)
            .unwrap();
        assert_eq!(d, vec![1., 1.]);

        let settings = LinearSolverSettings::<f64> {
            linear_system_scaling: "mc19".to_string(),
            ..LinearSolverSettings::default()
        };
        assert!(matches!(
            ScalingMethod::new(&settings),
            Err(SettingsError::UnknownOption { .. })
        ));
    }
}
