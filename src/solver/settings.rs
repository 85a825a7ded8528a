use crate::algebra::*;
use derive_builder::Builder;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Error type returned by settings validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A field holds a value outside of its admissible range
    #[error("Bad value for field \"{0}\"")]
    BadFieldValue(&'static str),
    /// A string valued field names an option that does not exist
    #[error("Unknown option \"{value}\" for field \"{field}\"")]
    UnknownOption { field: &'static str, value: String },
}

/// Settings for the [`TSymLinearSolver`](crate::solver::TSymLinearSolver) driver,
/// and for the backends and scaling methods it constructs.

#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = "T: Serialize + DeserializeOwned"))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinearSolverSettings<T: FloatT> {
    ///factorization backend ("qdldl" or "dense")
    #[builder(default = r#""qdldl".to_string()"#)]
    pub linear_solver: String,

    ///scaling method ("ruiz" or "none")
    #[builder(default = r#""ruiz".to_string()"#)]
    pub linear_system_scaling: String,

    ///start unscaled and switch scaling on when a quality increase is requested.
    ///If false, scaling is always on
    #[builder(default = "true")]
    pub linear_scaling_on_demand: bool,

    ///keep the structural caches on re-initialization, and accept a new
    ///structure tag for a matrix with identical dimension and triplet indices
    #[builder(default = "false")]
    pub warm_start_same_structure: bool,

    ///continue unscaled when the scaling method fails
    #[builder(default = "false")]
    pub scaling_failure_fallback: bool,

    ///recompute scaling factors whenever matrix values change
    #[builder(default = "false")]
    pub rescale_on_new_values: bool,

    ///relative zero pivot tolerance.  For "qdldl" this is also the
    ///starting tolerance below which a pivot of the sparse ordering is
    ///rejected in favour of the pivoted dense factorization
    #[builder(default = "(1e-12).as_T()")]
    pub pivot_tolerance: T,

    ///largest "qdldl" pivot rejection tolerance reachable by quality increases
    #[builder(default = "(1e-4).as_T()")]
    pub pivot_tolerance_max: T,

    ///largest dimension for which "qdldl" falls back to a pivoted dense
    ///factorization when its sparse ordering meets a small pivot
    #[builder(default = "2000")]
    pub dense_fallback_max_dim: usize,

    ///relative residual below which a row is considered dependent
    #[builder(default = "(1e-10).as_T()")]
    pub degeneracy_tolerance: T,

    ///maximum Ruiz scaling passes
    #[builder(default = "10")]
    pub scaling_max_iter: u32,

    ///Ruiz scaling convergence tolerance
    #[builder(default = "(1e-3).as_T()")]
    pub scaling_tolerance: T,

    ///minimum row norm used in Ruiz scaling
    #[builder(default = "(1e-4).as_T()")]
    pub scaling_min: T,

    ///maximum row norm used in Ruiz scaling
    #[builder(default = "(1e+4).as_T()")]
    pub scaling_max: T,

    ///verbose printing
    #[builder(default = "false")]
    pub verbose: bool,
}

impl<T> Default for LinearSolverSettings<T>
where
    T: FloatT,
{
    fn default() -> LinearSolverSettings<T> {
        LinearSolverSettingsBuilder::<T>::default().build().unwrap()
    }
}

impl<T> LinearSolverSettings<T>
where
    T: FloatT,
{
    /// Checks that the settings are valid.
    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_linear_solver(&self.linear_solver)?;
        validate_linear_system_scaling(&self.linear_system_scaling)?;
        validate_pivot_tolerances(self.pivot_tolerance, self.pivot_tolerance_max)?;
        validate_positive("degeneracy_tolerance", self.degeneracy_tolerance)?;
        validate_positive("scaling_tolerance", self.scaling_tolerance)?;
        validate_scaling_limits(self.scaling_min, self.scaling_max)?;
        Ok(())
    }
}

// pre build checker (for auto-validation when using the builder)

impl From<SettingsError> for LinearSolverSettingsBuilderError {
    fn from(e: SettingsError) -> Self {
        LinearSolverSettingsBuilderError::ValidationError(e.to_string())
    }
}

/// Automatic pre-build settings validation
impl<T> LinearSolverSettingsBuilder<T>
where
    T: FloatT,
{
    /// check the fields that have been set explicitly.  Fields
    /// that are checked against each other are checked when both
    /// are present.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(ref linear_solver) = self.linear_solver {
            validate_linear_solver(linear_solver)?;
        }
        if let Some(ref scaling) = self.linear_system_scaling {
            validate_linear_system_scaling(scaling)?;
        }
        if let Some(tol) = self.degeneracy_tolerance {
            validate_positive("degeneracy_tolerance", tol)?;
        }
        if let Some(tol) = self.scaling_tolerance {
            validate_positive("scaling_tolerance", tol)?;
        }

        let default = LinearSolverSettings::<T>::paired_defaults();
        validate_pivot_tolerances(
            self.pivot_tolerance.unwrap_or(default.0),
            self.pivot_tolerance_max.unwrap_or(default.1),
        )?;
        validate_scaling_limits(
            self.scaling_min.unwrap_or(default.2),
            self.scaling_max.unwrap_or(default.3),
        )?;

        Ok(())
    }
}

impl<T> LinearSolverSettings<T>
where
    T: FloatT,
{
    // defaults of the fields that are validated in pairs.  Must
    // agree with the builder defaults above
    fn paired_defaults() -> (T, T, T, T) {
        ((1e-12).as_T(), (1e-4).as_T(), (1e-4).as_T(), (1e+4).as_T())
    }
}

// ---------------------------------------------------------
// individual validation functions go here
// ---------------------------------------------------------

fn validate_linear_solver(linear_solver: &str) -> Result<(), SettingsError> {
    match linear_solver {
        "qdldl" | "dense" => Ok(()),
        _ => Err(SettingsError::UnknownOption {
            field: "linear_solver",
            value: linear_solver.to_string(),
        }),
    }
}

fn validate_linear_system_scaling(scaling: &str) -> Result<(), SettingsError> {
    match scaling {
        "ruiz" | "none" => Ok(()),
        _ => Err(SettingsError::UnknownOption {
            field: "linear_system_scaling",
            value: scaling.to_string(),
        }),
    }
}

fn validate_positive<T: FloatT>(field: &'static str, value: T) -> Result<(), SettingsError> {
    if value.is_finite() && value > T::zero() {
        Ok(())
    } else {
        Err(SettingsError::BadFieldValue(field))
    }
}

fn validate_pivot_tolerances<T: FloatT>(tol: T, tol_max: T) -> Result<(), SettingsError> {
    validate_positive("pivot_tolerance", tol)?;
    validate_positive("pivot_tolerance_max", tol_max)?;
    if tol > tol_max {
        return Err(SettingsError::BadFieldValue("pivot_tolerance"));
    }
    if tol_max >= T::one() {
        return Err(SettingsError::BadFieldValue("pivot_tolerance_max"));
    }
    Ok(())
}

fn validate_scaling_limits<T: FloatT>(min: T, max: T) -> Result<(), SettingsError> {
    validate_positive("scaling_min", min)?;
    validate_positive("scaling_max", max)?;
    if min > max {
        return Err(SettingsError::BadFieldValue("scaling_min"));
    }
    Ok(())
}

#[test]
fn test_settings_validate() {
    // all standard settings
    LinearSolverSettingsBuilder::<f64>::default().build().unwrap();

    // fail on unknown backend
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .linear_solver("foo".to_string())
        .build()
        .is_err());

    // fail on unknown scaling method
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .linear_system_scaling("mc19".to_string())
        .build()
        .is_err());

    // fail on inconsistent pivot tolerances, including
    // against the default of the unset partner field
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .pivot_tolerance(1e-2)
        .build()
        .is_err());
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .pivot_tolerance(1e-2)
        .pivot_tolerance_max(0.5)
        .build()
        .is_ok());
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .pivot_tolerance_max(1.0)
        .build()
        .is_err());

    // fail on non-positive or non-finite tolerances
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .degeneracy_tolerance(0.0)
        .build()
        .is_err());
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .scaling_tolerance(f64::NAN)
        .build()
        .is_err());

    // fail on crossed scaling limits
    assert!(LinearSolverSettingsBuilder::<f64>::default()
        .scaling_min(10.0)
        .scaling_max(1.0)
        .build()
        .is_err());

    // direct validation of a settings struct
    let mut settings = LinearSolverSettings::<f64>::default();
    assert!(settings.validate().is_ok());
    settings.linear_solver = "ma27".to_string();
    assert_eq!(
        settings.validate(),
        Err(SettingsError::UnknownOption {
            field: "linear_solver",
            value: "ma27".to_string()
        })
    );
}
