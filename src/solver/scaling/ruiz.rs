use super::{ScalingError, SymScalingMethod};
use crate::algebra::*;
use crate::solver::LinearSolverSettings;

/// Symmetric Ruiz equilibration.
///
/// Each pass divides every factor by the square root of the largest
/// absolute entry in its row of the currently scaled matrix `D A D`.
/// Row norms are limited to `[scaling_min, scaling_max]` before use,
/// and rows with norm below the minimum are left unscaled.  Triplets
/// at the same symmetric position are summed before taking norms.

#[derive(Debug, Clone)]
pub struct RuizScaling<T> {
    max_iter: u32,
    tolerance: T,
    scaling_min: T,
    scaling_max: T,
    // row norms of the scaled matrix
    norms: Vec<T>,
    // upper triangular values with duplicates summed
    compressed: Vec<T>,
}

impl<T> RuizScaling<T>
where
    T: FloatT,
{
    pub fn new(settings: &LinearSolverSettings<T>) -> Self {
        Self {
            max_iter: settings.scaling_max_iter,
            tolerance: settings.scaling_tolerance,
            scaling_min: settings.scaling_min,
            scaling_max: settings.scaling_max,
            norms: vec![],
            compressed: vec![],
        }
    }

    // inf-norms of the rows of D A D
    fn scaled_row_norms(&mut self, pattern: &TripletToCscConverter, d: &[T]) {
        let (colptr, rowval) = (pattern.colptr(), pattern.rowval());
        let norms = &mut self.norms;
        norms.set(T::zero());
        for col in 0..pattern.dim() {
            for p in colptr[col]..colptr[col + 1] {
                let row = rowval[p];
                let a = T::abs(d[row] * self.compressed[p] * d[col]);
                norms[row] = T::max(norms[row], a);
                norms[col] = T::max(norms[col], a);
            }
        }
    }

    fn is_converged(&self) -> bool {
        self.norms
            .iter()
            .all(|&n| n == T::zero() || T::abs(n - T::one()) <= self.tolerance)
    }
}

impl<T> SymScalingMethod<T> for RuizScaling<T>
where
    T: FloatT,
{
    fn compute_scaling_factors(
        &mut self,
        dim: usize,
        irow: &[usize],
        jcol: &[usize],
        values: &[T],
        factors: &mut [T],
    ) -> Result<(), ScalingError> {
        if factors.len() != dim
            || irow.len() != values.len()
            || jcol.len() != values.len()
            || irow.iter().chain(jcol).any(|&i| i >= dim)
        {
            return Err(ScalingError::DimensionMismatch);
        }
        if !values.is_finite() {
            return Err(ScalingError::Failed("matrix values are not finite".into()));
        }

        let pattern = TripletToCscConverter::new(dim, irow, jcol, CompressedShape::Triu)
            .map_err(|_| ScalingError::DimensionMismatch)?;
        self.compressed.resize(pattern.nnz_compressed(), T::zero());
        pattern.convert_values(values, &mut self.compressed);

        factors.set(T::one());
        self.norms.resize(dim, T::zero());

        let (scale_min, scale_max) = (self.scaling_min, self.scaling_max);

        for _ in 0..self.max_iter {
            self.scaled_row_norms(&pattern, factors);
            if self.is_converged() {
                break;
            }
            self.norms
                .scalarop(|x| limit_scaling(x, scale_min, scale_max))
                .rsqrt();
            factors.hadamard(&self.norms);
        }

        if !factors.is_finite() {
            return Err(ScalingError::Failed("scaling factors are not finite".into()));
        }
        Ok(())
    }
}

fn limit_scaling<T>(s: T, minval: T, maxval: T) -> T
where
    T: FloatT + ScalarMath<T = T>,
{
    s.clip(minval, maxval, T::one(), maxval)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ruiz(settings: &LinearSolverSettings<f64>, A: &SymTripletMatrix<f64>) -> Vec<f64> {
        let mut method = RuizScaling::new(settings);
        let mut d = vec![0.; A.dim()];
        method
            .compute_scaling_factors(A.dim(), A.rowval(), A.colval(), A.values(), &mut d)
            .unwrap();
        d
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_ruiz_diagonal() {
        let A = SymTripletMatrix::from_dense_lower(&[[4., 0.], [0., 0.25]]);
        let d = ruiz(&LinearSolverSettings::default(), &A);
        assert_eq!(d, vec![0.5, 2.]);
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_ruiz_converges() {
        let A = SymTripletMatrix::from_dense_lower(&[[100., 0.], [1., 0.01]]);
        let settings = LinearSolverSettings {
            scaling_max_iter: 20,
            ..LinearSolverSettings::default()
        };
        let d = ruiz(&settings, &A);
        assert!(d.iter().all(|&x| x > 0.));

        // row norms of D A D
        let r0 = f64::max(100. * d[0] * d[0], d[0] * d[1]);
        let r1 = f64::max(d[0] * d[1], 0.01 * d[1] * d[1]);
        assert!((r0 - 1.).abs() <= 2e-3);
        assert!((r1 - 1.).abs() <= 2e-3);
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_ruiz_limits() {
        // rows with tiny norms are left alone, huge norms are capped
        let A = SymTripletMatrix::from_dense_lower(&[[1e-8, 0.], [0., 1e10]]);
        let settings = LinearSolverSettings {
            scaling_max_iter: 1,
            ..LinearSolverSettings::default()
        };
        let d = ruiz(&settings, &A);
        assert_eq!(d[0], 1.);
        assert!((d[1] - 1e-2).abs() < 1e-15);

        // an empty row keeps a unit factor
        let A = SymTripletMatrix::new(2, vec![0], vec![0], vec![9.]).unwrap();
        let d = ruiz(&LinearSolverSettings::default(), &A);
        assert_eq!(d, vec![1. / 3., 1.]);
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_ruiz_sums_duplicates() {
        // the entries at (0,0) cancel, so row 0 is empty.  The
        // mirrored triplets at (1,2) and (2,1) add up to 4
        let A = SymTripletMatrix::new(
            3,
            vec![0, 0, 1, 1, 2, 2],
            vec![0, 0, 1, 2, 1, 2],
            vec![5., -5., 4., 2., 2., 4.],
        )
        .unwrap();
        let settings = LinearSolverSettings {
            scaling_max_iter: 1,
            ..LinearSolverSettings::default()
        };
        let d = ruiz(&settings, &A);
        assert_eq!(d, vec![1., 0.5, 0.5]);
    }

    #[test]
    fn test_ruiz_bad_inputs() {
        let mut method = RuizScaling::<f64>::new(&LinearSolverSettings::default());
        let mut d = vec![0.; 2];
        assert_eq!(
            method.compute_scaling_factors(3, &[0], &[0], &[1.], &mut d),
            Err(ScalingError::DimensionMismatch)
        );
        assert!(matches!(
            method.compute_scaling_factors(2, &[0], &[0], &[f64::NAN], &mut d),
            Err(ScalingError::Failed(_))
        ));
    }
}
