#![allow(non_snake_case)]

mod common;
use common::*;
use symsolve::solver::backends::QdldlBackend;
use symsolve::solver::scaling::NoScaling;
use symsolve::{algebra::*, solver::*};

type ScaledSolver = TSymLinearSolver<f64, CountingBackend<QdldlBackend<f64>>, FixedScaling>;

fn always_scaled() -> LinearSolverSettings<f64> {
    LinearSolverSettings {
        linear_scaling_on_demand: false,
        ..LinearSolverSettings::default()
    }
}

fn scaled_solver(factors: Vec<f64>, settings: LinearSolverSettings<f64>) -> ScaledSolver {
    TSymLinearSolver::with_components(
        CountingBackend::new(qdldl_backend()),
        Some(FixedScaling::new(factors)),
        settings,
    )
    .unwrap()
}

fn unscaled_solution(A: &SymTripletMatrix<f64>, b: &[f64]) -> Vec<f64> {
    let settings = LinearSolverSettings {
        linear_system_scaling: "none".to_string(),
        ..LinearSolverSettings::default()
    };
    let mut solver = TSymLinearSolver::new(settings).unwrap();
    solver.solve(A, b, false, 0).solutions.remove(0)
}

#[test]
fn test_scaling_round_trip() {
    let A = kkt4();
    let b = [1., -2., 3., 0.5];
    let mut solver = scaled_solver(vec![2., 0.5, 4., 1.], always_scaled());

    let report = solver.solve(&A, &b, true, 1);
    assert!(report.is_ok());
    assert!(solver.info().scaling_active);
    assert_eq!(solver.scaling_factors(), Some(&[2., 0.5, 4., 1.][..]));

    // the backend factors D A D
    assert_eq!(
        solver.backend().last_values,
        vec![16., 1., 0.75, 32., 0.5, 4., -1.]
    );

    let x = unscaled_solution(&A, &b);
    let x_scaled = &report.solutions[0];
    assert!(x.iter().zip(x_scaled).all(|(a, b)| (a - b).abs() < 1e-12));
    assert!(residual(&A, x_scaled, &b) < 1e-12);

    // the caller's matrix is never modified
    assert_eq!(A.values(), kkt4().values());
}

#[test]
fn test_ruiz_scaling_badly_scaled_system() {
    // [ 1e6   1    .  ]
    // [ 1    1e-4  1  ]
    // [ .     1   -1e3]
    let A = SymTripletMatrix::from_dense_lower(&[[1e6, 0., 0.], [1., 1e-4, 0.], [0., 1., -1e3]]);
    let b = [1., 2., 3.];

    let mut solver = TSymLinearSolver::new(always_scaled()).unwrap();
    let report = solver.solve(&A, &b, false, 0);
    assert!(report.is_ok());
    assert!(solver.info().scaling_active);
    assert_eq!(solver.info().scaling_computations, 1);

    let d = solver.scaling_factors().unwrap();
    assert!(d.iter().all(|&d| d > 0. && d.is_finite()));
    assert!(d[0] < 1e-2);

    let x = unscaled_solution(&A, &b);
    let x_scaled = &report.solutions[0];
    let xnorm = x.norm_inf();
    assert!(x.iter().zip(x_scaled).all(|(a, b)| (a - b).abs() <= 1e-9 * xnorm));
}

#[test]
fn test_scaling_on_demand() {
    let A = kkt4();
    let b = [1., 1., 1., 1.];
    let mut solver = scaled_solver(vec![2., 2., 2., 2.], LinearSolverSettings::default());

    assert!(solver.solve(&A, &b, false, 0).is_ok());
    assert!(!solver.info().scaling_active);
    assert_eq!(solver.scaling_factors(), None);
    assert_eq!(solver.info().scaling_computations, 0);

    // the first quality increase switches scaling on
    assert!(solver.increase_quality());
    assert_eq!(solver.backend().counts.quality_increases, 0);
    assert_eq!(solver.info().quality, QualityState::Escalated);

    let report = solver.solve(&A, &b, false, 0);
    assert!(report.is_ok());
    assert_eq!(solver.scaling_factors(), Some(&[2., 2., 2., 2.][..]));
    assert_eq!(solver.backend().counts.factorizations, 2);
    assert!(residual(&A, &report.solutions[0], &b) < 1e-12);

    // the next one goes to the backend
    assert!(solver.increase_quality());
    assert_eq!(solver.backend().counts.quality_increases, 1);
}

#[test]
fn test_scale_factors_per_structure() {
    let mut A = kkt4();
    let b = [1., 1., 1., 1.];
    let mut solver = scaled_solver(vec![1., 2., 1., 2.], always_scaled());

    assert!(solver.solve(&A, &b, false, 0).is_ok());
    A.values_mut()[0] = 5.;
    assert!(solver.solve(&A, &b, false, 0).is_ok());
    assert_eq!(solver.info().scaling_computations, 1);
    assert_eq!(solver.info().factorizations, 2);

    // recomputed with new values when requested
    let settings = LinearSolverSettings {
        rescale_on_new_values: true,
        ..always_scaled()
    };
    let mut solver = scaled_solver(vec![1., 2., 1., 2.], settings);
    assert!(solver.solve(&A, &b, false, 0).is_ok());
    A.values_mut()[0] = 6.;
    assert!(solver.solve(&A, &b, false, 0).is_ok());
    assert!(solver.solve(&A, &b, false, 0).is_ok());
    assert_eq!(solver.info().scaling_computations, 2);
    assert_eq!(solver.info().factorizations, 2);
}

#[test]
fn test_scaling_failure() {
    let A = kkt4();
    let b = [1., 1., 1., 1.];

    // a zero factor is an error, not clamped
    let mut solver = scaled_solver(vec![1., 0., 1., 1.], always_scaled());
    let report = solver.solve(&A, &b, false, 0);
    assert_eq!(report.status, SymSolverStatus::ScalingFailure);
    assert!(report.solutions.is_empty());
    assert_eq!(solver.backend().counts.factorizations, 0);

    // unless the fallback is enabled
    let settings = LinearSolverSettings {
        scaling_failure_fallback: true,
        ..always_scaled()
    };
    let mut solver = scaled_solver(vec![1., f64::NAN, 1., 1.], settings);
    let report = solver.solve(&A, &b, false, 0);
    assert!(report.is_ok());
    assert!(!solver.info().scaling_active);
    assert_eq!(solver.backend().last_values, vec![4., 1., 3., 2., 1., 1., -1.]);
    assert!(residual(&A, &report.solutions[0], &b) < 1e-12);
}

#[test]
fn test_identity_scaling_is_no_scaling() {
    let mut solver: TSymLinearSolver<f64, CountingBackend<QdldlBackend<f64>>> =
        TSymLinearSolver::with_components(
            CountingBackend::new(qdldl_backend()),
            Some(ScalingMethod::NoScaling(NoScaling)),
            always_scaled(),
        )
        .unwrap();

    assert!(solver.solve(&kkt4(), &[1., 1., 1., 1.], false, 0).is_ok());
    assert!(!solver.info().scaling_active);

    // quality increases go straight to the backend
    assert!(solver.increase_quality());
    assert_eq!(solver.backend().counts.quality_increases, 1);
}
