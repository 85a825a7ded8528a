#![allow(non_snake_case)]

mod common;
use common::*;
use symsolve::{algebra::*, solver::*};

fn dense_solver() -> TSymLinearSolver<f64> {
    let settings = LinearSolverSettingsBuilder::default()
        .linear_solver("dense".to_string())
        .build()
        .unwrap();
    TSymLinearSolver::new(settings).unwrap()
}

#[test]
fn test_dependent_row_known_example() {
    // J =
    // [ 1  2  0  1 ]
    // [ 0  1 -1  0 ]
    // [ 2  4  0  2 ]   = 2 * row 0
    let J = TripletMatrix::new(
        3,
        4,
        vec![0, 0, 0, 1, 1, 2, 2, 2],
        vec![0, 1, 3, 1, 2, 0, 1, 3],
        vec![1., 2., 1., 1., -1., 2., 4., 2.],
    );

    let mut solver = dense_solver();
    assert!(solver.provides_degeneracy_detection());
    assert_eq!(solver.determine_dependent_rows(&J).unwrap(), vec![2]);

    // lowest index wins also when the dependent row comes first
    let J = TripletMatrix::new(
        3,
        2,
        vec![0, 0, 1, 2, 2],
        vec![0, 1, 1, 0, 1],
        vec![2., 4., 1., 1., 2.],
    );
    assert_eq!(solver.determine_dependent_rows(&J).unwrap(), vec![2]);
}

#[test]
fn test_dependent_rows_zero_and_combinations() {
    // row 3 = row 0 + row 1, row 4 is empty, and row 5 repeats row 2
    // split over two triplets
    let J = TripletMatrix::new(
        6,
        3,
        vec![0, 1, 1, 2, 3, 3, 3, 5, 5],
        vec![0, 1, 2, 2, 0, 1, 2, 2, 2],
        vec![1., 1., 1., 3., 1., 1., 1., 1., 2.],
    );
    let mut solver = dense_solver();
    assert_eq!(solver.determine_dependent_rows(&J).unwrap(), vec![3, 4, 5]);

    // full row rank
    let J = TripletMatrix::new(2, 2, vec![0, 1], vec![0, 1], vec![1e-3, 1e3]);
    assert!(solver.determine_dependent_rows(&J).unwrap().is_empty());
}

#[test]
fn test_degeneracy_unsupported() {
    let mut solver = TSymLinearSolver::<f64>::new(LinearSolverSettings::default()).unwrap();
    assert!(!solver.provides_degeneracy_detection());

    let J = TripletMatrix::new(1, 1, vec![0], vec![0], vec![1.]);
    assert!(matches!(
        solver.determine_dependent_rows(&J),
        Err(LinearSolverError::UnsupportedCapability(_))
    ));
}

#[test]
fn test_degeneracy_compressed_backend() {
    let mut solver: TSymLinearSolver<f64, CompressedDegeneracyBackend> =
        TSymLinearSolver::with_components(
            CompressedDegeneracyBackend::default(),
            None,
            LinearSolverSettings::default(),
        )
        .unwrap();

    // explicit zeros in rows 2 and 0, with row 2 twice
    let J = TripletMatrix::new(
        3,
        3,
        vec![2, 0, 1, 2],
        vec![0, 1, 1, 2],
        vec![0., 0., 1., 0.],
    );
    assert_eq!(solver.determine_dependent_rows(&J).unwrap(), vec![0, 2]);
    assert_eq!(solver.backend().received_csc, Some(true));
}

#[test]
fn test_degeneracy_bad_matrix() {
    let mut solver = dense_solver();
    let J = TripletMatrix::new(2, 2, vec![0, 2], vec![0, 1], vec![1., 1.]);
    assert!(matches!(
        solver.determine_dependent_rows(&J),
        Err(LinearSolverError::Format(SparseFormatError::BadRowval))
    ));
}
