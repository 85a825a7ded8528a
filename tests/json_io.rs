#![allow(non_snake_case)]

mod common;

#[cfg(feature = "serde")]
#[test]
fn test_json_io() {
    use common::*;
    use symsolve::{algebra::*, solver::*};
    use std::io::{Seek, SeekFrom};

    // a singular system captured for later inspection
    // [ 1  1  . ]
    // [ 1  1  . ]
    // [ .  .  2 ]
    let A = SymTripletMatrix::new(3, vec![0, 1, 1, 2], vec![0, 0, 1, 2], vec![1., 1., 1., 2.]).unwrap();
    let settings = LinearSolverSettingsBuilder::default()
        .linear_solver("dense".to_string())
        .build()
        .unwrap();
    let mut solver = TSymLinearSolver::new(settings.clone()).unwrap();
    let report = solver.solve(&A, &[1., 2., 3.], false, 0);
    assert_eq!(report.status, SymSolverStatus::Singular);

    let data = LinearSystemData::new(A, vec![vec![1., 2., 3.]], settings);

    // write the system to a file
    let mut file = tempfile::tempfile().unwrap();
    data.write_to_file(&mut file).unwrap();

    // read the system from the file and solve it again
    file.seek(SeekFrom::Start(0)).unwrap();
    let data2 = LinearSystemData::<f64>::read_from_file(&mut file, None).unwrap();
    assert_eq!(data2.replay().unwrap().status, SymSolverStatus::Singular);

    // read the system from the file with custom settings
    file.seek(SeekFrom::Start(0)).unwrap();
    let settings = LinearSolverSettingsBuilder::default()
        .linear_solver("qdldl".to_string())
        .build()
        .unwrap();
    let data3 = LinearSystemData::<f64>::read_from_file(&mut file, Some(settings)).unwrap();
    assert_eq!(data3.settings.linear_solver, "qdldl");
    assert_eq!(data3.replay().unwrap().status, SymSolverStatus::Singular);

    // a regular system replays successfully
    let data4 = LinearSystemData::new(kkt4(), vec![vec![1., 1., 1., 1.]], data3.settings);
    let report = data4.replay().unwrap();
    assert!(report.is_ok());
    assert!(residual(&data4.matrix, &report.solutions[0], &data4.rhs[0]) < 1e-12);
}
