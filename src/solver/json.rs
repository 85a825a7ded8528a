#![allow(non_snake_case)]
use crate::algebra::*;
use crate::solver::{LinearSolverError, LinearSolverSettings, SolveReport, TSymLinearSolver};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Write;
use std::{fs::File, io, io::Read};

/// A symmetric linear system with its right-hand sides and the settings
/// used to solve it.  Systems can be written to JSON when a solve fails
/// and replayed later.  Matrix tags are not stored, so a system that is
/// read back carries fresh tags.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Serialize + DeserializeOwned")]
pub struct LinearSystemData<T: FloatT> {
    pub matrix: SymTripletMatrix<T>,
    pub rhs: Vec<Vec<T>>,
    pub settings: LinearSolverSettings<T>,
}

impl<T> LinearSystemData<T>
where
    T: FloatT + DeserializeOwned + Serialize,
{
    pub fn new(
        matrix: SymTripletMatrix<T>,
        rhs: Vec<Vec<T>>,
        settings: LinearSolverSettings<T>,
    ) -> Self {
        Self {
            matrix,
            rhs,
            settings,
        }
    }

    pub fn write_to_file(&self, file: &mut File) -> Result<(), io::Error> {
        let json = serde_json::to_string(self)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Reads a system from a file.  If `settings` is given it replaces
    /// the stored settings.
    pub fn read_from_file(
        file: &mut File,
        settings: Option<LinearSolverSettings<T>>,
    ) -> Result<Self, io::Error> {
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)?;
        let mut data: Self = serde_json::from_str(&buffer)?;

        if let Some(settings) = settings {
            data.settings = settings;
        }

        // indices are not checked by deserialization
        data.matrix
            .check_format()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(data)
    }

    /// Solves the system with a new driver built from the stored settings.
    /// Every right-hand side must match the matrix dimension.
    pub fn replay(&self) -> Result<SolveReport<T>, LinearSolverError> {
        let dim = self.matrix.dim();
        if let Some(b) = self.rhs.iter().find(|b| b.len() != dim) {
            return Err(LinearSolverError::DimensionMismatch {
                expected: dim,
                found: b.len(),
            });
        }

        let mut solver = TSymLinearSolver::new(self.settings.clone())?;
        let rhs: Vec<&[T]> = self.rhs.iter().map(|b| b.as_slice()).collect();
        Ok(solver.multi_solve(&self.matrix, &rhs, false, 0))
    }
}

#[test]
fn test_json_io() {
    use std::io::{Seek, SeekFrom};

    let A = SymTripletMatrix::new(2, vec![0, 1, 1], vec![0, 0, 1], vec![4., 1., -3.]).unwrap();
    let settings = crate::solver::LinearSolverSettingsBuilder::default()
        .linear_solver("dense".to_string())
        .pivot_tolerance(1e-10)
        .build()
        .unwrap();
    let data = LinearSystemData::new(A, vec![vec![1., 2.], vec![0., 1.]], settings);

    // write the system to a file
    let mut file = tempfile::tempfile().unwrap();
    data.write_to_file(&mut file).unwrap();

    // read the system from the file
    file.seek(SeekFrom::Start(0)).unwrap();
    let data2 = LinearSystemData::<f64>::read_from_file(&mut file, None).unwrap();

    assert_eq!(data2.settings, data.settings);
    assert_eq!(data2.rhs, data.rhs);
    assert_eq!(data2.matrix.values(), data.matrix.values());
    assert_ne!(data2.matrix.structure_tag(), data.matrix.structure_tag());

    let report1 = data.replay().unwrap();
    let report2 = data2.replay().unwrap();
    assert!(report1.is_ok());
    assert_eq!(report1.solutions, report2.solutions);
}

#[test]
fn test_json_bad_indices() {
    use std::io::{Seek, SeekFrom};

    let json = r#"{"matrix":{"n":2,"rowval":[5],"colval":[0],"nzval":[1.0]},"rhs":[],"settings":{}}"#;
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let err = LinearSystemData::<f64>::read_from_file(&mut file, None).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn test_json_replay_bad_rhs() {
    let A = SymTripletMatrix::new(2, vec![0, 1], vec![0, 1], vec![1., 2.]).unwrap();
    let data = LinearSystemData::new(A, vec![vec![1., 2.], vec![1., 2., 3.]], Default::default());

    match data.replay() {
        Err(LinearSolverError::DimensionMismatch { expected, found }) => {
            assert_eq!((expected, found), (2, 3));
        }
        other => panic!("unexpected replay result {:?}", other),
    }
}
