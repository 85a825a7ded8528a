#![allow(non_snake_case)]
use super::backends::*;
use super::scaling::*;
use super::{
    LinearSolverError, LinearSolverInfo, LinearSolverSettings, QualityState, SolveReport,
    SymSolverStatus,
};
use crate::algebra::*;
use crate::io::{ConfigurablePrintTarget, PrintTarget};
use itertools::izip;
use std::io::Write;

/// Driver for sparse symmetric indefinite linear systems.
///
/// The driver sits between an optimization algorithm and a factorization
/// backend.  It caches everything derived from the nonzero pattern of the
/// matrix (the compressed index arrays, the symbolic setup of the backend
/// and the scaling factors) and keeps it for as long as the
/// [structure tag](SymTripletMatrix::structure_tag) of the matrix does
/// not change.
///
/// The backend `B` and scaling method `S` default to the shipped variants,
/// selected through the [settings](LinearSolverSettings).  Custom
/// implementations can be supplied through [`with_components`](Self::with_components).
///
/// Numerical outcomes are reported as a [`SymSolverStatus`] in the
/// [`SolveReport`] of each solve.  Remediation (regularization etc.) is
/// left to the caller, except for a single automatic switch to scaled
/// factorizations on an inertia mismatch.

pub struct TSymLinearSolver<T: FloatT = f64, B = LinearBackend<T>, S = ScalingMethod<T>> {
    backend: B,
    // None for an identity scaling
    scaling_method: Option<S>,
    settings: LinearSolverSettings<T>,

    // cached structural state.  `irow` and `jcol` hold the pattern
    // the backend was set up for
    dim: usize,
    irow: Vec<usize>,
    jcol: Vec<usize>,
    converter: Option<TripletToCscConverter>,
    atag: Option<Tag>,
    initialized: bool,

    // value arenas, sized on structural change.  `values` holds the
    // (scaled) triplet values and `compressed` their compressed form
    values: Vec<T>,
    compressed: Vec<T>,
    rhs_work: Vec<T>,

    // scaling state
    scaling_factors: Vec<T>,
    scaling_valid: bool,
    scaling_values_tag: Option<Tag>,
    use_scaling: bool,

    // values tag and scaling mode of the backend's current factorization
    factored: Option<(Tag, bool)>,

    quality: QualityState,
    info: LinearSolverInfo,
    print_target: PrintTarget,
}

impl<T> TSymLinearSolver<T>
where
    T: FloatT,
{
    /// Creates a driver with the backend and scaling method named
    /// in `settings`.
    pub fn new(settings: LinearSolverSettings<T>) -> Result<Self, LinearSolverError> {
        settings.validate()?;
        let backend = LinearBackend::new(&settings)?;
        let scaling = ScalingMethod::new(&settings)?;
        Self::with_components(backend, Some(scaling), settings)
    }
}

impl<T, B, S> TSymLinearSolver<T, B, S>
where
    T: FloatT,
    B: SymLinearBackend<T>,
    S: SymScalingMethod<T>,
{
    /// Creates a driver from an existing backend and scaling method.
    /// A scaling method that reports itself as the identity is
    /// treated as no scaling method.
    pub fn with_components(
        backend: B,
        scaling_method: Option<S>,
        settings: LinearSolverSettings<T>,
    ) -> Result<Self, LinearSolverError> {
        settings.validate()?;

        let scaling_method = scaling_method.filter(|s| !s.is_identity());

        let mut solver = Self {
            backend,
            scaling_method,
            settings,
            dim: 0,
            irow: vec![],
            jcol: vec![],
            converter: None,
            atag: None,
            initialized: false,
            values: vec![],
            compressed: vec![],
            rhs_work: vec![],
            scaling_factors: vec![],
            scaling_valid: false,
            scaling_values_tag: None,
            use_scaling: false,
            factored: None,
            quality: QualityState::Normal,
            info: LinearSolverInfo::default(),
            print_target: PrintTarget::default(),
        };
        solver.reset_quality();
        Ok(solver)
    }

    /// Re-reads the driver options.
    ///
    /// Resets the quality state and scaling mode.  Structural caches are
    /// discarded unless `warm_start_same_structure` is set, in which case
    /// a previously initialized structure is required.  The backend and
    /// scaling method are kept, so their variant settings have no effect.
    pub fn initialize(&mut self, settings: LinearSolverSettings<T>) -> Result<(), LinearSolverError> {
        settings.validate()?;

        if settings.warm_start_same_structure && !self.initialized {
            return Err(LinearSolverError::WarmStartWithoutStructure);
        }
        self.settings = settings;

        if !self.settings.warm_start_same_structure {
            self.initialized = false;
            self.atag = None;
            self.converter = None;
        }
        self.factored = None;
        self.scaling_valid = false;
        self.reset_quality();
        Ok(())
    }

    /// Factors `A` as needed and solves for each right-hand side.
    ///
    /// With `check_neg_evals` set and a backend that reports inertia, a
    /// factorization with other than `expected_neg_evals` negative
    /// eigenvalues is retried once with scaling switched on (if scaling
    /// is on demand and still off) and otherwise reported as
    /// [`WrongInertia`](SymSolverStatus::WrongInertia).
    pub fn multi_solve(
        &mut self,
        A: &SymTripletMatrix<T>,
        rhs: &[&[T]],
        check_neg_evals: bool,
        expected_neg_evals: usize,
    ) -> SolveReport<T> {
        let status = self.ensure_structure(A);
        if status != SymSolverStatus::Success {
            return SolveReport::failed(status, None);
        }

        let dim = self.dim;
        if let Some(b) = rhs.iter().find(|b| b.len() != dim) {
            self.log(format_args!(
                "right-hand side has length {}, expected {}",
                b.len(),
                dim
            ));
            return SolveReport::failed(SymSolverStatus::StructuralError, None);
        }

        let check_neg_evals = check_neg_evals && self.backend.provides_inertia();
        let mut retried = false;

        let neg_evals = loop {
            let status = self.update_scaling(A);
            if status != SymSolverStatus::Success {
                return SolveReport::failed(status, None);
            }

            let status = self.factorize(A);
            if status != SymSolverStatus::Success {
                return SolveReport::failed(status, None);
            }

            let neg_evals = self
                .backend
                .provides_inertia()
                .then(|| self.backend.number_of_neg_evals());

            if check_neg_evals && neg_evals != Some(expected_neg_evals) {
                let found = self.backend.number_of_neg_evals();
                if !retried && self.quality == QualityState::Normal && self.can_switch_scaling_on() {
                    self.log(format_args!(
                        "wrong inertia: {} negative eigenvalues, expected {}.  Switching scaling on",
                        found, expected_neg_evals
                    ));
                    retried = true;
                    self.info.quality_retries += 1;
                    self.switch_scaling_on();
                    continue;
                }
                self.log(format_args!(
                    "wrong inertia: {} negative eigenvalues, expected {}",
                    found, expected_neg_evals
                ));
                return SolveReport::failed(SymSolverStatus::WrongInertia, neg_evals);
            }
            break neg_evals;
        };

        match self.solve_rhs(rhs) {
            Ok(solutions) => SolveReport {
                status: SymSolverStatus::Success,
                solutions,
                neg_evals,
            },
            Err(status) => SolveReport::failed(status, neg_evals),
        }
    }

    /// [`multi_solve`](Self::multi_solve) for a single right-hand side
    pub fn solve(
        &mut self,
        A: &SymTripletMatrix<T>,
        rhs: &[T],
        check_neg_evals: bool,
        expected_neg_evals: usize,
    ) -> SolveReport<T> {
        self.multi_solve(A, &[rhs], check_neg_evals, expected_neg_evals)
    }

    /// Negative eigenvalues found by the most recent factorization
    pub fn number_of_neg_evals(&self) -> Result<usize, LinearSolverError> {
        if !self.backend.provides_inertia() {
            return Err(LinearSolverError::UnsupportedCapability("inertia"));
        }
        Ok(self.backend.number_of_neg_evals())
    }

    /// Requests more accurate factorizations from here on.
    ///
    /// Switches on-demand scaling on if it is still off, and otherwise
    /// asks the backend for higher quality.  Returns false if neither
    /// was possible.
    pub fn increase_quality(&mut self) -> bool {
        let increased = if self.can_switch_scaling_on() {
            self.log(format_args!("increasing quality: switching scaling on"));
            self.switch_scaling_on();
            true
        } else if self.backend.increase_quality() {
            self.log(format_args!("increasing quality of the factorization"));
            true
        } else {
            false
        };

        self.factored = None;
        self.quality = if increased {
            QualityState::Escalated
        } else {
            self.log(format_args!("quality cannot be increased further"));
            QualityState::Exhausted
        };
        self.info.quality = self.quality;
        increased
    }

    /// true if the backend reports negative eigenvalue counts
    pub fn provides_inertia(&self) -> bool {
        self.backend.provides_inertia()
    }

    /// true if the backend can detect dependent rows
    pub fn provides_degeneracy_detection(&self) -> bool {
        self.backend.provides_degeneracy_detection()
    }

    /// Indices of linearly dependent rows of `J`, in increasing order
    /// and without repeats.  The matrix is converted to compressed
    /// columns first if the backend works on a compressed format.
    pub fn determine_dependent_rows(
        &mut self,
        J: &TripletMatrix<T>,
    ) -> Result<Vec<usize>, LinearSolverError> {
        if !self.backend.provides_degeneracy_detection() {
            return Err(LinearSolverError::UnsupportedCapability(
                "degeneracy detection",
            ));
        }
        J.check_format()?;

        let mut rows = match self.backend.matrix_format().compressed_shape() {
            None => self
                .backend
                .determine_dependent_rows(RectangularMatrix::Triplet(J))?,
            Some(_) => {
                let csc = J.to_csc();
                self.backend
                    .determine_dependent_rows(RectangularMatrix::Csc(&csc))?
            }
        };

        rows.sort_unstable();
        rows.dedup();
        if rows.last().is_some_and(|&r| r >= J.m) {
            return Err(LinearSolverError::Backend(SymSolverStatus::FatalError));
        }

        self.log(format_args!(
            "found {} dependent rows in a {} x {} matrix",
            rows.len(),
            J.m,
            J.n
        ));
        Ok(rows)
    }

    /// Counters and state of the driver
    pub fn info(&self) -> &LinearSolverInfo {
        &self.info
    }

    pub fn settings(&self) -> &LinearSolverSettings<T> {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The scaling factors in use, if scaling is active
    pub fn scaling_factors(&self) -> Option<&[T]> {
        (self.use_scaling && self.scaling_valid).then_some(self.scaling_factors.as_slice())
    }

    // ---------------------------------
    // internals
    // ---------------------------------

    fn reset_quality(&mut self) {
        self.quality = QualityState::Normal;
        let always_on = !self.settings.linear_scaling_on_demand;
        self.set_use_scaling(always_on && self.scaling_method.is_some());
        self.info.quality = self.quality;
    }

    fn set_use_scaling(&mut self, use_scaling: bool) {
        self.use_scaling = use_scaling;
        self.info.scaling_active = use_scaling;
    }

    fn can_switch_scaling_on(&self) -> bool {
        !self.use_scaling && self.scaling_method.is_some() && self.settings.linear_scaling_on_demand
    }

    fn switch_scaling_on(&mut self) {
        self.set_use_scaling(true);
        self.scaling_valid = false;
        self.factored = None;
        self.quality = QualityState::Escalated;
        self.info.quality = self.quality;
    }

    fn log(&mut self, args: std::fmt::Arguments) {
        if self.settings.verbose {
            // print failures never affect the solve
            let _ = self.print_target.write_fmt(args);
            let _ = self.print_target.write_all(b"\n");
        }
    }

    fn ensure_structure(&mut self, A: &SymTripletMatrix<T>) -> SymSolverStatus {
        let tag = A.structure_tag();

        if self.initialized && self.atag == Some(tag) {
            return SymSolverStatus::Success;
        }

        // a warm start only adopts a new tag for an identical pattern
        if self.initialized
            && self.settings.warm_start_same_structure
            && A.dim() == self.dim
            && A.rowval() == self.irow.as_slice()
            && A.colval() == self.jcol.as_slice()
        {
            self.log(format_args!("warm start: reusing structure for a new matrix"));
            self.atag = Some(tag);
            self.factored = None;
            return SymSolverStatus::Success;
        }

        self.initialized = false;
        self.atag = None;
        self.converter = None;
        self.factored = None;
        self.scaling_valid = false;

        if A.check_format().is_err() {
            self.log(format_args!("bad matrix structure"));
            return SymSolverStatus::StructuralError;
        }

        let (dim, nnz) = (A.dim(), A.nnz());
        self.info.structure_inits += 1;

        let status = match self.backend.matrix_format().compressed_shape() {
            None => self.backend.initialize_structure(SparsityPattern::Triplet {
                dim,
                irow: A.rowval(),
                jcol: A.colval(),
            }),
            Some(shape) => {
                let converter = match TripletToCscConverter::new(dim, A.rowval(), A.colval(), shape) {
                    Ok(converter) => converter,
                    Err(_) => return SymSolverStatus::StructuralError,
                };
                let status = self.backend.initialize_structure(SparsityPattern::Csc {
                    dim,
                    colptr: converter.colptr(),
                    rowval: converter.rowval(),
                });
                self.compressed.resize(converter.nnz_compressed(), T::zero());
                self.converter = Some(converter);
                status
            }
        };

        if status != SymSolverStatus::Success {
            self.log(format_args!(
                "backend rejected the structure with status {}",
                status
            ));
            return SymSolverStatus::StructuralError;
        }

        self.dim = dim;
        self.irow.clear();
        self.irow.extend_from_slice(A.rowval());
        self.jcol.clear();
        self.jcol.extend_from_slice(A.colval());
        self.values.resize(nnz, T::zero());
        self.scaling_factors.resize(dim, T::one());
        self.atag = Some(tag);
        self.initialized = true;

        self.log(format_args!(
            "symsolve v{}: initialized structure of dimension {} with {} nonzeros",
            crate::VERSION,
            dim,
            nnz
        ));
        if let Some(converter) = &self.converter {
            let nnz_compressed = converter.nnz_compressed();
            self.log(format_args!("compressed to {} nonzeros", nnz_compressed));
        }

        SymSolverStatus::Success
    }

    // (re)computes scaling factors if scaling is on and they are stale
    fn update_scaling(&mut self, A: &SymTripletMatrix<T>) -> SymSolverStatus {
        if !self.use_scaling {
            return SymSolverStatus::Success;
        }
        let Some(method) = self.scaling_method.as_mut() else {
            return SymSolverStatus::Success;
        };

        let stale = !self.scaling_valid
            || (self.settings.rescale_on_new_values
                && self.scaling_values_tag != Some(A.values_tag()));
        if !stale {
            return SymSolverStatus::Success;
        }

        self.info.scaling_computations += 1;
        let result = method
            .compute_scaling_factors(
                self.dim,
                A.rowval(),
                A.colval(),
                A.values(),
                &mut self.scaling_factors,
            )
            .and_then(|_| validate_scaling_factors(&self.scaling_factors));

        // new factors need a new factorization
        self.factored = None;

        match result {
            Ok(()) => {
                self.scaling_valid = true;
                self.scaling_values_tag = Some(A.values_tag());
                SymSolverStatus::Success
            }
            Err(e) => {
                self.scaling_valid = false;
                self.scaling_factors.set(T::one());
                if self.settings.scaling_failure_fallback {
                    self.log(format_args!("{}.  Continuing without scaling", e));
                    self.set_use_scaling(false);
                    SymSolverStatus::Success
                } else {
                    self.log(format_args!("{}", e));
                    SymSolverStatus::ScalingFailure
                }
            }
        }
    }

    // copies the current values into the backend's layout,
    // applying scaling to the copy
    fn give_matrix_to_solver(&mut self, A: &SymTripletMatrix<T>) {
        self.values.copy_from(A.values());

        if self.use_scaling {
            let d = &self.scaling_factors;
            for (v, &i, &j) in izip!(&mut self.values, A.rowval(), A.colval()) {
                *v *= d[i] * d[j];
            }
        }

        if let Some(converter) = &self.converter {
            converter.convert_values(&self.values, &mut self.compressed);
        }
    }

    fn factorize(&mut self, A: &SymTripletMatrix<T>) -> SymSolverStatus {
        let key = (A.values_tag(), self.use_scaling);
        if self.factored == Some(key) {
            return SymSolverStatus::Success;
        }
        self.factored = None;

        self.give_matrix_to_solver(A);

        let mut call_again = 0;
        loop {
            self.info.factorizations += 1;

            let values = match self.converter {
                Some(_) => &self.compressed,
                None => &self.values,
            };

            match self.backend.factorize(values) {
                SymSolverStatus::Success => {
                    self.factored = Some(key);
                    return SymSolverStatus::Success;
                }
                SymSolverStatus::CallAgain => {
                    call_again += 1;
                    if call_again > MAX_CALL_AGAIN {
                        self.log(format_args!(
                            "backend requested values more than {} times",
                            MAX_CALL_AGAIN
                        ));
                        return SymSolverStatus::FatalError;
                    }
                    self.log(format_args!("backend requested values again"));
                    self.give_matrix_to_solver(A);
                }
                status => {
                    self.log(format_args!("factorization failed with status {}", status));
                    return status;
                }
            }
        }
    }

    // solves for all right-hand sides with the current factorization
    fn solve_rhs(&mut self, rhs: &[&[T]]) -> Result<Vec<Vec<T>>, SymSolverStatus> {
        let (n, nrhs) = (self.dim, rhs.len());

        if n == 0 || nrhs == 0 {
            return Ok(vec![vec![]; nrhs]);
        }

        self.rhs_work.clear();
        rhs.iter().for_each(|b| self.rhs_work.extend_from_slice(b));

        if self.use_scaling {
            for x in self.rhs_work.chunks_exact_mut(n) {
                x.hadamard(&self.scaling_factors);
            }
        }

        self.info.solves += 1;
        let status = self.backend.solve(&mut self.rhs_work, nrhs);
        if status != SymSolverStatus::Success {
            self.log(format_args!("solve failed with status {}", status));
            return Err(status);
        }

        if self.use_scaling {
            for x in self.rhs_work.chunks_exact_mut(n) {
                x.hadamard(&self.scaling_factors);
            }
        }

        Ok(self.rhs_work.chunks_exact(n).map(|x| x.to_vec()).collect())
    }
}

impl<T, B, S> ConfigurablePrintTarget for TSymLinearSolver<T, B, S>
where
    T: FloatT,
{
    fn print_to_stdout(&mut self) {
        self.print_target.print_to_stdout()
    }
    fn print_to_file(&mut self, file: std::fs::File) {
        self.print_target.print_to_file(file)
    }
    fn print_to_stream(&mut self, stream: Box<dyn Write + Send + Sync>) {
        self.print_target.print_to_stream(stream)
    }
    fn print_to_buffer(&mut self) {
        self.print_target.print_to_buffer()
    }
    fn print_to_sink(&mut self) {
        self.print_target.print_to_sink()
    }
    fn get_print_buffer(&mut self) -> std::io::Result<String> {
        self.print_target.get_print_buffer()
    }
}
