#![allow(non_snake_case)]
use super::{MatrixFormat, RectangularMatrix, SparsityPattern, SymLinearBackend};
use crate::algebra::*;
use crate::solver::{LinearSolverError, LinearSolverSettings, SymSolverStatus};
use itertools::izip;

// diagonal blocks of D in P A P^T = L D L^T
#[derive(Debug, Clone, Copy, PartialEq)]
enum PivotBlock<T> {
    One(T),
    // the 2x2 block [a b; b c]
    Two(T, T, T),
}

/// Dense symmetric indefinite $LDL^T$ factors with 1x1 and 2x2 pivots.
///
/// The matrix is assembled into [`matrix_mut`](Self::matrix_mut) as a full
/// column major array and factored in place.  Pivots follow the
/// Bunch-Kaufman rule, or the rook rule when `rook` is set, which
/// searches further for a pivot and keeps the entries of `L` bounded.
#[derive(Debug)]
pub(crate) struct BunchKaufmanFactors<T> {
    n: usize,
    // dense column major workspace, overwritten by the factorization
    W: Vec<T>,
    // dense unit lower triangular factor, column major
    L: Vec<T>,
    blocks: Vec<PivotBlock<T>>,
    perm: Vec<usize>,
    work: Vec<T>,
    pub(crate) rook: bool,
}

impl<T> BunchKaufmanFactors<T>
where
    T: FloatT,
{
    pub(crate) fn new(n: usize) -> Self {
        Self {
            n,
            W: vec![T::zero(); n * n],
            L: vec![T::zero(); n * n],
            blocks: Vec::with_capacity(n),
            perm: (0..n).collect(),
            work: vec![T::zero(); n],
            rook: false,
        }
    }

    pub(crate) fn dim(&self) -> usize {
        self.n
    }

    /// zeroed full column major matrix to assemble into
    pub(crate) fn matrix_mut(&mut self) -> &mut [T] {
        self.W.fill(T::zero());
        &mut self.W
    }

    /// Factors the assembled matrix.  A pivot is zero when it is at
    /// most `tol` times the largest entry.  Returns the number of
    /// negative eigenvalues, or None for a singular matrix.
    pub(crate) fn factor(&mut self, tol: T) -> Option<usize> {
        let threshold = tol * self.W.norm_inf();
        _bunch_kaufman(
            self.n,
            &mut self.W,
            &mut self.L,
            &mut self.perm,
            &mut self.blocks,
            threshold,
            self.rook,
        )
    }

    /// Solves in place with the current factors
    pub(crate) fn solve(&mut self, x: &mut [T]) {
        _solve(self.n, &self.L, &self.blocks, &self.perm, &mut self.work, x);
    }
}

/// Dense Bunch-Kaufman $LDL^T$ backend.
///
/// Assembles the symmetric triplets into a dense matrix and factors it with
/// 1x1 and 2x2 pivots and symmetric row/column interchanges, so any
/// nonsingular symmetric matrix can be factored.  Storage and work grow as
/// `dim^2` and `dim^3`, so this is meant for small systems.  A quality
/// increase switches from Bunch-Kaufman to rook pivoting.
///
/// This is also the backend that provides dependent row detection, by
/// modified Gram-Schmidt on the rows in increasing order.  The rows are
/// copied into dense storage, so an `m x n` matrix needs `m * n` entries
/// of memory.

#[derive(Debug)]
pub struct DenseLdlBackend<T> {
    irow: Vec<usize>,
    jcol: Vec<usize>,
    factors: Option<BunchKaufmanFactors<T>>,
    is_factored: bool,
    neg_evals: usize,
    pivot_tolerance: T,
    degeneracy_tolerance: T,
    rook: bool,
}

impl<T> DenseLdlBackend<T>
where
    T: FloatT,
{
    pub fn new(settings: &LinearSolverSettings<T>) -> Self {
        Self {
            irow: vec![],
            jcol: vec![],
            factors: None,
            is_factored: false,
            neg_evals: 0,
            pivot_tolerance: settings.pivot_tolerance,
            degeneracy_tolerance: settings.degeneracy_tolerance,
            rook: false,
        }
    }

    /// true once a quality increase has switched to rook pivoting
    pub fn uses_rook_pivoting(&self) -> bool {
        self.rook
    }
}

impl<T> SymLinearBackend<T> for DenseLdlBackend<T>
where
    T: FloatT,
{
    fn matrix_format(&self) -> MatrixFormat {
        MatrixFormat::Triplet
    }

    fn initialize_structure(&mut self, pattern: SparsityPattern<'_>) -> SymSolverStatus {
        self.factors = None;
        self.is_factored = false;

        let SparsityPattern::Triplet { dim, irow, jcol } = pattern else {
            return SymSolverStatus::StructuralError;
        };
        if irow.len() != jcol.len() || irow.iter().chain(jcol).any(|&i| i >= dim) {
            return SymSolverStatus::StructuralError;
        }

        self.irow = irow.to_vec();
        self.jcol = jcol.to_vec();
        self.factors = Some(BunchKaufmanFactors::new(dim));

        SymSolverStatus::Success
    }

    fn factorize(&mut self, values: &[T]) -> SymSolverStatus {
        self.is_factored = false;

        let Some(factors) = self.factors.as_mut() else {
            return SymSolverStatus::FatalError;
        };
        if values.len() != self.irow.len() || !values.is_finite() {
            return SymSolverStatus::FatalError;
        }

        let n = factors.dim();
        let W = factors.matrix_mut();
        for (&i, &j, &v) in izip!(&self.irow, &self.jcol, values) {
            W[i + j * n] += v;
            if i != j {
                W[j + i * n] += v;
            }
        }

        factors.rook = self.rook;
        match factors.factor(self.pivot_tolerance) {
            Some(neg_evals) => {
                self.neg_evals = neg_evals;
                self.is_factored = true;
                SymSolverStatus::Success
            }
            None => SymSolverStatus::Singular,
        }
    }

    fn solve(&mut self, rhs: &mut [T], nrhs: usize) -> SymSolverStatus {
        let Some(factors) = self.factors.as_mut() else {
            return SymSolverStatus::FatalError;
        };
        let n = factors.dim();
        if !self.is_factored || rhs.len() != n * nrhs {
            return SymSolverStatus::FatalError;
        }
        if n == 0 {
            return SymSolverStatus::Success;
        }

        for x in rhs.chunks_exact_mut(n) {
            factors.solve(x);
        }

        if rhs.is_finite() {
            SymSolverStatus::Success
        } else {
            SymSolverStatus::FatalError
        }
    }

    fn number_of_neg_evals(&self) -> usize {
        self.neg_evals
    }

    fn increase_quality(&mut self) -> bool {
        if self.rook {
            return false;
        }
        self.rook = true;
        true
    }

    fn provides_inertia(&self) -> bool {
        true
    }

    fn provides_degeneracy_detection(&self) -> bool {
        true
    }

    fn determine_dependent_rows(
        &mut self,
        matrix: RectangularMatrix<'_, T>,
    ) -> Result<Vec<usize>, LinearSolverError> {
        let rows = matrix.to_dense_rows();
        if rows.iter().any(|row| !row.is_finite()) {
            return Err(LinearSolverError::Backend(SymSolverStatus::FatalError));
        }
        Ok(_dependent_rows(rows, self.degeneracy_tolerance))
    }
}

// Bunch-Kaufman factorization P A P^T = L D L^T of the full symmetric
// column major matrix W, following the LAPACK sytf2 pivot choice, or
// sytf2_rook when `rook` is set.  Returns the number of negative
// eigenvalues, or None on a zero pivot.
fn _bunch_kaufman<T: FloatT>(
    n: usize,
    W: &mut [T],
    L: &mut [T],
    perm: &mut [usize],
    blocks: &mut Vec<PivotBlock<T>>,
    threshold: T,
    rook: bool,
) -> Option<usize> {
    let idx = |i: usize, j: usize| i + j * n;
    let alpha = (T::one() + T::sqrt((17.).as_T())) / (8.).as_T();

    // largest off-diagonal entry of row r in the active columns k..n
    let rowmax = |W: &[T], k: usize, r: usize| {
        (k..n)
            .filter(|&j| j != r)
            .map(|j| (j, W[idx(r, j)].abs()))
            .fold((r, T::zero()), |acc, x| if x.1 > acc.1 { x } else { acc })
    };

    L.fill(T::zero());
    for i in 0..n {
        L[idx(i, i)] = T::one();
        perm[i] = i;
    }
    blocks.clear();

    let mut neg_evals = 0;
    let mut k = 0;

    while k < n {
        let absakk = W[idx(k, k)].abs();

        // largest off-diagonal entry in column k
        let (imax, colmax) = ((k + 1)..n)
            .map(|i| (i, W[idx(i, k)].abs()))
            .fold((k, T::zero()), |acc, x| if x.1 > acc.1 { x } else { acc });

        if !(T::max(absakk, colmax) > threshold) {
            return None;
        }

        // (kp, kstep, p): a 2x2 pivot moves row p to k and kp to k+1
        let (kp, kstep, p) = if absakk >= alpha * colmax {
            (k, 1, k)
        } else if !rook {
            // row imax includes the entry in column k,
            // so rowmax >= colmax > 0
            let (_, rmax) = rowmax(&*W, k, imax);

            if absakk >= alpha * colmax * (colmax / rmax) {
                (k, 1, k)
            } else if W[idx(imax, imax)].abs() >= alpha * rmax {
                (imax, 1, k)
            } else {
                (imax, 2, k)
            }
        } else {
            // the off-diagonal maximum grows strictly on every pass
            let (mut p, mut imax, mut colmax) = (k, imax, colmax);
            loop {
                let (jmax, rmax) = rowmax(&*W, k, imax);
                if W[idx(imax, imax)].abs() >= alpha * rmax {
                    break (imax, 1, k);
                }
                if p == jmax || rmax <= colmax {
                    break (imax, 2, p);
                }
                p = imax;
                colmax = rmax;
                imax = jmax;
            }
        };

        if kstep == 2 && p != k {
            _symmetric_swap(n, W, L, perm, k, k, p);
        }
        let kk = k + kstep - 1;
        if kp != kk {
            _symmetric_swap(n, W, L, perm, k, kk, kp);
        }

        if kstep == 1 {
            let d = W[idx(k, k)];
            if !(d.abs() > threshold) {
                return None;
            }
            for i in (k + 1)..n {
                L[idx(i, k)] = W[idx(i, k)] / d;
            }
            for j in (k + 1)..n {
                let wjk = W[idx(j, k)];
                for i in (k + 1)..n {
                    W[idx(i, j)] -= L[idx(i, k)] * wjk;
                }
            }
            if d < T::zero() {
                neg_evals += 1;
            }
            blocks.push(PivotBlock::One(d));
        } else {
            let (a, b, c) = (W[idx(k, k)], W[idx(k + 1, k)], W[idx(k + 1, k + 1)]);
            let det = a * c - b * b;
            if !(det.abs() > threshold * b.abs()) {
                return None;
            }
            for i in (k + 2)..n {
                let (wk, wk1) = (W[idx(i, k)], W[idx(i, k + 1)]);
                L[idx(i, k)] = (wk * c - wk1 * b) / det;
                L[idx(i, k + 1)] = (wk1 * a - wk * b) / det;
            }
            for j in (k + 2)..n {
                let (wjk, wjk1) = (W[idx(j, k)], W[idx(j, k + 1)]);
                for i in (k + 2)..n {
                    W[idx(i, j)] -= L[idx(i, k)] * wjk + L[idx(i, k + 1)] * wjk1;
                }
            }
            // a 2x2 block with negative determinant has one eigenvalue
            // of each sign, otherwise both share the sign of the trace
            if det < T::zero() {
                neg_evals += 1;
            } else if a + c < T::zero() {
                neg_evals += 2;
            }
            blocks.push(PivotBlock::Two(a, b, c));
        }

        k += kstep;
    }

    Some(neg_evals)
}

// interchange rows and columns p and q of W, the rows of the
// already computed columns 0..k of L, and the permutation
fn _symmetric_swap<T: FloatT>(
    n: usize,
    W: &mut [T],
    L: &mut [T],
    perm: &mut [usize],
    k: usize,
    p: usize,
    q: usize,
) {
    let idx = |i: usize, j: usize| i + j * n;
    for j in 0..n {
        W.swap(idx(p, j), idx(q, j));
    }
    for i in 0..n {
        W.swap(idx(i, p), idx(i, q));
    }
    for j in 0..k {
        L.swap(idx(p, j), idx(q, j));
    }
    perm.swap(p, q);
}

// Solves A x = b in place from the factors of P A P^T
fn _solve<T: FloatT>(
    n: usize,
    L: &[T],
    blocks: &[PivotBlock<T>],
    perm: &[usize],
    y: &mut [T],
    x: &mut [T],
) {
    let idx = |i: usize, j: usize| i + j * n;

    for (yi, &p) in y.iter_mut().zip(perm) {
        *yi = x[p];
    }

    // L \ y
    for j in 0..n {
        let yj = y[j];
        for i in (j + 1)..n {
            y[i] -= L[idx(i, j)] * yj;
        }
    }

    // D \ y
    let mut k = 0;
    for block in blocks {
        match *block {
            PivotBlock::One(d) => {
                y[k] /= d;
                k += 1;
            }
            PivotBlock::Two(a, b, c) => {
                let det = a * c - b * b;
                let (y0, y1) = (y[k], y[k + 1]);
                y[k] = (c * y0 - b * y1) / det;
                y[k + 1] = (a * y1 - b * y0) / det;
                k += 2;
            }
        }
    }

    // L^T \ y
    for j in (0..n).rev() {
        let mut s = T::zero();
        for i in (j + 1)..n {
            s += L[idx(i, j)] * y[i];
        }
        y[j] -= s;
    }

    for (&yi, &p) in y.iter().zip(perm) {
        x[p] = yi;
    }
}

// Rows in increasing index order.  A row is dependent if it is zero, or
// if its part orthogonal to the previously accepted rows is at most
// `tol` times its norm.  The earlier of two dependent rows is kept.
fn _dependent_rows<T: FloatT>(rows: Vec<Vec<T>>, tol: T) -> Vec<usize> {
    let mut basis: Vec<Vec<T>> = vec![];
    let mut dependent = vec![];

    for (i, mut v) in rows.into_iter().enumerate() {
        let norm0 = v.norm();
        if norm0 == T::zero() {
            dependent.push(i);
            continue;
        }

        // modified Gram-Schmidt, twice for numerical orthogonality
        for _ in 0..2 {
            for q in &basis {
                let c = q.dot(&v);
                v.axpby(-c, q, T::one());
            }
        }

        let r = v.norm();
        if r <= tol * norm0 {
            dependent.push(i);
        } else {
            v.scale(r.recip());
            basis.push(v);
        }
    }
    dependent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_factor(A: &SymTripletMatrix<f64>) -> (DenseLdlBackend<f64>, SymSolverStatus) {
        let mut backend = DenseLdlBackend::new(&LinearSolverSettings::default());
        let status = backend.initialize_structure(SparsityPattern::Triplet {
            dim: A.dim(),
            irow: A.rowval(),
            jcol: A.colval(),
        });
        assert_eq!(status, SymSolverStatus::Success);
        let status = backend.factorize(A.values());
        (backend, status)
    }

    fn residual(A: &SymTripletMatrix<f64>, x: &[f64], b: &[f64]) -> f64 {
        let mut r = b.to_vec();
        A.symv(&mut r, x, 1.0, -1.0);
        r.norm_inf()
    }

    #[test]
    fn test_dense_2x2_pivot() {
        // A = [0 1; 1 0] needs a 2x2 pivot
        let A = SymTripletMatrix::new(2, vec![1], vec![0], vec![1.]).unwrap();
        let (mut backend, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Success);
        assert_eq!(backend.number_of_neg_evals(), 1);
        assert_eq!(backend.factors.as_ref().unwrap().blocks.len(), 1);

        let mut x = vec![2., 3.];
        assert_eq!(backend.solve(&mut x, 1), SymSolverStatus::Success);
        assert_eq!(x, vec![3., 2.]);
    }

    #[test]
    fn test_dense_indefinite() {
        // A =
        //[ 4.0  1.0  ⋅ ]
        //[ 1.0 -3.0 2.0]
        //[  ⋅   2.0 5.0]
        let A = SymTripletMatrix::from_dense_lower(&[[4., 0., 0.], [1., -3., 0.], [0., 2., 5.]]);
        let (mut backend, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Success);
        assert_eq!(backend.number_of_neg_evals(), 1);

        let b = [1., 2., 3.];
        let mut x = b.to_vec();
        assert_eq!(backend.solve(&mut x, 1), SymSolverStatus::Success);
        assert!(residual(&A, &x, &b) <= 1e-12);
    }

    #[test]
    fn test_dense_pivoting() {
        // small diagonal entries force interchanges
        // A =
        //[ 1e-3  2.0   1.0   ⋅  ]
        //[ 2.0   1e-3  ⋅    3.0 ]
        //[ 1.0    ⋅   -2.0  1.0 ]
        //[  ⋅    3.0   1.0  1e-2]
        let A = SymTripletMatrix::from_dense_lower(&[
            [1e-3, 0., 0., 0.],
            [2., 1e-3, 0., 0.],
            [1., 0., -2., 0.],
            [0., 3., 1., 1e-2],
        ]);
        let (mut backend, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Success);

        let b = [1., -1., 2., 0.5];
        let mut x = b.to_vec();
        assert_eq!(backend.solve(&mut x, 1), SymSolverStatus::Success);
        assert!(residual(&A, &x, &b) <= 1e-10);
    }

    #[test]
    fn test_dense_negative_definite() {
        // two negative eigenvalues in a single 2x2 block is not
        // possible under the pivot rule, so check diagonal pivots
        let A = SymTripletMatrix::from_dense_lower(&[[-2., 0.], [1., -3.]]);
        let (backend, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Success);
        assert_eq!(backend.number_of_neg_evals(), 2);
    }

    #[test]
    fn test_dense_singular() {
        let A = SymTripletMatrix::from_dense_lower(&[[1., 0.], [1., 1.]]);
        let (mut backend, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Singular);
        let mut x = vec![1., 1.];
        assert_eq!(backend.solve(&mut x, 1), SymSolverStatus::FatalError);

        // structurally zero row
        let A = SymTripletMatrix::new(2, vec![0], vec![0], vec![1.]).unwrap();
        let (_, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Singular);
    }

    #[test]
    fn test_dense_rook_pivoting() {
        // the rook search passes over rows 1 and 2 before
        // settling on the 2x2 pivot in rows 2 and 3
        // A =
        //[ 0.0  1.0   ⋅   0.5]
        //[ 1.0   ⋅   5.0   ⋅ ]
        //[  ⋅   5.0   ⋅   7.0]
        //[ 0.5   ⋅   7.0  0.1]
        let A = SymTripletMatrix::from_dense_lower(&[
            [0., 0., 0., 0.],
            [1., 0., 0., 0.],
            [0., 5., 0., 0.],
            [0.5, 0., 7., 0.1],
        ]);
        let b = [1., 2., 3., 4.];

        let (mut backend, status) = dense_factor(&A);
        assert_eq!(status, SymSolverStatus::Success);
        assert!(!backend.uses_rook_pivoting());
        let mut x = b.to_vec();
        assert_eq!(backend.solve(&mut x, 1), SymSolverStatus::Success);
        assert!(residual(&A, &x, &b) <= 1e-12);

        // one quality increase is available
        assert!(backend.increase_quality());
        assert!(!backend.increase_quality());
        assert!(backend.uses_rook_pivoting());

        assert_eq!(backend.factorize(A.values()), SymSolverStatus::Success);
        assert_eq!(backend.number_of_neg_evals(), 2);
        assert_eq!(backend.factors.as_ref().unwrap().perm, vec![2, 3, 0, 1]);
        let mut y = b.to_vec();
        assert_eq!(backend.solve(&mut y, 1), SymSolverStatus::Success);
        assert!(residual(&A, &y, &b) <= 1e-12);
        assert!(x.norm_inf_diff(&y) <= 1e-12);
    }

    #[test]
    fn test_dense_singular_with_rook() {
        let A = SymTripletMatrix::from_dense_lower(&[[1., 0.], [1., 1.]]);
        let (mut backend, _) = dense_factor(&A);
        assert!(backend.increase_quality());
        assert_eq!(backend.factorize(A.values()), SymSolverStatus::Singular);
    }

    #[test]
    fn test_dependent_rows() {
        // row 2 = 2 * row 0, row 4 = row 1 + row 3, row 5 = 0
        let rows = vec![
            vec![1., 2., 0., 1.],
            vec![0., 1., 1., 0.],
            vec![2., 4., 0., 2.],
            vec![1., 0., 0., 3.],
            vec![1., 1., 1., 3.],
            vec![0., 0., 0., 0.],
        ];
        assert_eq!(_dependent_rows(rows, 1e-10), vec![2, 4, 5]);

        // identical rows, lowest index is kept
        let rows = vec![vec![1., 1.], vec![1., 1.]];
        assert_eq!(_dependent_rows(rows, 1e-10), vec![1]);
    }

    #[test]
    fn test_dependent_rows_from_csc() {
        let mut backend = DenseLdlBackend::<f64>::new(&LinearSolverSettings::default());
        assert!(backend.provides_degeneracy_detection());

        // 3 x 2 with row 1 = -row 0
        let J = TripletMatrix::new(3, 2, vec![0, 0, 1, 1, 2], vec![0, 1, 0, 1, 1], vec![1., 2., -1., -2., 5.]);
        let csc = J.to_csc();
        let rows = backend
            .determine_dependent_rows(RectangularMatrix::Csc(&csc))
            .unwrap();
        assert_eq!(rows, vec![1]);
        let rows = backend
            .determine_dependent_rows(RectangularMatrix::Triplet(&J))
            .unwrap();
        assert_eq!(rows, vec![1]);
    }
}
