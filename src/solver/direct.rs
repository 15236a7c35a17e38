//! Direct factorization of the coarsest operator using Faer.
//!
//! Two paths are provided, chosen from the operator's size and density:
//! - large sparse operators use Faer's supernodal sparse LLᵀ, whose symbolic analysis applies an
//!   approximate minimum degree fill-reducing ordering;
//! - small or dense operators are copied into a dense matrix and factored by LU with partial
//!   pivoting in their natural order.
//!
//! The symbolic analysis is cached so that [`DirectFactor::refactor`] only repeats the numeric
//! phase when the values of the operator change but its pattern does not.
//!
//! # References
//! - Faer documentation: https://github.com/sarah-ek/faer-rs
//! - Davis, Direct Methods for Sparse Linear Systems

use crate::error::KError;
use crate::matrix::BsrMatrix;
use faer::linalg::solvers::{PartialPivLu, Solve, SolveCore};
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::{Conj, Mat, MatMut, Side};

/// Block rows from which reordering is considered worthwhile.
const REORDER_MIN_ROWS: usize = 20;
/// Maximum block density (nnz / n²) for the sparse path.
const REORDER_MAX_DENSITY: f64 = 0.25;

pub enum DirectFactor {
    /// Sparse LLᵀ with an AMD ordering.
    Sparse {
        symbolic: SymbolicLlt<usize>,
        llt: Llt<usize, f64>,
    },
    /// Dense LU with partial pivoting, natural ordering.
    Dense(PartialPivLu<f64>),
}

/// Dense LU of `a`, rejecting non-finite entries and zero or non-finite pivots.
fn dense_lu(a: &BsrMatrix) -> Result<PartialPivLu<f64>, KError> {
    if let Some(v) = a.values().iter().find(|v| !v.is_finite()) {
        return Err(KError::FactorError(format!("operator has a non-finite entry {v}")));
    }
    let lu = PartialPivLu::new(a.to_dense().as_ref());
    let u = lu.U();
    for i in 0..u.nrows() {
        let pivot = u[(i, i)];
        if pivot == 0.0 || !pivot.is_finite() {
            return Err(KError::FactorError(format!("LU pivot {i} is {pivot:e}")));
        }
    }
    Ok(lu)
}

impl DirectFactor {
    /// Whether `a` is large and sparse enough to warrant a reordered sparse factorization.
    pub fn prefers_reordering(a: &BsrMatrix) -> bool {
        let n = a.nbrows();
        n >= REORDER_MIN_ROWS && (a.nnz() as f64) < REORDER_MAX_DENSITY * (n * n) as f64
    }

    /// Symbolic then numeric factorization of `a`.
    pub fn new(a: &BsrMatrix) -> Result<Self, KError> {
        if a.nrows() != a.ncols() {
            return Err(KError::DimensionMismatch(format!(
                "cannot factor a {}x{} operator",
                a.nrows(),
                a.ncols()
            )));
        }
        if Self::prefers_reordering(a) {
            let csc = a.to_csc()?;
            let symbolic = SymbolicLlt::try_new(csc.symbolic().as_ref(), Side::Upper)
                .map_err(|e| KError::FactorError(format!("symbolic analysis failed: {e:?}")))?;
            let llt = Llt::try_new_with_symbolic(symbolic.clone(), csc.as_ref(), Side::Upper)
                .map_err(|e| KError::FactorError(format!("Cholesky factorization failed: {e:?}")))?;
            Ok(DirectFactor::Sparse { symbolic, llt })
        } else {
            Ok(DirectFactor::Dense(dense_lu(a)?))
        }
    }

    /// Numeric refactorization after the values of `a` changed; the pattern must be unchanged.
    pub fn refactor(&mut self, a: &BsrMatrix) -> Result<(), KError> {
        match self {
            DirectFactor::Sparse { symbolic, llt } => {
                let csc = a.to_csc()?;
                *llt = Llt::try_new_with_symbolic(symbolic.clone(), csc.as_ref(), Side::Upper)
                    .map_err(|e| KError::FactorError(format!("Cholesky factorization failed: {e:?}")))?;
            }
            DirectFactor::Dense(lu) => {
                *lu = dense_lu(a)?;
            }
        }
        Ok(())
    }

    /// Short name of the factorization path, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DirectFactor::Sparse { .. } => "sparse-llt-amd",
            DirectFactor::Dense(_) => "dense-lu",
        }
    }

    /// x = A⁻¹ b
    pub fn solve(&self, b: &[f64], x: &mut [f64]) {
        assert_eq!(b.len(), x.len(), "right-hand side and solution lengths differ");
        let n = b.len();
        match self {
            DirectFactor::Sparse { llt, .. } => {
                let rhs = Mat::<f64>::from_fn(n, 1, |i, _| b[i]);
                let sol = llt.solve(&rhs);
                for (i, xi) in x.iter_mut().enumerate() {
                    *xi = sol[(i, 0)];
                }
            }
            DirectFactor::Dense(lu) => {
                x.copy_from_slice(b);
                let x_mat = MatMut::from_column_major_slice_mut(x, n, 1);
                lu.solve_in_place_with_conj(Conj::No, x_mat);
            }
        }
    }
}
