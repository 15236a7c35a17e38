//! Smoothed-aggregation algebraic multigrid over block-sparse operators.
//!
//! A [`BsrAmg`] is a chain of [`Level`]s from the fine operator to a coarsest level that is
//! factored directly. Every interior level carries
//! - a block SSOR smoother and its inverse block diagonal,
//! - the smoothed prolongation `P` and restriction `Pᵀ` to the next level,
//! - scratch vectors for the coarse correction,
//!
//! and the next level's operator is the Galerkin product `Pᵀ A P`. The fine block width is kept
//! only at level 0; every coarser level has blocks of the near-null-space dimension.
//!
//! The hierarchy reuses its scratch vectors across solves and is therefore not reentrant.
//!
//! # Example
//! ```rust
//! use bsr_amg::{AmgOptions, BsrAmg, BsrMatrix, NullSpace, SolveOptions};
//!
//! // 1-D Laplacian on 30 nodes
//! let n = 30;
//! let mut entries = Vec::new();
//! for i in 0..n {
//!     entries.push((i, i, vec![2.0]));
//!     if i > 0 { entries.push((i, i - 1, vec![-1.0])); }
//!     if i + 1 < n { entries.push((i, i + 1, vec![-1.0])); }
//! }
//! let a = BsrMatrix::from_block_entries(n, n, 1, 1, &entries).unwrap();
//! let mut amg = BsrAmg::with_options(a, NullSpace::constant(n, 1), AmgOptions::new(2, 2.0 / 3.0, 0.0)).unwrap();
//! let b = vec![1.0; n];
//! let mut x = vec![0.0; n];
//! assert!(amg.solve_mg(&b, &mut x, &SolveOptions::default()));
//! ```

pub mod aggregation;
mod cycle;
pub mod nullspace;
pub mod smoothing;
pub mod strength;
pub mod tentative;

pub use cycle::VCycle;
pub use nullspace::NullSpace;

use rand::Rng;
use tracing::{debug, info};

use crate::config::{AmgOptions, SolveOptions};
use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::matrix::BsrMatrix;
use crate::preconditioner::FlexiblePreconditioner;
use crate::preconditioner::sor::{BlockSor, MatSorType};
use crate::solver::LinearSolver;
use crate::solver::direct::DirectFactor;
use crate::solver::mg::MgSolver;
use crate::solver::pcg::PcgSolver;
use aggregation::{Aggregates, standard_aggregation};
use cycle::{LevelWork, cycle};
use smoothing::jacobi_prolongation_smoother;
use strength::strength_of_connection;
use tentative::tentative_prolongation;

/// Grid transfer and smoothing data of an interior level.
pub(crate) struct Transfer {
    pub(crate) p: BsrMatrix,
    pub(crate) pt: BsrMatrix,
    pub(crate) smoother: BlockSor,
    pub(crate) rho: f64,
    pub(crate) aggregates: Aggregates,
    pub(crate) rank_deficient: Vec<usize>,
}

pub(crate) enum LevelKind {
    Interior(Transfer),
    Terminal(DirectFactor),
}

/// One level of the hierarchy.
pub struct Level {
    index: usize,
    a: BsrMatrix,
    basis: NullSpace,
    kind: LevelKind,
}

impl Level {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn operator(&self) -> &BsrMatrix {
        &self.a
    }

    /// Near-null-space basis this level was coarsened with.
    pub fn basis(&self) -> &NullSpace {
        &self.basis
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, LevelKind::Terminal(_))
    }

    fn transfer(&self) -> Option<&Transfer> {
        match &self.kind {
            LevelKind::Interior(t) => Some(t),
            LevelKind::Terminal(_) => None,
        }
    }

    /// Smoothed prolongation to this level from the next coarser one.
    pub fn prolongation(&self) -> Option<&BsrMatrix> {
        self.transfer().map(|t| &t.p)
    }

    pub fn restriction(&self) -> Option<&BsrMatrix> {
        self.transfer().map(|t| &t.pt)
    }

    pub fn aggregates(&self) -> Option<&Aggregates> {
        self.transfer().map(|t| &t.aggregates)
    }

    pub fn smoother(&self) -> Option<&BlockSor> {
        self.transfer().map(|t| &t.smoother)
    }

    /// Estimate of ρ(D⁻¹A) used to damp the prolongation.
    pub fn spectral_radius(&self) -> Option<f64> {
        self.transfer().map(|t| t.rho)
    }

    /// Aggregates whose tentative basis lost a dependent column.
    pub fn rank_deficient(&self) -> &[usize] {
        self.transfer().map(|t| t.rank_deficient.as_slice()).unwrap_or(&[])
    }

    pub fn factor(&self) -> Option<&DirectFactor> {
        match &self.kind {
            LevelKind::Terminal(f) => Some(f),
            LevelKind::Interior(_) => None,
        }
    }
}

/// Galerkin consistency of one interior level: `‖Pᵀ A P x − A_c x‖` for a random `x`.
#[derive(Clone, Debug, PartialEq)]
pub struct GalerkinCheck {
    pub level: usize,
    pub abs_error: f64,
    pub rel_error: f64,
}

/// Smoothed-aggregation multigrid hierarchy.
pub struct BsrAmg {
    levels: Vec<Level>,
    work: Vec<LevelWork>,
    options: AmgOptions,
}

impl BsrAmg {
    /// Build a hierarchy of `num_levels` levels with prolongation damping `omega` and
    /// strength-of-connection tolerance `epsilon` (0 disables filtering).
    pub fn new(
        num_levels: usize,
        omega: f64,
        epsilon: f64,
        a: BsrMatrix,
        basis: NullSpace,
    ) -> Result<Self, KError> {
        Self::with_options(a, basis, AmgOptions::new(num_levels, omega, epsilon))
    }

    pub fn with_options(a: BsrMatrix, basis: NullSpace, options: AmgOptions) -> Result<Self, KError> {
        Self::validate(&a, &basis, &options)?;

        let mut levels = Vec::with_capacity(options.num_levels);
        let mut work = Vec::with_capacity(options.num_levels - 1);
        let (mut a, mut basis) = (a, basis);
        while levels.len() + 1 < options.num_levels {
            let index = levels.len();
            let (transfer, ar, coarse_basis) = Self::coarsen(&a, &basis, &options)?;
            if index == 0 {
                info!("{:>6}{:>12}{:>12}{:>12}{:>12}", "level", "n(A)", "nnz(A)", "nnz(P)", "rho");
            }
            info!(
                "{index:>6}{:>12}{:>12}{:>12}{:>12.5}",
                a.nbrows(),
                a.nnz(),
                transfer.p.nnz(),
                transfer.rho
            );
            work.push(LevelWork::new(a.nrows(), ar.nrows()));
            levels.push(Level { index, a, basis, kind: LevelKind::Interior(transfer) });
            a = ar;
            basis = coarse_basis;
        }

        let index = levels.len();
        let factor = DirectFactor::new(&a)?;
        info!("{index:>6}{:>12}{:>12}  {}", a.nbrows(), a.nnz(), factor.kind());
        levels.push(Level { index, a, basis, kind: LevelKind::Terminal(factor) });

        Ok(Self { levels, work, options })
    }

    fn validate(a: &BsrMatrix, basis: &NullSpace, options: &AmgOptions) -> Result<(), KError> {
        if options.num_levels == 0 {
            return Err(KError::InvalidArgument("a hierarchy needs at least one level".into()));
        }
        if a.nbrows() != a.nbcols() || a.row_block() != a.col_block() {
            return Err(KError::InvalidArgument(format!(
                "operator must be square, got {}x{} blocks of {}x{}",
                a.nbrows(),
                a.nbcols(),
                a.row_block(),
                a.col_block()
            )));
        }
        if a.nbrows() == 0 {
            return Err(KError::InvalidArgument("operator has no rows".into()));
        }
        if basis.nrows() != a.nbrows() || basis.width() != a.row_block() {
            return Err(KError::InvalidArgument(format!(
                "basis has {} rows of width {}, operator {} rows of width {}",
                basis.nrows(),
                basis.width(),
                a.nbrows(),
                a.row_block()
            )));
        }
        Ok(())
    }

    /// Aggregate, build and smooth the prolongation, and form the Galerkin operator.
    fn coarsen(
        a: &BsrMatrix,
        basis: &NullSpace,
        options: &AmgOptions,
    ) -> Result<(Transfer, BsrMatrix, NullSpace), KError> {
        let mut smoother = BlockSor::new(options.smoother_omega, 1, MatSorType::SYMMETRIC_SWEEP)
            .with_multicolor(options.multicolor);
        let dinv = smoother.setup(a)?;

        let aggregates = if options.epsilon != 0.0 {
            let (rowp, cols) = strength_of_connection(options.epsilon, a);
            standard_aggregation(&rowp, &cols)
        } else {
            standard_aggregation(a.rowp(), a.cols())
        };
        debug!(rows = a.nbrows(), aggregates = aggregates.count(), "aggregation");

        let tentative = tentative_prolongation(&aggregates, basis, options.orthogonality_tol)?;
        let (p, rho) =
            jacobi_prolongation_smoother(options.omega, a, dinv, &tentative.p, options.spectral_estimate)?;
        let pt = p.transpose();

        let mut ap = BsrMatrix::matmul_symbolic(a, &p)?;
        BsrMatrix::matmul_numeric(a, &p, &mut ap)?;
        let mut ar = BsrMatrix::matmul_symbolic(&pt, &ap)?;
        BsrMatrix::matmul_numeric(&pt, &ap, &mut ar)?;

        let transfer = Transfer {
            p,
            pt,
            smoother,
            rho,
            aggregates,
            rank_deficient: tentative.rank_deficient,
        };
        Ok((transfer, ar, tentative.coarse_basis))
    }

    /// Recompute the numeric values of every level after the fine operator's values changed.
    ///
    /// Aggregates, prolongations and sparsity patterns are kept; each interior level refreshes its
    /// inverse block diagonal and its Galerkin product, and the terminal level is refactored.
    pub fn update(&mut self) -> Result<(), KError> {
        for index in 0..self.levels.len() {
            let (head, tail) = self.levels.split_at_mut(index + 1);
            let level = &mut head[index];
            match &mut level.kind {
                LevelKind::Terminal(factor) => factor.refactor(&level.a)?,
                LevelKind::Interior(transfer) => {
                    transfer.smoother.refresh_diagonal(&level.a)?;
                    let mut ap = BsrMatrix::matmul_symbolic(&level.a, &transfer.p)?;
                    BsrMatrix::matmul_numeric(&level.a, &transfer.p, &mut ap)?;
                    BsrMatrix::matmul_numeric(&transfer.pt, &ap, &mut tail[0].a)?;
                }
            }
        }
        debug!(levels = self.levels.len(), "hierarchy updated");
        Ok(())
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn options(&self) -> &AmgOptions {
        &self.options
    }

    /// The fine operator.
    pub fn operator(&self) -> &BsrMatrix {
        &self.levels[0].a
    }

    /// Mutable access to the fine operator's values; call [`Self::update`] afterwards.
    pub fn operator_mut(&mut self) -> &mut BsrMatrix {
        &mut self.levels[0].a
    }

    /// Split into the fine operator and a V-cycle preconditioner over this hierarchy.
    pub fn v_cycle(&mut self) -> VCycle<'_> {
        VCycle { levels: &self.levels, work: &mut self.work }
    }

    /// One V-cycle for `A x = b` starting from the current `x`.
    pub fn cycle(&mut self, b: &[f64], x: &mut [f64]) {
        assert_eq!(b.len(), self.operator().nrows(), "right-hand side has incorrect length");
        assert_eq!(x.len(), b.len(), "solution has incorrect length");
        cycle(&self.levels, &mut self.work, b, x, false);
    }

    /// Stationary multigrid iteration from `x = 0`. Returns whether the tolerance was met.
    pub fn solve_mg(&mut self, b: &[f64], x: &mut [f64], options: &SolveOptions) -> bool {
        MgSolver::from_options(options).solve(self, b, x).converged
    }

    /// Conjugate gradient on `mat_vec` preconditioned by one V-cycle per iteration.
    ///
    /// `mat_vec` need not be the fine operator itself, for instance a matrix-free product of the
    /// exact Jacobian while the hierarchy holds an approximation.
    pub fn solve_pcg<M>(
        &mut self,
        mat_vec: &M,
        b: &Vec<f64>,
        x: &mut Vec<f64>,
        options: &SolveOptions,
    ) -> Result<bool, KError>
    where
        M: MatVec<Vec<f64>> + ?Sized,
    {
        let mut pc = self.v_cycle();
        let stats = PcgSolver::from_options(options).solve(mat_vec, Some(&mut pc), b, x)?;
        Ok(stats.converged)
    }

    /// [`Self::solve_pcg`] with the fine operator as the Krylov operator.
    pub fn solve_pcg_fine(
        &mut self,
        b: &Vec<f64>,
        x: &mut Vec<f64>,
        options: &SolveOptions,
    ) -> Result<bool, KError> {
        let mut pc = VCycle { levels: &self.levels, work: &mut self.work };
        let stats = PcgSolver::from_options(options).solve(&self.levels[0].a, Some(&mut pc), b, x)?;
        Ok(stats.converged)
    }

    /// Compare `A_c x` against `Pᵀ A P x` for a random coarse `x` at every interior level.
    pub fn check_galerkin_consistency(&self) -> Vec<GalerkinCheck> {
        let mut rng = rand::thread_rng();
        let ip = ();
        let mut checks = Vec::with_capacity(self.work.len());
        for pair in self.levels.windows(2) {
            let (fine, coarse) = (&pair[0], &pair[1]);
            let Some(transfer) = fine.transfer() else {
                continue;
            };
            let xr: Vec<f64> = (0..coarse.a.nrows()).map(|_| rng.gen_range(-1.0..1.0)).collect();

            let mut x0 = vec![0.0; fine.a.nrows()];
            let mut y0 = vec![0.0; fine.a.nrows()];
            let mut yr1 = vec![0.0; coarse.a.nrows()];
            let mut yr2 = vec![0.0; coarse.a.nrows()];
            transfer.p.matvec(&xr, &mut x0);
            fine.a.matvec(&x0, &mut y0);
            transfer.pt.matvec(&y0, &mut yr1);
            coarse.a.matvec(&xr, &mut yr2);

            let reference = ip.norm(&yr2);
            yr1.iter_mut().zip(&yr2).for_each(|(y1, y2)| *y1 -= y2);
            let abs_error = ip.norm(&yr1);
            let rel_error = if reference > 0.0 { abs_error / reference } else { abs_error };
            info!(level = fine.index, abs_error, rel_error, "Galerkin operator check");
            checks.push(GalerkinCheck { level: fine.index, abs_error, rel_error });
        }
        checks
    }
}

impl FlexiblePreconditioner<Vec<f64>> for BsrAmg {
    /// One V-cycle from a zero initial guess.
    fn apply(&mut self, r: &Vec<f64>, z: &mut Vec<f64>) -> Result<(), KError> {
        self.v_cycle().apply(r, z)
    }
}
