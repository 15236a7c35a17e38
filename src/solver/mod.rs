//! Krylov, stationary multigrid and direct solver interfaces.

use crate::preconditioner::FlexiblePreconditioner;
use crate::utils::convergence::SolveStats;

/// Common interface for iterative solvers driven by an operator and an optional preconditioner.
pub trait LinearSolver<M: ?Sized, V> {
    type Error;
    type Scalar;
    /// Solve A·x = b, writing result into `x`.
    /// Returns iteration stats (including convergence info).
    fn solve(
        &mut self,
        a: &M,
        pc: Option<&mut dyn FlexiblePreconditioner<V>>,
        b: &V,
        x: &mut V,
    ) -> Result<SolveStats<Self::Scalar>, Self::Error>;
}

pub mod direct;
pub use direct::DirectFactor;

pub mod mg;
pub use mg::MgSolver;

pub mod pcg;
pub use pcg::PcgSolver;
