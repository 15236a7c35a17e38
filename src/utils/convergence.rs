//! Convergence tracking & tolerance checks for iterative solvers.

/// Stopping criteria: absolute and relative residual tolerances plus a hard iteration cap.
#[derive(Clone, Debug)]
pub struct Convergence<T> {
    pub rtol: T,
    pub atol: T,
    pub max_iters: usize,
}

#[derive(Clone, Debug)]
pub struct SolveStats<T> {
    pub iterations: usize,
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    pub fn new(rtol: T, atol: T, max_iters: usize) -> Self {
        Self { rtol, atol, max_iters }
    }

    /// True once `res_norm` is below `atol` or below `rtol` times the initial residual.
    pub fn is_converged(&self, res_norm: T, res0_norm: T) -> bool {
        res_norm.abs() < self.atol || res_norm.abs() < self.rtol * res0_norm.abs()
    }

    /// Returns (should_stop, stats) given current `res_norm` after iteration `i`.
    pub fn check(&self, res_norm: T, res0_norm: T, i: usize) -> (bool, SolveStats<T>) {
        let converged = self.is_converged(res_norm, res0_norm);
        (
            converged || i >= self.max_iters,
            SolveStats {
                iterations: i,
                final_residual: res_norm,
                converged,
            },
        )
    }
}

/// Whether iteration `iter` (1-based) falls on the progress-reporting cadence.
pub fn on_monitor_stride(monitor: usize, iter: usize) -> bool {
    monitor > 0 && iter % monitor == 0
}
