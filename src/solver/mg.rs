//! Stationary multigrid iteration: repeated V-cycles on the true residual.

use tracing::{info, warn};

use crate::config::SolveOptions;
use crate::core::traits::InnerProduct;
use crate::preconditioner::amg::BsrAmg;
use crate::utils::convergence::{Convergence, SolveStats, on_monitor_stride};

pub struct MgSolver {
    pub conv: Convergence<f64>,
    /// Progress reporting stride; 0 is silent.
    pub monitor: usize,
    pub residual_history: Vec<f64>,
}

impl MgSolver {
    pub fn new(rtol: f64, atol: f64, max_iters: usize) -> Self {
        Self { conv: Convergence::new(rtol, atol, max_iters), monitor: 0, residual_history: Vec::new() }
    }

    pub fn from_options(opts: &SolveOptions) -> Self {
        Self::new(opts.rtol, opts.atol, opts.max_iters).with_monitor(opts.monitor)
    }

    pub fn with_monitor(mut self, stride: usize) -> Self {
        self.monitor = stride;
        self
    }

    /// Cycle from `x = 0` until `‖b − A x‖` meets the tolerance or the iteration cap is reached.
    ///
    /// On failure `x` holds the iterate with the smallest residual norm.
    pub fn solve(&mut self, amg: &mut BsrAmg, b: &[f64], x: &mut [f64]) -> SolveStats<f64> {
        assert_eq!(b.len(), amg.operator().nrows(), "right-hand side has incorrect length");
        assert_eq!(x.len(), b.len(), "solution has incorrect length");
        let ip = ();

        x.fill(0.0);
        let mut r = b.to_vec();
        let init_norm = ip.norm(&r);
        let mut best = x.to_vec();
        let mut best_norm = init_norm;
        self.residual_history.clear();
        self.residual_history.push(init_norm);
        if self.monitor > 0 {
            info!(iteration = 0, residual = init_norm, "MG |A x - b|");
        }

        let mut stats = SolveStats { iterations: 0, final_residual: init_norm, converged: false };
        for iter in 1..=self.conv.max_iters {
            amg.cycle(b, x);

            r.copy_from_slice(b);
            amg.operator().matvec_sub(x, &mut r);
            let res_norm = ip.norm(&r);
            self.residual_history.push(res_norm);
            if res_norm < best_norm {
                best_norm = res_norm;
                best.copy_from_slice(x);
            }

            let on_stride = on_monitor_stride(self.monitor, iter);
            if on_stride {
                info!(iteration = iter, residual = res_norm, "MG |A x - b|");
            }
            let (stop, s) = self.conv.check(res_norm, init_norm, iter);
            stats = s;
            if stats.converged && self.monitor > 0 && !on_stride {
                info!(iteration = iter, residual = res_norm, "MG |A x - b|");
            }
            if stop {
                break;
            }
        }
        if !stats.converged {
            if best_norm < stats.final_residual {
                x.copy_from_slice(&best);
                stats.final_residual = best_norm;
            }
            warn!(iterations = stats.iterations, residual = stats.final_residual, "MG did not converge");
        }
        stats
    }
}
