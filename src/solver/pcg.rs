//! Inexact preconditioned conjugate gradient.
//!
//! Golub & Ye, "Inexact Preconditioned Conjugate Gradient Method with Inner-Outer Iteration".
//! The update coefficient is taken as `β = (r', z' − z) / (r, z)`, which stays robust when the
//! preconditioner varies between iterations (a multigrid cycle with nonsymmetric rounding, or an
//! inner iterative solve). Every `restart` iterations the residual is recomputed as `b − A x`
//! and the search direction restarts from the preconditioned residual.

use std::fmt::Debug;

use num_traits::Float;
use tracing::{info, warn};

use crate::config::SolveOptions;
use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::preconditioner::FlexiblePreconditioner;
use crate::solver::LinearSolver;
use crate::utils::convergence::{Convergence, SolveStats, on_monitor_stride};

pub struct PcgSolver<T> {
    pub conv: Convergence<T>,
    /// Iterations between true-residual recomputations.
    pub restart: usize,
    /// Progress reporting stride; 0 is silent.
    pub monitor: usize,
    pub residual_history: Vec<T>,
}

impl<T: Float> PcgSolver<T> {
    pub fn new(rtol: T, atol: T, max_iters: usize) -> Self {
        Self {
            conv: Convergence::new(rtol, atol, max_iters),
            restart: 100,
            monitor: 0,
            residual_history: Vec::new(),
        }
    }
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }
    pub fn with_monitor(mut self, stride: usize) -> Self {
        self.monitor = stride;
        self
    }
    pub fn clear_history(&mut self) {
        self.residual_history.clear();
    }
}

impl PcgSolver<f64> {
    pub fn from_options(opts: &SolveOptions) -> Self {
        Self::new(opts.rtol, opts.atol, opts.max_iters)
            .with_restart(opts.restart)
            .with_monitor(opts.monitor)
    }
}

fn precondition<T: Copy>(
    pc: &mut Option<&mut dyn FlexiblePreconditioner<Vec<T>>>,
    r: &Vec<T>,
    z: &mut Vec<T>,
) -> Result<(), KError> {
    match pc {
        Some(pc) => pc.apply(r, z),
        None => {
            z.copy_from_slice(r);
            Ok(())
        }
    }
}

impl<M, T> LinearSolver<M, Vec<T>> for PcgSolver<T>
where
    M: MatVec<Vec<T>> + ?Sized,
    T: Float + From<f64> + Send + Sync + Debug,
{
    type Error = KError;
    type Scalar = T;

    /// Solve from `x = 0`; the incoming contents of `x` are discarded.
    fn solve(
        &mut self,
        a: &M,
        mut pc: Option<&mut dyn FlexiblePreconditioner<Vec<T>>>,
        b: &Vec<T>,
        x: &mut Vec<T>,
    ) -> Result<SolveStats<T>, KError> {
        let n = b.len();
        assert_eq!(x.len(), n, "solution has incorrect length");
        let ip = ();
        let restart = self.restart.max(1);

        x.fill(T::zero());
        let mut r = b.clone();
        let mut z = vec![T::zero(); n];
        let mut p = vec![T::zero(); n];
        let mut work = vec![T::zero(); n];

        let init_norm = ip.norm(&r);
        self.residual_history.clear();
        self.residual_history.push(init_norm);
        if self.monitor > 0 {
            info!(iteration = 0, residual = ?init_norm, "PCG |A x - b|");
        }
        if init_norm.abs() < self.conv.atol {
            return Ok(SolveStats { iterations: 0, final_residual: init_norm, converged: true });
        }

        let mut stats = SolveStats { iterations: 0, final_residual: init_norm, converged: false };
        let mut iter = 0;
        let mut reset = 0;
        while iter < self.conv.max_iters {
            if reset > 0 {
                a.matvec(x, &mut work);
                for ((ri, bi), wi) in r.iter_mut().zip(b).zip(&work) {
                    *ri = *bi - *wi;
                }
            }
            reset += 1;

            precondition(&mut pc, &r, &mut z)?;
            p.copy_from_slice(&z);
            let mut rz = ip.dot(&r, &z);

            for _ in 0..restart {
                if iter >= self.conv.max_iters {
                    break;
                }
                a.matvec(&p, &mut work);
                let pap = ip.dot(&work, &p);
                if !(pap > T::zero()) {
                    warn!(iteration = iter, curvature = ?pap, "PCG breakdown: non-positive curvature");
                    return Ok(stats);
                }
                let alpha = rz / pap;
                for (xi, pi) in x.iter_mut().zip(&p) {
                    *xi = *xi + alpha * *pi;
                }
                for (ri, wi) in r.iter_mut().zip(&work) {
                    *ri = *ri - alpha * *wi;
                }
                iter += 1;

                let res_norm = ip.norm(&r);
                self.residual_history.push(res_norm);
                let on_stride = on_monitor_stride(self.monitor, iter);
                if on_stride {
                    info!(iteration = iter, residual = ?res_norm, "PCG |A x - b|");
                }
                let (_, s) = self.conv.check(res_norm, init_norm, iter);
                stats = s;
                if stats.converged {
                    if self.monitor > 0 && !on_stride {
                        info!(iteration = iter, residual = ?res_norm, "PCG |A x - b|");
                    }
                    return Ok(stats);
                }

                // work = z' = M⁻¹ r'
                precondition(&mut pc, &r, &mut work)?;
                let rz_new = ip.dot(&r, &work);
                let rz_old = ip.dot(&r, &z);
                let beta = (rz_new - rz_old) / rz;
                for (pi, wi) in p.iter_mut().zip(&work) {
                    *pi = *wi + beta * *pi;
                }
                std::mem::swap(&mut z, &mut work);
                rz = rz_new;
            }
        }
        warn!(iterations = stats.iterations, residual = ?stats.final_residual, "PCG did not converge");
        Ok(stats)
    }
}
