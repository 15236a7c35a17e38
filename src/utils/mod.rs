//! Utilities shared by the solvers and smoothers.

pub mod coloring;
pub mod convergence;

pub use convergence::{Convergence, SolveStats};
