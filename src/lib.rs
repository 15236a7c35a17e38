//! bsr-amg: smoothed-aggregation algebraic multigrid over block-sparse operators.
//!
//! This crate builds a multilevel hierarchy from one fine block-sparse operator and a
//! near-null-space basis, and solves or preconditions systems with it through a symmetric V-cycle,
//! a stationary multigrid iteration, and an inexact preconditioned conjugate gradient driver.

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod preconditioner;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::matrix::*;
pub use crate::preconditioner::*;
pub use crate::solver::*;
pub use crate::utils::*;
