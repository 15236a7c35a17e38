//! Preconditioners for linear solvers.
//!
//! This module defines the [`FlexiblePreconditioner`] trait and its implementations: the block
//! SOR/SSOR smoother and the smoothed-aggregation multigrid hierarchy.

use crate::error::KError;

/// A preconditioner whose action M⁻¹ may change at every iteration.
///
/// `apply` takes `&mut self` because implementations reuse internal scratch buffers; a single
/// instance must not be applied concurrently.
pub trait FlexiblePreconditioner<V> {
    /// Given the current residual `r`, produce `z ≈ Mₖ⁻¹ r`.
    fn apply(&mut self, r: &V, z: &mut V) -> Result<(), KError>;
}

/// M = I.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPc;

impl<T: Copy> FlexiblePreconditioner<Vec<T>> for IdentityPc {
    fn apply(&mut self, r: &Vec<T>, z: &mut Vec<T>) -> Result<(), KError> {
        z.copy_from_slice(r);
        Ok(())
    }
}

pub mod amg;
pub mod sor;

pub use amg::{BsrAmg, GalerkinCheck, Level, NullSpace};
pub use sor::{BlockSor, MatSorType};
