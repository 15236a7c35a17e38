//! Wrappers implementing the core traits for plain vectors and closures.
//!
//! This module provides the inner product used by the Krylov drivers for `Vec<T>`, with optional
//! Rayon parallelism, and [`FnOperator`], which lets any closure act as a matrix-vector operator.
//! The latter is how callers hand an approximate or matrix-free product to the conjugate gradient
//! driver while the multigrid hierarchy preconditions with the assembled operator.
//!
//! # Features
//! - Inner product and norm operations for vectors, with optional Rayon parallelism.
//! - Closure-backed matrix-vector operator.
//!
//! # References
//! - [num-traits crate documentation](https://docs.rs/num-traits)

use crate::core::traits::{InnerProduct, MatVec};
use num_traits::Float;

/// Implements inner product and norm for vectors, with optional Rayon parallelism.
///
/// If the `rayon` feature is enabled, uses parallel iterators for performance.
impl<T: Float + From<f64> + Send + Sync> InnerProduct<Vec<T>> for () {
    type Scalar = T;
    /// Computes the dot product of two vectors: `x^T y`.
    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> T {
        assert_eq!(x.len(), y.len(), "Vectors must have the same length");
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.as_slice()
                .par_iter()
                .zip(y.as_slice().par_iter())
                .map(|(xi, yi)| *xi * *yi)
                .reduce(|| T::zero(), |acc, v| acc + v)
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter()
                .zip(y.iter())
                .map(|(xi, yi)| *xi * *yi)
                .fold(T::zero(), |acc, v| acc + v)
        }
    }
    /// Computes the Euclidean norm of a vector: `||x||_2`.
    fn norm(&self, x: &Vec<T>) -> T {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            x.as_slice()
                .par_iter()
                .map(|xi| *xi * *xi)
                .reduce(|| T::zero(), |acc, v| acc + v)
                .sqrt()
        }
        #[cfg(not(feature = "rayon"))]
        {
            x.iter()
                .map(|xi| *xi * *xi)
                .fold(T::zero(), |acc, v| acc + v)
                .sqrt()
        }
    }
}

/// Matrix-vector operator backed by a closure computing `y = A x`.
///
/// ```rust
/// use bsr_amg::core::traits::MatVec;
/// use bsr_amg::core::wrappers::FnOperator;
/// let diag = FnOperator(|x: &Vec<f64>, y: &mut Vec<f64>| {
///     for (yi, xi) in y.iter_mut().zip(x) {
///         *yi = 2.0 * xi;
///     }
/// });
/// let mut y = vec![0.0; 2];
/// diag.matvec(&vec![1.0, 3.0], &mut y);
/// assert_eq!(y, vec![2.0, 6.0]);
/// ```
pub struct FnOperator<F>(pub F);

impl<T, F> MatVec<Vec<T>> for FnOperator<F>
where
    F: Fn(&Vec<T>, &mut Vec<T>),
{
    fn matvec(&self, x: &Vec<T>, y: &mut Vec<T>) {
        (self.0)(x, y)
    }
}
