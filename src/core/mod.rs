//! Core traits and their implementations for vectors and closures.

pub mod traits;
pub mod wrappers;

pub use traits::{InnerProduct, MatVec};
pub use wrappers::FnOperator;
