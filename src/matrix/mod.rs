//! Matrix module: block-sparse operators and the dense block kernels they are built on.

pub mod block;
pub mod bsr;
pub use bsr::BsrMatrix;
