//! Options for hierarchy construction and iterative solves.

pub mod options;
pub use options::{AmgOptions, SolveOptions, SpectralEstimate};
