use thiserror::Error;

// Unified error type for bsr-amg

#[derive(Error, Debug)]
pub enum KError {
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("sparsity pattern mismatch: {0}")]
    PatternMismatch(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("spectral radius estimate failed: {0}")]
    SpectralEstimate(String),
}
