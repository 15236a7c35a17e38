//! Jacobi smoothing of the tentative prolongation (classical smoothed aggregation).

use tracing::debug;

use crate::config::SpectralEstimate;
use crate::error::KError;
use crate::matrix::BsrMatrix;

/// Compute `P = P0 − (ω/ρ) D⁻¹ A P0` where `ρ` estimates the spectral radius of `D⁻¹ A`.
///
/// `dinv` is the inverted block diagonal of `a`. The output pattern is the symbolic union of
/// `P0` and `D⁻¹ A P0`, allocated before any value is written. Returns `(P, ρ)`.
pub fn jacobi_prolongation_smoother(
    omega: f64,
    a: &BsrMatrix,
    dinv: &BsrMatrix,
    p0: &BsrMatrix,
    estimate: SpectralEstimate,
) -> Result<(BsrMatrix, f64), KError> {
    let dinv_a = a.left_block_scale(dinv)?;

    let rho = match estimate {
        SpectralEstimate::Arnoldi { steps } => dinv_a.arnoldi_spectral_radius(steps)?,
        SpectralEstimate::Gershgorin => dinv_a.gershgorin_spectral_radius(),
    };
    if !(rho.is_finite() && rho > 0.0) {
        return Err(KError::SpectralEstimate(format!("rho(D^-1 A) = {rho:e}")));
    }
    let scale = omega / rho;
    debug!(rho, scale, "smoothing tentative prolongation");

    let mut p = BsrMatrix::matmul_add_symbolic(p0, &dinv_a, p0)?;
    p0.copy_values_into(&mut p)?;
    BsrMatrix::matmul_add_scaled(-scale, &dinv_a, p0, &mut p)?;
    Ok((p, rho))
}
