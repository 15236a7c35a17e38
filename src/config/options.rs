//! Construction and solve options for the multigrid hierarchy.
//!
//! [`AmgOptions`] fixes how the hierarchy is built (number of levels, prolongation damping,
//! strength-of-connection tolerance, spectral estimator) and [`SolveOptions`] the stopping
//! criteria and reporting cadence of the stationary and conjugate gradient drivers.

/// How the spectral radius of `D⁻¹A` is estimated when smoothing the prolongation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpectralEstimate {
    /// Arnoldi iteration with the given number of Krylov steps.
    Arnoldi { steps: usize },
    /// Gershgorin row-sum bound; cheaper, usually pessimistic.
    Gershgorin,
}

/// Hierarchy construction parameters.
#[derive(Debug, Clone)]
pub struct AmgOptions {
    /// Total number of levels including the terminal (directly factored) one.
    pub num_levels: usize,

    /// Damping ω of the Jacobi prolongation smoother, scaled by 1/ρ(D⁻¹A).
    pub omega: f64,

    /// Strength-of-connection tolerance ε; 0 disables filtering.
    pub epsilon: f64,

    /// Relative norm below which a Gram-Schmidt column is treated as dependent.
    pub orthogonality_tol: f64,

    pub spectral_estimate: SpectralEstimate,

    /// Relaxation factor of the block SSOR smoother inside the cycle.
    pub smoother_omega: f64,

    /// Sweep the smoother in multicolor order.
    pub multicolor: bool,
}

impl Default for AmgOptions {
    fn default() -> Self {
        Self {
            num_levels: 3,
            omega: 4.0 / 3.0,
            epsilon: 0.0,
            orthogonality_tol: 1e-10,
            spectral_estimate: SpectralEstimate::Arnoldi { steps: 15 },
            smoother_omega: 1.0,
            multicolor: true,
        }
    }
}

impl AmgOptions {
    pub fn new(num_levels: usize, omega: f64, epsilon: f64) -> Self {
        Self { num_levels, omega, epsilon, ..Self::default() }
    }
    pub fn with_orthogonality_tol(mut self, tol: f64) -> Self {
        self.orthogonality_tol = tol;
        self
    }
    pub fn with_spectral_estimate(mut self, estimate: SpectralEstimate) -> Self {
        self.spectral_estimate = estimate;
        self
    }
    pub fn with_smoother_omega(mut self, omega: f64) -> Self {
        self.smoother_omega = omega;
        self
    }
    pub fn with_multicolor(mut self, flag: bool) -> Self {
        self.multicolor = flag;
        self
    }
}

/// Stopping criteria and reporting cadence for the iterative drivers.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Report the residual every `monitor` iterations; 0 keeps the solve silent.
    pub monitor: usize,
    pub max_iters: usize,
    pub rtol: f64,
    pub atol: f64,
    /// Conjugate gradient iterations between true-residual recomputations.
    pub restart: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self { monitor: 0, max_iters: 500, rtol: 1e-8, atol: 1e-30, restart: 100 }
    }
}

impl SolveOptions {
    pub fn new(max_iters: usize, rtol: f64, atol: f64) -> Self {
        Self { max_iters, rtol, atol, ..Self::default() }
    }
    pub fn with_monitor(mut self, stride: usize) -> Self {
        self.monitor = stride;
        self
    }
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }
}
