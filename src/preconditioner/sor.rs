use std::fmt;
use bitflags::bitflags;
use crate::error::KError;
use crate::matrix::BsrMatrix;
use crate::matrix::block;
use crate::utils::coloring::multicolor_order;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct MatSorType: u32 {
        const ZERO_INITIAL_GUESS       = 0b0000_0001;
        const APPLY_LOWER              = 0b0000_0010; // forward Gauss–Seidel
        const APPLY_UPPER              = 0b0000_0100; // backward
        const SYMMETRIC_SWEEP          = Self::APPLY_LOWER.bits() | Self::APPLY_UPPER.bits();
    }
}

/// Block SOR / SSOR smoother over a [`BsrMatrix`].
///
/// Each row update is `x_i += ω D_i⁻¹ (b_i − Σ_j A_ij x_j)` using the most recent values of `x`.
/// Forward sweeps follow `order`; backward sweeps follow it in reverse, so a symmetric sweep is
/// a symmetric operator whenever `A` is.
pub struct BlockSor {
    pub its:   usize,
    pub sym:   MatSorType,
    pub omega: f64,
    multicolor: bool,
    dinv:  Option<BsrMatrix>,
    order: Vec<usize>,
}

impl BlockSor {
    pub fn new(omega: f64, its: usize, sym: MatSorType) -> Self {
        Self { its, sym, omega, multicolor: false, dinv: None, order: Vec::new() }
    }
    pub fn with_multicolor(mut self, flag: bool) -> Self {
        self.multicolor = flag;
        self
    }
    pub fn set_omega(&mut self, omega: f64) { self.omega = omega; }
    pub fn omega(&self) -> f64 { self.omega }
    pub fn set_its(&mut self, its: usize) { self.its = its; }
    pub fn its(&self) -> usize { self.its }
    pub fn set_sym(&mut self, sym: MatSorType) { self.sym = sym; }
    pub fn sym(&self) -> MatSorType { self.sym }

    /// Inverse block diagonal computed by the last `setup`/`refresh_diagonal`.
    pub fn inverse_diagonal(&self) -> Option<&BsrMatrix> {
        self.dinv.as_ref()
    }

    /// Row visiting order of forward sweeps.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Fix the sweep order and invert the block diagonal of `a`, returning the inverse.
    pub fn setup(&mut self, a: &BsrMatrix) -> Result<&BsrMatrix, KError> {
        self.order = if self.multicolor {
            multicolor_order(a.rowp(), a.cols())
        } else {
            (0..a.nbrows()).collect()
        };
        self.refresh_diagonal(a)
    }

    /// Recompute only the inverse block diagonal; the sweep order is structural and kept.
    pub fn refresh_diagonal(&mut self, a: &BsrMatrix) -> Result<&BsrMatrix, KError> {
        Ok(&*self.dinv.insert(a.block_diagonal(true)?))
    }

    fn relax_row(&self, a: &BsrMatrix, dinv: &BsrMatrix, i: usize, b: &[f64], x: &mut [f64], t: &mut [f64]) {
        let m = a.row_block();
        a.row_residual(i, b, x, t);
        block::gemv_add(self.omega, dinv.block(i), t, &mut x[i * m..(i + 1) * m], m, m);
    }

    /// Smooth `x` in place towards the solution of `a x = b`.
    ///
    /// # Panics
    /// Panics if called before `setup`.
    pub fn apply(&self, a: &BsrMatrix, b: &[f64], x: &mut [f64]) {
        let dinv = self.dinv.as_ref().expect("BlockSor not setup");
        assert_eq!(b.len(), a.nrows(), "right-hand side has incorrect length");
        assert_eq!(x.len(), a.nrows(), "solution has incorrect length");
        if self.sym.contains(MatSorType::ZERO_INITIAL_GUESS) {
            x.fill(0.0);
        }
        let mut t = vec![0.0; a.row_block()];
        for _ in 0..self.its {
            // FORWARD sweep
            if self.sym.intersects(MatSorType::APPLY_LOWER) {
                for &i in &self.order {
                    self.relax_row(a, dinv, i, b, x, &mut t);
                }
            }
            // BACKWARD sweep
            if self.sym.intersects(MatSorType::APPLY_UPPER) {
                for &i in self.order.iter().rev() {
                    self.relax_row(a, dinv, i, b, x, &mut t);
                }
            }
        }
    }
}

impl fmt::Display for BlockSor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockSOR(omega={}, its={}, sym={:?}, multicolor={})",
            self.omega, self.its, self.sym, self.multicolor)
    }
}
