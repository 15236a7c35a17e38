//! Symmetric V-cycle over a built hierarchy.

use crate::error::KError;
use crate::matrix::BsrMatrix;
use crate::preconditioner::FlexiblePreconditioner;
use crate::preconditioner::amg::{Level, LevelKind};

/// Scratch vectors owned by an interior level for its coarse-grid correction.
#[derive(Clone, Debug)]
pub(crate) struct LevelWork {
    /// Fine residual.
    r: Vec<f64>,
    /// Restricted residual, the right-hand side of the next level.
    coarse_b: Vec<f64>,
    /// Correction computed on the next level.
    coarse_x: Vec<f64>,
}

impl LevelWork {
    pub(crate) fn new(fine: usize, coarse: usize) -> Self {
        Self { r: vec![0.0; fine], coarse_b: vec![0.0; coarse], coarse_x: vec![0.0; coarse] }
    }
}

/// One V-cycle on `levels[0]`, recursing through the coarser levels.
///
/// Pre-smoothing precedes restriction and post-smoothing follows prolongation; both are one
/// symmetric block SOR sweep, so the cycle is a symmetric operator.
pub(crate) fn cycle(levels: &[Level], work: &mut [LevelWork], b: &[f64], x: &mut [f64], zero_guess: bool) {
    let Some((level, coarser)) = levels.split_first() else {
        return;
    };
    match &level.kind {
        LevelKind::Terminal(factor) => factor.solve(b, x),
        LevelKind::Interior(transfer) => {
            let Some((w, rest)) = work.split_first_mut() else {
                return;
            };
            if zero_guess {
                x.fill(0.0);
            }
            transfer.smoother.apply(&level.a, b, x);

            w.r.copy_from_slice(b);
            level.a.matvec_sub(x, &mut w.r);
            transfer.pt.matvec(&w.r, &mut w.coarse_b);

            cycle(coarser, rest, &w.coarse_b, &mut w.coarse_x, true);

            transfer.p.matvec_add(&w.coarse_x, x);
            transfer.smoother.apply(&level.a, b, x);
        }
    }
}

/// V-cycle preconditioner borrowing the levels immutably and the scratch mutably.
///
/// Splitting the borrow lets the fine operator serve as the Krylov operator while the cycle
/// preconditions with the same hierarchy.
pub struct VCycle<'a> {
    pub(crate) levels: &'a [Level],
    pub(crate) work: &'a mut [LevelWork],
}

impl VCycle<'_> {
    /// The fine-level operator.
    pub fn operator(&self) -> &BsrMatrix {
        &self.levels[0].a
    }

    /// Apply one cycle with `x` as the initial guess.
    pub fn apply_with_guess(&mut self, b: &[f64], x: &mut [f64]) {
        cycle(self.levels, self.work, b, x, false);
    }
}

impl FlexiblePreconditioner<Vec<f64>> for VCycle<'_> {
    fn apply(&mut self, r: &Vec<f64>, z: &mut Vec<f64>) -> Result<(), KError> {
        let n = self.operator().nrows();
        if r.len() != n || z.len() != n {
            return Err(KError::DimensionMismatch(format!(
                "V-cycle expects vectors of length {n}, got {} and {}",
                r.len(),
                z.len()
            )));
        }
        cycle(self.levels, self.work, r, z, true);
        Ok(())
    }
}
