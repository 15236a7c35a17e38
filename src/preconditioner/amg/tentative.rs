//! Tentative prolongation with an orthonormal basis per aggregate.
//!
//! For every aggregate the rows of the near-null-space basis belonging to it are orthonormalized
//! by block modified Gram-Schmidt. The result satisfies, restricted to each aggregate,
//!
//! ```text
//! B = P R,    Pᵀ P = I
//! ```
//!
//! where `R` is the `N×N` upper-triangular change of basis, which becomes the near-null-space
//! basis of the coarse level.

use tracing::warn;

use crate::error::KError;
use crate::matrix::BsrMatrix;
use crate::matrix::block::transpose_into;
use crate::preconditioner::amg::aggregation::Aggregates;
use crate::preconditioner::amg::nullspace::NullSpace;

/// Tentative prolongation `P` (fine × aggregates, blocks `width × N`) and coarse basis `R`.
pub struct TentativeProlongation {
    pub p: BsrMatrix,
    pub coarse_basis: NullSpace,
    /// Aggregates where at least one basis column was numerically dependent and zeroed.
    pub rank_deficient: Vec<usize>,
}

/// Build the tentative prolongation for `aggregates` from the basis `b`.
///
/// A column whose norm after orthogonalization falls to `tol` times its norm before is zeroed
/// instead of normalized, leaving a rank-reduced basis for that aggregate.
pub fn tentative_prolongation(
    aggregates: &Aggregates,
    b: &NullSpace,
    tol: f64,
) -> Result<TentativeProlongation, KError> {
    let nrows = aggregates.ids.len();
    if b.nrows() != nrows {
        return Err(KError::DimensionMismatch(format!(
            "basis has {} rows, aggregation {}",
            b.nrows(),
            nrows
        )));
    }
    let num_aggregates = aggregates.count();
    let (m, n) = (b.width(), b.dim());

    // Pattern of Pᵀ: one block row per aggregate, columns are its member rows.
    let mut rowp = vec![0; num_aggregates + 1];
    for &id in &aggregates.ids {
        rowp[id + 1] += 1;
    }
    for k in 0..num_aggregates {
        rowp[k + 1] += rowp[k];
    }
    let mut next = rowp.clone();
    let mut cols = vec![0; nrows];
    for (i, &id) in aggregates.ids.iter().enumerate() {
        cols[next[id]] = i;
        next[id] += 1;
    }

    let mut pt = BsrMatrix::new(num_aggregates, nrows, n, m, rowp, cols)?;
    let mut r = vec![0.0; num_aggregates * n * n];
    let mut rank_deficient = Vec::new();

    for agg in 0..num_aggregates {
        let (start, end) = (pt.rowp()[agg], pt.rowp()[agg + 1]);
        for jp in start..end {
            let j = pt.cols()[jp];
            transpose_into(b.block(j), pt.block_mut(jp), m, n);
        }

        // The member blocks of Pᵀ are contiguous, so each aggregate is one dense slab of
        // (end - start) blocks of n×m; row k of block jp is the k-th basis column on that row.
        let bs = n * m;
        let slab = &mut pt.values_mut()[start * bs..end * bs];
        let r_agg = &mut r[agg * n * n..(agg + 1) * n * n];
        let mut deficient = false;
        for k in 0..n {
            let theta = slab_dot(slab, k, k, n, m).sqrt();

            for j in 0..k {
                let dot = slab_dot(slab, j, k, n, m);
                r_agg[j * n + k] = dot;
                for blk in slab.chunks_mut(bs) {
                    for c in 0..m {
                        blk[k * m + c] -= dot * blk[j * m + c];
                    }
                }
            }

            let norm = slab_dot(slab, k, k, n, m).sqrt();
            let scale = if norm > tol * theta {
                r_agg[k * n + k] = norm;
                1.0 / norm
            } else {
                deficient = true;
                0.0
            };
            for blk in slab.chunks_mut(bs) {
                for c in 0..m {
                    blk[k * m + c] *= scale;
                }
            }
        }
        if deficient {
            warn!(aggregate = agg, "tentative prolongation: zeroed dependent basis column");
            rank_deficient.push(agg);
        }
    }

    Ok(TentativeProlongation {
        p: pt.transpose(),
        coarse_basis: NullSpace::from_blocks(num_aggregates, n, n, r)?,
        rank_deficient,
    })
}

/// Dot product of rows `j` and `k` across every `n×m` block of `slab`.
fn slab_dot(slab: &[f64], j: usize, k: usize, n: usize, m: usize) -> f64 {
    slab.chunks(n * m)
        .map(|blk| {
            blk[j * m..(j + 1) * m]
                .iter()
                .zip(&blk[k * m..(k + 1) * m])
                .map(|(a, b)| a * b)
                .sum::<f64>()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioner::amg::aggregation::standard_aggregation;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_basis_gives_normalized_indicators() {
        let agg = Aggregates { ids: vec![0, 0, 1, 1, 1], seeds: vec![0, 3] };
        let b = NullSpace::constant(5, 1);
        let t = tentative_prolongation(&agg, &b, 1e-10).unwrap();
        let p = t.p.to_dense();
        assert_abs_diff_eq!(p[(0, 0)], 1.0 / 2f64.sqrt(), epsilon = 1e-15);
        assert_abs_diff_eq!(p[(4, 1)], 1.0 / 3f64.sqrt(), epsilon = 1e-15);
        assert_eq!(p[(4, 0)], 0.0);
        assert_abs_diff_eq!(t.coarse_basis.block(0)[0], 2f64.sqrt(), epsilon = 1e-15);
        assert_abs_diff_eq!(t.coarse_basis.block(1)[0], 3f64.sqrt(), epsilon = 1e-15);
        assert!(t.rank_deficient.is_empty());
    }

    #[test]
    fn dependent_columns_are_zeroed_and_flagged() {
        // Two identical basis columns on a single aggregate.
        let b = NullSpace::from_blocks(2, 1, 2, vec![1.0, 1.0, 2.0, 2.0]).unwrap();
        let agg = Aggregates { ids: vec![0, 0], seeds: vec![0] };
        let t = tentative_prolongation(&agg, &b, 1e-10).unwrap();
        assert_eq!(t.rank_deficient, vec![0]);
        let p = t.p.to_dense();
        assert_eq!(p[(0, 1)], 0.0);
        assert_eq!(p[(1, 1)], 0.0);
        assert_abs_diff_eq!(p[(0, 0)] * p[(0, 0)] + p[(1, 0)] * p[(1, 0)], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn rigid_modes_are_reconstructed() {
        // 6 nodes along a bent line, chained pattern
        let coords: Vec<[f64; 2]> = (0..6).map(|i| [i as f64, (i * i) as f64 * 0.1]).collect();
        let b = NullSpace::rigid_body_2d(&coords);
        let rowp = vec![0, 2, 5, 8, 11, 14, 16];
        let cols = vec![0, 1, 0, 1, 2, 1, 2, 3, 2, 3, 4, 3, 4, 5, 4, 5];
        let agg = standard_aggregation(&rowp, &cols);
        let t = tentative_prolongation(&agg, &b, 1e-10).unwrap();
        assert_eq!((t.p.row_block(), t.p.col_block()), (2, 3));

        // P R = B column by column
        let mut coarse_col = vec![0.0; agg.count() * 3];
        for k in 0..3 {
            for a in 0..agg.count() {
                let blk = t.coarse_basis.block(a);
                for r in 0..3 {
                    coarse_col[a * 3 + r] = blk[r * 3 + k];
                }
            }
            let mut fine = vec![0.0; 12];
            t.p.matvec(&coarse_col, &mut fine);
            for (x, y) in fine.iter().zip(b.column(k)) {
                assert_abs_diff_eq!(*x, y, epsilon = 1e-12);
            }
        }
    }
}
