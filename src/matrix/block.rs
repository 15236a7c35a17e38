//! Small dense block kernels.
//!
//! Blocks are stored row-major in flat slices: an `m×n` block `a` holds entry `(i, j)` at
//! `a[i * n + j]`. Every kernel takes the block extents explicitly since block widths are a
//! runtime property of the owning operator.

/// C += alpha · A · B with A `m×k`, B `k×n`, C `m×n`.
#[inline]
pub fn gemm_add(alpha: f64, a: &[f64], b: &[f64], c: &mut [f64], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(c.len(), m * n);
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for (l, &ail) in a[i * k..(i + 1) * k].iter().enumerate() {
            if ail == 0.0 {
                continue;
            }
            let scale = alpha * ail;
            for (cij, &blj) in c_row.iter_mut().zip(&b[l * n..(l + 1) * n]) {
                *cij += scale * blj;
            }
        }
    }
}

/// y += alpha · A · x with A `m×n`.
#[inline]
pub fn gemv_add(alpha: f64, a: &[f64], x: &[f64], y: &mut [f64], m: usize, n: usize) {
    debug_assert_eq!(a.len(), m * n);
    for (i, yi) in y.iter_mut().enumerate().take(m) {
        let row = &a[i * n..(i + 1) * n];
        let sum: f64 = row.iter().zip(x).map(|(aij, xj)| aij * xj).sum();
        *yi += alpha * sum;
    }
}

/// Squared Frobenius norm.
#[inline]
pub fn frobenius_sq(a: &[f64]) -> f64 {
    a.iter().map(|v| v * v).sum()
}

/// Write the transpose of the `m×n` block `a` into the `n×m` block `at`.
#[inline]
pub fn transpose_into(a: &[f64], at: &mut [f64], m: usize, n: usize) {
    for i in 0..m {
        for j in 0..n {
            at[j * m + i] = a[i * n + j];
        }
    }
}

/// Invert an `n×n` block by Gauss-Jordan elimination with partial pivoting.
///
/// Returns the local row index of the vanishing pivot on failure.
pub fn invert(a: &[f64], n: usize) -> Result<Vec<f64>, usize> {
    let mut work = a.to_vec();
    let mut inv = vec![0.0; n * n];
    for i in 0..n {
        inv[i * n + i] = 1.0;
    }
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tiny = f64::EPSILON * scale * n as f64;

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r, &s| work[r * n + col].abs().total_cmp(&work[s * n + col].abs()))
            .unwrap_or(col);
        let pivot = work[pivot_row * n + col];
        if pivot.abs() <= tiny || pivot == 0.0 {
            return Err(col);
        }
        if pivot_row != col {
            for j in 0..n {
                work.swap(col * n + j, pivot_row * n + j);
                inv.swap(col * n + j, pivot_row * n + j);
            }
        }
        let inv_pivot = 1.0 / pivot;
        for j in 0..n {
            work[col * n + j] *= inv_pivot;
            inv[col * n + j] *= inv_pivot;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = work[r * n + col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                work[r * n + j] -= factor * work[col * n + j];
                inv[r * n + j] -= factor * inv[col * n + j];
            }
        }
    }
    Ok(inv)
}
