//! Block SOR/SSOR smoother tests for bsr-amg
//!
//! These tests verify the block SOR smoother on identity and tridiagonal operators, the symmetry
//! of the symmetric sweep (which the multigrid cycle relies on to stay a valid conjugate gradient
//! preconditioner), in natural and multicolor order, and the display format.
//!
//! The tests use `approx` for floating-point comparisons.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use bsr_amg::matrix::BsrMatrix;
use bsr_amg::preconditioner::{BlockSor, MatSorType};

/// Block tridiagonal operator with `n` block rows, diagonal block `d` and off-diagonal blocks `o`.
fn make_block_tridiag(n: usize, m: usize, d: &[f64], o: &[f64]) -> BsrMatrix {
    let mut entries = Vec::new();
    for i in 0..n {
        if i > 0 {
            entries.push((i, i - 1, o.to_vec()));
        }
        entries.push((i, i, d.to_vec()));
        if i + 1 < n {
            entries.push((i, i + 1, o.to_vec()));
        }
    }
    BsrMatrix::from_block_entries(n, n, m, m, &entries).unwrap()
}

fn make_eye(n: usize) -> BsrMatrix {
    let entries: Vec<_> = (0..n).map(|i| (i, i, vec![1.0])).collect();
    BsrMatrix::from_block_entries(n, n, 1, 1, &entries).unwrap()
}

/// Applying SOR to the identity matrix returns the right-hand side unchanged.
#[test]
fn test_sor_identity() {
    let n = 5;
    let a = make_eye(n);
    let mut sor = BlockSor::new(1.0, 1, MatSorType::APPLY_LOWER | MatSorType::ZERO_INITIAL_GUESS);
    sor.setup(&a).unwrap();
    let b = vec![1.0; n];
    let mut x = vec![3.0; n];
    sor.apply(&a, &b, &mut x);
    assert_relative_eq!(b.as_slice(), x.as_slice(), epsilon = 1e-12);
}

/// One forward sweep on a tridiagonal matrix is a Gauss-Seidel step.
#[test]
fn test_sor_tridiag_forward() {
    let n = 4;
    let a = make_block_tridiag(n, 1, &[4.0], &[-1.0]);
    let mut sor = BlockSor::new(1.0, 1, MatSorType::APPLY_LOWER | MatSorType::ZERO_INITIAL_GUESS);
    sor.setup(&a).unwrap();
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];
    sor.apply(&a, &b, &mut x);
    // x_i = (1 + x_{i-1}) / 4
    let expected = [0.25, 0.3125, 0.328125, 0.33203125];
    for (xi, ei) in x.iter().zip(&expected) {
        assert_abs_diff_eq!(*xi, *ei, epsilon = 1e-15);
    }
}

fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// `(u, M⁻¹ v) = (v, M⁻¹ u)` for the symmetric sweep from a zero guess.
fn assert_symmetric_sweep(a: &BsrMatrix, sor: &BlockSor) {
    let n = a.nrows();
    let u: Vec<f64> = (0..n).map(|i| ((i * 7 + 3) % 11) as f64 - 5.0).collect();
    let v: Vec<f64> = (0..n).map(|i| ((i * 5 + 1) % 13) as f64 * 0.5).collect();
    let mut mu = vec![0.0; n];
    let mut mv = vec![0.0; n];
    sor.apply(a, &u, &mut mu);
    sor.apply(a, &v, &mut mv);
    assert_relative_eq!(dot(&u, &mv), dot(&v, &mu), max_relative = 1e-12);
}

#[test]
fn test_ssor_is_symmetric() {
    let a = make_block_tridiag(9, 1, &[2.0], &[-1.0]);
    let mut sor = BlockSor::new(1.0, 1, MatSorType::SYMMETRIC_SWEEP | MatSorType::ZERO_INITIAL_GUESS);
    sor.setup(&a).unwrap();
    assert_symmetric_sweep(&a, &sor);
}

#[test]
fn test_block_ssor_multicolor_is_symmetric() {
    let a = make_block_tridiag(8, 2, &[4.0, 1.0, 1.0, 4.0], &[-1.0, 0.0, 0.0, -1.0]);
    let mut sor = BlockSor::new(1.0, 1, MatSorType::SYMMETRIC_SWEEP | MatSorType::ZERO_INITIAL_GUESS)
        .with_multicolor(true);
    sor.setup(&a).unwrap();
    // a chain colors in two classes, evens first
    assert_eq!(sor.order(), &[0, 2, 4, 6, 1, 3, 5, 7]);
    assert_symmetric_sweep(&a, &sor);
}

/// Repeated SSOR sweeps reduce the residual and the result stays finite.
#[test]
fn test_ssor_reduces_residual() {
    let n = 10;
    let a = make_block_tridiag(n, 1, &[4.0], &[-1.0]);
    let mut sor = BlockSor::new(1.2, 3, MatSorType::SYMMETRIC_SWEEP);
    sor.setup(&a).unwrap();
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];
    sor.apply(&a, &b, &mut x);
    assert!(x.iter().all(|v| v.is_finite()));
    let mut r = b.clone();
    a.matvec_sub(&x, &mut r);
    assert!(dot(&r, &r).sqrt() < 1e-2 * dot(&b, &b).sqrt());
}

#[test]
fn test_sor_display() {
    let sor = BlockSor::new(1.0, 2, MatSorType::SYMMETRIC_SWEEP);
    let s = format!("{}", sor);
    assert!(s.starts_with("BlockSOR(omega=1, its=2"));
    assert!(s.contains("multicolor=false"));
}
