//! Hierarchy construction and stationary multigrid tests.
//!
//! The model problem is the five-point Laplacian on a square grid with Dirichlet boundaries, plus
//! its singular Neumann counterpart with a consistent right-hand side. The tests cover convergence
//! of the V-cycle iteration (scalar, blocked, and with a rigid-body basis), the exact single-level
//! solve on both factorization paths, aggregation and tentative prolongation properties, Galerkin
//! consistency, and numeric refresh via `update`.

use approx::assert_abs_diff_eq;
use bsr_amg::config::{AmgOptions, SolveOptions, SpectralEstimate};
use bsr_amg::matrix::BsrMatrix;
use bsr_amg::preconditioner::amg::aggregation::standard_aggregation;
use bsr_amg::preconditioner::amg::tentative::tentative_prolongation;
use bsr_amg::preconditioner::{BsrAmg, NullSpace};
use bsr_amg::solver::MgSolver;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Five-point Laplacian on a `k × k` grid, blocks of width `m` with diagonal block `d` and
/// off-diagonal blocks `-I`.
fn five_point(k: usize, m: usize, d: &[f64]) -> BsrMatrix {
    let mut off = vec![0.0; m * m];
    for r in 0..m {
        off[r * m + r] = -1.0;
    }
    let mut entries = Vec::new();
    for gy in 0..k {
        for gx in 0..k {
            let i = gy * k + gx;
            if gy > 0 {
                entries.push((i, i - k, off.clone()));
            }
            if gx > 0 {
                entries.push((i, i - 1, off.clone()));
            }
            entries.push((i, i, d.to_vec()));
            if gx + 1 < k {
                entries.push((i, i + 1, off.clone()));
            }
            if gy + 1 < k {
                entries.push((i, i + k, off.clone()));
            }
        }
    }
    BsrMatrix::from_block_entries(k * k, k * k, m, m, &entries).unwrap()
}

fn laplacian(k: usize) -> BsrMatrix {
    five_point(k, 1, &[4.0])
}

fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn residual_norm(a: &BsrMatrix, b: &[f64], x: &[f64]) -> f64 {
    let mut r = b.to_vec();
    a.matvec_sub(x, &mut r);
    r.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn norm(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[test]
fn mg_converges_on_five_point_laplacian() {
    let a = laplacian(10);
    let mut amg = BsrAmg::new(3, 2.0 / 3.0, 0.0, a, NullSpace::constant(100, 1)).unwrap();
    assert_eq!(amg.num_levels(), 3);
    assert!(amg.level(1).unwrap().operator().nbrows() < 100);

    let b = random_vector(100, 7);
    let mut x = vec![0.0; 100];
    let mut solver = MgSolver::from_options(&SolveOptions::new(100, 1e-8, 1e-30));
    let stats = solver.solve(&mut amg, &b, &mut x);
    assert!(stats.converged);
    assert!(stats.iterations <= 20, "took {} iterations", stats.iterations);
    assert!(residual_norm(amg.operator(), &b, &x) < 1e-8 * norm(&b));

    // the residual history is non-increasing
    for pair in solver.residual_history.windows(2) {
        assert!(pair[1] <= pair[0] * (1.0 + 1e-12), "{:e} > {:e}", pair[1], pair[0]);
    }
}

/// Five-point Laplacian with natural (Neumann) boundaries: constants span its null space.
fn neumann_laplacian(k: usize) -> BsrMatrix {
    let mut entries = Vec::new();
    for gy in 0..k {
        for gx in 0..k {
            let i = gy * k + gx;
            let mut nbrs = Vec::new();
            if gy > 0 {
                nbrs.push(i - k);
            }
            if gx > 0 {
                nbrs.push(i - 1);
            }
            if gx + 1 < k {
                nbrs.push(i + 1);
            }
            if gy + 1 < k {
                nbrs.push(i + k);
            }
            entries.push((i, i, vec![nbrs.len() as f64]));
            entries.extend(nbrs.into_iter().map(|j| (i, j, vec![-1.0])));
        }
    }
    BsrMatrix::from_block_entries(k * k, k * k, 1, 1, &entries).unwrap()
}

#[test]
fn mg_converges_on_consistent_neumann_problem() {
    let mut amg = BsrAmg::new(3, 2.0 / 3.0, 0.0, neumann_laplacian(10), NullSpace::constant(100, 1)).unwrap();

    // right-hand side orthogonal to the constant null space
    let mut b = random_vector(100, 17);
    let mean = b.iter().sum::<f64>() / 100.0;
    b.iter_mut().for_each(|v| *v -= mean);

    let mut x = vec![0.0; 100];
    let mut solver = MgSolver::from_options(&SolveOptions::new(100, 1e-8, 1e-30));
    let stats = solver.solve(&mut amg, &b, &mut x);
    assert!(stats.converged);
    assert!(stats.iterations <= 30, "took {} iterations", stats.iterations);
    assert!(residual_norm(amg.operator(), &b, &x) < 1e-7 * norm(&b));
}

#[test]
fn rigid_body_basis_hierarchy_converges() {
    let k = 10;
    let a = five_point(k, 2, &[4.5, 0.5, 0.5, 4.5]);
    let coords: Vec<[f64; 2]> = (0..k * k).map(|i| [(i % k) as f64, (i / k) as f64]).collect();
    let mut amg = BsrAmg::new(2, 2.0 / 3.0, 0.0, a, NullSpace::rigid_body_2d(&coords)).unwrap();
    let coarse = amg.level(1).unwrap();
    assert!(coarse.is_terminal());
    assert_eq!(coarse.operator().row_block(), 3);
    assert!(coarse.operator().nrows() >= 16);

    let b = random_vector(2 * k * k, 19);
    let mut x = vec![0.0; 2 * k * k];
    let mut solver = MgSolver::from_options(&SolveOptions::new(100, 1e-8, 1e-30));
    let stats = solver.solve(&mut amg, &b, &mut x);
    assert!(solver.residual_history.iter().all(|r| r.is_finite()));
    assert!(stats.converged, "residual {:e} after {} cycles", stats.final_residual, stats.iterations);
    assert!(residual_norm(amg.operator(), &b, &x) < 1e-8 * norm(&b));
}

#[test]
fn single_level_dense_factor_is_a_direct_solve() {
    // a 19-point chain stays on the dense path
    let mut entries = Vec::new();
    for i in 0..19 {
        entries.push((i, i, vec![2.0]));
        if i > 0 {
            entries.push((i, i - 1, vec![-1.0]));
        }
        if i + 1 < 19 {
            entries.push((i, i + 1, vec![-1.0]));
        }
    }
    let a = BsrMatrix::from_block_entries(19, 19, 1, 1, &entries).unwrap();
    let mut amg = BsrAmg::new(1, 2.0 / 3.0, 0.0, a, NullSpace::constant(19, 1)).unwrap();
    assert_eq!(amg.level(0).unwrap().factor().map(|f| f.kind()), Some("dense-lu"));
    let b = random_vector(19, 23);
    let mut x = vec![0.0; 19];
    let stats = MgSolver::new(1e-8, 1e-30, 10).solve(&mut amg, &b, &mut x);
    assert!(stats.converged);
    assert_eq!(stats.iterations, 1);
    assert!(x.iter().all(|v| v.is_finite()));
}

#[test]
fn single_level_is_a_direct_solve() {
    let mut amg = BsrAmg::new(1, 2.0 / 3.0, 0.0, laplacian(10), NullSpace::constant(100, 1)).unwrap();
    assert!(amg.level(0).unwrap().is_terminal());
    let b = random_vector(100, 11);
    let mut x = vec![0.0; 100];
    let stats = MgSolver::new(1e-8, 1e-30, 10).solve(&mut amg, &b, &mut x);
    assert!(stats.converged);
    assert_eq!(stats.iterations, 1);
}

#[test]
fn iteration_cap_returns_false_with_best_iterate() {
    let mut amg = BsrAmg::new(2, 2.0 / 3.0, 0.0, laplacian(10), NullSpace::constant(100, 1)).unwrap();
    let b = random_vector(100, 3);
    let mut x = vec![0.0; 100];
    let converged = amg.solve_mg(&b, &mut x, &SolveOptions::new(2, 1e-14, 0.0));
    assert!(!converged);
    // two cycles still make progress
    assert!(residual_norm(amg.operator(), &b, &x) < norm(&b));

    let mut solver = MgSolver::new(1e-14, 0.0, 3);
    let stats = solver.solve(&mut amg, &b, &mut x);
    assert!(!stats.converged);
    let best = solver.residual_history.iter().cloned().fold(f64::INFINITY, f64::min);
    assert_eq!(stats.final_residual, best);
    assert_abs_diff_eq!(residual_norm(amg.operator(), &b, &x), best, epsilon = 1e-12 * norm(&b));
}

#[test]
fn aggregation_partitions_every_row_once() {
    let a = laplacian(10);
    let agg = standard_aggregation(a.rowp(), a.cols());
    assert!(agg.ids.iter().all(|&id| id < agg.count()));
    let members = agg.members();
    assert_eq!(members.iter().map(Vec::len).sum::<usize>(), 100);
    // each seed belongs to its own aggregate
    for (id, &seed) in agg.seeds.iter().enumerate() {
        assert_eq!(agg.ids[seed], id);
    }
}

#[test]
fn tentative_columns_are_orthonormal_per_aggregate() {
    // two unknowns per node with rigid-body modes of the grid coordinates
    let k = 6;
    let a = laplacian(k);
    let coords: Vec<[f64; 2]> = (0..k * k).map(|i| [(i % k) as f64, (i / k) as f64]).collect();
    let basis = NullSpace::rigid_body_2d(&coords);
    let agg = standard_aggregation(a.rowp(), a.cols());
    let t = tentative_prolongation(&agg, &basis, 1e-10).unwrap();

    let p = t.p.to_dense();
    let (nr, nc) = (p.nrows(), p.ncols());
    for c1 in 0..nc {
        for c2 in 0..nc {
            let dot: f64 = (0..nr).map(|r| p[(r, c1)] * p[(r, c2)]).sum();
            let expected = if c1 == c2 && !t.rank_deficient.contains(&(c1 / 3)) { 1.0 } else { 0.0 };
            if c1 == c2 && t.rank_deficient.contains(&(c1 / 3)) {
                // a zeroed column or a normalized one
                assert!(dot.abs() < 1e-10 || (dot - 1.0).abs() < 1e-10);
            } else {
                assert_abs_diff_eq!(dot, expected, epsilon = 1e-10);
            }
        }
    }

    // P R reproduces the rigid-body modes
    let n_agg = agg.count();
    for mode in 0..3 {
        let mut coarse = vec![0.0; n_agg * 3];
        for g in 0..n_agg {
            let blk = t.coarse_basis.block(g);
            for r in 0..3 {
                coarse[g * 3 + r] = blk[r * 3 + mode];
            }
        }
        let mut fine = vec![0.0; k * k * 2];
        t.p.matvec(&coarse, &mut fine);
        for (got, want) in fine.iter().zip(basis.column(mode)) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-10);
        }
    }
}

#[test]
fn galerkin_operator_is_consistent() {
    let amg = BsrAmg::new(3, 2.0 / 3.0, 0.0, laplacian(10), NullSpace::constant(100, 1)).unwrap();
    let checks = amg.check_galerkin_consistency();
    assert_eq!(checks.len(), 2);
    for check in &checks {
        assert!(check.rel_error < 1e-10, "level {}: {:e}", check.level, check.rel_error);
    }
}

#[test]
fn strength_filtering_still_converges() {
    // anisotropic coupling: weak in x, strong in y
    let k = 10;
    let mut entries = Vec::new();
    for gy in 0..k {
        for gx in 0..k {
            let i = gy * k + gx;
            entries.push((i, i, vec![2.02]));
            if gx > 0 {
                entries.push((i, i - 1, vec![-0.01]));
            }
            if gx + 1 < k {
                entries.push((i, i + 1, vec![-0.01]));
            }
            if gy > 0 {
                entries.push((i, i - k, vec![-1.0]));
            }
            if gy + 1 < k {
                entries.push((i, i + k, vec![-1.0]));
            }
        }
    }
    let a = BsrMatrix::from_block_entries(k * k, k * k, 1, 1, &entries).unwrap();
    let options = AmgOptions::new(3, 2.0 / 3.0, 0.25).with_spectral_estimate(SpectralEstimate::Gershgorin);
    let mut amg = BsrAmg::with_options(a, NullSpace::constant(k * k, 1), options).unwrap();

    let b = random_vector(k * k, 5);
    let mut x = vec![0.0; k * k];
    assert!(amg.solve_mg(&b, &mut x, &SolveOptions::new(200, 1e-8, 1e-30)));
    assert!(residual_norm(amg.operator(), &b, &x) < 1e-8 * norm(&b));
}

#[test]
fn block_operator_converges() {
    let k = 8;
    let a = five_point(k, 2, &[4.5, 0.5, 0.5, 4.5]);
    let mut amg = BsrAmg::new(3, 2.0 / 3.0, 0.0, a, NullSpace::constant(k * k, 2)).unwrap();
    assert_eq!(amg.level(1).unwrap().operator().row_block(), 2);
    let b = random_vector(2 * k * k, 9);
    let mut x = vec![0.0; 2 * k * k];
    assert!(amg.solve_mg(&b, &mut x, &SolveOptions::new(200, 1e-8, 1e-30)));
    assert!(residual_norm(amg.operator(), &b, &x) < 1e-8 * norm(&b));
}

#[test]
fn update_refreshes_every_level() {
    let mut amg = BsrAmg::new(3, 2.0 / 3.0, 0.0, laplacian(10), NullSpace::constant(100, 1)).unwrap();
    let nnz_before: Vec<usize> = amg.levels().iter().map(|l| l.operator().nnz()).collect();

    // shift the diagonal, keeping the pattern
    let diag = amg.operator().diagonal_positions();
    let a = amg.operator_mut();
    for jp in diag.into_iter().flatten() {
        a.block_mut(jp)[0] += 1.0;
    }
    amg.update().unwrap();

    let nnz_after: Vec<usize> = amg.levels().iter().map(|l| l.operator().nnz()).collect();
    assert_eq!(nnz_before, nnz_after);
    for check in amg.check_galerkin_consistency() {
        assert!(check.rel_error < 1e-10);
    }

    let b = random_vector(100, 13);
    let mut x = vec![0.0; 100];
    assert!(amg.solve_mg(&b, &mut x, &SolveOptions::new(100, 1e-8, 1e-30)));
    assert!(residual_norm(amg.operator(), &b, &x) < 1e-8 * norm(&b));
}
