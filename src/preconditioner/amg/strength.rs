//! Strength-of-connection filtering of a block sparsity graph.

use crate::matrix::BsrMatrix;
use crate::matrix::block::frobenius_sq;

/// Filtered CSR graph of a square block operator.
///
/// With `a_ij = ‖A_ij‖²_F` and `d_i = ‖A_ii‖²_F`, the off-diagonal edge `(i, j)` is kept iff
/// `a_ij² ≥ ε⁴ d_i d_j`. Diagonal entries are always kept. A row without a stored diagonal
/// block gets `d_i = 0`, which keeps all of its edges.
pub fn strength_of_connection(epsilon: f64, a: &BsrMatrix) -> (Vec<usize>, Vec<usize>) {
    let n = a.nbrows();
    let epsilon4 = epsilon.powi(4);
    let d: Vec<f64> = a
        .diagonal_positions()
        .into_iter()
        .map(|jp| jp.map_or(0.0, |jp| frobenius_sq(a.block(jp))))
        .collect();

    let (rowp, cols) = (a.rowp(), a.cols());
    let mut srowp = Vec::with_capacity(n + 1);
    let mut scols = Vec::with_capacity(a.nnz());
    srowp.push(0);
    for i in 0..n {
        for jp in rowp[i]..rowp[i + 1] {
            let j = cols[jp];
            if i == j {
                scols.push(j);
            } else {
                let af = frobenius_sq(a.block(jp));
                if af * af >= epsilon4 * d[i] * d[j] {
                    scols.push(j);
                }
            }
        }
        srowp.push(scols.len());
    }
    (srowp, scols)
}
