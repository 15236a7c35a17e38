//! Block-compressed-row (BSR) operators.
//!
//! A [`BsrMatrix`] stores `nbrows × nbcols` blocks of `row_block × col_block` scalars. Block
//! widths are runtime values so a single type covers the fine operator (width = degrees of
//! freedom per node), rectangular transfer operators and the coarse operators of width `N`.
//!
//! Column indices inside a block row are kept sorted. Products are split into a symbolic phase,
//! which allocates the output pattern, and a numeric phase, which only writes values. The numeric
//! phase can be rerun against an existing pattern when values change but structure does not.

use crate::core::traits::{InnerProduct, MatVec};
use crate::error::KError;
use crate::matrix::block;
use faer::Mat;
use faer::sparse::{SparseColMat, Triplet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NO_ENTRY: usize = usize::MAX;

#[derive(Clone, Debug)]
pub struct BsrMatrix {
    nbrows: usize,
    nbcols: usize,
    row_block: usize,
    col_block: usize,
    rowp: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl BsrMatrix {
    /// Allocate a matrix with the given pattern and zero values.
    pub fn new(
        nbrows: usize,
        nbcols: usize,
        row_block: usize,
        col_block: usize,
        rowp: Vec<usize>,
        cols: Vec<usize>,
    ) -> Result<Self, KError> {
        let nnz = cols.len();
        Self::from_parts(
            nbrows,
            nbcols,
            row_block,
            col_block,
            rowp,
            cols,
            vec![0.0; nnz * row_block * col_block],
        )
    }

    /// Build from raw block-CSR arrays, validating the structure.
    pub fn from_parts(
        nbrows: usize,
        nbcols: usize,
        row_block: usize,
        col_block: usize,
        rowp: Vec<usize>,
        cols: Vec<usize>,
        vals: Vec<f64>,
    ) -> Result<Self, KError> {
        if row_block == 0 || col_block == 0 {
            return Err(KError::InvalidArgument("block widths must be positive".into()));
        }
        if rowp.len() != nbrows + 1 || rowp[0] != 0 || rowp[nbrows] != cols.len() {
            return Err(KError::DimensionMismatch(format!(
                "row pointer of length {} does not describe {} block rows with {} entries",
                rowp.len(),
                nbrows,
                cols.len()
            )));
        }
        if vals.len() != cols.len() * row_block * col_block {
            return Err(KError::DimensionMismatch(format!(
                "expected {} values for {} blocks of {}x{}, got {}",
                cols.len() * row_block * col_block,
                cols.len(),
                row_block,
                col_block,
                vals.len()
            )));
        }
        if let Some(i) = (0..nbrows).find(|&i| rowp[i] > rowp[i + 1]) {
            return Err(KError::PatternMismatch(format!("row pointer decreases at row {i}")));
        }
        for i in 0..nbrows {
            let row = &cols[rowp[i]..rowp[i + 1]];
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(KError::PatternMismatch(format!(
                    "column indices of block row {i} are not strictly increasing"
                )));
            }
            if let Some(&j) = row.last() {
                if j >= nbcols {
                    return Err(KError::PatternMismatch(format!(
                        "column {j} out of range in block row {i} (ncols = {nbcols})"
                    )));
                }
            }
        }
        Ok(Self { nbrows, nbcols, row_block, col_block, rowp, cols, vals })
    }

    /// Assemble from `(block_row, block_col, block)` entries; duplicates are summed.
    pub fn from_block_entries(
        nbrows: usize,
        nbcols: usize,
        row_block: usize,
        col_block: usize,
        entries: &[(usize, usize, Vec<f64>)],
    ) -> Result<Self, KError> {
        let bsize = row_block * col_block;
        let mut per_row: Vec<Vec<(usize, usize)>> = vec![Vec::new(); nbrows];
        for (k, (i, j, blk)) in entries.iter().enumerate() {
            if *i >= nbrows || *j >= nbcols {
                return Err(KError::PatternMismatch(format!(
                    "entry ({i}, {j}) outside a {nbrows}x{nbcols} block matrix"
                )));
            }
            if blk.len() != bsize {
                return Err(KError::DimensionMismatch(format!(
                    "entry ({i}, {j}) has {} values, expected {bsize}",
                    blk.len()
                )));
            }
            per_row[*i].push((*j, k));
        }

        let mut rowp = vec![0; nbrows + 1];
        let mut cols = Vec::with_capacity(entries.len());
        let mut vals = Vec::with_capacity(entries.len() * bsize);
        for (i, row) in per_row.iter_mut().enumerate() {
            row.sort_by_key(|&(j, _)| j);
            for &(j, k) in row.iter() {
                if cols.len() > rowp[i] && cols.last() == Some(&j) {
                    let start = vals.len() - bsize;
                    for (v, e) in vals[start..].iter_mut().zip(&entries[k].2) {
                        *v += e;
                    }
                } else {
                    cols.push(j);
                    vals.extend_from_slice(&entries[k].2);
                }
            }
            rowp[i + 1] = cols.len();
        }
        Self::from_parts(nbrows, nbcols, row_block, col_block, rowp, cols, vals)
    }

    /// Number of block rows.
    pub fn nbrows(&self) -> usize {
        self.nbrows
    }
    /// Number of block columns.
    pub fn nbcols(&self) -> usize {
        self.nbcols
    }
    /// Scalar rows per block.
    pub fn row_block(&self) -> usize {
        self.row_block
    }
    /// Scalar columns per block.
    pub fn col_block(&self) -> usize {
        self.col_block
    }
    /// Number of scalar rows.
    pub fn nrows(&self) -> usize {
        self.nbrows * self.row_block
    }
    /// Number of scalar columns.
    pub fn ncols(&self) -> usize {
        self.nbcols * self.col_block
    }
    /// Number of stored blocks.
    pub fn nnz(&self) -> usize {
        self.cols.len()
    }
    pub fn rowp(&self) -> &[usize] {
        &self.rowp
    }
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }
    pub fn values(&self) -> &[f64] {
        &self.vals
    }
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.vals
    }

    fn block_size(&self) -> usize {
        self.row_block * self.col_block
    }

    /// Values of the `jp`-th stored block.
    pub fn block(&self, jp: usize) -> &[f64] {
        let bs = self.block_size();
        &self.vals[jp * bs..(jp + 1) * bs]
    }

    pub fn block_mut(&mut self, jp: usize) -> &mut [f64] {
        let bs = self.block_size();
        &mut self.vals[jp * bs..(jp + 1) * bs]
    }

    /// Storage position of block `(i, j)`, if present.
    pub fn find_block(&self, i: usize, j: usize) -> Option<usize> {
        let start = self.rowp[i];
        self.cols[start..self.rowp[i + 1]]
            .binary_search(&j)
            .ok()
            .map(|k| start + k)
    }

    /// Storage position of each diagonal block.
    pub fn diagonal_positions(&self) -> Vec<Option<usize>> {
        (0..self.nbrows).map(|i| self.find_block(i, i)).collect()
    }

    fn same_pattern(&self, other: &BsrMatrix) -> bool {
        self.nbrows == other.nbrows
            && self.nbcols == other.nbcols
            && self.row_block == other.row_block
            && self.col_block == other.col_block
            && self.rowp == other.rowp
            && self.cols == other.cols
    }

    fn row_product(&self, i: usize, x: &[f64], acc: &mut [f64]) {
        let (m, n) = (self.row_block, self.col_block);
        for jp in self.rowp[i]..self.rowp[i + 1] {
            let j = self.cols[jp];
            block::gemv_add(1.0, self.block(jp), &x[j * n..(j + 1) * n], acc, m, n);
        }
    }

    fn apply_rows<F>(&self, x: &[f64], y: &mut [f64], update: F)
    where
        F: Fn(&mut [f64], &[f64]) + Sync,
    {
        assert_eq!(x.len(), self.ncols(), "Input vector x has incorrect length");
        assert_eq!(y.len(), self.nrows(), "Output vector y has incorrect length");
        let m = self.row_block;
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            y.par_chunks_mut(m).enumerate().for_each(|(i, yi)| {
                let mut acc = vec![0.0; m];
                self.row_product(i, x, &mut acc);
                update(yi, &acc);
            });
        }
        #[cfg(not(feature = "rayon"))]
        {
            let mut acc = vec![0.0; m];
            for (i, yi) in y.chunks_mut(m).enumerate() {
                acc.fill(0.0);
                self.row_product(i, x, &mut acc);
                update(yi, &acc);
            }
        }
    }

    /// y = A x
    pub fn matvec(&self, x: &[f64], y: &mut [f64]) {
        self.apply_rows(x, y, |yi, acc| yi.copy_from_slice(acc));
    }

    /// y += A x
    pub fn matvec_add(&self, x: &[f64], y: &mut [f64]) {
        self.apply_rows(x, y, |yi, acc| {
            for (a, b) in yi.iter_mut().zip(acc) {
                *a += b;
            }
        });
    }

    /// y -= A x
    pub fn matvec_sub(&self, x: &[f64], y: &mut [f64]) {
        self.apply_rows(x, y, |yi, acc| {
            for (a, b) in yi.iter_mut().zip(acc) {
                *a -= b;
            }
        });
    }

    /// Block-row residual `b_i - (A x)_i` for one block row, written into `out`.
    pub(crate) fn row_residual(&self, i: usize, b: &[f64], x: &[f64], out: &mut [f64]) {
        let m = self.row_block;
        out.copy_from_slice(&b[i * m..(i + 1) * m]);
        let n = self.col_block;
        for jp in self.rowp[i]..self.rowp[i + 1] {
            let j = self.cols[jp];
            block::gemv_add(-1.0, self.block(jp), &x[j * n..(j + 1) * n], out, m, n);
        }
    }

    /// Transposed operator with transposed blocks.
    pub fn transpose(&self) -> BsrMatrix {
        let (m, n) = (self.row_block, self.col_block);
        let bs = m * n;
        let mut rowp = vec![0; self.nbcols + 1];
        for &j in &self.cols {
            rowp[j + 1] += 1;
        }
        for j in 0..self.nbcols {
            rowp[j + 1] += rowp[j];
        }
        let mut next = rowp.clone();
        let mut cols = vec![0; self.nnz()];
        let mut vals = vec![0.0; self.vals.len()];
        for i in 0..self.nbrows {
            for jp in self.rowp[i]..self.rowp[i + 1] {
                let j = self.cols[jp];
                let dest = next[j];
                next[j] += 1;
                cols[dest] = i;
                block::transpose_into(self.block(jp), &mut vals[dest * bs..(dest + 1) * bs], m, n);
            }
        }
        // Rows are visited in increasing order, so the columns come out sorted.
        BsrMatrix {
            nbrows: self.nbcols,
            nbcols: self.nbrows,
            row_block: n,
            col_block: m,
            rowp,
            cols,
            vals,
        }
    }

    fn check_product_shapes(a: &BsrMatrix, b: &BsrMatrix) -> Result<(), KError> {
        if a.nbcols != b.nbrows || a.col_block != b.row_block {
            return Err(KError::DimensionMismatch(format!(
                "cannot multiply {}x{} blocks of {}x{} by {}x{} blocks of {}x{}",
                a.nbrows, a.nbcols, a.row_block, a.col_block, b.nbrows, b.nbcols, b.row_block,
                b.col_block
            )));
        }
        Ok(())
    }

    fn product_pattern(seed: Option<&BsrMatrix>, a: &BsrMatrix, b: &BsrMatrix) -> BsrMatrix {
        let mut marker = vec![NO_ENTRY; b.nbcols];
        let mut rowp = vec![0; a.nbrows + 1];
        let mut cols = Vec::new();
        let mut row = Vec::new();
        for i in 0..a.nbrows {
            row.clear();
            if let Some(c) = seed {
                for &j in &c.cols[c.rowp[i]..c.rowp[i + 1]] {
                    marker[j] = i;
                    row.push(j);
                }
            }
            for kp in a.rowp[i]..a.rowp[i + 1] {
                let k = a.cols[kp];
                for &j in &b.cols[b.rowp[k]..b.rowp[k + 1]] {
                    if marker[j] != i {
                        marker[j] = i;
                        row.push(j);
                    }
                }
            }
            row.sort_unstable();
            cols.extend_from_slice(&row);
            rowp[i + 1] = cols.len();
        }
        let nnz = cols.len();
        BsrMatrix {
            nbrows: a.nbrows,
            nbcols: b.nbcols,
            row_block: a.row_block,
            col_block: b.col_block,
            rowp,
            cols,
            vals: vec![0.0; nnz * a.row_block * b.col_block],
        }
    }

    /// Pattern of `A B` with zero values.
    pub fn matmul_symbolic(a: &BsrMatrix, b: &BsrMatrix) -> Result<BsrMatrix, KError> {
        Self::check_product_shapes(a, b)?;
        Ok(Self::product_pattern(None, a, b))
    }

    /// Pattern of `C0 + A B` with zero values.
    pub fn matmul_add_symbolic(
        c0: &BsrMatrix,
        a: &BsrMatrix,
        b: &BsrMatrix,
    ) -> Result<BsrMatrix, KError> {
        Self::check_product_shapes(a, b)?;
        if c0.nbrows != a.nbrows
            || c0.nbcols != b.nbcols
            || c0.row_block != a.row_block
            || c0.col_block != b.col_block
        {
            return Err(KError::DimensionMismatch(
                "addend shape does not match the product shape".into(),
            ));
        }
        Ok(Self::product_pattern(Some(c0), a, b))
    }

    /// C = A B within the existing pattern of C.
    pub fn matmul_numeric(a: &BsrMatrix, b: &BsrMatrix, c: &mut BsrMatrix) -> Result<(), KError> {
        c.vals.fill(0.0);
        Self::matmul_add_scaled(1.0, a, b, c)
    }

    /// C += alpha A B within the existing pattern of C.
    pub fn matmul_add_scaled(
        alpha: f64,
        a: &BsrMatrix,
        b: &BsrMatrix,
        c: &mut BsrMatrix,
    ) -> Result<(), KError> {
        Self::check_product_shapes(a, b)?;
        if c.nbrows != a.nbrows
            || c.nbcols != b.nbcols
            || c.row_block != a.row_block
            || c.col_block != b.col_block
        {
            return Err(KError::DimensionMismatch(
                "output shape does not match the product shape".into(),
            ));
        }
        let (m, k, n) = (a.row_block, a.col_block, b.col_block);
        let cbs = m * n;
        let mut position = vec![NO_ENTRY; c.nbcols];
        for i in 0..a.nbrows {
            for jp in c.rowp[i]..c.rowp[i + 1] {
                position[c.cols[jp]] = jp;
            }
            for kp in a.rowp[i]..a.rowp[i + 1] {
                let kk = a.cols[kp];
                let a_blk = a.block(kp);
                for jp in b.rowp[kk]..b.rowp[kk + 1] {
                    let j = b.cols[jp];
                    let dest = position[j];
                    if dest == NO_ENTRY {
                        return Err(KError::PatternMismatch(format!(
                            "product entry ({i}, {j}) missing from the output pattern"
                        )));
                    }
                    block::gemm_add(
                        alpha,
                        a_blk,
                        b.block(jp),
                        &mut c.vals[dest * cbs..(dest + 1) * cbs],
                        m,
                        k,
                        n,
                    );
                }
            }
            for jp in c.rowp[i]..c.rowp[i + 1] {
                position[c.cols[jp]] = NO_ENTRY;
            }
        }
        Ok(())
    }

    /// Copy the values of `self` into `dst`, whose pattern must contain this one.
    /// Entries of `dst` outside this pattern are zeroed.
    pub fn copy_values_into(&self, dst: &mut BsrMatrix) -> Result<(), KError> {
        if self.nbrows != dst.nbrows
            || self.nbcols != dst.nbcols
            || self.row_block != dst.row_block
            || self.col_block != dst.col_block
        {
            return Err(KError::DimensionMismatch("copy between differently shaped matrices".into()));
        }
        if self.same_pattern(dst) {
            dst.vals.copy_from_slice(&self.vals);
            return Ok(());
        }
        dst.vals.fill(0.0);
        for i in 0..self.nbrows {
            for jp in self.rowp[i]..self.rowp[i + 1] {
                let j = self.cols[jp];
                let dest = dst.find_block(i, j).ok_or_else(|| {
                    KError::PatternMismatch(format!("entry ({i}, {j}) missing from destination"))
                })?;
                dst.block_mut(dest).copy_from_slice(self.block(jp));
            }
        }
        Ok(())
    }

    /// Extract the block diagonal, optionally inverting each block.
    pub fn block_diagonal(&self, inverse: bool) -> Result<BsrMatrix, KError> {
        if self.nbrows != self.nbcols || self.row_block != self.col_block {
            return Err(KError::DimensionMismatch("block diagonal of a non-square matrix".into()));
        }
        let m = self.row_block;
        let mut vals = Vec::with_capacity(self.nbrows * m * m);
        for i in 0..self.nbrows {
            let jp = self.find_block(i, i).ok_or(KError::ZeroPivot(i * m))?;
            if inverse {
                let inv = block::invert(self.block(jp), m).map_err(|r| KError::ZeroPivot(i * m + r))?;
                vals.extend_from_slice(&inv);
            } else {
                vals.extend_from_slice(self.block(jp));
            }
        }
        Ok(BsrMatrix {
            nbrows: self.nbrows,
            nbcols: self.nbrows,
            row_block: m,
            col_block: m,
            rowp: (0..=self.nbrows).collect(),
            cols: (0..self.nbrows).collect(),
            vals,
        })
    }

    /// D A for a block-diagonal `d` (one block per row, as built by [`Self::block_diagonal`]).
    pub fn left_block_scale(&self, d: &BsrMatrix) -> Result<BsrMatrix, KError> {
        if d.nbrows != self.nbrows || d.nnz() != self.nbrows || d.col_block != self.row_block {
            return Err(KError::DimensionMismatch("scaling matrix is not block diagonal".into()));
        }
        let (m, n) = (self.row_block, self.col_block);
        let bs = m * n;
        let mut out = self.clone();
        out.vals.fill(0.0);
        for i in 0..self.nbrows {
            let di = d.block(i);
            for jp in self.rowp[i]..self.rowp[i + 1] {
                block::gemm_add(1.0, di, self.block(jp), &mut out.vals[jp * bs..(jp + 1) * bs], m, m, n);
            }
        }
        Ok(out)
    }

    /// Largest absolute scalar row sum, an upper bound on the spectral radius.
    pub fn gershgorin_spectral_radius(&self) -> f64 {
        let (m, n) = (self.row_block, self.col_block);
        let mut rho = 0.0_f64;
        let mut sums = vec![0.0; m];
        for i in 0..self.nbrows {
            sums.fill(0.0);
            for jp in self.rowp[i]..self.rowp[i + 1] {
                let blk = self.block(jp);
                for (r, s) in sums.iter_mut().enumerate() {
                    *s += blk[r * n..(r + 1) * n].iter().map(|v| v.abs()).sum::<f64>();
                }
            }
            rho = sums.iter().fold(rho, |acc, &s| acc.max(s));
        }
        rho
    }

    /// Spectral radius estimate from `steps` Arnoldi iterations.
    ///
    /// The Krylov space is started from a fixed pseudo-random vector so builds are reproducible;
    /// the dominant Ritz value is then taken by power iteration on the Hessenberg matrix.
    pub fn arnoldi_spectral_radius(&self, steps: usize) -> Result<f64, KError> {
        let size = self.nrows();
        if size != self.ncols() {
            return Err(KError::DimensionMismatch("spectral radius of a non-square matrix".into()));
        }
        let m = steps.min(size).max(1);
        let ip = ();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut v0: Vec<f64> = (0..size).map(|_| rng.gen_range(0.5..1.5)).collect();
        let norm0 = ip.norm(&v0);
        v0.iter_mut().for_each(|v| *v /= norm0);

        let mut basis = vec![v0];
        let mut h = Mat::<f64>::zeros(m + 1, m);
        let mut dim = m;
        let mut w = vec![0.0; size];
        for j in 0..m {
            self.matvec(&basis[j], &mut w);
            for (i, vi) in basis.iter().enumerate() {
                let hij = ip.dot(&w, vi);
                h[(i, j)] = hij;
                w.iter_mut().zip(vi).for_each(|(wk, vk)| *wk -= hij * vk);
            }
            let hnorm = ip.norm(&w);
            h[(j + 1, j)] = hnorm;
            if hnorm <= 1e-12 * h[(j, j)].abs().max(1.0) {
                // Invariant subspace found.
                dim = j + 1;
                break;
            }
            basis.push(w.iter().map(|wk| wk / hnorm).collect());
        }

        let mut y = vec![1.0 / (dim as f64).sqrt(); dim];
        let mut hy = vec![0.0; dim];
        let mut rho = 0.0;
        for _ in 0..200 {
            for (r, hr) in hy.iter_mut().enumerate() {
                *hr = (0..dim).map(|c| h[(r, c)] * y[c]).sum();
            }
            let nrm = ip.norm(&hy);
            if nrm == 0.0 {
                break;
            }
            let converged = (nrm - rho).abs() <= 1e-10 * nrm;
            rho = nrm;
            y.iter_mut().zip(&hy).for_each(|(yi, hi)| *yi = hi / nrm);
            if converged {
                break;
            }
        }
        if !(rho.is_finite() && rho > 0.0) {
            return Err(KError::SpectralEstimate(format!(
                "Arnoldi produced a non-positive estimate {rho:e}"
            )));
        }
        Ok(rho)
    }

    /// Dense copy, for small systems and tests.
    pub fn to_dense(&self) -> Mat<f64> {
        let (m, n) = (self.row_block, self.col_block);
        let mut dense = Mat::<f64>::zeros(self.nrows(), self.ncols());
        for i in 0..self.nbrows {
            for jp in self.rowp[i]..self.rowp[i + 1] {
                let j = self.cols[jp];
                let blk = self.block(jp);
                for r in 0..m {
                    for c in 0..n {
                        dense[(i * m + r, j * n + c)] = blk[r * n + c];
                    }
                }
            }
        }
        dense
    }

    /// Unblocked compressed-column copy for faer's sparse factorizations.
    pub fn to_csc(&self) -> Result<SparseColMat<usize, f64>, KError> {
        let (m, n) = (self.row_block, self.col_block);
        let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::with_capacity(self.vals.len());
        for i in 0..self.nbrows {
            for jp in self.rowp[i]..self.rowp[i + 1] {
                let j = self.cols[jp];
                let blk = self.block(jp);
                for r in 0..m {
                    for c in 0..n {
                        triplets.push(Triplet { row: i * m + r, col: j * n + c, val: blk[r * n + c] });
                    }
                }
            }
        }
        SparseColMat::try_new_from_triplets(self.nrows(), self.ncols(), &triplets)
            .map_err(|e| KError::FactorError(format!("failed to build CSC matrix: {e:?}")))
    }
}

impl MatVec<Vec<f64>> for BsrMatrix {
    fn matvec(&self, x: &Vec<f64>, y: &mut Vec<f64>) {
        BsrMatrix::matvec(self, x, y);
    }
}
