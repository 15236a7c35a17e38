//! Near-null-space bases.
//!
//! A basis holds one `width × dim` block per block row, stored row-major. The coarse correction
//! reproduces every column exactly, so for elasticity the columns are the rigid-body modes of the
//! nodal coordinates and for scalar diffusion the constant vector.

use crate::error::KError;

#[derive(Clone, Debug)]
pub struct NullSpace {
    nrows: usize,
    width: usize,
    dim: usize,
    data: Vec<f64>,
}

impl NullSpace {
    pub fn from_blocks(nrows: usize, width: usize, dim: usize, data: Vec<f64>) -> Result<Self, KError> {
        if width == 0 || dim == 0 {
            return Err(KError::InvalidArgument("near-null-space blocks must be non-empty".into()));
        }
        if data.len() != nrows * width * dim {
            return Err(KError::DimensionMismatch(format!(
                "expected {} basis values for {nrows} rows of {width}x{dim}, got {}",
                nrows * width * dim,
                data.len()
            )));
        }
        Ok(Self { nrows, width, dim, data })
    }

    /// Identity block per row (`dim == width`); for width 1 this is the constant vector.
    pub fn constant(nrows: usize, width: usize) -> Self {
        let mut data = vec![0.0; nrows * width * width];
        for blk in data.chunks_mut(width * width) {
            for k in 0..width {
                blk[k * width + k] = 1.0;
            }
        }
        Self { nrows, width, dim: width, data }
    }

    /// Two translations and the in-plane rotation for nodes at `coords`.
    pub fn rigid_body_2d(coords: &[[f64; 2]]) -> Self {
        let (width, dim) = (2, 3);
        let mut data = vec![0.0; coords.len() * width * dim];
        for (blk, &[x, y]) in data.chunks_mut(width * dim).zip(coords) {
            blk[0] = 1.0; // (0, 0)
            blk[dim + 1] = 1.0; // (1, 1)
            blk[2] = y; // (0, 2)
            blk[dim + 2] = -x; // (1, 2)
        }
        Self { nrows: coords.len(), width, dim, data }
    }

    /// Three translations and three rotations for nodes at `coords`.
    pub fn rigid_body_3d(coords: &[[f64; 3]]) -> Self {
        let (width, dim) = (3, 6);
        let mut data = vec![0.0; coords.len() * width * dim];
        for (blk, &[x, y, z]) in data.chunks_mut(width * dim).zip(coords) {
            let mut set = |r: usize, c: usize, v: f64| blk[r * dim + c] = v;
            set(0, 0, 1.0);
            set(1, 1, 1.0);
            set(2, 2, 1.0);
            set(1, 3, z);
            set(2, 3, -y);
            set(0, 4, z);
            set(2, 4, -x);
            set(0, 5, y);
            set(1, 5, -x);
        }
        Self { nrows: coords.len(), width, dim, data }
    }

    /// Number of block rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }
    /// Scalar rows per block (the operator's block width).
    pub fn width(&self) -> usize {
        self.width
    }
    /// Number of basis vectors, the coarse block width.
    pub fn dim(&self) -> usize {
        self.dim
    }
    pub fn block(&self, i: usize) -> &[f64] {
        let bs = self.width * self.dim;
        &self.data[i * bs..(i + 1) * bs]
    }
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Basis column `k` as a full-length vector.
    pub fn column(&self, k: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.nrows * self.width);
        for i in 0..self.nrows {
            let blk = self.block(i);
            out.extend((0..self.width).map(|r| blk[r * self.dim + k]));
        }
        out
    }
}
