//! Greedy graph coloring of a block sparsity pattern and the multicolor row ordering it induces.
//! See Saad §12.4 for background.
//!
//! The ordering only changes the visiting order of the smoother sweeps; it never renumbers the
//! operator, so aggregation and the transfer operators see the natural row order.

/// Extract a symmetrized adjacency list from a CSR pattern: adj[i] = { j ≠ i | A[i,j] ≠ 0 or A[j,i] ≠ 0 }
pub fn extract_adjacency(rowp: &[usize], cols: &[usize]) -> Vec<Vec<usize>> {
    let n = rowp.len().saturating_sub(1);
    let mut adj = vec![Vec::new(); n];
    for i in 0..n {
        for &j in &cols[rowp[i]..rowp[i + 1]] {
            if i != j && j < n {
                adj[i].push(j);
                adj[j].push(i);
            }
        }
    }
    for row in adj.iter_mut() {
        row.sort_unstable();
        row.dedup();
    }
    adj
}

/// Greedy distance-1 coloring in increasing node order. Returns colors[i] = color of node i.
pub fn greedy_coloring(adj: &[Vec<usize>]) -> Vec<usize> {
    let n = adj.len();
    let mut color_of = vec![usize::MAX; n];
    // banned[c] == i marks color c as taken by a neighbor of node i
    let mut banned: Vec<usize> = Vec::new();
    for i in 0..n {
        for &k in &adj[i] {
            let c = color_of[k];
            if c != usize::MAX {
                if c >= banned.len() {
                    banned.resize(c + 1, usize::MAX);
                }
                banned[c] = i;
            }
        }
        color_of[i] = (0..).find(|&c| c >= banned.len() || banned[c] != i).unwrap_or(0);
    }
    color_of
}

/// Build blocks from a color assignment: blocks[c] = indices with color c
pub fn build_blocks_from_colors(colors: &[usize]) -> Vec<Vec<usize>> {
    let num_colors = colors.iter().copied().max().map(|c| c + 1).unwrap_or(0);
    let mut blocks = vec![Vec::new(); num_colors];
    for (i, &c) in colors.iter().enumerate() {
        blocks[c].push(i);
    }
    blocks
}

/// Rows grouped by color, increasing row index within each color.
pub fn multicolor_order(rowp: &[usize], cols: &[usize]) -> Vec<usize> {
    let adj = extract_adjacency(rowp, cols);
    let colors = greedy_coloring(&adj);
    build_blocks_from_colors(&colors).into_iter().flatten().collect()
}
