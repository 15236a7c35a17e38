//! Standard three-pass aggregation.
//!
//! Rows are scanned strictly in increasing index order in every pass. The order decides which
//! rows seed aggregates and therefore the convergence rate of the resulting hierarchy, so it is
//! part of the observable behavior.

const UNAGGREGATED: usize = usize::MAX;
const ISOLATED: usize = usize::MAX - 1;

/// Partition of the rows of a graph into aggregates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aggregates {
    /// Aggregate id of each row, in `0..count()`.
    pub ids: Vec<usize>,
    /// Seed row of each aggregate.
    pub seeds: Vec<usize>,
}

impl Aggregates {
    pub fn count(&self) -> usize {
        self.seeds.len()
    }

    /// Rows of each aggregate, in increasing order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.count()];
        for (i, &id) in self.ids.iter().enumerate() {
            members[id].push(i);
        }
        members
    }
}

/// Aggregate the rows of the CSR graph `(rowp, cols)`.
///
/// 1. A row whose off-diagonal neighbors are all free seeds an aggregate holding itself and
///    every neighbor; a row with no off-diagonal neighbor is set aside.
/// 2. A leftover row joins the aggregate of its first aggregated neighbor.
/// 3. A row still left over seeds an aggregate and absorbs its free neighbors; rows set aside in
///    the first pass become singletons.
pub fn standard_aggregation(rowp: &[usize], cols: &[usize]) -> Aggregates {
    let nrows = rowp.len().saturating_sub(1);
    let mut ids = vec![UNAGGREGATED; nrows];
    let mut seeds = Vec::new();
    let row = |i: usize| &cols[rowp[i]..rowp[i + 1]];

    // First pass
    for i in 0..nrows {
        if ids[i] != UNAGGREGATED {
            continue;
        }
        let mut has_neighbors = false;
        let mut has_aggregated_neighbors = false;
        for &j in row(i) {
            if i != j {
                has_neighbors = true;
                if ids[j] != UNAGGREGATED {
                    has_aggregated_neighbors = true;
                    break;
                }
            }
        }
        if !has_neighbors {
            ids[i] = ISOLATED;
        } else if !has_aggregated_neighbors {
            let id = seeds.len();
            ids[i] = id;
            for &j in row(i) {
                ids[j] = id;
            }
            seeds.push(i);
        }
    }

    // Second pass
    for i in 0..nrows {
        if ids[i] != UNAGGREGATED {
            continue;
        }
        if let Some(&j) = row(i).iter().find(|&&j| ids[j] < ISOLATED) {
            ids[i] = ids[j];
        }
    }

    // Third pass
    for i in 0..nrows {
        if ids[i] == UNAGGREGATED {
            let id = seeds.len();
            ids[i] = id;
            for &j in row(i) {
                if ids[j] == UNAGGREGATED {
                    ids[j] = id;
                }
            }
            seeds.push(i);
        } else if ids[i] == ISOLATED {
            ids[i] = seeds.len();
            seeds.push(i);
        }
    }

    Aggregates { ids, seeds }
}
