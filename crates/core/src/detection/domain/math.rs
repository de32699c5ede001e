//! Union-find over cluster indices, used when merged clusters must be fused.

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`, keeping the smaller root.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

/// Partition `0..parent.len()` into sets.
///
/// Sets are ordered by their smallest member and members ascend, so the
/// result does not depend on union order.
pub fn partition(parent: &mut [usize]) -> Vec<Vec<usize>> {
    let mut slot_of_root: Vec<Option<usize>> = vec![None; parent.len()];
    let mut sets: Vec<Vec<usize>> = Vec::new();
    for i in 0..parent.len() {
        let root = find(parent, i);
        match slot_of_root[root] {
            Some(slot) => sets[slot].push(i),
            None => {
                slot_of_root[root] = Some(sets.len());
                sets.push(vec![i]);
            }
        }
    }
    sets
}
