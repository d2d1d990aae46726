//! Evaluation order of port-variable definitions.

use std::collections::{BTreeMap, BTreeSet};

use bg_expr::Expr;

use crate::equations::node_of;

/// Order the definitions so each comes after the port variables it reads.
///
/// Kahn's algorithm with an ordered ready-set, so the order depends only on
/// the definitions. When a cycle remains, `Err` carries the nodes of one
/// concrete cycle.
pub(crate) fn evaluation_order(defs: &[Expr]) -> Result<Vec<usize>, Vec<usize>> {
    let n = defs.len();
    let deps: Vec<BTreeSet<usize>> = defs
        .iter()
        .map(|d| d.free_vars().iter().filter_map(node_of).collect())
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];
    for (node, ds) in deps.iter().enumerate() {
        in_degree[node] = ds.len();
        for &d in ds {
            dependents[d].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &dependents[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let remaining: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
    Err(find_cycle(&deps, &remaining))
}

/// Walk unresolved dependencies from the smallest remaining node until a
/// node repeats.
fn find_cycle(deps: &[BTreeSet<usize>], remaining: &BTreeSet<usize>) -> Vec<usize> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut seen: BTreeMap<usize, usize> = BTreeMap::new();
    let mut path = Vec::new();
    let mut current = start;
    loop {
        if let Some(&pos) = seen.get(&current) {
            return path.split_off(pos);
        }
        seen.insert(current, path.len());
        path.push(current);
        match deps[current].iter().find(|d| remaining.contains(*d)) {
            Some(&next) => current = next,
            None => return path,
        }
    }
}
