//! Cycle Detector (C2): Tarjan's strongly-connected-components algorithm,
//! run iteratively over an explicit work stack so there is no recursion
//! depth limit. Owns no shared state — a fresh index stack and low-link
//! map are allocated per call.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Detects every strongly-connected component of size >= 2 in `adjacency`
/// (keys = internal service ids, values = downstream targets). Trivial
/// single-node SCCs — including self-loops, which the domain forbids
/// anyway — are excluded. O(V+E) time, O(V) space.
pub fn detect_cycles(adjacency: &HashMap<Uuid, Vec<Uuid>>) -> Vec<Vec<Uuid>> {
    let mut index_counter = 0usize;
    let mut indices: HashMap<Uuid, usize> = HashMap::new();
    let mut lowlinks: HashMap<Uuid, usize> = HashMap::new();
    let mut on_stack: HashSet<Uuid> = HashSet::new();
    let mut tarjan_stack: Vec<Uuid> = Vec::new();
    let mut sccs: Vec<Vec<Uuid>> = Vec::new();
    let empty: Vec<Uuid> = Vec::new();

    let roots: Vec<Uuid> = adjacency.keys().copied().collect();
    for root in roots {
        if indices.contains_key(&root) {
            continue;
        }

        // `work` simulates the call stack of the recursive formulation:
        // each frame is (node, index of the next child to visit).
        let mut work: Vec<(Uuid, usize)> = vec![(root, 0)];
        indices.insert(root, index_counter);
        lowlinks.insert(root, index_counter);
        index_counter += 1;
        tarjan_stack.push(root);
        on_stack.insert(root);

        while let Some(&mut (node, ref mut pos)) = work.last_mut() {
            let children = adjacency.get(&node).unwrap_or(&empty);
            if *pos < children.len() {
                let child = children[*pos];
                *pos += 1;
                if !indices.contains_key(&child) {
                    indices.insert(child, index_counter);
                    lowlinks.insert(child, index_counter);
                    index_counter += 1;
                    tarjan_stack.push(child);
                    on_stack.insert(child);
                    work.push((child, 0));
                } else if on_stack.contains(&child) {
                    let child_index = indices[&child];
                    let node_low = lowlinks[&node];
                    lowlinks.insert(node, node_low.min(child_index));
                }
            } else {
                work.pop();
                if lowlinks[&node] == indices[&node] {
                    let mut scc = Vec::new();
                    loop {
                        let w = tarjan_stack.pop().expect("node must be on stack");
                        on_stack.remove(&w);
                        scc.push(w);
                        if w == node {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
                if let Some(&(parent, _)) = work.last() {
                    let node_low = lowlinks[&node];
                    let parent_low = lowlinks[&parent];
                    lowlinks.insert(parent, parent_low.min(node_low));
                }
            }
        }
    }

    sccs.into_iter().filter(|scc| scc.len() >= 2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn dag_has_zero_sccs() {
        let nodes = uuids(4);
        let mut adj = HashMap::new();
        adj.insert(nodes[0], vec![nodes[1], nodes[2]]);
        adj.insert(nodes[1], vec![nodes[3]]);
        adj.insert(nodes[2], vec![nodes[3]]);
        adj.insert(nodes[3], vec![]);
        assert!(detect_cycles(&adj).is_empty());
    }

    #[test]
    fn three_cycle_plus_disjoint_edge_yields_one_scc() {
        // A -> B -> C -> A, plus D -> E
        let nodes = uuids(5);
        let (a, b, c, d, e) = (nodes[0], nodes[1], nodes[2], nodes[3], nodes[4]);
        let mut adj = HashMap::new();
        adj.insert(a, vec![b]);
        adj.insert(b, vec![c]);
        adj.insert(c, vec![a]);
        adj.insert(d, vec![e]);
        adj.insert(e, vec![]);

        let sccs = detect_cycles(&adj);
        assert_eq!(sccs.len(), 1);
        let scc = &sccs[0];
        assert_eq!(scc.len(), 3);
        let set: HashSet<Uuid> = scc.iter().copied().collect();
        assert_eq!(set, HashSet::from([a, b, c]));
        assert!(!scc.contains(&d));
        assert!(!scc.contains(&e));
    }

    #[test]
    fn fully_strongly_connected_graph_yields_one_scc_with_all_nodes() {
        let nodes = uuids(4);
        let mut adj: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for i in 0..nodes.len() {
            let next = nodes[(i + 1) % nodes.len()];
            adj.insert(nodes[i], vec![next]);
        }
        let sccs = detect_cycles(&adj);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 4);
    }

    #[test]
    fn empty_graph_yields_no_sccs() {
        let adj: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        assert!(detect_cycles(&adj).is_empty());
    }
}
