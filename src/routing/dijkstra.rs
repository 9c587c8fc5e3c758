use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use uuid::Uuid;

use crate::routing::graph::Graph;

/// Single-source shortest paths over a unit-weight topology graph, reduced
///  to the piece the transport needs: the first hop on a shortest path
///  towards every reachable node.
///
/// Ties between equal-cost paths resolve towards the smallest first-hop id,
///  so repeated runs over the same graph yield identical assignments on
///  every node.
pub struct Dijkstra {
    first_hops: BTreeMap<Uuid, Uuid>,
}

impl Dijkstra {
    pub fn new(source: Uuid, graph: &Graph) -> Dijkstra {
        // per node: (distance, first hop), compared lexicographically so a
        //  shorter path wins and the smaller first hop breaks ties
        let mut best: BTreeMap<Uuid, (u32, Uuid)> = BTreeMap::new();
        let mut heap = BinaryHeap::new();

        for neighbor in graph.neighbors(source) {
            best.insert(neighbor, (1, neighbor));
            heap.push(Reverse((1u32, neighbor, neighbor)));
        }

        while let Some(Reverse((distance, node, first_hop))) = heap.pop() {
            if best.get(&node) != Some(&(distance, first_hop)) {
                continue; // superseded by a better entry
            }

            for neighbor in graph.neighbors(node) {
                if neighbor == source {
                    continue;
                }
                let candidate = (distance + 1, first_hop);
                if best.get(&neighbor).map(|current| candidate < *current).unwrap_or(true) {
                    best.insert(neighbor, candidate);
                    heap.push(Reverse((distance + 1, neighbor, first_hop)));
                }
            }
        }

        Dijkstra {
            first_hops: best.into_iter()
                .map(|(node, (_, first_hop))| (node, first_hop))
                .collect(),
        }
    }

    /// the neighbor through which `target` is reached on a shortest path,
    ///  or None if `target` is unreachable (or is the source itself)
    pub fn first_hop_to(&self, target: Uuid) -> Option<Uuid> {
        self.first_hops.get(&target).copied()
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn node(number: u128) -> Uuid {
        Uuid::from_u128(number)
    }

    fn graph(edges: &[(u128, u128)]) -> Graph {
        let mut graph = Graph::new();
        for &(a, b) in edges {
            graph.add_edge(node(a), node(b));
        }
        graph
    }

    #[rstest]
    #[case::direct_neighbor(&[(1, 2)], 2, Some(2))]
    #[case::two_hops(&[(1, 2), (2, 3)], 3, Some(2))]
    #[case::three_hops(&[(1, 2), (2, 3), (3, 4)], 4, Some(2))]
    #[case::unreachable(&[(1, 2), (3, 4)], 3, None)]
    #[case::source_itself(&[(1, 2)], 1, None)]
    #[case::shorter_of_two_paths(&[(1, 2), (2, 3), (3, 4), (1, 5), (5, 4)], 4, Some(5))]
    fn test_first_hop(#[case] edges: &[(u128, u128)], #[case] target: u128, #[case] expected: Option<u128>) {
        let dijkstra = Dijkstra::new(node(1), &graph(edges));
        assert_eq!(dijkstra.first_hop_to(node(target)), expected.map(node));
    }

    #[test]
    fn test_equal_cost_tie_breaks_towards_smaller_first_hop() {
        // 1 reaches 4 via 2 or via 3, both in two hops
        let dijkstra = Dijkstra::new(node(1), &graph(&[(1, 2), (1, 3), (2, 4), (3, 4)]));
        assert_eq!(dijkstra.first_hop_to(node(4)), Some(node(2)));

        // and the choice does not depend on edge insertion order
        let dijkstra = Dijkstra::new(node(1), &graph(&[(3, 4), (1, 3), (2, 4), (1, 2)]));
        assert_eq!(dijkstra.first_hop_to(node(4)), Some(node(2)));
    }

    #[test]
    fn test_all_nodes_of_a_mesh_get_first_hops() {
        // a ring of five nodes
        let dijkstra = Dijkstra::new(node(1), &graph(&[(1, 2), (2, 3), (3, 4), (4, 5), (5, 1)]));

        assert_eq!(dijkstra.first_hop_to(node(2)), Some(node(2)));
        assert_eq!(dijkstra.first_hop_to(node(3)), Some(node(2)));
        assert_eq!(dijkstra.first_hop_to(node(4)), Some(node(5)));
        assert_eq!(dijkstra.first_hop_to(node(5)), Some(node(5)));
    }
}
