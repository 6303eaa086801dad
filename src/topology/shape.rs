//! Graph shape generators.
//!
//! A shape generator maps a node count to an abstract graph with nodes
//! numbered `0..n` and an ordered edge list. The builder turns nodes into
//! switches and edges into links, so edge order decides link order.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Abstract connectivity: `node_count` nodes and undirected edges between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyGraph {
    node_count: usize,
    edges: Vec<(usize, usize)>,
}

impl TopologyGraph {
    pub fn new(node_count: usize, edges: Vec<(usize, usize)>) -> Self {
        TopologyGraph { node_count, edges }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn nodes(&self) -> std::ops::Range<usize> {
        0..self.node_count
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn degree(&self, node: usize) -> usize {
        self.edges.iter().filter(|(a, b)| *a == node || *b == node).count()
    }

    /// True if every node can reach node 0. Empty and single-node graphs are connected.
    pub fn is_connected(&self) -> bool {
        if self.node_count <= 1 {
            return true;
        }
        let mut adjacency = vec![Vec::new(); self.node_count];
        for &(a, b) in &self.edges {
            if a < self.node_count && b < self.node_count {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        let mut seen = vec![false; self.node_count];
        let mut queue = VecDeque::from([0]);
        seen[0] = true;
        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        seen.into_iter().all(|s| s)
    }
}

/// Anything that can lay out a graph for a given node count.
pub trait ShapeGenerator {
    fn generate(&self, node_count: usize) -> TopologyGraph;

    /// Whether the builder should reject disconnected output.
    fn requires_connectivity(&self) -> bool {
        true
    }
}

impl<F> ShapeGenerator for F
where
    F: Fn(usize) -> TopologyGraph,
{
    fn generate(&self, node_count: usize) -> TopologyGraph {
        self(node_count)
    }
}

/// Built-in switch graph shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Node i linked to node i+1
    #[default]
    Path,
    /// Path closed back to node 0
    Cycle,
    /// Node 0 linked to every other node
    Star,
    /// Every pair of nodes linked
    Complete,
    /// Breadth-first numbered tree where each node has `branching` children
    BalancedTree { branching: usize },
}

impl ShapeGenerator for Shape {
    fn generate(&self, n: usize) -> TopologyGraph {
        let edges = match *self {
            Shape::Path => (1..n).map(|i| (i - 1, i)).collect(),
            Shape::Cycle => {
                let mut edges: Vec<_> = (1..n).map(|i| (i - 1, i)).collect();
                // two nodes already share their only edge
                if n > 2 {
                    edges.push((n - 1, 0));
                }
                edges
            }
            Shape::Star => (1..n).map(|i| (0, i)).collect(),
            Shape::Complete => (0..n)
                .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
                .collect(),
            Shape::BalancedTree { branching } => {
                if branching == 0 {
                    Vec::new()
                } else {
                    (1..n).map(|i| ((i - 1) / branching, i)).collect()
                }
            }
        };
        TopologyGraph::new(n, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_edges() {
        let g = Shape::Path.generate(4);
        assert_eq!(g.edges(), &[(0, 1), (1, 2), (2, 3)]);
        assert!(g.is_connected());
        assert!(Shape::Path.generate(1).edges().is_empty());
        assert!(Shape::Path.generate(0).edges().is_empty());
    }

    #[test]
    fn test_cycle_edges() {
        assert_eq!(Shape::Cycle.generate(3).edges(), &[(0, 1), (1, 2), (2, 0)]);
        assert_eq!(Shape::Cycle.generate(2).edges(), &[(0, 1)]);
        assert!(Shape::Cycle.generate(6).nodes().all(|n| Shape::Cycle.generate(6).degree(n) == 2));
    }

    #[test]
    fn test_star_and_complete() {
        let star = Shape::Star.generate(5);
        assert_eq!(star.degree(0), 4);
        assert_eq!(star.edges().len(), 4);

        let complete = Shape::Complete.generate(5);
        assert_eq!(complete.edges().len(), 10);
        assert_eq!(complete.edges()[0], (0, 1));
    }

    #[test]
    fn test_balanced_tree() {
        let tree = Shape::BalancedTree { branching: 2 }.generate(7);
        assert_eq!(tree.edges(), &[(0, 1), (0, 2), (1, 3), (1, 4), (2, 5), (2, 6)]);
        assert!(tree.is_connected());
        assert!(!Shape::BalancedTree { branching: 0 }.generate(3).is_connected());
    }

    #[test]
    fn test_closure_generator() {
        let pairs = |n: usize| TopologyGraph::new(n, (0..n / 2).map(|i| (2 * i, 2 * i + 1)).collect());
        let g = pairs.generate(4);
        assert_eq!(g.edges(), &[(0, 1), (2, 3)]);
        assert!(!g.is_connected());
    }

    #[test]
    fn test_shape_from_yaml() {
        let shape: Shape = serde_yaml::from_str("cycle").unwrap();
        assert_eq!(shape, Shape::Cycle);
        let shape: Shape = serde_yaml::from_str("balanced_tree:\n  branching: 3").unwrap();
        assert_eq!(shape, Shape::BalancedTree { branching: 3 });
    }
}
