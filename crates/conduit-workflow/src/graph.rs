use std::collections::VecDeque;

/// Index-based graph structure for traversal and analysis.
///
/// Nodes are addressed by their position in the flow's declaration order.
/// Adjacency lists keep edge declaration order.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Edge endpoints, in declaration order.
  edges: Vec<(usize, usize)>,
  /// node -> outgoing edge indices.
  outgoing: Vec<Vec<usize>>,
  /// node -> downstream nodes.
  adjacency: Vec<Vec<usize>>,
  /// node -> upstream nodes.
  reverse_adjacency: Vec<Vec<usize>>,
}

impl Graph {
  /// Build a graph over `node_count` nodes from `(source, target)` pairs.
  pub fn new(node_count: usize, edges: Vec<(usize, usize)>) -> Self {
    let mut outgoing = vec![Vec::new(); node_count];
    let mut adjacency = vec![Vec::new(); node_count];
    let mut reverse_adjacency = vec![Vec::new(); node_count];

    for (edge_idx, &(from, to)) in edges.iter().enumerate() {
      outgoing[from].push(edge_idx);
      adjacency[from].push(to);
      reverse_adjacency[to].push(from);
    }

    Self {
      edges,
      outgoing,
      adjacency,
      reverse_adjacency,
    }
  }

  pub fn node_count(&self) -> usize {
    self.adjacency.len()
  }

  pub fn downstream(&self, node: usize) -> &[usize] {
    &self.adjacency[node]
  }

  /// Upstream nodes in the order their edges were declared.
  pub fn upstream(&self, node: usize) -> &[usize] {
    &self.reverse_adjacency[node]
  }

  /// Find one edge closing a cycle, if any.
  ///
  /// Iterative DFS with an explicit recursion stack; the returned edge is the
  /// back edge that reaches a node still on the stack.
  pub fn find_cycle(&self) -> Option<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      Unvisited,
      OnStack,
      Done,
    }

    let mut marks = vec![Mark::Unvisited; self.node_count()];

    for start in 0..self.node_count() {
      if marks[start] != Mark::Unvisited {
        continue;
      }

      // (node, next outgoing edge position)
      let mut stack = vec![(start, 0usize)];
      marks[start] = Mark::OnStack;

      while let Some(frame) = stack.last_mut() {
        let (node, pos) = *frame;
        match self.outgoing[node].get(pos) {
          Some(&edge_idx) => {
            frame.1 += 1;
            let next = self.edges[edge_idx].1;
            match marks[next] {
              Mark::OnStack => return Some(edge_idx),
              Mark::Unvisited => {
                marks[next] = Mark::OnStack;
                stack.push((next, 0));
              }
              Mark::Done => {}
            }
          }
          None => {
            marks[node] = Mark::Done;
            stack.pop();
          }
        }
      }
    }

    None
  }

  /// Mark every node reachable from `start` (inclusive).
  pub fn reachable_from(&self, start: usize) -> Vec<bool> {
    let mut seen = vec![false; self.node_count()];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;

    while let Some(node) = queue.pop_front() {
      for &next in &self.adjacency[node] {
        if !seen[next] {
          seen[next] = true;
          queue.push_back(next);
        }
      }
    }

    seen
  }

  /// Group the included nodes by dependency depth.
  ///
  /// A node's depth is the length of the longest path reaching it from the
  /// included nodes without included predecessors. Nodes inside a layer are
  /// mutually independent and sorted by declaration order. The graph must be
  /// acyclic.
  pub fn layers(&self, included: &[bool]) -> Vec<Vec<usize>> {
    let mut in_degree = vec![0usize; self.node_count()];
    for &(from, to) in &self.edges {
      if included[from] && included[to] {
        in_degree[to] += 1;
      }
    }

    let mut depth = vec![0usize; self.node_count()];
    let mut queue: VecDeque<usize> = (0..self.node_count())
      .filter(|&idx| included[idx] && in_degree[idx] == 0)
      .collect();

    let mut layers: Vec<Vec<usize>> = Vec::new();
    while let Some(node) = queue.pop_front() {
      if layers.len() <= depth[node] {
        layers.resize_with(depth[node] + 1, Vec::new);
      }
      layers[depth[node]].push(node);

      for &next in &self.adjacency[node] {
        if !included[next] {
          continue;
        }
        depth[next] = depth[next].max(depth[node] + 1);
        in_degree[next] -= 1;
        if in_degree[next] == 0 {
          queue.push_back(next);
        }
      }
    }

    for layer in &mut layers {
      layer.sort_unstable();
    }
    layers
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_upstream_keeps_edge_order() {
    let graph = Graph::new(4, vec![(0, 1), (0, 2), (2, 3), (1, 3)]);

    assert_eq!(graph.upstream(3), &[2, 1]);
    assert_eq!(graph.downstream(0), &[1, 2]);
    assert!(graph.upstream(0).is_empty());
  }

  #[test]
  fn test_find_cycle_reports_back_edge() {
    let graph = Graph::new(3, vec![(0, 1), (1, 2), (2, 1)]);
    assert_eq!(graph.find_cycle(), Some(2));
  }

  #[test]
  fn test_self_loop_is_a_cycle() {
    let graph = Graph::new(2, vec![(0, 1), (1, 1)]);
    assert_eq!(graph.find_cycle(), Some(1));
  }

  #[test]
  fn test_diamond_has_no_cycle() {
    let graph = Graph::new(4, vec![(0, 1), (0, 2), (1, 3), (2, 3)]);
    assert_eq!(graph.find_cycle(), None);
  }

  #[test]
  fn test_layers_use_longest_path_depth() {
    // 0 -> 1 -> 2 -> 4, 0 -> 3 -> 4: node 4 waits for the longer chain.
    let graph = Graph::new(5, vec![(0, 1), (1, 2), (2, 4), (0, 3), (3, 4)]);
    let layers = graph.layers(&[true; 5]);

    assert_eq!(layers, vec![vec![0], vec![1, 3], vec![2], vec![4]]);
  }

  #[test]
  fn test_layers_skip_excluded_nodes() {
    let graph = Graph::new(3, vec![(0, 1), (2, 1)]);
    let layers = graph.layers(&[true, true, false]);

    assert_eq!(layers, vec![vec![0], vec![1]]);
  }

  #[test]
  fn test_reachable_from() {
    let graph = Graph::new(4, vec![(0, 1), (2, 3)]);
    assert_eq!(graph.reachable_from(0), vec![true, true, false, false]);
  }
}
