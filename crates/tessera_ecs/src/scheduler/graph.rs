use std::collections::BTreeSet;

/// Ordering constraints between the systems of one phase.
//       j
//   - 0 1 2
//   0 0 1 0     0 runs before 1
// i 1 0 0 1     1 runs before 2
//   2 0 0 0
#[derive(Debug)]
pub struct DependencyGraph {
  edges: Vec<Vec<bool>>,
}

/// Sort key of a node: explicit order first, then registration sequence.
pub type NodeKey = (i32, u64);

impl DependencyGraph {
  pub fn new(nodes: usize) -> Self {
    Self {
      edges: vec![vec![false; nodes]; nodes],
    }
  }

  pub fn len(&self) -> usize {
    self.edges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.edges.is_empty()
  }

  /// `from` has to run before `to`.
  pub fn add_edge(&mut self, from: usize, to: usize) {
    if from != to {
      self.edges[from][to] = true;
    }
  }

  pub fn has_edge(&self, from: usize, to: usize) -> bool {
    self.edges[from][to]
  }

  fn successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
    self.edges[node]
      .iter()
      .enumerate()
      .filter_map(|(i, &e)| e.then_some(i))
  }

  fn predecessors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
    self
      .edges
      .iter()
      .enumerate()
      .filter_map(move |(i, row)| row[node].then_some(i))
  }

  /// Topological order, smallest key first among the ready nodes. On a cycle
  /// the nodes of one cycle are returned in execution order.
  pub fn sort(&self, keys: &[NodeKey]) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree = (0..self.len())
      .map(|n| self.predecessors(n).count())
      .collect::<Vec<_>>();

    let mut ready = in_degree
      .iter()
      .enumerate()
      .filter(|(_, &d)| d == 0)
      .map(|(n, _)| (keys[n], n))
      .collect::<BTreeSet<_>>();

    let mut order = Vec::with_capacity(self.len());
    while let Some((_, node)) = ready.pop_first() {
      order.push(node);

      for next in self.successors(node) {
        in_degree[next] -= 1;
        if in_degree[next] == 0 {
          ready.insert((keys[next], next));
        }
      }
    }

    if order.len() == self.len() {
      Ok(order)
    } else {
      Err(self.find_cycle(&in_degree))
    }
  }

  // Every node left with a positive in-degree has a predecessor that is left
  // as well, so walking predecessors has to revisit a node.
  fn find_cycle(&self, in_degree: &[usize]) -> Vec<usize> {
    let Some(start) = in_degree.iter().position(|&d| d > 0) else {
      return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
      let Some(prev) = self.predecessors(current).find(|&p| in_degree[p] > 0) else {
        return path;
      };

      if let Some(pos) = path.iter().position(|&n| n == prev) {
        let mut cycle = path.split_off(pos);
        cycle.reverse();
        return cycle;
      }

      path.push(prev);
      current = prev;
    }
  }

  /// Splits `order` into consecutive batches. A node starts a new batch when
  /// one of its direct predecessors or a node it conflicts with is already in
  /// the current one.
  pub fn batches(
    &self,
    order: &[usize],
    conflicts: impl Fn(usize, usize) -> bool,
  ) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();

    for &node in order {
      let fits = batches.last().is_some_and(|batch| {
        batch
          .iter()
          .all(|&other| !self.has_edge(other, node) && !conflicts(other, node))
      });

      match batches.last_mut() {
        Some(batch) if fits => batch.push(node),
        _ => batches.push(vec![node]),
      }
    }

    batches
  }
}
