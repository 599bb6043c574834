use crate::distance::pairwise::DistanceMatrix;
use crate::make_error;
use crate::tree::tree::{NodeKey, Tree};
use eyre::Report;
use itertools::Itertools;
use ndarray::Array2;

/// Builds a tree from a distance matrix with the neighbor-joining method.
///
/// Leaves are named after the matrix labels, internal nodes are left unnamed. The result is rooted at the node created by
/// the last join. Negative branch lengths are set to zero.
pub fn neighbor_joining(matrix: &DistanceMatrix) -> Result<Tree, Report> {
  if matrix.is_empty() {
    return make_error!("Neighbor joining requires at least one sample");
  }

  let mut tree = Tree::new();
  let mut active = matrix
    .labels()
    .iter()
    .map(|label| tree.add_node(Some(label.clone())))
    .collect_vec();
  let mut dist = matrix.values().clone();

  while active.len() > 3 {
    let m = active.len();
    let r = (0..m).map(|i| dist.row(i).sum()).collect_vec();
    let q = |i: usize, j: usize| (m as f64 - 2.0) * dist[[i, j]] - r[i] - r[j];

    let Some((i, j)) = (0..m)
      .tuple_combinations()
      .min_by(|&(a, b), &(c, d)| q(a, b).total_cmp(&q(c, d)))
    else {
      return make_error!("Neighbor joining: no pair to join");
    };

    let d_ij = dist[[i, j]];
    let length_i = d_ij / 2.0 + (r[i] - r[j]) / (2.0 * (m as f64 - 2.0));
    let length_j = d_ij - length_i;

    let joined = tree.add_node(None);
    tree.add_edge(joined, active[i], length_i.max(0.0))?;
    tree.add_edge(joined, active[j], length_j.max(0.0))?;

    let keep = (0..m).filter(|&k| k != i && k != j).collect_vec();
    let to_joined = keep
      .iter()
      .map(|&k| (dist[[i, k]] + dist[[j, k]] - d_ij) / 2.0)
      .collect_vec();

    let n = keep.len() + 1;
    dist = Array2::from_shape_fn((n, n), |(a, b)| match (a == n - 1, b == n - 1) {
      (true, true) => 0.0,
      (true, false) => to_joined[b],
      (false, true) => to_joined[a],
      (false, false) => dist[[keep[a], keep[b]]],
    });
    active = keep.iter().map(|&k| active[k]).chain([joined]).collect_vec();
  }

  join_remaining(&mut tree, &active, &dist)?;
  tree.build()?;
  Ok(tree)
}

fn join_remaining(tree: &mut Tree, active: &[NodeKey], dist: &Array2<f64>) -> Result<(), Report> {
  match active {
    [_] => Ok(()),
    [a, b] => {
      let center = tree.add_node(None);
      let half = dist[[0, 1]] / 2.0;
      tree.add_edge(center, *a, half.max(0.0))?;
      tree.add_edge(center, *b, half.max(0.0))
    }
    [_, _, _] => {
      let center = tree.add_node(None);
      for (i, &node) in active.iter().enumerate() {
        let (j, k) = ((i + 1) % 3, (i + 2) % 3);
        let length = (dist[[i, j]] + dist[[i, k]] - dist[[j, k]]) / 2.0;
        tree.add_edge(center, node, length.max(0.0))?;
      }
      Ok(())
    }
    _ => make_error!("Neighbor joining: unexpected number of remaining nodes: {}", active.len()),
  }
}
