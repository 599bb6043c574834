use crate::distance::pairwise::DistanceMatrix;
use crate::make_error;
use crate::tree::neighbor_joining::neighbor_joining;
use crate::tree::reroot::{assign_node_names, root_at_normal_neighbor};
use crate::tree::tree::Tree;
use eyre::{Report, WrapErr};
use itertools::Itertools;
use log::info;
use std::collections::BTreeSet;

/// Infers the tree topology from pairwise distances and roots it next to the normal sample.
///
/// With exactly two samples the tree is a cherry `internal_1` with the normal sample at distance 0 and the other sample at
/// distance 1.
pub fn infer_tree_topology(matrix: &DistanceMatrix, normal_name: &str) -> Result<Tree, Report> {
  if matrix.index_of(normal_name).is_none() {
    return make_error!("Normal sample '{normal_name}' is not in the distance matrix");
  }

  let mut tree = if matrix.len() == 2 {
    info!("Only two samples present, skipping neighbor joining");
    two_sample_tree(matrix, normal_name)?
  } else {
    info!("Inferring tree topology with neighbor joining");
    let mut tree = neighbor_joining(matrix)?;
    root_at_normal_neighbor(&mut tree, normal_name)?;
    tree
  };

  assign_node_names(&mut tree)?;
  Ok(tree)
}

fn two_sample_tree(matrix: &DistanceMatrix, normal_name: &str) -> Result<Tree, Report> {
  let mut tree = Tree::new();
  let root = tree.add_node(None);
  for label in matrix.labels() {
    let length = if label == normal_name { 0.0 } else { 1.0 };
    let node = tree.add_node(Some(label.clone()));
    tree.add_edge(root, node, length)?;
  }
  tree.build()?;
  Ok(tree)
}

/// Checks a user-supplied tree against the samples and roots it next to the normal sample.
///
/// Every named node whose name does not contain "internal" must be a sample, and every sample must be in the tree.
pub fn prepare_input_tree(mut tree: Tree, samples: &[String], normal_name: &str) -> Result<Tree, Report> {
  let duplicated = tree
    .keys()
    .filter_map(|key| tree.name_of(key))
    .filter(|name| !name.is_empty())
    .duplicates()
    .collect_vec();
  if !duplicated.is_empty() {
    return make_error!("Node names of the input tree must be unique, but found duplicates: [{}]", duplicated.join(", "));
  }

  let tree_names = tree
    .keys()
    .filter_map(|key| tree.name_of(key))
    .filter(|name| !name.is_empty() && !name.contains("internal"))
    .map(ToOwned::to_owned)
    .collect::<BTreeSet<_>>();
  let sample_names = samples.iter().cloned().collect::<BTreeSet<_>>();

  if tree_names != sample_names {
    let only_tree = tree_names.difference(&sample_names).join(", ");
    let only_samples = sample_names.difference(&tree_names).join(", ");
    return make_error!(
      "Names in the input tree do not match the sample names.\n  In the tree only: [{only_tree}]\n  In the data only: [{only_samples}]"
    );
  }

  if let Some(unnamed) = tree.leaves().into_iter().find(|&key| tree.name_of(key).map_or(true, str::is_empty)) {
    return make_error!("Input tree contains an unnamed leaf (node {unnamed})");
  }

  root_at_normal_neighbor(&mut tree, normal_name).wrap_err("When rooting the input tree")?;
  assign_node_names(&mut tree)?;
  Ok(tree)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::o;
  use crate::tree::reroot::root_with_outgroup;
  use ndarray::array;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn matrix() -> Result<DistanceMatrix, Report> {
    DistanceMatrix::new(
      vec![o!("diploid"), o!("a"), o!("b"), o!("c")],
      array![
        [0.0, 3.0, 5.0, 3.0],
        [3.0, 0.0, 6.0, 4.0],
        [5.0, 6.0, 0.0, 4.0],
        [3.0, 4.0, 4.0, 0.0],
      ],
    )
  }

  #[rstest]
  fn normal_is_child_of_root() -> Result<(), Report> {
    let tree = infer_tree_topology(&matrix()?, "diploid")?;
    let normal = tree.find_by_name("diploid").unwrap();
    assert_eq!(tree.parent_of(normal), Some(tree.root()?));
    assert!(tree.internal_nodes().iter().all(|&key| tree.name_of(key).unwrap().starts_with("internal_")));
    Ok(())
  }

  #[rstest]
  fn outgroup_rooting_adds_unnamed_root() -> Result<(), Report> {
    let mut tree = infer_tree_topology(&matrix()?, "diploid")?;
    let before = tree.total_branch_length();
    let old_root = tree.root()?;
    root_with_outgroup(&mut tree, "diploid")?;

    let root = tree.root()?;
    let normal = tree.find_by_name("diploid").unwrap();
    assert_eq!(tree.name_of(root), None);
    assert_eq!(tree.children_of(root), &[normal, old_root]);
    assert_eq!(tree.branch_length(normal), 0.0);
    assert_eq!(tree.total_branch_length(), before);
    Ok(())
  }

  #[rstest]
  fn two_samples_give_cherry() -> Result<(), Report> {
    let matrix = DistanceMatrix::new(vec![o!("diploid"), o!("t")], array![[0.0, 7.0], [7.0, 0.0]])?;
    let mut tree = infer_tree_topology(&matrix, "diploid")?;
    root_with_outgroup(&mut tree, "diploid")?;
    let root = tree.root()?;
    assert_eq!(tree.name_of(root), Some("internal_1"));
    assert_eq!(tree.branch_length(tree.find_by_name("diploid").unwrap()), 0.0);
    assert_eq!(tree.branch_length(tree.find_by_name("t").unwrap()), 1.0);
    Ok(())
  }

  fn supplied_tree() -> Result<Tree, Report> {
    // ((diploid:1,a:2):1,(b:1,c:1):2)
    let mut tree = Tree::new();
    let root = tree.add_node(None);
    let x = tree.add_node(None);
    let y = tree.add_node(None);
    tree.add_edge(root, x, 1.0)?;
    tree.add_edge(root, y, 2.0)?;
    for (parent, name, length) in [(x, "diploid", 1.0), (x, "a", 2.0), (y, "b", 1.0), (y, "c", 1.0)] {
      let leaf = tree.add_node(Some(o!(name)));
      tree.add_edge(parent, leaf, length)?;
    }
    tree.build()?;
    Ok(tree)
  }

  #[rstest]
  fn supplied_tree_is_rerooted_next_to_normal() -> Result<(), Report> {
    let samples = vec![o!("diploid"), o!("a"), o!("b"), o!("c")];
    let tree = prepare_input_tree(supplied_tree()?, &samples, "diploid")?;
    let root = tree.root()?;
    let normal = tree.find_by_name("diploid").unwrap();
    assert_eq!(tree.parent_of(normal), Some(root));
    assert_eq!(tree.children_of(root).len(), 3);
    assert_eq!(tree.total_branch_length(), 8.0);
    assert!(tree.keys().all(|key| tree.name_of(key).is_some()));
    Ok(())
  }

  #[rstest]
  fn supplied_tree_must_match_samples() -> Result<(), Report> {
    let samples = vec![o!("diploid"), o!("a"), o!("b"), o!("d")];
    let err = prepare_input_tree(supplied_tree()?, &samples, "diploid").unwrap_err();
    assert!(err.to_string().contains("In the tree only: [c]"));
    Ok(())
  }
}
