use crate::{make_error, make_report};
use crate::tree::tree::{NodeKey, Tree};
use eyre::{Report, WrapErr};
use itertools::Itertools;
use log::debug;
use std::collections::HashSet;

/// Makes `new_root` the root of the tree by inverting every branch on the path from the current root
pub fn reroot_at(tree: &mut Tree, new_root: NodeKey) -> Result<(), Report> {
  let path = tree.path_from_root(new_root);
  for (&parent, &child) in path.iter().tuple_windows() {
    tree.invert_edge(parent, child)?;
  }
  Ok(())
}

/// Removes nodes with exactly one child, merging their branch into the child's branch
pub fn collapse_unifurcations(tree: &mut Tree) -> Result<(), Report> {
  let unifurcations = tree
    .keys()
    .filter(|&key| tree.children_of(key).len() == 1)
    .collect_vec();

  for key in unifurcations {
    debug!("Removing unifurcation at node '{}'", tree.name_of(key).unwrap_or_default());
    tree.splice_out(key)?;
  }
  Ok(())
}

/// Roots the tree at the node adjacent to the normal sample, so that the normal sample becomes a direct child of the root
pub fn root_at_normal_neighbor(tree: &mut Tree, normal_name: &str) -> Result<(), Report> {
  let normal = tree
    .find_by_name(normal_name)
    .ok_or_else(|| make_report!("Normal sample '{normal_name}' not found in the tree"))?;

  let neighbor = match (tree.parent_of(normal), tree.children_of(normal)) {
    (Some(parent), _) => parent,
    (None, [child]) => *child,
    (None, _) => return make_error!("Normal sample '{normal_name}' must be a leaf of the tree"),
  };

  reroot_at(tree, neighbor).wrap_err_with(|| format!("When rooting the tree next to '{normal_name}'"))?;
  collapse_unifurcations(tree)?;

  if !tree.is_leaf(normal) {
    return make_error!("Normal sample '{normal_name}' must be a leaf of the tree");
  }
  Ok(())
}

/// Places the root on the branch leading to `outgroup`, which must be a child of the current root.
///
/// The new root is unnamed. The outgroup hangs from it with a zero-length branch and the old root takes over the outgroup's
/// former branch length. Trees whose root already has exactly two children, one of them the outgroup, are left unchanged.
pub fn root_with_outgroup(tree: &mut Tree, outgroup_name: &str) -> Result<(), Report> {
  let root = tree.root()?;
  let outgroup = tree
    .find_by_name(outgroup_name)
    .ok_or_else(|| make_report!("Outgroup '{outgroup_name}' not found in the tree"))?;

  if tree.parent_of(outgroup) != Some(root) {
    return make_error!("Outgroup '{outgroup_name}' must be a direct child of the root");
  }
  if tree.children_of(root).len() <= 2 {
    return Ok(());
  }

  let length = tree.branch_length(outgroup);
  tree.detach(outgroup)?;
  let new_root = tree.add_node(None);
  tree.add_edge(new_root, outgroup, 0.0)?;
  tree.add_edge(new_root, root, length)?;
  tree.build()
}

/// Gives every unnamed node a unique name `internal_<n>`, numbered in preorder
pub fn assign_node_names(tree: &mut Tree) -> Result<(), Report> {
  let mut names = tree
    .keys()
    .filter_map(|key| tree.name_of(key).map(ToOwned::to_owned))
    .collect::<HashSet<String>>();

  let mut counter = 1;
  for key in tree.preorder() {
    if tree.name_of(key).map_or(false, |name| !name.is_empty()) {
      continue;
    }
    let mut name = format!("internal_{counter}");
    while names.contains(&name) {
      counter += 1;
      name = format!("internal_{counter}");
    }
    names.insert(name.clone());
    tree.node_mut(key)?.name = Some(name);
    counter += 1;
  }
  Ok(())
}
