use crate::{make_error, make_internal_error, make_internal_report};
use eyre::Report;
use itertools::Itertools;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(pub usize);

impl Display for NodeKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TreeNode {
  pub name: Option<String>,
  /// Length of the branch from the parent. Zero for the root.
  pub branch_length: f64,
  parent: Option<NodeKey>,
  children: Vec<NodeKey>,
}

impl TreeNode {
  pub fn name_or_empty(&self) -> &str {
    self.name.as_deref().unwrap_or_default()
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }
}

/// Rooted tree with ordered children. Branch lengths are stored on the child node of each branch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
  nodes: Vec<Option<TreeNode>>,
  root: Option<NodeKey>,
}

impl Tree {
  pub const fn new() -> Self {
    Self {
      nodes: vec![],
      root: None,
    }
  }

  pub fn add_node(&mut self, name: Option<String>) -> NodeKey {
    let key = NodeKey(self.nodes.len());
    self.nodes.push(Some(TreeNode {
      name,
      branch_length: 0.0,
      parent: None,
      children: vec![],
    }));
    key
  }

  pub fn add_edge(&mut self, parent: NodeKey, child: NodeKey, branch_length: f64) -> Result<(), Report> {
    if parent == child {
      return make_error!("When adding branch: node {parent} cannot be its own parent");
    }
    if let Some(existing) = self.node(child)?.parent {
      return make_error!("When adding branch {parent} -> {child}: node {child} already has parent {existing}");
    }
    self.node_mut(parent)?.children.push(child);
    let child_node = self.node_mut(child)?;
    child_node.parent = Some(parent);
    child_node.branch_length = branch_length;
    Ok(())
  }

  /// Recalculates the root. The tree must be connected and have exactly one root.
  pub fn build(&mut self) -> Result<(), Report> {
    let roots = self.keys().filter(|&key| self.nodes[key.0].as_ref().map_or(false, |node| node.parent.is_none())).collect_vec();
    match roots.as_slice() {
      [root] => {
        self.root = Some(*root);
        if let Some(node) = self.nodes[root.0].as_mut() {
          node.branch_length = 0.0;
        }
      }
      [] => return make_error!("When building tree: no root found"),
      _ => return make_error!("When building tree: multiple roots found: {}", roots.iter().join(", ")),
    }

    let reachable = self.preorder().len();
    let total = self.keys().count();
    if reachable != total {
      return make_error!("When building tree: {} of {total} nodes are not connected to the root", total - reachable);
    }
    Ok(())
  }

  pub fn root(&self) -> Result<NodeKey, Report> {
    self
      .root
      .ok_or_else(|| make_internal_report!("Tree has no root. Was the tree built?"))
  }

  pub fn node(&self, key: NodeKey) -> Result<&TreeNode, Report> {
    self
      .nodes
      .get(key.0)
      .and_then(Option::as_ref)
      .ok_or_else(|| make_internal_report!("Node {key} not found"))
  }

  pub fn node_mut(&mut self, key: NodeKey) -> Result<&mut TreeNode, Report> {
    self
      .nodes
      .get_mut(key.0)
      .and_then(Option::as_mut)
      .ok_or_else(|| make_internal_report!("Node {key} not found"))
  }

  /// Keys of all nodes in insertion order
  pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
    self
      .nodes
      .iter()
      .enumerate()
      .filter(|(_, node)| node.is_some())
      .map(|(i, _)| NodeKey(i))
  }

  pub fn children_of(&self, key: NodeKey) -> &[NodeKey] {
    self.node(key).map_or(&[], |node| node.children.as_slice())
  }

  pub fn parent_of(&self, key: NodeKey) -> Option<NodeKey> {
    self.node(key).ok().and_then(|node| node.parent)
  }

  pub fn name_of(&self, key: NodeKey) -> Option<&str> {
    self.node(key).ok().and_then(|node| node.name.as_deref())
  }

  pub fn branch_length(&self, key: NodeKey) -> f64 {
    self.node(key).map_or(0.0, |node| node.branch_length)
  }

  pub fn set_branch_length(&mut self, key: NodeKey, branch_length: f64) -> Result<(), Report> {
    self.node_mut(key)?.branch_length = branch_length;
    Ok(())
  }

  pub fn find_by_name(&self, name: &str) -> Option<NodeKey> {
    self.keys().find(|&key| self.name_of(key) == Some(name))
  }

  pub fn is_leaf(&self, key: NodeKey) -> bool {
    self.children_of(key).is_empty()
  }

  pub fn leaves(&self) -> Vec<NodeKey> {
    self.preorder().into_iter().filter(|&key| self.is_leaf(key)).collect()
  }

  pub fn internal_nodes(&self) -> Vec<NodeKey> {
    self.preorder().into_iter().filter(|&key| !self.is_leaf(key)).collect()
  }

  /// Parents before children, children in their stored order
  pub fn preorder(&self) -> Vec<NodeKey> {
    let mut order = vec![];
    let mut stack = self.root.into_iter().collect_vec();
    while let Some(key) = stack.pop() {
      order.push(key);
      stack.extend(self.children_of(key).iter().rev().copied());
    }
    order
  }

  /// Children before parents
  pub fn postorder(&self) -> Vec<NodeKey> {
    let mut order = vec![];
    let mut stack = self.root.map(|root| (root, false)).into_iter().collect_vec();
    while let Some((key, expanded)) = stack.pop() {
      if expanded {
        order.push(key);
      } else {
        stack.push((key, true));
        stack.extend(self.children_of(key).iter().rev().map(|&child| (child, false)));
      }
    }
    order
  }

  /// Nodes from the root down to `key`, both included
  pub fn path_from_root(&self, key: NodeKey) -> Vec<NodeKey> {
    let mut path = vec![key];
    let mut current = key;
    while let Some(parent) = self.parent_of(current) {
      path.push(parent);
      current = parent;
    }
    path.reverse();
    path
  }

  pub fn total_branch_length(&self) -> f64 {
    self.keys().map(|key| self.branch_length(key)).sum()
  }

  /// Reverses the branch between the root `parent` and its `child`, making `child` the new root.
  /// The branch keeps its length.
  pub fn invert_edge(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), Report> {
    if self.root != Some(parent) {
      return make_internal_error!("When inverting branch: node {parent} is not the root");
    }
    if self.parent_of(child) != Some(parent) {
      return make_error!("When inverting branch: node {parent} is not the parent of node {child}");
    }
    let branch_length = self.branch_length(child);

    self.node_mut(parent)?.children.retain(|&c| c != child);
    let child_node = self.node_mut(child)?;
    child_node.parent = None;
    child_node.branch_length = 0.0;
    self.root = Some(child);

    self.add_edge(child, parent, branch_length)
  }

  /// Disconnects `key` from its parent. The node keeps its subtree and becomes parentless.
  pub fn detach(&mut self, key: NodeKey) -> Result<(), Report> {
    let Some(parent) = self.parent_of(key) else {
      return make_error!("When detaching node {key}: node has no parent");
    };
    self.node_mut(parent)?.children.retain(|&c| c != key);
    let node = self.node_mut(key)?;
    node.parent = None;
    node.branch_length = 0.0;
    Ok(())
  }

  /// Removes a node with a single child, connecting its parent (if any) directly to the child
  pub fn splice_out(&mut self, key: NodeKey) -> Result<(), Report> {
    let child = match self.children_of(key) {
      [child] => *child,
      children => {
        return make_error!(
          "When removing node {key}: expected exactly one child, found {}",
          children.len()
        )
      }
    };

    let parent = self.parent_of(key);
    let length = self.branch_length(key) + self.branch_length(child);

    let child_node = self.node_mut(child)?;
    child_node.parent = None;
    child_node.branch_length = 0.0;

    if let Some(parent) = parent {
      let parent_node = self.node_mut(parent)?;
      let pos = parent_node
        .children
        .iter()
        .position(|&c| c == key)
        .ok_or_else(|| make_internal_report!("Node {key} is not a child of its parent {parent}"))?;
      parent_node.children[pos] = child;
      let child_node = self.node_mut(child)?;
      child_node.parent = Some(parent);
      child_node.branch_length = length;
    } else {
      self.root = Some(child);
    }

    self.nodes[key.0] = None;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::o;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  // (root,(a:1,(b:2,c:3)x:4))
  fn small_tree() -> Result<(Tree, [NodeKey; 5]), Report> {
    let mut tree = Tree::new();
    let root = tree.add_node(Some(o!("root")));
    let a = tree.add_node(Some(o!("a")));
    let x = tree.add_node(Some(o!("x")));
    let b = tree.add_node(Some(o!("b")));
    let c = tree.add_node(Some(o!("c")));
    tree.add_edge(root, a, 1.0)?;
    tree.add_edge(root, x, 4.0)?;
    tree.add_edge(x, b, 2.0)?;
    tree.add_edge(x, c, 3.0)?;
    tree.build()?;
    Ok((tree, [root, a, x, b, c]))
  }

  fn names(tree: &Tree, keys: &[NodeKey]) -> Vec<String> {
    keys.iter().map(|&key| tree.name_of(key).unwrap_or_default().to_owned()).collect()
  }

  #[rstest]
  fn traverses_in_order() -> Result<(), Report> {
    let (tree, _) = small_tree()?;
    assert_eq!(names(&tree, &tree.preorder()), vec!["root", "a", "x", "b", "c"]);
    assert_eq!(names(&tree, &tree.postorder()), vec!["a", "b", "c", "x", "root"]);
    assert_eq!(names(&tree, &tree.leaves()), vec!["a", "b", "c"]);
    assert_eq!(tree.total_branch_length(), 10.0);
    Ok(())
  }

  #[rstest]
  fn rejects_multiple_roots() {
    let mut tree = Tree::new();
    tree.add_node(Some(o!("a")));
    tree.add_node(Some(o!("b")));
    assert!(tree.build().is_err());
  }

  #[rstest]
  fn rejects_second_parent() -> Result<(), Report> {
    let (mut tree, [root, _, x, b, _]) = small_tree()?;
    assert!(tree.add_edge(root, b, 1.0).is_err());
    assert!(tree.add_edge(x, x, 1.0).is_err());
    Ok(())
  }

  #[rstest]
  fn inverts_root_edge() -> Result<(), Report> {
    let (mut tree, [root, _, x, _, _]) = small_tree()?;
    tree.invert_edge(root, x)?;
    assert_eq!(tree.root()?, x);
    assert_eq!(tree.parent_of(root), Some(x));
    assert_eq!(tree.branch_length(root), 4.0);
    assert_eq!(tree.total_branch_length(), 10.0);
    Ok(())
  }

  #[rstest]
  fn splices_out_unifurcation() -> Result<(), Report> {
    let (mut tree, [root, a, x, _, _]) = small_tree()?;
    tree.invert_edge(root, x)?;
    tree.splice_out(root)?;
    assert_eq!(tree.parent_of(a), Some(x));
    assert_eq!(tree.branch_length(a), 5.0);
    assert_eq!(tree.find_by_name("root"), None);
    assert_eq!(names(&tree, &tree.preorder()), vec!["x", "b", "c", "a"]);
    Ok(())
  }
}
