use crate::io::file::{create_file_or_stdout, open_file_or_stdin};
use crate::make_error;
use crate::tree::tree::{NodeKey, Tree};
use crate::utils::float_fmt::float_to_digits;
use bio::io::newick;
use eyre::{eyre, Report, WrapErr};
use indexmap::IndexMap;
use log::warn;
use petgraph::visit::{EdgeRef, IntoNodeReferences};
use petgraph::Direction;
use smart_default::SmartDefault;
use std::io::{Cursor, Read, Write};
use std::path::Path;

pub fn read_nwk(reader: impl Read) -> Result<bio_types::phylogeny::Tree, Report> {
  let mut nwk_tree = newick::read(reader)?;

  nwk_tree.g.node_weights_mut().for_each(|weight| {
    if weight == "N/A" {
      *weight = "".to_owned();
    }
  });

  Ok(nwk_tree)
}

pub fn create_tree_from_nwk_file(filepath: impl AsRef<Path>) -> Result<Tree, Report> {
  let filepath = filepath.as_ref();
  create_tree_from_nwk_reader(open_file_or_stdin(&Some(filepath))?)
    .wrap_err_with(|| format!("When reading file '{filepath:#?}'"))
}

pub fn create_tree_from_nwk_str(nwk_string: impl AsRef<str>) -> Result<Tree, Report> {
  let nwk_string = nwk_string.as_ref();
  create_tree_from_nwk_reader(Cursor::new(nwk_string))
    .wrap_err_with(|| format!("When reading Newick string:\n    '{nwk_string}'"))
}

pub fn create_tree_from_nwk_reader(s: impl Read) -> Result<Tree, Report> {
  let nwk_tree = read_nwk(s).wrap_err("When parsing Newick")?;

  let mut tree = Tree::new();

  // Map of `nwk` node indices to tree node keys
  let mut index_map = IndexMap::<usize, NodeKey>::new();
  for (nwk_idx, nwk_node) in nwk_tree.g.node_references() {
    let name = (!nwk_node.is_empty()).then(|| nwk_node.clone());
    index_map.insert(nwk_idx.index(), tree.add_node(name));
  }

  for nwk_idx in nwk_tree.g.node_indices() {
    let parent = index_map[&nwk_idx.index()];
    let mut children = nwk_tree
      .g
      .edges_directed(nwk_idx, Direction::Outgoing)
      .map(|edge| (edge.id().index(), edge.target(), *edge.weight()))
      .collect::<Vec<_>>();
    // Newick order of children
    children.sort_by_key(|(edge_idx, _, _)| *edge_idx);

    for (edge_idx, target, weight) in children {
      let child = index_map
        .get(&target.index())
        .ok_or_else(|| eyre!("When inserting branch {edge_idx}: Node with index {} not found.", target.index()))?;
      tree.add_edge(parent, *child, f64::from(weight))?;
    }
  }

  tree.build()?;
  Ok(tree)
}

#[derive(Clone, SmartDefault)]
pub struct WriteNwkOptions {
  /// Format branch lengths keeping this many significant digits
  pub weight_significant_digits: Option<u8>,

  /// Format branch lengths keeping this many decimal digits
  pub weight_decimal_digits: Option<i8>,
}

pub fn write_nwk_file(filepath: impl AsRef<Path>, tree: &Tree, options: &WriteNwkOptions) -> Result<(), Report> {
  let filepath = filepath.as_ref();
  let mut f = create_file_or_stdout(filepath)?;
  write_nwk_writer(&mut f, tree, options).wrap_err_with(|| format!("When writing Newick file {filepath:#?}"))?;
  writeln!(f)?;
  f.flush()?;
  Ok(())
}

pub fn write_nwk_str(tree: &Tree, options: &WriteNwkOptions) -> Result<String, Report> {
  let mut buf = Vec::new();
  write_nwk_writer(&mut buf, tree, options)?;
  Ok(String::from_utf8(buf)?)
}

pub fn write_nwk_writer(writer: &mut impl Write, tree: &Tree, options: &WriteNwkOptions) -> Result<(), Report> {
  let Ok(root) = tree.root() else {
    return make_error!("When converting tree to Newick format: No root found.");
  };

  let mut stack: Vec<(NodeKey, usize)> = vec![(root, 0)];
  while let Some((node, child_visit)) = stack.pop() {
    let children = tree.children_of(node);

    if child_visit < children.len() {
      stack.push((node, child_visit + 1));

      if child_visit == 0 {
        write!(writer, "(")?;
      } else {
        write!(writer, ",")?;
      }

      stack.push((children[child_visit], 0));
    } else {
      if child_visit > 0 {
        write!(writer, ")")?;
      }

      write!(writer, "{}", tree.name_of(node).unwrap_or_default())?;

      if node != root {
        write!(writer, ":{}", format_weight(tree.branch_length(node), options))?;
      }
    }
  }

  write!(writer, ";")?;

  Ok(())
}

pub fn format_weight(weight: f64, options: &WriteNwkOptions) -> String {
  if !weight.is_finite() {
    warn!("When converting tree to Newick: Branch length is invalid: '{weight}'");
  }
  float_to_digits(weight, options.weight_significant_digits, options.weight_decimal_digits)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn test_nwk_read_write() -> Result<(), Report> {
    let input = "((A:1,B:2)AB:1,(C:0.5,D:3)CD:0.25)root;";
    let tree = create_tree_from_nwk_str(input)?;
    let output = write_nwk_str(&tree, &WriteNwkOptions::default())?;
    assert_eq!(input, output);
    Ok(())
  }

  #[rstest]
  fn reads_unnamed_internal_nodes() -> Result<(), Report> {
    let tree = create_tree_from_nwk_str("((a:1,b:1):2,c:3);")?;
    assert_eq!(tree.name_of(tree.root()?), None);
    assert_eq!(tree.leaves().len(), 3);
    assert_eq!(tree.internal_nodes().len(), 2);
    assert_eq!(tree.total_branch_length(), 7.0);
    Ok(())
  }

  #[rstest]
  fn writes_unnamed_root() -> Result<(), Report> {
    let mut tree = Tree::new();
    let root = tree.add_node(None);
    let a = tree.add_node(Some("a".to_owned()));
    let b = tree.add_node(Some("b".to_owned()));
    tree.add_edge(root, a, 0.0)?;
    tree.add_edge(root, b, 12.0)?;
    tree.build()?;
    assert_eq!(write_nwk_str(&tree, &WriteNwkOptions::default())?, "(a:0,b:12);");
    Ok(())
  }
}
