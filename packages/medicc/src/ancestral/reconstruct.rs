use crate::distance::engine::DistanceEngine;
use crate::encode::encoder::decode_profile;
use crate::encode::profile::CopyNumberTable;
use crate::model::cost_model::{CostModel, Unreachable};
use crate::tree::tree::{NodeKey, Tree};
use crate::{make_error, make_internal_report, make_report};
use eyre::{Report, WrapErr};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::{debug, info};
use std::collections::HashMap;

/// Encoded profiles of every node of the tree: the observed samples followed by the reconstructed ancestors
pub type AncestorTable = IndexMap<String, String>;

fn node_name(tree: &Tree, key: NodeKey) -> Result<&str, Report> {
  tree
    .name_of(key)
    .ok_or_else(|| make_internal_report!("Node {key} has no name. Node names must be assigned before reconstruction"))
}

fn profile_of<'a>(profiles: &'a AncestorTable, name: &str) -> Result<&'a str, Report> {
  profiles
    .get(name)
    .map(String::as_str)
    .ok_or_else(|| make_internal_report!("No profile for node '{name}'"))
}

/// Internal nodes with more children than this are not solved with the lattice directly
pub const MAX_LATTICE_CHILDREN: usize = 2;

/// Reconstructs the profiles of all internal nodes, minimizing the summed cost of all branches.
///
/// A bottom-up pass solves every internal node from the current estimates of its children. These estimates, the
/// normal sample and the estimates of the neighbouring nodes form a small candidate set per node. A Sankoff pass over
/// the candidate sets then picks the assignment with the lowest total cost, with the normal sample as the parent of
/// the root. Ties keep the bottom-up estimate.
pub fn reconstruct_ancestors(
  tree: &Tree,
  samples: &IndexMap<String, String>,
  engine: &DistanceEngine,
  normal_name: &str,
  prune_weight: f64,
) -> Result<AncestorTable, Report> {
  let mut profiles: AncestorTable = samples.clone();
  let root = tree.root()?;
  let normal = profile_of(samples, normal_name)?.to_owned();

  if tree.leaves().len() == 2 {
    let root_name = node_name(tree, root)?;
    debug!("Two samples: ancestor '{root_name}' equals the normal sample");
    profiles.insert(root_name.to_owned(), normal);
    return Ok(profiles);
  }

  let internal = tree.postorder().into_iter().filter(|&key| !tree.is_leaf(key)).collect_vec();
  info!("Reconstructing {} ancestors", internal.len());

  let estimates = estimate_ancestors(tree, &internal, samples, engine.model(), &normal, normal_name, prune_weight)?;
  let candidates = candidate_sets(tree, &internal, &estimates, &normal, normal_name)?;
  let costs = subtree_costs(tree, &internal, &candidates, engine, normal_name)?;

  let (root_choice, total) = cheapest(&candidates[&root], &costs[&root], |x| engine.score(&normal, x))?
    .ok_or_else(|| make_report!("No valid ancestor exists for the root under the cost model"))?;
  info!("Total cost of the reconstructed tree: {total}");

  let mut chosen: HashMap<NodeKey, usize> = HashMap::from([(root, root_choice)]);
  for key in tree.preorder() {
    let Some(&choice) = chosen.get(&key) else {
      continue;
    };
    let ancestor = &candidates[&key][choice];
    for child in non_normal_children(tree, key, normal_name)? {
      if tree.is_leaf(child) {
        continue;
      }
      let (child_choice, _) = cheapest(&candidates[&child], &costs[&child], |y| engine.score(ancestor, y))?
        .ok_or_else(|| make_internal_report!("Lost the cheapest profile of node {child} during traceback"))?;
      chosen.insert(child, child_choice);
    }
  }

  for &key in &internal {
    let choice = chosen
      .get(&key)
      .ok_or_else(|| make_internal_report!("Node {key} was not reached during traceback"))?;
    profiles.insert(node_name(tree, key)?.to_owned(), candidates[&key][*choice].clone());
  }
  Ok(profiles)
}

fn non_normal_children(tree: &Tree, key: NodeKey, normal_name: &str) -> Result<Vec<NodeKey>, Report> {
  let mut children = vec![];
  for &child in tree.children_of(key) {
    if node_name(tree, child)? != normal_name {
      children.push(child);
    }
  }
  Ok(children)
}

/// Bottom-up lattice estimate of every internal node from the estimates of its children
fn estimate_ancestors(
  tree: &Tree,
  internal: &[NodeKey],
  samples: &IndexMap<String, String>,
  model: &dyn CostModel,
  normal: &str,
  normal_name: &str,
  prune_weight: f64,
) -> Result<HashMap<NodeKey, String>, Report> {
  let mut estimates = HashMap::new();
  for key in tree.leaves() {
    estimates.insert(key, profile_of(samples, node_name(tree, key)?)?.to_owned());
  }

  for &key in internal {
    let name = node_name(tree, key)?;
    let children = non_normal_children(tree, key, normal_name)?
      .iter()
      .map(|child| {
        estimates
          .get(child)
          .map(String::as_str)
          .ok_or_else(|| make_internal_report!("Node {child} visited before its parent"))
      })
      .collect::<Result<Vec<_>, Report>>()?;

    let estimate = if children.is_empty() || children.len() > MAX_LATTICE_CHILDREN {
      debug!("Ancestor '{name}' has {} children, starting from the normal sample", children.len());
      normal.to_owned()
    } else {
      match model.reconstruct(None, &children, prune_weight) {
        Ok(reconstruction) => {
          debug!("Ancestor '{name}' estimated with cost {}", reconstruction.cost);
          reconstruction.ancestor
        }
        Err(Unreachable) => {
          debug!("Ancestor '{name}' has no common ancestor of its children, starting from the normal sample");
          normal.to_owned()
        }
      }
    };
    estimates.insert(key, estimate);
  }
  Ok(estimates)
}

/// Own estimate first, then the normal sample, the parent's estimate and the children's estimates
fn candidate_sets(
  tree: &Tree,
  internal: &[NodeKey],
  estimates: &HashMap<NodeKey, String>,
  normal: &str,
  normal_name: &str,
) -> Result<HashMap<NodeKey, Vec<String>>, Report> {
  let estimate_of = |key: NodeKey| -> Result<&String, Report> {
    estimates
      .get(&key)
      .ok_or_else(|| make_internal_report!("No estimate for node {key}"))
  };

  let mut candidates = HashMap::new();
  for key in tree.leaves() {
    candidates.insert(key, vec![estimate_of(key)?.clone()]);
  }
  for &key in internal {
    let mut set: IndexSet<String> = IndexSet::new();
    set.insert(estimate_of(key)?.clone());
    set.insert(normal.to_owned());
    if let Some(parent) = tree.parent_of(key) {
      set.insert(estimate_of(parent)?.clone());
    }
    for child in non_normal_children(tree, key, normal_name)? {
      set.insert(estimate_of(child)?.clone());
    }
    candidates.insert(key, set.into_iter().collect_vec());
  }
  Ok(candidates)
}

/// Cost of the cheapest subtree below every internal node, for each of its candidates. `None` if unreachable.
fn subtree_costs(
  tree: &Tree,
  internal: &[NodeKey],
  candidates: &HashMap<NodeKey, Vec<String>>,
  engine: &DistanceEngine,
  normal_name: &str,
) -> Result<HashMap<NodeKey, Vec<Option<f64>>>, Report> {
  let mut costs: HashMap<NodeKey, Vec<Option<f64>>> = HashMap::new();
  for key in tree.leaves() {
    costs.insert(key, vec![Some(0.0)]);
  }

  for &key in internal {
    let children = non_normal_children(tree, key, normal_name)?;
    let mut node_costs = Vec::with_capacity(candidates[&key].len());
    for x in &candidates[&key] {
      let mut total = Some(0.0);
      for child in &children {
        let best = cheapest(&candidates[child], &costs[child], |y| engine.score(x, y))?;
        total = match (total, best) {
          (Some(total), Some((_, cost))) => Some(total + cost),
          _ => None,
        };
      }
      node_costs.push(total);
    }
    costs.insert(key, node_costs);
  }
  Ok(costs)
}

/// Index and cost of the candidate minimizing `edge_cost(candidate) + subtree cost`. The first one wins ties.
fn cheapest(
  candidates: &[String],
  costs: &[Option<f64>],
  edge_cost: impl Fn(&str) -> Result<Result<f64, Unreachable>, Report>,
) -> Result<Option<(usize, f64)>, Report> {
  let mut best: Option<(usize, f64)> = None;
  for (i, (candidate, cost)) in candidates.iter().zip(costs).enumerate() {
    let Some(cost) = cost else {
      continue;
    };
    let Ok(edge) = edge_cost(candidate)? else {
      continue;
    };
    let total = edge + cost;
    if best.map_or(true, |(_, best_total)| total < best_total) {
      best = Some((i, total));
    }
  }
  Ok(best)
}

/// Sets every branch length to the cost of the branch under the model.
///
/// Branches are scored from parent to child, except the branch to the normal sample, which is scored from the normal
/// sample to its parent.
pub fn update_branch_lengths(
  tree: &mut Tree,
  engine: &DistanceEngine,
  profiles: &AncestorTable,
  normal_name: &str,
) -> Result<(), Report> {
  for key in tree.preorder() {
    let Some(name) = tree.name_of(key).map(ToOwned::to_owned) else {
      continue;
    };
    for child in tree.children_of(key).to_vec() {
      let child_name = node_name(tree, child)?.to_owned();
      let (from, to) = if child_name == normal_name {
        (child_name.as_str(), name.as_str())
      } else {
        (name.as_str(), child_name.as_str())
      };

      let length = engine
        .score(profile_of(profiles, from)?, profile_of(profiles, to)?)?
        .map_err(|Unreachable| make_report!("Branch from '{from}' to '{to}' cannot be explained by the cost model"))?;
      debug!("Branch length from '{from}' to '{to}': {length}");
      tree.set_branch_length(child, length)?;
    }
  }
  Ok(())
}

/// Adds the decoded profiles of the reconstructed ancestors to a copy of the input table
pub fn create_output_table(
  input: &CopyNumberTable,
  profiles: &AncestorTable,
  model: &dyn CostModel,
) -> Result<CopyNumberTable, Report> {
  let mut output = input.clone();
  for (name, encoded) in profiles {
    if input.contains(name) {
      continue;
    }
    let alleles = decode_profile(name, encoded, input, model.alphabet())
      .wrap_err_with(|| format!("When decoding the profile of ancestor '{name}'"))?;
    output.insert_sample(name.clone(), alleles)?;
  }
  if output.n_samples() < input.n_samples() {
    return make_error!("Output table lost samples");
  }
  Ok(output)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encode::profile::Segment;
  use crate::model::med_model::{MedModel, ModelSpec};
  use crate::o;
  use indexmap::indexmap;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::Arc;

  // (diploid, (a, b)internal_2, c)internal_1
  fn tree() -> Result<Tree, Report> {
    let mut tree = Tree::new();
    let root = tree.add_node(Some(o!("internal_1")));
    let x = tree.add_node(Some(o!("internal_2")));
    for (parent, name) in [(root, "diploid"), (root, "c"), (x, "a"), (x, "b")] {
      let leaf = tree.add_node(Some(o!(name)));
      tree.add_edge(parent, leaf, 1.0)?;
    }
    tree.add_edge(root, x, 1.0)?;
    tree.build()?;
    Ok(tree)
  }

  fn samples() -> IndexMap<String, String> {
    indexmap! {
      o!("diploid") => o!("1111"),
      o!("a") => o!("2211"),
      o!("b") => o!("2221"),
      o!("c") => o!("1111"),
    }
  }

  fn model() -> Result<Arc<MedModel>, Report> {
    Ok(Arc::new(MedModel::new(&ModelSpec::default())?))
  }

  fn engine() -> Result<DistanceEngine, Report> {
    Ok(DistanceEngine::new(model()?))
  }

  fn build_tree(edges: &[(&str, &str)]) -> Result<Tree, Report> {
    let mut tree = Tree::new();
    let mut keys: HashMap<&str, NodeKey> = HashMap::new();
    for &(parent, child) in edges {
      for name in [parent, child] {
        if !keys.contains_key(name) {
          keys.insert(name, tree.add_node(Some(o!(name))));
        }
      }
      tree.add_edge(keys[parent], keys[child], 1.0)?;
    }
    tree.build()?;
    Ok(tree)
  }

  // (diploid, ((a, b)internal_3, (c, d)internal_4)internal_2)internal_1
  fn balanced_tree() -> Result<Tree, Report> {
    build_tree(&[
      ("internal_1", "diploid"),
      ("internal_1", "internal_2"),
      ("internal_2", "internal_3"),
      ("internal_2", "internal_4"),
      ("internal_3", "a"),
      ("internal_3", "b"),
      ("internal_4", "c"),
      ("internal_4", "d"),
    ])
  }

  fn edge_cost(engine: &DistanceEngine, from: &str, to: &str) -> Result<f64, Report> {
    Ok(engine.score(from, to)?.unwrap_or(f64::INFINITY))
  }

  /// Summed cost of all branches, the branch to the normal sample scored from the normal sample
  fn tree_cost(tree: &Tree, profiles: &AncestorTable, engine: &DistanceEngine) -> Result<f64, Report> {
    let mut total = 0.0;
    for key in tree.preorder() {
      let name = node_name(tree, key)?;
      for &child in tree.children_of(key) {
        let child_name = node_name(tree, child)?;
        total += if child_name == "diploid" {
          edge_cost(engine, &profiles[child_name], &profiles[name])?
        } else {
          edge_cost(engine, &profiles[name], &profiles[child_name])?
        };
      }
    }
    Ok(total)
  }

  /// Cheapest assignment of all profiles with `len` loci and copy numbers 1 to 3 to the internal nodes
  fn exhaustive_minimum(
    tree: &Tree,
    samples: &IndexMap<String, String>,
    engine: &DistanceEngine,
    len: usize,
  ) -> Result<f64, Report> {
    let universe = (0..len)
      .map(|_| ['1', '2', '3'])
      .multi_cartesian_product()
      .map(|chars| chars.into_iter().collect::<String>())
      .collect_vec();
    let internal = tree
      .internal_nodes()
      .into_iter()
      .map(|key| node_name(tree, key).map(ToOwned::to_owned))
      .collect::<Result<Vec<_>, Report>>()?;

    let mut best = f64::INFINITY;
    for assignment in (0..internal.len()).map(|_| universe.iter()).multi_cartesian_product() {
      let mut profiles = samples.clone();
      for (name, profile) in internal.iter().zip(assignment) {
        profiles.insert(name.clone(), profile.clone());
      }
      best = best.min(tree_cost(tree, &profiles, engine)?);
    }
    Ok(best)
  }

  #[rstest]
  #[case::split_pairs(&["2", "1", "2", "1"], 2.0)]
  #[case::split_pairs_mirrored(&["1", "2", "1", "2"], 2.0)]
  #[case::shared_amplification(&["3", "3", "1", "2"], 3.0)]
  #[case::swapped_alleles(&["21", "12", "21", "12"], 4.0)]
  #[case::clade_gain(&["22", "22", "21", "11"], 2.0)]
  fn reaches_minimal_tree_cost(#[case] leaves: &[&str], #[case] expected: f64) -> Result<(), Report> {
    let tree = balanced_tree()?;
    let engine = engine()?;
    let len = leaves[0].len();
    let mut samples = indexmap! { o!("diploid") => "1".repeat(len) };
    for (name, profile) in ["a", "b", "c", "d"].into_iter().zip(leaves) {
      samples.insert(o!(name), (*profile).to_owned());
    }

    let profiles = reconstruct_ancestors(&tree, &samples, &engine, "diploid", 0.0)?;
    let total = tree_cost(&tree, &profiles, &engine)?;
    assert_eq!(total, exhaustive_minimum(&tree, &samples, &engine, len)?);
    assert_eq!(total, expected);
    Ok(())
  }

  #[rstest]
  fn result_does_not_depend_on_child_order() -> Result<(), Report> {
    let engine = engine()?;
    let mirrored = build_tree(&[
      ("internal_1", "internal_2"),
      ("internal_1", "diploid"),
      ("internal_2", "internal_4"),
      ("internal_2", "internal_3"),
      ("internal_3", "b"),
      ("internal_3", "a"),
      ("internal_4", "d"),
      ("internal_4", "c"),
    ])?;
    let samples = indexmap! {
      o!("diploid") => o!("11"),
      o!("a") => o!("21"),
      o!("b") => o!("12"),
      o!("c") => o!("21"),
      o!("d") => o!("12"),
    };
    for tree in [balanced_tree()?, mirrored] {
      let profiles = reconstruct_ancestors(&tree, &samples, &engine, "diploid", 0.0)?;
      assert_eq!(tree_cost(&tree, &profiles, &engine)?, 4.0);
    }
    Ok(())
  }

  #[rstest]
  fn reconstructs_minimal_ancestors() -> Result<(), Report> {
    let engine = engine()?;
    let mut tree = tree()?;
    let profiles = reconstruct_ancestors(&tree, &samples(), &engine, "diploid", 0.0)?;
    assert_eq!(profiles["internal_1"], "1111");
    assert!(["2211", "2221"].contains(&profiles["internal_2"].as_str()));
    assert_eq!(tree_cost(&tree, &profiles, &engine)?, 2.0);

    update_branch_lengths(&mut tree, &engine, &profiles, "diploid")?;
    assert_eq!(tree.total_branch_length(), 2.0);
    assert_eq!(tree.branch_length(tree.find_by_name("diploid").unwrap()), 0.0);
    assert_eq!(tree.branch_length(tree.find_by_name("c").unwrap()), 0.0);
    Ok(())
  }

  #[rstest]
  fn polytomies_are_reconstructed() -> Result<(), Report> {
    let engine = engine()?;
    let tree = build_tree(&[
      ("internal_1", "diploid"),
      ("internal_1", "internal_2"),
      ("internal_2", "a"),
      ("internal_2", "b"),
      ("internal_2", "c"),
    ])?;
    let samples = indexmap! {
      o!("diploid") => o!("1111"),
      o!("a") => o!("2211"),
      o!("b") => o!("2211"),
      o!("c") => o!("2221"),
    };
    let profiles = reconstruct_ancestors(&tree, &samples, &engine, "diploid", 0.0)?;
    assert_eq!(profiles["internal_2"], "2211");
    assert_eq!(tree_cost(&tree, &profiles, &engine)?, 2.0);
    Ok(())
  }

  #[rstest]
  fn two_samples_use_normal_as_ancestor() -> Result<(), Report> {
    let engine = engine()?;
    let mut tree = Tree::new();
    let root = tree.add_node(Some(o!("internal_1")));
    let normal = tree.add_node(Some(o!("diploid")));
    let tumor = tree.add_node(Some(o!("t")));
    tree.add_edge(root, normal, 0.0)?;
    tree.add_edge(root, tumor, 1.0)?;
    tree.build()?;

    let samples = indexmap! { o!("diploid") => o!("111X111"), o!("t") => o!("122X101") };
    let profiles = reconstruct_ancestors(&tree, &samples, &engine, "diploid", 0.0)?;
    assert_eq!(profiles["internal_1"], "111X111");

    update_branch_lengths(&mut tree, &engine, &profiles, "diploid")?;
    assert_eq!(tree.branch_length(tumor), 2.0);
    assert_eq!(tree.branch_length(normal), 0.0);
    Ok(())
  }

  #[rstest]
  fn output_table_contains_ancestors() -> Result<(), Report> {
    let model = model()?;
    let segments = vec![Segment::new("1", 0, 9), Segment::new("1", 10, 19)];
    let mut input = CopyNumberTable::new(vec![o!("cn_a"), o!("cn_b")], segments)?;
    input.insert_sample("diploid", vec![vec![1, 1], vec![1, 1]])?;
    input.insert_sample("a", vec![vec![2, 1], vec![1, 1]])?;

    let profiles = indexmap! {
      o!("diploid") => o!("11X11"),
      o!("a") => o!("21X11"),
      o!("internal_1") => o!("21X10"),
    };
    let output = create_output_table(&input, &profiles, model.as_ref())?;
    assert_eq!(output.n_samples(), 3);
    assert_eq!(output.sample("internal_1"), Some([vec![2, 1], vec![1, 0]].as_slice()));

    let bad = indexmap! { o!("internal_1") => o!("21X10X1") };
    assert!(create_output_table(&input, &bad, model.as_ref()).is_err());
    Ok(())
  }
}
