use crate::encode::profile::CopyNumberTable;
use crate::events::branch::{calculate_cn_events_per_branch, BranchEvents};
use crate::events::event::{EventRecord, SegmentFlags};
use crate::events::models::EventModels;
use crate::tree::tree::Tree;
use eyre::{Report, WrapErr};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{info, warn};

/// Events on all branches of a tree, together with per-segment summaries
#[derive(Clone, Debug, Default)]
pub struct EventReconstruction {
  pub events: Vec<EventRecord>,
  /// Flags of every sample in the profile table; samples without events on their branch have all flags unset
  pub flags: IndexMap<String, Vec<SegmentFlags>>,
  /// Segment carries no event in any sample
  pub is_normal: Vec<bool>,
  /// Segment carries no event outside the branch leading to the most recent common ancestor of the tumor samples
  pub is_clonal: Vec<bool>,
}

impl EventReconstruction {
  pub fn events_of<'a>(&'a self, sample: &'a str) -> impl Iterator<Item = &'a EventRecord> + 'a {
    self.events.iter().filter(move |event| event.sample_id == sample)
  }

  pub fn flags_of(&self, sample: &str) -> Option<&[SegmentFlags]> {
    self.flags.get(sample).map(Vec::as_slice)
  }
}

/// Reconstructs the events on every branch of `tree` with a non-zero length.
///
/// `table` has to contain the profiles of all nodes, ancestors included.
pub fn calculate_all_cn_events(
  tree: &Tree,
  table: &CopyNumberTable,
  models: &EventModels,
  normal_name: &str,
) -> Result<EventReconstruction, Report> {
  let n = table.n_segments();
  let mut flags: IndexMap<String, Vec<SegmentFlags>> = table
    .sample_names()
    .map(|name| (name.clone(), vec![SegmentFlags::default(); n]))
    .collect();
  let mut events = vec![];

  for key in tree.preorder() {
    let children = tree.children_of(key);
    if children.is_empty() {
      continue;
    }
    let parent_name = tree.name_of(key).unwrap_or(normal_name);
    for &child in children {
      if tree.branch_length(child) == 0.0 {
        continue;
      }
      let Some(child_name) = tree.name_of(child) else {
        continue;
      };

      let BranchEvents {
        events: branch_events,
        flags: branch_flags,
      } = calculate_cn_events_per_branch(table, parent_name, child_name, models)
        .wrap_err_with(|| format!("When reconstructing events on branch '{parent_name}' -> '{child_name}'"))?;
      events.extend(branch_events);
      flags.insert(child_name.to_owned(), branch_flags);
    }
  }
  events.sort();
  info!("Reconstructed {} copy-number events", events.len());

  let mrca = find_mrca(tree, normal_name);
  let is_normal = (0..n).map(|i| flags.values().all(|f| !f[i].any())).collect_vec();
  let is_clonal = (0..n)
    .map(|i| {
      flags
        .iter()
        .filter(|(name, _)| Some(name.as_str()) != mrca)
        .all(|(_, f)| !f[i].any())
    })
    .collect_vec();

  Ok(EventReconstruction {
    events,
    flags,
    is_normal,
    is_clonal,
  })
}

/// First child of the root which is not the normal sample
fn find_mrca<'t>(tree: &'t Tree, normal_name: &str) -> Option<&'t str> {
  let root = tree.root().ok()?;
  tree
    .children_of(root)
    .iter()
    .filter_map(|&child| tree.name_of(child))
    .find(|&name| name != normal_name)
}

/// Names of nodes whose branch length differs from the number of events reconstructed on their branch.
///
/// Logs a warning listing them when the total number of events differs from the total tree length.
pub fn check_event_consistency(tree: &Tree, reconstruction: &EventReconstruction, normal_name: &str) -> Vec<String> {
  let total_branch_length = tree.total_branch_length();
  let n_events = reconstruction.events.len();
  if n_events as f64 == total_branch_length {
    return vec![];
  }

  let faulty = tree
    .preorder()
    .into_iter()
    .filter_map(|key| {
      let name = tree.name_of(key)?;
      let branch_length = tree.branch_length(key);
      let n_node_events = reconstruction.events_of(name).count();
      (name != normal_name && branch_length != 0.0 && branch_length != n_node_events as f64).then(|| name.to_owned())
    })
    .collect_vec();

  warn!(
    "Event recreation was faulty. Events in '_cn_events_df.tsv' will be incorrect for the following nodes: [{}]. \
     total_branch_length: {total_branch_length}, nr of inferred events: {n_events}",
    faulty.iter().map(|name| format!("'{name}'")).join(", ")
  );
  faulty
}
