use crate::events::event::{EventRecord, EventType};
use crate::tree::tree::Tree;
use crate::utils::float_fmt::float_to_digits;
use itertools::Itertools;
use serde::Serialize;

/// Key statistics of one patient's tree
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PatientSummary {
  pub nsamples: usize,
  pub normal_name: String,
  pub tree_length: f64,
  pub mean_branch_length: f64,
  pub median_branch_length: f64,
  pub min_branch_length: f64,
  pub max_branch_length: f64,
  pub wgd_status: String,
}

impl PatientSummary {
  /// Name and formatted value of every statistic, in output order
  pub fn to_rows(&self) -> Vec<(&'static str, String)> {
    let fmt = |x: f64| float_to_digits(x, None, None);
    vec![
      ("nsamples", self.nsamples.to_string()),
      ("normal_name", self.normal_name.clone()),
      ("tree_length", fmt(self.tree_length)),
      ("mean_branch_length", fmt(self.mean_branch_length)),
      ("median_branch_length", fmt(self.median_branch_length)),
      ("min_branch_length", fmt(self.min_branch_length)),
      ("max_branch_length", fmt(self.max_branch_length)),
      ("wgd_status", self.wgd_status.clone()),
    ]
  }
}

/// Summarizes the non-zero branch lengths of the tree and the WGDs found on its branches.
///
/// Statistics of a tree without non-zero branches are NaN, except the tree length, which is 0.
pub fn summarize_patient(
  tree: &Tree,
  nsamples: usize,
  normal_name: &str,
  events: Option<&[EventRecord]>,
) -> PatientSummary {
  let branch_lengths = tree
    .internal_nodes()
    .into_iter()
    .flat_map(|key| tree.children_of(key).iter().map(|&child| tree.branch_length(child)))
    .filter(|&length| length != 0.0)
    .sorted_by(f64::total_cmp)
    .collect_vec();

  let n = branch_lengths.len();
  let tree_length: f64 = branch_lengths.iter().sum();
  let (mean, median, min, max) = if n == 0 {
    (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
  } else {
    let median = if n % 2 == 0 {
      (branch_lengths[n / 2 - 1] + branch_lengths[n / 2]) / 2.0
    } else {
      branch_lengths[n / 2]
    };
    (tree_length / n as f64, median, branch_lengths[0], branch_lengths[n - 1])
  };

  PatientSummary {
    nsamples,
    normal_name: normal_name.to_owned(),
    tree_length,
    mean_branch_length: mean,
    median_branch_length: median,
    min_branch_length: min,
    max_branch_length: max,
    wgd_status: wgd_status(events),
  }
}

fn wgd_status(events: Option<&[EventRecord]>) -> String {
  let Some(events) = events else {
    return "unknown (run with --events flag to detect WGDs)".to_owned();
  };
  let branches = events
    .iter()
    .filter(|event| event.event_type == EventType::Wgd)
    .map(|event| event.sample_id.as_str())
    .collect_vec();
  if branches.is_empty() {
    "no WGD".to_owned()
  } else {
    format!("WGD on branch {}", branches.join("and "))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::event::ALL_ALLELES;
  use crate::io::nwk::create_tree_from_nwk_str;
  use crate::o;
  use approx::assert_ulps_eq;
  use eyre::Report;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn wgd(sample: &str) -> EventRecord {
    EventRecord {
      sample_id: o!(sample),
      allele: o!(ALL_ALLELES),
      chrom: o!("chr0"),
      start: 0,
      end: 100,
      event_type: EventType::Wgd,
      cn_child: 0,
    }
  }

  #[rstest]
  fn summarizes_nonzero_branches() -> Result<(), Report> {
    let tree = create_tree_from_nwk_str("(diploid:0,(a:1,b:4)internal_2:2)internal_1;")?;
    let summary = summarize_patient(&tree, 3, "diploid", None);
    assert_eq!(summary.nsamples, 3);
    assert_ulps_eq!(summary.tree_length, 7.0);
    assert_ulps_eq!(summary.mean_branch_length, 7.0 / 3.0);
    assert_ulps_eq!(summary.median_branch_length, 2.0);
    assert_ulps_eq!(summary.min_branch_length, 1.0);
    assert_ulps_eq!(summary.max_branch_length, 4.0);
    assert_eq!(summary.wgd_status, "unknown (run with --events flag to detect WGDs)");
    assert_eq!(summary.to_rows()[2], ("tree_length", o!("7")));
    Ok(())
  }

  #[rstest]
  #[case(vec![], "no WGD")]
  #[case(vec![wgd("a")], "WGD on branch a")]
  #[case(vec![wgd("a"), wgd("internal_2")], "WGD on branch aand internal_2")]
  fn describes_wgd_status(#[case] events: Vec<EventRecord>, #[case] expected: &str) {
    assert_eq!(wgd_status(Some(&events)), expected);
  }
}
