use crate::distance::engine::DistanceEngine;
use crate::model::cost_model::Unreachable;
use crate::{make_error, make_internal_error};
use eyre::Report;
use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use ndarray::Array2;
use rayon::prelude::*;

/// Square, symmetric, zero-diagonal matrix of MED distances between labeled samples
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
  labels: Vec<String>,
  values: Array2<f64>,
}

impl DistanceMatrix {
  pub fn new(labels: Vec<String>, values: Array2<f64>) -> Result<Self, Report> {
    let n = labels.len();
    if values.dim() != (n, n) {
      return make_error!(
        "Distance matrix has shape {:?}, but there are {n} labels",
        values.dim()
      );
    }
    Ok(Self { labels, values })
  }

  pub fn zeros(labels: Vec<String>) -> Self {
    let n = labels.len();
    Self {
      labels,
      values: Array2::zeros((n, n)),
    }
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  pub const fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn index_of(&self, label: &str) -> Option<usize> {
    self.labels.iter().position(|l| l == label)
  }

  pub fn get(&self, a: &str, b: &str) -> Option<f64> {
    Some(self.values[[self.index_of(a)?, self.index_of(b)?]])
  }
}

type PairResult = ((usize, usize), Result<f64, Unreachable>);

/// Computes distances between all pairs of profiles, one after another
pub fn calc_pairwise_distance_matrix(
  engine: &DistanceEngine,
  profiles: &IndexMap<String, String>,
) -> Result<DistanceMatrix, Report> {
  let labels = profiles.keys().cloned().collect_vec();
  let pairs = (0..labels.len()).tuple_combinations::<(usize, usize)>().collect_vec();
  let n_pairs = pairs.len();

  let mut results = Vec::with_capacity(n_pairs);
  for (i, (a, b)) in pairs.into_iter().enumerate() {
    let distance = engine.distance(&profiles[a], &profiles[b])?;
    results.push(((a, b), distance));

    let percent = 100 * (i + 1) / n_pairs;
    if percent / 10 != 100 * i / n_pairs / 10 {
      info!("Pairwise distances: {percent}% done ({} of {n_pairs} pairs)", i + 1);
    }
  }

  assemble_matrix(labels, results)
}

/// Computes distances between all pairs of profiles, splitting the samples into groups processed in parallel.
///
/// Every group is a union of two blocks of samples, so every pair of samples appears together in at least one group.
pub fn calc_pairwise_distance_matrix_parallel(
  engine: &DistanceEngine,
  profiles: &IndexMap<String, String>,
  n_jobs: usize,
) -> Result<DistanceMatrix, Report> {
  let labels = profiles.keys().cloned().collect_vec();
  let groups = create_parallelization_groups(labels.len(), n_jobs);
  verify_group_coverage(&groups, labels.len())?;

  info!("Running {} parallel groups of samples", groups.len());

  let partials = groups
    .par_iter()
    .map(|group| {
      group
        .iter()
        .tuple_combinations()
        .map(|(&a, &b)| Ok(((a, b), engine.distance(&profiles[a], &profiles[b])?)))
        .collect::<Result<Vec<PairResult>, Report>>()
    })
    .collect::<Result<Vec<_>, Report>>()?;

  let results = partials
    .into_iter()
    .flatten()
    .unique_by(|(pair, _)| *pair)
    .collect_vec();

  assemble_matrix(labels, results)
}

/// Splits `n_samples` into balanced blocks and pairs the blocks up into groups
pub fn create_parallelization_groups(n_samples: usize, n_jobs: usize) -> Vec<Vec<usize>> {
  if n_samples <= 2 || n_jobs <= 1 {
    return vec![(0..n_samples).collect()];
  }

  // Smallest number of blocks whose pairings give every job at least one group
  let mut n_blocks = 2;
  while n_blocks < n_samples && n_blocks * (n_blocks - 1) / 2 < n_jobs {
    n_blocks += 1;
  }

  let blocks = (0..n_blocks)
    .map(|block| (0..n_samples).filter(|sample| sample % n_blocks == block).collect_vec())
    .filter(|block| !block.is_empty())
    .collect_vec();

  blocks
    .iter()
    .tuple_combinations()
    .map(|(a, b)| a.iter().chain(b.iter()).copied().sorted().collect_vec())
    .collect()
}

/// Checks that every unordered pair of samples shares at least one group
pub fn verify_group_coverage(groups: &[Vec<usize>], n_samples: usize) -> Result<(), Report> {
  let mut covered = Array2::from_elem((n_samples, n_samples), false);
  for group in groups {
    for (&a, &b) in group.iter().tuple_combinations() {
      covered[[a, b]] = true;
      covered[[b, a]] = true;
    }
  }

  let missing = (0..n_samples)
    .tuple_combinations()
    .filter(|&(a, b)| !covered[[a, b]])
    .collect_vec();

  if !missing.is_empty() {
    return make_internal_error!("Parallelization groups do not cover sample pairs: {missing:?}");
  }
  Ok(())
}

fn assemble_matrix(labels: Vec<String>, results: Vec<PairResult>) -> Result<DistanceMatrix, Report> {
  let n = labels.len();
  let mut values = Array2::from_elem((n, n), f64::NAN);
  let mut unreachable = vec![];
  for ((a, b), distance) in results {
    match distance {
      Ok(distance) => {
        values[[a, b]] = distance;
        values[[b, a]] = distance;
      }
      Err(Unreachable) => unreachable.push(format!("('{}', '{}')", labels[a], labels[b])),
    }
  }

  if !unreachable.is_empty() {
    return make_error!(
      "Evolutionary distances could not be calculated for some sample pairings. Please check the input data.\n\nThe affected pairs are: [{}]",
      unreachable.join(", ")
    );
  }

  for i in 0..n {
    values[[i, i]] = 0.0;
  }

  if let Some(((a, b), _)) = values.indexed_iter().find(|(_, v)| v.is_nan()) {
    return make_internal_error!(
      "Distance between '{}' and '{}' was not computed",
      labels[a],
      labels[b]
    );
  }

  Ok(DistanceMatrix { labels, values })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::med_model::{MedModel, ModelSpec};
  use crate::o;
  use indexmap::indexmap;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::sync::Arc;

  fn engine() -> Result<DistanceEngine, Report> {
    Ok(DistanceEngine::new(Arc::new(MedModel::new(&ModelSpec::default())?)))
  }

  fn profiles() -> IndexMap<String, String> {
    indexmap! {
      o!("diploid") => o!("1111X1111"),
      o!("a") => o!("1221X1111"),
      o!("b") => o!("1221X1101"),
      o!("c") => o!("2222X2222"),
      o!("d") => o!("1111X1011"),
    }
  }

  #[rstest]
  fn matrix_is_symmetric_with_zero_diagonal() -> Result<(), Report> {
    let matrix = calc_pairwise_distance_matrix(&engine()?, &profiles())?;
    let values = matrix.values();
    for i in 0..matrix.len() {
      assert_eq!(values[[i, i]], 0.0);
      for j in 0..matrix.len() {
        assert_eq!(values[[i, j]], values[[j, i]]);
        assert!(values[[i, j]] >= 0.0);
      }
    }
    assert_eq!(matrix.get("diploid", "a"), Some(1.0));
    Ok(())
  }

  #[rstest]
  fn identical_profiles_give_zero_matrix() -> Result<(), Report> {
    let profiles = indexmap! {
      o!("x") => o!("1221X1111"),
      o!("y") => o!("1221X1111"),
      o!("z") => o!("1221X1111"),
    };
    let matrix = calc_pairwise_distance_matrix(&engine()?, &profiles)?;
    assert!(matrix.values().iter().all(|&v| v == 0.0));
    Ok(())
  }

  #[rstest]
  fn parallel_matches_sequential() -> Result<(), Report> {
    let sequential = calc_pairwise_distance_matrix(&engine()?, &profiles())?;
    let parallel = calc_pairwise_distance_matrix_parallel(&engine()?, &profiles(), 3)?;
    assert_eq!(sequential, parallel);
    Ok(())
  }

  #[rstest]
  fn reports_unreachable_pairs() -> Result<(), Report> {
    let profiles = indexmap! {
      o!("diploid") => o!("1111X1111"),
      o!("short") => o!("1111X111"),
      o!("a") => o!("1111X1112"),
    };
    let err = calc_pairwise_distance_matrix(&engine()?, &profiles).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("('diploid', 'short')"));
    assert!(msg.contains("('short', 'a')"));
    assert!(!msg.contains("('diploid', 'a')"));
    Ok(())
  }

  #[rstest]
  #[case(2, 4)]
  #[case(5, 1)]
  #[case(5, 3)]
  #[case(10, 4)]
  #[case(17, 16)]
  fn groups_cover_all_pairs(#[case] n_samples: usize, #[case] n_jobs: usize) -> Result<(), Report> {
    let groups = create_parallelization_groups(n_samples, n_jobs);
    verify_group_coverage(&groups, n_samples)?;
    Ok(())
  }

  #[rstest]
  fn detects_uncovered_pairs() {
    let groups = vec![vec![0, 1], vec![1, 2]];
    assert!(verify_group_coverage(&groups, 3).is_err());
  }
}
