use crate::encode::encoder::ProfileView;
use crate::encode::profile::CopyNumberTable;
use crate::make_error;
use crate::model::cost_model::{CostModel, Unreachable};
use crate::model::med_model::{MedModel, ModelSpec};
use eyre::{Report, WrapErr};
use log::debug;

/// Largest number of prior WGDs that the detection can test against
pub const MAX_DETECTABLE_PRIOR_WGD: u8 = 2;

/// Decides whether `sample` underwent a WGD relative to a diploid genome.
///
/// The sample is scored from a diploid reference with two model variants. Without `n_wgd` the WGD model is compared
/// to the model without WGDs. With `n_wgd` set to 1 or 2, the test is whether one more WGD than `n_wgd` explains the
/// sample better than at most `n_wgd` WGDs.
pub fn detect_wgd(table: &CopyNumberTable, sample: &str, spec: &ModelSpec, n_wgd: Option<u8>) -> Result<bool, Report> {
  let base = ModelSpec {
    no_wgd: false,
    n_wgd: None,
    ..*spec
  };
  let (wgd_spec, no_wgd_spec) = match n_wgd {
    None => (base, base.no_wgd()),
    Some(1) => (base.with_n_wgd(Some(2)), base.with_n_wgd(Some(1))),
    Some(2) => (base, base.with_n_wgd(Some(2))),
    Some(n) => {
      return make_error!("WGDs can only be detected with n_wgd <= {MAX_DETECTABLE_PRIOR_WGD}, but found {n}");
    }
  };
  let wgd_model = MedModel::new(&wgd_spec)?;
  let no_wgd_model = MedModel::new(&no_wgd_spec)?;

  let alphabet = no_wgd_model.alphabet();
  let profile = ProfileView::of_sample(table, sample)?
    .aggregate(alphabet)
    .wrap_err_with(|| format!("When encoding sample '{sample}'"))?;
  let ploidy = if spec.total_cn { 2 } else { 1 };
  let diploid_alleles = vec![vec![ploidy; table.n_segments()]; table.n_alleles()];
  let diploid = ProfileView::Table {
    alleles: &diploid_alleles,
    blocks: table.chromosome_blocks(),
  }
  .aggregate(alphabet)?;

  let with_wgd = wgd_model.score(&diploid, &profile);
  let without_wgd = no_wgd_model.score(&diploid, &profile);
  debug!("WGD detection for '{sample}': with WGD {with_wgd:?}, without WGD {without_wgd:?}");

  Ok(match (with_wgd, without_wgd) {
    (Ok(with_wgd), Ok(without_wgd)) => with_wgd < without_wgd,
    (Ok(_), Err(Unreachable)) => true,
    (Err(Unreachable), _) => false,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encode::profile::Segment;
  use itertools::Itertools;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn table(alleles: Vec<Vec<u8>>) -> Result<CopyNumberTable, Report> {
    let segments = vec![
      Segment::new("1", 0, 99),
      Segment::new("1", 100, 199),
      Segment::new("2", 0, 99),
      Segment::new("3", 0, 99),
    ];
    let columns = (0..alleles.len()).map(|i| format!("cn_{}", (b'a' + i as u8) as char)).collect();
    let mut table = CopyNumberTable::new(columns, segments)?;
    table.insert_sample("t", alleles)?;
    Ok(table)
  }

  #[rstest]
  fn detects_doubled_genome() -> Result<(), Report> {
    let table = table(vec![vec![2; 4], vec![2; 4]])?;
    assert!(detect_wgd(&table, "t", &ModelSpec::default(), None)?);
    Ok(())
  }

  #[rstest]
  fn detects_doubled_total_copy_number() -> Result<(), Report> {
    let table = table(vec![vec![4; 4]])?;
    let spec = ModelSpec {
      total_cn: true,
      ..ModelSpec::default()
    };
    assert!(detect_wgd(&table, "t", &spec, None)?);
    Ok(())
  }

  #[rstest]
  fn focal_gain_is_not_a_wgd() -> Result<(), Report> {
    let table = table(vec![vec![1, 2, 1, 1], vec![1; 4]])?;
    assert!(!detect_wgd(&table, "t", &ModelSpec::default(), None)?);
    Ok(())
  }

  #[rstest]
  fn diploid_is_not_a_wgd() -> Result<(), Report> {
    let table = table(vec![vec![1; 4], vec![1; 4]])?;
    for n_wgd in [None, Some(1), Some(2)] {
      assert!(!detect_wgd(&table, "t", &ModelSpec::default(), n_wgd)?);
    }
    Ok(())
  }

  #[rstest]
  fn second_wgd_needs_quadrupled_genome() -> Result<(), Report> {
    let doubled = table(vec![vec![2; 4], vec![2; 4]])?;
    let quadrupled = table(vec![vec![3; 4], vec![3; 4]])?;
    assert!(!detect_wgd(&doubled, "t", &ModelSpec::default(), Some(1))?);
    assert!(detect_wgd(&quadrupled, "t", &ModelSpec::default(), Some(1))?);
    Ok(())
  }

  #[rstest]
  fn second_wgd_call_is_monotonic_in_tripled_loci() -> Result<(), Report> {
    let calls = (0..=4)
      .map(|n_tripled| {
        let alleles = (0..4).map(|i| if i < n_tripled { 3 } else { 2 }).collect_vec();
        let table = table(vec![alleles.clone(), alleles])?;
        detect_wgd(&table, "t", &ModelSpec::default(), Some(1))
      })
      .collect::<Result<Vec<_>, Report>>()?;
    assert_eq!(calls, vec![false, false, false, true, true]);
    Ok(())
  }

  #[rstest]
  fn rejects_more_than_two_prior_wgds() -> Result<(), Report> {
    let table = table(vec![vec![1; 4]])?;
    let err = detect_wgd(&table, "t", &ModelSpec::default(), Some(3)).unwrap_err();
    assert_eq!(err.to_string(), "WGDs can only be detected with n_wgd <= 2, but found 3");
    Ok(())
  }

  #[rstest]
  fn unknown_sample_is_an_error() -> Result<(), Report> {
    let table = table(vec![vec![1; 4]])?;
    assert!(detect_wgd(&table, "x", &ModelSpec::default(), None).is_err());
    Ok(())
  }
}
