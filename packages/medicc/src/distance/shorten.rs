use crate::make_internal_error;
use eyre::Report;

/// Indices of columns that are not a repetition of the previous column in every profile.
///
/// The first column is always kept.
pub fn informative_columns<T: PartialEq>(profiles: &[&[T]]) -> Vec<usize> {
  let len = profiles.first().map_or(0, |profile| profile.len());
  (0..len)
    .filter(|&i| i == 0 || profiles.iter().any(|profile| profile[i] != profile[i - 1]))
    .collect()
}

/// Removes positions at which both profiles repeat their previous symbol
pub fn shorten_cn_strings(a: &str, b: &str) -> Result<(String, String), Report> {
  if a.len() != b.len() {
    return make_internal_error!(
      "When shortening profiles: lengths differ ({} and {})",
      a.len(),
      b.len()
    );
  }

  let (a, b) = (a.as_bytes(), b.as_bytes());
  let columns = informative_columns(&[a, b]);
  let pick = |profile: &[u8]| columns.iter().map(|&i| profile[i] as char).collect::<String>();
  let shortened = (pick(a), pick(b));

  if shortened.0.len() != shortened.1.len() {
    return make_internal_error!("When shortening profiles: shortened lengths differ");
  }

  Ok(shortened)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::cost_model::CostModel;
  use crate::model::med_model::{MedModel, ModelSpec};
  use itertools::Itertools;
  use pretty_assertions::assert_eq;
  use rand::{Rng, SeedableRng};
  use rand_isaac::Isaac64Rng;
  use rstest::rstest;

  #[rstest]
  #[case("1111", "2222", "1", "2")]
  #[case("1122", "1111", "12", "11")]
  #[case("1122", "1112", "122", "112")]
  #[case("11X11", "22X22", "1X1", "2X2")]
  #[case("", "", "", "")]
  fn shortens_jointly_constant_runs(
    #[case] a: &str,
    #[case] b: &str,
    #[case] expected_a: &str,
    #[case] expected_b: &str,
  ) -> Result<(), Report> {
    let (short_a, short_b) = shorten_cn_strings(a, b)?;
    assert_eq!((short_a.as_str(), short_b.as_str()), (expected_a, expected_b));
    Ok(())
  }

  #[rstest]
  fn rejects_unequal_lengths() {
    assert!(shorten_cn_strings("111", "11").is_err());
  }

  fn random_profile(rng: &mut impl Rng, chromosome_lengths: &[usize]) -> String {
    chromosome_lengths
      .iter()
      .map(|&len| (0..len).map(|_| char::from(b'0' + rng.gen_range(0..=4))).collect::<String>())
      .join("X")
  }

  #[rstest]
  #[case(ModelSpec::default().no_wgd())]
  #[case(ModelSpec::default())]
  fn shortening_preserves_scores(#[case] spec: ModelSpec) -> Result<(), Report> {
    let model = MedModel::new(&spec)?;
    let mut rng = Isaac64Rng::seed_from_u64(42);

    for _ in 0..5 {
      let chromosome_lengths = (0..4).map(|_| rng.gen_range(1..=6)).collect_vec();
      let a = random_profile(&mut rng, &chromosome_lengths);
      let b = random_profile(&mut rng, &chromosome_lengths);
      let (short_a, short_b) = shorten_cn_strings(&a, &b)?;

      assert_eq!(model.kernel_score(&a, &b), model.kernel_score(&short_a, &short_b));
      assert_eq!(model.score(&a, &b), model.score(&short_a, &short_b));
    }
    Ok(())
  }
}
