use lazy_static::lazy_static;
use pretty_dtoa::{dtoa, FmtFloatConfig};

lazy_static! {
  static ref FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .force_no_e_notation()
    .add_point_zero(true)
    .radix_point('.')
    .round();
}

fn float_format(x: f64, config: FmtFloatConfig) -> String {
  let formatted = dtoa(x, config);
  match formatted.strip_suffix(".0") {
    Some(integral) => integral.to_owned(),
    None => formatted,
  }
}

/// Formats a branch length or distance. Whole numbers are printed without a fractional part.
pub fn float_to_digits(x: f64, max_significant_digits: Option<u8>, max_decimal_digits: Option<i8>) -> String {
  let mut config = *FLOAT_CONFIG;
  if let Some(max_significant_digits) = max_significant_digits {
    config = config.max_significant_digits(max_significant_digits);
  }
  if let Some(max_decimal_digits) = max_decimal_digits {
    config = config.max_decimal_digits(max_decimal_digits);
  }
  float_format(x, config)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  #[case(0.0, "0")]
  #[case(3.0, "3")]
  #[case(12.0, "12")]
  #[case(0.25, "0.25")]
  fn formats_event_counts(#[case] x: f64, #[case] expected: &str) {
    assert_eq!(float_to_digits(x, Some(6), None), expected);
  }
}
