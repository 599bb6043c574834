use crate::make_error;
use crate::model::cost_model::Unreachable;
use eyre::Report;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Symbol placed between chromosomes (and between allele blocks) of an encoded profile
pub const SEPARATOR: char = 'X';

/// Internal code of the separator in decoded profiles
pub const SEPARATOR_CODE: u8 = u8::MAX;

const SYMBOLS: &[u8] = b"0123456789ABCDEF";

/// Largest copy number representable by a single symbol
pub const MAX_SUPPORTED_CN: u8 = (SYMBOLS.len() - 1) as u8;

/// Copy-number alphabet: one symbol per copy number in `0..=max_cn`, plus the separator
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alphabet {
  max_cn: u8,
}

impl Alphabet {
  pub fn new(max_cn: u8) -> Result<Self, Report> {
    if max_cn == 0 || max_cn > MAX_SUPPORTED_CN {
      return make_error!(
        "When creating copy-number alphabet: maximum copy number must be between 1 and {MAX_SUPPORTED_CN}, but found {max_cn}"
      );
    }
    Ok(Self { max_cn })
  }

  pub const fn max_cn(&self) -> u8 {
    self.max_cn
  }

  pub const fn separator(&self) -> char {
    SEPARATOR
  }

  pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
    SYMBOLS[..=self.max_cn as usize].iter().map(|&c| c as char)
  }

  pub fn contains(&self, symbol: char) -> bool {
    symbol_to_cn(symbol).map_or(false, |cn| cn <= self.max_cn)
  }

  pub fn symbol(&self, cn: u8) -> Result<char, Report> {
    if cn > self.max_cn {
      return make_error!(
        "Copy number {cn} is outside of the alphabet (maximum copy number is {})",
        self.max_cn
      );
    }
    Ok(SYMBOLS[cn as usize] as char)
  }

  /// Converts an encoded profile into copy numbers, with separators mapped to `SEPARATOR_CODE`
  pub fn decode(&self, encoded: &str) -> Result<Vec<u8>, Unreachable> {
    encoded
      .chars()
      .map(|c| {
        if c == SEPARATOR {
          Ok(SEPARATOR_CODE)
        } else {
          symbol_to_cn(c).filter(|&cn| cn <= self.max_cn).ok_or(Unreachable)
        }
      })
      .collect()
  }

  pub fn encode(&self, codes: &[u8]) -> String {
    codes
      .iter()
      .map(|&code| {
        if code == SEPARATOR_CODE {
          SEPARATOR
        } else {
          SYMBOLS[code as usize] as char
        }
      })
      .collect()
  }

  pub fn describe(&self) -> String {
    self.symbols().join("")
  }
}

/// Parses one copy-number symbol
pub fn symbol_to_cn(symbol: char) -> Option<u8> {
  SYMBOLS
    .iter()
    .position(|&s| s as char == symbol.to_ascii_uppercase())
    .map(|pos| pos as u8)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn separator_is_not_a_copy_number_symbol() -> Result<(), Report> {
    let alphabet = Alphabet::new(MAX_SUPPORTED_CN)?;
    assert!(!alphabet.contains(SEPARATOR));
    assert!(alphabet.symbols().all(|c| c != SEPARATOR));
    Ok(())
  }

  #[rstest]
  fn decodes_and_encodes_with_separators() -> Result<(), Report> {
    let alphabet = Alphabet::new(8)?;
    let codes = alphabet.decode("120X38").map_err(Report::new)?;
    assert_eq!(codes, vec![1, 2, 0, SEPARATOR_CODE, 3, 8]);
    assert_eq!(alphabet.encode(&codes), "120X38");
    Ok(())
  }

  #[rstest]
  #[case("9")]
  #[case("1A")]
  #[case("1-2")]
  fn rejects_symbols_outside_alphabet(#[case] encoded: &str) -> Result<(), Report> {
    let alphabet = Alphabet::new(8)?;
    assert_eq!(alphabet.decode(encoded), Err(Unreachable));
    Ok(())
  }

  #[rstest]
  #[case(0)]
  #[case(16)]
  fn rejects_invalid_maximum(#[case] max_cn: u8) {
    assert!(Alphabet::new(max_cn).is_err());
  }
}
