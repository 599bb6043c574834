use crate::encode::profile::CopyNumberTable;
use crate::make_error;
use crate::model::alphabet::{symbol_to_cn, Alphabet};
use eyre::{Report, WrapErr};
use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use std::ops::Range;

/// Copy numbers of one sample, in the shape they are encoded from
#[derive(Clone, Copy, Debug)]
pub enum ProfileView<'a> {
  /// One value vector per allele column. Allele strings are joined with the separator.
  Table {
    alleles: &'a [Vec<u8>],
    blocks: &'a [Range<usize>],
  },
  /// A single value vector
  Vector {
    values: &'a [u8],
    blocks: &'a [Range<usize>],
  },
}

impl<'a> ProfileView<'a> {
  pub fn of_sample(table: &'a CopyNumberTable, sample: &str) -> Result<Self, Report> {
    let Some(alleles) = table.sample(sample) else {
      return make_error!("Sample '{sample}' not found");
    };
    Ok(Self::Table {
      alleles,
      blocks: table.chromosome_blocks(),
    })
  }

  /// Encodes the values chromosome by chromosome, joining chromosomes with the separator
  pub fn aggregate(&self, alphabet: &Alphabet) -> Result<String, Report> {
    let separator = alphabet.separator().to_string();
    match self {
      ProfileView::Table { alleles, blocks } => {
        let per_allele = alleles
          .iter()
          .map(|values| ProfileView::Vector { values, blocks }.aggregate(alphabet))
          .collect::<Result<Vec<_>, Report>>()?;
        Ok(per_allele.join(&separator))
      }
      ProfileView::Vector { values, blocks } => {
        let per_chromosome = blocks
          .iter()
          .map(|block| {
            values[block.clone()]
              .iter()
              .map(|&cn| alphabet.symbol(cn))
              .collect::<Result<String, Report>>()
          })
          .collect::<Result<Vec<_>, Report>>()?;
        Ok(per_chromosome.join(&separator))
      }
    }
  }
}

/// Encodes every sample of the table
pub fn encode_profiles(table: &CopyNumberTable, alphabet: &Alphabet) -> Result<IndexMap<String, String>, Report> {
  info!(
    "Encoding copy-number profiles of {} samples with the following data columns: {}",
    table.n_samples(),
    table.allele_columns().join(", ")
  );
  table
    .sample_names()
    .map(|sample| {
      let encoded = ProfileView::of_sample(table, sample)?
        .aggregate(alphabet)
        .wrap_err_with(|| format!("When encoding sample '{sample}'"))?;
      Ok((sample.clone(), encoded))
    })
    .collect()
}

/// Splits an encoded profile back into one value vector per allele column
pub fn decode_profile(
  name: &str,
  encoded: &str,
  table: &CopyNumberTable,
  alphabet: &Alphabet,
) -> Result<Vec<Vec<u8>>, Report> {
  let n_alleles = table.n_alleles();
  let chunks = encoded.split(alphabet.separator()).collect_vec();
  if chunks.len() % n_alleles != 0 {
    return make_error!(
      "For sample {name} we have {} haplotype-specific chromosomes for {n_alleles} alleles\nnumber of chromosomes has to be divisible by nr of alleles",
      chunks.len()
    );
  }

  let n_chroms = chunks.len() / n_alleles;
  chunks
    .chunks(n_chroms)
    .zip(table.allele_columns())
    .map(|(allele_chunks, allele)| {
      let values = allele_chunks
        .iter()
        .flat_map(|chunk| chunk.chars())
        .map(|c| match symbol_to_cn(c).filter(|&cn| cn <= alphabet.max_cn()) {
          Some(cn) => Ok(cn),
          None => make_error!("Symbol '{c}' of sample {name} is not in the alphabet {}", alphabet.describe()),
        })
        .collect::<Result<Vec<u8>, Report>>()?;
      if values.len() != table.n_segments() {
        return make_error!(
          "Allele '{allele}' of sample {name} has {} segments, but the input has {}",
          values.len(),
          table.n_segments()
        );
      }
      Ok(values)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encode::profile::Segment;
  use crate::o;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn table() -> Result<CopyNumberTable, Report> {
    let segments = vec![
      Segment::new("chr1", 0, 9),
      Segment::new("chr1", 10, 19),
      Segment::new("chr1", 20, 29),
      Segment::new("chr2", 0, 9),
      Segment::new("chr2", 10, 19),
    ];
    let mut table = CopyNumberTable::new(vec![o!("cn_a"), o!("cn_b")], segments)?;
    table.insert_sample("diploid", vec![vec![1; 5], vec![1; 5]])?;
    table.insert_sample("t1", vec![vec![2, 2, 1, 0, 3], vec![1, 1, 1, 1, 8]])?;
    Ok(table)
  }

  #[rstest]
  fn encodes_alleles_and_chromosomes_with_separators() -> Result<(), Report> {
    let alphabet = Alphabet::new(8)?;
    let encoded = encode_profiles(&table()?, &alphabet)?;
    assert_eq!(encoded["diploid"], "111X11X111X11");
    assert_eq!(encoded["t1"], "221X03X111X18");
    Ok(())
  }

  #[rstest]
  fn single_vector_has_half_the_chunks() -> Result<(), Report> {
    let alphabet = Alphabet::new(8)?;
    let table = table()?;
    let view = ProfileView::Vector {
      values: &[2, 2, 1, 0, 3],
      blocks: table.chromosome_blocks(),
    };
    assert_eq!(view.aggregate(&alphabet)?, "221X03");
    Ok(())
  }

  #[rstest]
  fn rejects_values_outside_alphabet() -> Result<(), Report> {
    let alphabet = Alphabet::new(4)?;
    assert!(encode_profiles(&table()?, &alphabet).is_err());
    Ok(())
  }

  #[rstest]
  fn decoding_inverts_encoding() -> Result<(), Report> {
    let alphabet = Alphabet::new(8)?;
    let table = table()?;
    for (name, encoded) in encode_profiles(&table, &alphabet)? {
      let decoded = decode_profile(&name, &encoded, &table, &alphabet)?;
      assert_eq!(Some(decoded.as_slice()), table.sample(&name));
    }
    Ok(())
  }

  #[rstest]
  fn rejects_chunk_count_not_divisible_by_alleles() -> Result<(), Report> {
    let alphabet = Alphabet::new(8)?;
    let err = decode_profile("internal_1", "111X11X111", &table()?, &alphabet).unwrap_err();
    assert!(err.to_string().contains("3 haplotype-specific chromosomes for 2 alleles"));
    Ok(())
  }
}
