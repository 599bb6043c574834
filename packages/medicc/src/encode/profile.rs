use crate::make_error;
use eyre::Report;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;

/// Genomic segment. Coordinates are inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
  pub chrom: String,
  pub start: u64,
  pub end: u64,
}

impl Segment {
  pub fn new(chrom: impl AsRef<str>, start: u64, end: u64) -> Self {
    Self {
      chrom: format_chromosome(chrom.as_ref()),
      start,
      end,
    }
  }

  pub const fn width(&self) -> u64 {
    (self.end + 1).saturating_sub(self.start)
  }
}

impl PartialOrd for Segment {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Segment {
  fn cmp(&self, other: &Self) -> Ordering {
    chrom_sort_key(&self.chrom)
      .cmp(&chrom_sort_key(&other.chrom))
      .then(self.start.cmp(&other.start))
      .then(self.end.cmp(&other.end))
  }
}

/// Adds the `chr` prefix if missing
pub fn format_chromosome(chrom: &str) -> String {
  if chrom.starts_with("chr") {
    chrom.to_owned()
  } else {
    format!("chr{chrom}")
  }
}

/// Sort key of a chromosome name: numbered chromosomes in numeric order, then X, then Y, then everything else by name
pub fn chrom_sort_key(chrom: &str) -> (u8, u64, String) {
  let name = chrom.strip_prefix("chr").unwrap_or(chrom);
  if let Ok(number) = name.parse::<u64>() {
    return (0, number, String::new());
  }
  match name {
    "X" => (1, 0, String::new()),
    "Y" => (2, 0, String::new()),
    _ => (3, 0, name.to_owned()),
  }
}

/// Allele-specific copy numbers of a cohort of samples over a shared list of segments.
///
/// Values are stored per sample, then per allele column, then per segment.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyNumberTable {
  allele_columns: Vec<String>,
  segments: Vec<Segment>,
  chromosome_blocks: Vec<Range<usize>>,
  samples: IndexMap<String, Vec<Vec<u8>>>,
}

impl CopyNumberTable {
  pub fn new(allele_columns: Vec<String>, segments: Vec<Segment>) -> Result<Self, Report> {
    if allele_columns.is_empty() {
      return make_error!("No alleles found.");
    }
    let chromosome_blocks = chromosome_blocks(&segments);
    Ok(Self {
      allele_columns,
      segments,
      chromosome_blocks,
      samples: IndexMap::new(),
    })
  }

  pub fn allele_columns(&self) -> &[String] {
    &self.allele_columns
  }

  pub fn n_alleles(&self) -> usize {
    self.allele_columns.len()
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  pub fn n_segments(&self) -> usize {
    self.segments.len()
  }

  /// Ranges of consecutive segments on the same chromosome, in table order
  pub fn chromosome_blocks(&self) -> &[Range<usize>] {
    &self.chromosome_blocks
  }

  /// Index of the chromosome block of every segment
  pub fn chromosome_index(&self) -> Vec<usize> {
    self
      .chromosome_blocks
      .iter()
      .enumerate()
      .flat_map(|(i, block)| block.clone().map(move |_| i))
      .collect()
  }

  pub fn sample_names(&self) -> impl Iterator<Item = &String> {
    self.samples.keys()
  }

  pub fn n_samples(&self) -> usize {
    self.samples.len()
  }

  pub fn contains(&self, sample: &str) -> bool {
    self.samples.contains_key(sample)
  }

  pub fn sample(&self, sample: &str) -> Option<&[Vec<u8>]> {
    self.samples.get(sample).map(Vec::as_slice)
  }

  pub fn samples(&self) -> impl Iterator<Item = (&String, &Vec<Vec<u8>>)> {
    self.samples.iter()
  }

  /// Adds or replaces the copy numbers of a sample. Expects one vector per allele column, one value per segment.
  pub fn insert_sample(&mut self, name: impl Into<String>, alleles: Vec<Vec<u8>>) -> Result<(), Report> {
    let name = name.into();
    if alleles.len() != self.n_alleles() {
      return make_error!(
        "Sample '{name}' has {} alleles, but the table has {} allele columns",
        alleles.len(),
        self.n_alleles()
      );
    }
    if let Some((i, values)) = alleles.iter().find_position(|values| values.len() != self.n_segments()) {
      return make_error!(
        "Allele '{}' of sample '{name}' has {} segments, but the table has {}",
        self.allele_columns[i],
        values.len(),
        self.n_segments()
      );
    }
    self.samples.insert(name, alleles);
    Ok(())
  }

  /// Orders samples by name
  pub fn sort_samples(&mut self) {
    self.samples.sort_keys();
  }

  /// Creates a table over the same segments and alleles containing `values` as a single sample
  pub fn with_single_sample(&self, name: impl Into<String>, alleles: Vec<Vec<u8>>) -> Result<Self, Report> {
    let mut table = Self {
      allele_columns: self.allele_columns.clone(),
      segments: self.segments.clone(),
      chromosome_blocks: self.chromosome_blocks.clone(),
      samples: IndexMap::new(),
    };
    table.insert_sample(name, alleles)?;
    Ok(table)
  }

  /// Smallest start and largest end over all segments
  pub fn genome_span(&self) -> (u64, u64) {
    let start = self.segments.iter().map(|s| s.start).min().unwrap_or_default();
    let end = self.segments.iter().map(|s| s.end).max().unwrap_or_default();
    (start, end)
  }
}

fn chromosome_blocks(segments: &[Segment]) -> Vec<Range<usize>> {
  let mut blocks = vec![];
  let mut begin = 0;
  for i in 1..=segments.len() {
    if i == segments.len() || segments[i].chrom != segments[i - 1].chrom {
      blocks.push(begin..i);
      begin = i;
    }
  }
  blocks
}
