use crate::encode::profile::{CopyNumberTable, Segment};
use crate::io::csv::{csv_read_records, get_col_index};
use crate::io::file::open_file_or_stdin;
use crate::make_error;
use crate::model::alphabet::{Alphabet, MAX_SUPPORTED_CN};
use crate::model::med_model::DEFAULT_MAX_CN;
use crate::o;
use eyre::{Report, WrapErr};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

pub const DEFAULT_NORMAL_NAME: &str = "diploid";

/// Total length of gaps between segments above which a warning is issued
const MAX_TOTAL_GAPS: f64 = 1e8;

const REQUIRED_COLUMNS: [&str; 3] = ["sample_id", "start", "end"];

const INTEGER_PATTERN: &str = r"^[+-]?\d+$";

lazy_static! {
  static ref INTEGER_REGEX: Regex = Regex::new(INTEGER_PATTERN)
    .wrap_err_with(|| format!("When compiling regular expression '{INTEGER_PATTERN}'"))
    .unwrap();
}

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct InputParams {
  #[default(vec![o!("cn_a"), o!("cn_b")])]
  pub allele_columns: Vec<String>,

  #[default(o!("chrom"))]
  pub chrom_column: String,

  #[default(o!(DEFAULT_NORMAL_NAME))]
  pub normal_name: String,

  #[default(DEFAULT_MAX_CN)]
  pub max_cn: u8,

  /// Allele column holds total copy numbers. The normal value is 2 instead of 1.
  pub total_cn: bool,

  /// Segments of this length or shorter are removed
  pub filter_segment_length: Option<u64>,
}

impl InputParams {
  pub const fn normal_value(&self) -> u8 {
    if self.total_cn {
      2
    } else {
      1
    }
  }
}

struct Row {
  sample: String,
  segment: Segment,
  values: Vec<u8>,
}

/// Reads a TSV file of copy numbers, adds the normal sample if missing and applies the segment length filter
pub fn read_and_parse_input_data(filepath: impl AsRef<Path>, params: &InputParams) -> Result<CopyNumberTable, Report> {
  let filepath = filepath.as_ref();
  info!("Reading TSV file {filepath:?}");
  let reader = open_file_or_stdin(&Some(filepath))?;
  read_and_parse_input_reader(reader, params).wrap_err_with(|| format!("When reading input file {filepath:?}"))
}

pub fn read_and_parse_input_reader(reader: impl Read, params: &InputParams) -> Result<CopyNumberTable, Report> {
  check_params(params)?;

  let table = read_tsv(reader, params)?;
  warn_on_duplicated_samples(&table);
  warn_on_diploid_samples(&table, params);

  let table = add_normal_sample(table, &params.normal_name, params.normal_value())?;
  let n_chromosomes = table.segments().iter().map(|s| &s.chrom).unique().count();
  info!(
    "Read {} samples, {} chromosomes, {} segments per sample",
    table.n_samples(),
    n_chromosomes,
    table.n_segments()
  );
  warn_on_gaps(&table);

  match params.filter_segment_length {
    Some(filter_size) => filter_by_segment_length(&table, filter_size),
    None => Ok(table),
  }
}

fn check_params(params: &InputParams) -> Result<(), Report> {
  if params.max_cn > MAX_SUPPORTED_CN {
    return make_error!("Maximum copy number must be <= {MAX_SUPPORTED_CN}.");
  }
  if params.allele_columns.len() == 1 && !params.total_cn {
    warn!("You have provided only one allele column but the --total-copy-numbers flag was not set");
  }
  if params.total_cn && params.allele_columns.len() != 1 {
    return make_error!(
      "You have set the --total-copy-numbers flag but provided more than one allele column. \
       Set allele columns with the flag --input-allele-columns"
    );
  }
  Ok(())
}

fn read_tsv(reader: impl Read, params: &InputParams) -> Result<CopyNumberTable, Report> {
  let (headers, records) = csv_read_records(reader, b'\t')?;

  let column_names = REQUIRED_COLUMNS
    .iter()
    .map(|&c| c.to_owned())
    .chain([params.chrom_column.clone()])
    .chain(params.allele_columns.iter().cloned())
    .collect_vec();
  let missing = column_names.iter().filter(|c| !headers.contains(c)).collect_vec();
  if !missing.is_empty() {
    return make_error!(
      "TSV file needs the following columns: sample_id, chrom, start, end and the allele columns ({})\n\
       Missing columns are: {}",
      params.allele_columns.join(", "),
      missing.iter().join(", ")
    );
  }
  info!("Successfully read input file. Using columns: {}", column_names.join(", "));

  let i_sample = get_col_index(&headers, "sample_id")?;
  let i_chrom = get_col_index(&headers, &params.chrom_column)?;
  let i_start = get_col_index(&headers, "start")?;
  let i_end = get_col_index(&headers, "end")?;
  let i_alleles = params
    .allele_columns
    .iter()
    .map(|c| get_col_index(&headers, c))
    .collect::<Result<Vec<_>, Report>>()?;

  let mut has_floats = false;
  let mut has_capped = false;
  let rows = records
    .iter()
    .enumerate()
    .map(|(i, record)| {
      let field = |index: usize| record.get(index).unwrap_or_default();
      let coordinate = |index: usize| -> Result<u64, Report> {
        field(index)
          .parse::<u64>()
          .wrap_err_with(|| format!("When parsing coordinate '{}' in row {}", field(index), i + 1))
      };

      let values = i_alleles
        .iter()
        .map(|&index| {
          let (value, rounded) = parse_copy_number(field(index))
            .wrap_err_with(|| format!("When parsing copy number in row {}", i + 1))?;
          has_floats |= rounded;
          has_capped |= value > u64::from(params.max_cn);
          Ok(value.min(u64::from(params.max_cn)) as u8)
        })
        .collect::<Result<Vec<u8>, Report>>()?;

      Ok(Row {
        sample: field(i_sample).to_owned(),
        segment: Segment::new(field(i_chrom), coordinate(i_start)?, coordinate(i_end)?),
        values,
      })
    })
    .collect::<Result<Vec<Row>, Report>>()?;

  if has_floats {
    warn!("Floating point payload! I will round, but this might not be intended.");
  }
  if has_capped {
    warn!("Integer CN > maxcn {}, capping.", params.max_cn);
  }
  if rows.iter().any(|row| row.segment.chrom.contains('Y')) {
    warn!("Y chromosome detected in input. This might cause errors down the line!");
  }

  build_table(rows, &params.allele_columns)
}

/// Parses an integer-like copy number. Returns the value and whether it had to be rounded.
fn parse_copy_number(value: &str) -> Result<(u64, bool), Report> {
  let (number, rounded) = if INTEGER_REGEX.is_match(value) {
    (value.parse::<i64>()?, false)
  } else {
    let float = value
      .parse::<f64>()
      .wrap_err_with(|| format!("Copy number '{value}' is not a number"))?;
    if !float.is_finite() {
      return make_error!("Copy number '{value}' is not finite");
    }
    (float.round() as i64, true)
  };
  if number < 0 {
    return make_error!("Copy number '{value}' is negative");
  }
  Ok((number as u64, rounded))
}

fn build_table(rows: Vec<Row>, allele_columns: &[String]) -> Result<CopyNumberTable, Report> {
  let segments: BTreeSet<Segment> = rows.iter().map(|row| row.segment.clone()).collect();
  let segments = segments.into_iter().collect_vec();
  let segment_index: IndexMap<&Segment, usize> = segments.iter().enumerate().map(|(i, s)| (s, i)).collect();

  let mut per_sample: IndexMap<String, Vec<Option<Vec<u8>>>> = IndexMap::new();
  for row in &rows {
    let values = per_sample
      .entry(row.sample.clone())
      .or_insert_with(|| vec![None; segments.len()]);
    let i = segment_index[&row.segment];
    if values[i].is_some() {
      return make_error!(
        "Segment {}:{}-{} is listed more than once for sample '{}'",
        row.segment.chrom,
        row.segment.start,
        row.segment.end,
        row.sample
      );
    }
    values[i] = Some(row.values.clone());
  }
  per_sample.sort_keys();

  let mut table = CopyNumberTable::new(allele_columns.to_vec(), segments)?;
  for (sample, values) in per_sample {
    let Some(values) = values.into_iter().collect::<Option<Vec<Vec<u8>>>>() else {
      return make_error!(
        "The samples have different segments!\nTotal number of unique segments: {}\n",
        table.n_segments()
      );
    };
    let alleles = (0..allele_columns.len())
      .map(|a| values.iter().map(|segment| segment[a]).collect_vec())
      .collect_vec();
    table.insert_sample(sample, alleles)?;
  }
  Ok(table)
}

fn warn_on_duplicated_samples(table: &CopyNumberTable) {
  let duplicated = table
    .samples()
    .filter(|(name, values)| table.samples().any(|(other, other_values)| other != *name && other_values == *values))
    .map(|(name, _)| name)
    .collect_vec();
  if !duplicated.is_empty() {
    warn!("Duplicated entries found in input data: [{}]", duplicated.iter().join(", "));
  }
}

fn warn_on_diploid_samples(table: &CopyNumberTable, params: &InputParams) {
  let normal_value = params.normal_value();
  let diploid = table
    .samples()
    .filter(|(name, _)| **name != params.normal_name)
    .filter(|(_, values)| values.iter().flatten().all(|&v| v == normal_value))
    .map(|(name, _)| name)
    .collect_vec();
  if !diploid.is_empty() {
    warn!("Diploid samples found in input data: [{}]", diploid.iter().join(", "));
  }
}

fn warn_on_gaps(table: &CopyNumberTable) {
  let segments = table.segments();
  let n = segments.len();
  let total_gaps: i64 = (0..n)
    .map(|i| segments[i].start as i64 - segments[(i + n - 1) % n].end as i64)
    .filter(|&gap| gap > 0)
    .sum();
  if total_gaps as f64 > MAX_TOTAL_GAPS {
    warn!(
      "Total of {total_gaps:.1e} bp gaps in the segmentation. Large gaps might affect the performance of MEDICC2.",
      total_gaps = total_gaps as f64
    );
  }
}

/// Adds an artificial normal sample with the normal copy number on every allele, or checks the one present
pub fn add_normal_sample(
  mut table: CopyNumberTable,
  normal_name: &str,
  normal_value: u8,
) -> Result<CopyNumberTable, Report> {
  match table.sample(normal_name) {
    None => {
      info!("Normal sample '{normal_name}' not found, adding artifical normal by the name: '{normal_name}'.");
      let alleles = vec![vec![normal_value; table.n_segments()]; table.n_alleles()];
      table.insert_sample(normal_name, alleles)?;
      table.sort_samples();
    }
    Some(values) => {
      info!("Sample '{normal_name}' was found in data and is used as normal");
      if values.iter().flatten().any(|&v| v == 0) {
        warn!(
          "The provided normal sample contains segments with copy number 0. \
           If any other sample has non-zero values in these segments, MEDICC will crash"
        );
      }
      if values.iter().flatten().any(|&v| v != normal_value) {
        warn!("The provided normal sample contains segments with copy number != {normal_value}.");
      }
    }
  }
  Ok(table)
}

/// Keeps only segments longer than `filter_size`
pub fn filter_by_segment_length(table: &CopyNumberTable, filter_size: u64) -> Result<CopyNumberTable, Report> {
  let kept = table
    .segments()
    .iter()
    .positions(|segment| segment.width() > filter_size)
    .collect_vec();
  info!(
    "Filtering segments of length <= {filter_size}: {} of {} segments kept",
    kept.len(),
    table.n_segments()
  );

  let segments = kept.iter().map(|&i| table.segments()[i].clone()).collect_vec();
  let mut filtered = CopyNumberTable::new(table.allele_columns().to_vec(), segments)?;
  for (name, alleles) in table.samples() {
    let alleles = alleles
      .iter()
      .map(|values| kept.iter().map(|&i| values[i]).collect_vec())
      .collect_vec();
    filtered.insert_sample(name.clone(), alleles)?;
  }
  Ok(filtered)
}

/// Checks that the table can be processed: the normal sample is present, there are at least two other samples, there
/// are one or two alleles and every copy number is part of the alphabet.
pub fn validate_input(table: &CopyNumberTable, alphabet: &Alphabet, normal_name: &str) -> Result<(), Report> {
  if !table.contains(normal_name) {
    return make_error!(
      "Normal sample '{normal_name}' not found in input data. Specify a different name using the --normal-name flag."
    );
  }
  if table.n_samples() <= 2 {
    return make_error!("MEDICC2 requires at least 2 non-diploid samples to run.");
  }
  if table.n_alleles() > 2 {
    return make_error!("More than 2 alleles are currently not supported.");
  }
  if table.n_alleles() == 0 {
    return make_error!("No alleles found.");
  }

  let offending: IndexSet<u8> = table
    .samples()
    .flat_map(|(_, alleles)| alleles.iter().flatten().copied())
    .filter(|&cn| cn > alphabet.max_cn())
    .sorted()
    .collect();
  if !offending.is_empty() {
    return make_error!(
      "Not all input symbols are contained in symbol table. Offending symbols: {{{}}}",
      offending.iter().join(", ")
    );
  }

  info!("Input data is valid!");
  Ok(())
}
