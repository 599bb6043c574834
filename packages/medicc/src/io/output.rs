use crate::distance::pairwise::DistanceMatrix;
use crate::encode::profile::CopyNumberTable;
use crate::events::all_events::EventReconstruction;
use crate::events::event::EventRecord;
use crate::io::csv::{CsvStructFileWriter, CsvVecFileWriter, CsvVecWriter};
use crate::io::file::create_file_or_stdout;
use crate::make_internal_error;
use crate::pipeline::summary::PatientSummary;
use crate::tree::tree::Tree;
use crate::utils::float_fmt::float_to_digits;
use eyre::{Report, WrapErr};
use itertools::{chain, Itertools};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths of all result files of a run: `<output_dir>/<prefix><suffix>`
#[derive(Clone, Debug)]
pub struct OutputPaths {
  pub output_dir: PathBuf,
  pub prefix: String,
}

impl OutputPaths {
  pub fn new(output_dir: impl AsRef<Path>, prefix: impl AsRef<str>) -> Self {
    Self {
      output_dir: output_dir.as_ref().to_owned(),
      prefix: prefix.as_ref().to_owned(),
    }
  }

  fn path(&self, suffix: &str) -> PathBuf {
    self.output_dir.join(format!("{}{suffix}", self.prefix))
  }

  pub fn pairwise_distances(&self) -> PathBuf {
    self.path("_pairwise_distances.tsv")
  }

  pub fn final_tree(&self) -> PathBuf {
    self.path("_final_tree.new")
  }

  pub fn branch_lengths(&self) -> PathBuf {
    self.path("_branch_lengths.tsv")
  }

  pub fn final_cn_profiles(&self) -> PathBuf {
    self.path("_final_cn_profiles.tsv")
  }

  pub fn cn_events(&self) -> PathBuf {
    self.path("_cn_events_df.tsv")
  }

  pub fn summary(&self) -> PathBuf {
    self.path("_summary.tsv")
  }
}

fn fmt_float(x: f64) -> String {
  float_to_digits(x, None, None)
}

/// Writes the distance matrix with the sample names as header and as first column
pub fn write_pairwise_distances(filepath: impl AsRef<Path>, matrix: &DistanceMatrix) -> Result<(), Report> {
  let headers = chain!([String::new()], matrix.labels().iter().cloned()).collect_vec();
  let mut writer = CsvVecFileWriter::new(filepath, b'\t', &headers)?;
  for (label, row) in matrix.labels().iter().zip(matrix.values().rows()) {
    writer.write(chain!([label.clone()], row.iter().map(|&x| fmt_float(x))))?;
  }
  writer.flush()
}

/// Writes `name<TAB>branch_length` for every named node except the normal sample
pub fn write_branch_lengths(filepath: impl AsRef<Path>, tree: &Tree, normal_name: &str) -> Result<(), Report> {
  let filepath = filepath.as_ref();
  let mut f = create_file_or_stdout(filepath)?;
  write_branch_lengths_writer(&mut f, tree, normal_name)
    .wrap_err_with(|| format!("When writing branch lengths to {filepath:?}"))?;
  f.flush()?;
  Ok(())
}

pub fn write_branch_lengths_writer(writer: &mut impl Write, tree: &Tree, normal_name: &str) -> Result<(), Report> {
  for key in tree.preorder() {
    match tree.name_of(key) {
      Some(name) if name != normal_name => {
        writeln!(writer, "{name}\t{}", fmt_float(tree.branch_length(key)))?;
      }
      _ => {}
    }
  }
  Ok(())
}

/// Writes the copy numbers of all samples and ancestors, one row per sample and segment, sorted by sample.
///
/// With events, the per-segment flags `is_normal`, `is_clonal`, `is_gain`, `is_loss` and `is_wgd` are appended.
pub fn write_final_cn_profiles(
  filepath: impl AsRef<Path>,
  table: &CopyNumberTable,
  events: Option<&EventReconstruction>,
) -> Result<(), Report> {
  let filepath = filepath.as_ref();
  let f = create_file_or_stdout(filepath)?;
  write_final_cn_profiles_writer(f, table, events)
    .wrap_err_with(|| format!("When writing copy-number profiles to {filepath:?}"))
}

pub fn write_final_cn_profiles_writer(
  writer: impl Write + Send,
  table: &CopyNumberTable,
  events: Option<&EventReconstruction>,
) -> Result<(), Report> {
  const FLAG_COLUMNS: [&str; 5] = ["is_normal", "is_clonal", "is_gain", "is_loss", "is_wgd"];

  let headers = chain!(
    ["sample_id", "chrom", "start", "end"].map(ToOwned::to_owned),
    table.allele_columns().iter().cloned(),
    events.iter().flat_map(|_| FLAG_COLUMNS.map(ToOwned::to_owned)),
  )
  .collect_vec();
  let mut writer = CsvVecWriter::new(writer, b'\t', &headers)?;

  let fmt_bool = |x: bool| (if x { "True" } else { "False" }).to_owned();
  for (name, alleles) in table.samples().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
    for (i, segment) in table.segments().iter().enumerate() {
      let flags = match events {
        None => vec![],
        Some(events) => {
          let Some(sample_flags) = events.flags_of(name) else {
            return make_internal_error!("No event flags for sample '{name}'");
          };
          let flags = sample_flags[i];
          [
            events.is_normal[i],
            events.is_clonal[i],
            flags.is_gain,
            flags.is_loss,
            flags.is_wgd,
          ]
          .map(fmt_bool)
          .to_vec()
        }
      };

      writer.write(chain!(
        [
          name.clone(),
          segment.chrom.clone(),
          segment.start.to_string(),
          segment.end.to_string()
        ],
        alleles.iter().map(|values| values[i].to_string()),
        flags,
      ))?;
    }
  }
  writer.flush()
}

/// Writes one row per copy-number event
pub fn write_cn_events(filepath: impl AsRef<Path>, events: &[EventRecord]) -> Result<(), Report> {
  let mut writer = CsvStructFileWriter::new(filepath, b'\t')?;
  for event in events {
    writer.write(event)?;
  }
  writer.flush()
}

/// Writes the summary statistics as `name<TAB>value` rows
pub fn write_summary(filepath: impl AsRef<Path>, summary: &PatientSummary) -> Result<(), Report> {
  let filepath = filepath.as_ref();
  let mut f = create_file_or_stdout(filepath)?;
  for (name, value) in summary.to_rows() {
    writeln!(f, "{name}\t{value}").wrap_err_with(|| format!("When writing summary to {filepath:?}"))?;
  }
  f.flush()?;
  Ok(())
}
