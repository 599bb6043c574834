#![allow(clippy::struct_excessive_bools)]

use crate::cli::jobs::Jobs;
use crate::cli::verbosity::Verbosity;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use eyre::Report;
use medicc::io::input::{InputParams, DEFAULT_NORMAL_NAME};
use medicc::model::med_model::{ModelSpec, DEFAULT_MAX_CN};
use medicc::pipeline::params::{MediccParams, DEFAULT_EVENT_MAX_WGD};
use medicc::utils::global_init::setup_logger;
use std::fmt::Debug;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "medicc")]
#[clap(author, version)]
#[clap(verbatim_doc_comment)]
/// Minimum-event distance phylogenies from allele-specific copy-number profiles
///
/// Reconstructs the evolutionary history of tumor samples from their copy-number profiles: pairwise distances,
/// the tree, ancestral profiles and the copy-number events on every branch.
pub struct MediccArgs {
  #[clap(subcommand)]
  pub command: MediccCommands,

  #[clap(flatten)]
  pub jobs: Jobs,

  #[clap(flatten)]
  pub verbosity: Verbosity,
}

#[derive(Subcommand, Debug)]
#[clap(verbatim_doc_comment)]
pub enum MediccCommands {
  /// Generate shell completions.
  ///
  /// This will print the completions file contents to the console. Refer to your shell's documentation on how to install the completions.
  ///
  /// Example for Ubuntu Linux:
  ///
  ///    medicc completions bash > ~/.local/share/bash-completion/medicc
  ///
  Completions {
    /// Name of the shell to generate appropriate completions
    #[clap(value_name = "SHELL", value_enum, default_value_t = Shell::Bash)]
    shell: Shell,
  },

  /// Infers the phylogeny of a set of samples, reconstructs ancestral copy numbers and, optionally, the copy-number
  /// events on every branch.
  Run(MediccRunArgs),

  /// Tests whether a single sample carries a whole-genome doubling, by comparing its distance from the diploid
  /// genome with and without WGD.
  DetectWgd(MediccDetectWgdArgs),
}

/// Options of the input table, shared by all commands reading copy numbers
#[derive(Parser, Debug, Clone)]
pub struct MediccInputArgs {
  /// Path to a TSV file with the columns sample_id, chrom, start, end and one column per allele.
  ///
  /// Use "-" to read from standard input.
  #[clap(value_hint = ValueHint::FilePath)]
  #[clap(display_order = 1)]
  pub input: PathBuf,

  /// Name of the normal sample. If absent from the input, an artificial diploid sample with this name is added.
  #[clap(long, short = 'n', default_value = DEFAULT_NORMAL_NAME)]
  pub normal_name: String,

  /// Names of the allele columns
  #[clap(long, short = 'a', num_args = 1.., default_values_t = [String::from("cn_a"), String::from("cn_b")])]
  pub input_allele_columns: Vec<String>,

  /// Name of the chromosome column
  #[clap(long, default_value = "chrom")]
  pub chrom_column: String,

  /// Maximum copy number. Larger values in the input are capped.
  #[clap(long, default_value_t = DEFAULT_MAX_CN)]
  pub maxcn: u8,

  /// Input contains a single column of total copy numbers rather than allele-specific copy numbers
  #[clap(long)]
  pub total_copy_numbers: bool,

  /// Remove segments that are not longer than this number of base pairs
  #[clap(long)]
  pub filter_segment_length: Option<u64>,
}

impl MediccInputArgs {
  pub fn input_params(&self) -> InputParams {
    InputParams {
      allele_columns: self.input_allele_columns.clone(),
      chrom_column: self.chrom_column.clone(),
      normal_name: self.normal_name.clone(),
      max_cn: self.maxcn,
      total_cn: self.total_copy_numbers,
      filter_segment_length: self.filter_segment_length,
    }
  }
}

#[derive(Parser, Debug, Clone)]
pub struct MediccRunArgs {
  #[clap(flatten)]
  pub input: MediccInputArgs,

  /// Directory to write the results to. Created if it does not exist.
  #[clap(value_hint = ValueHint::DirPath)]
  #[clap(display_order = 2)]
  pub output_dir: PathBuf,

  /// Prefix of the output file names. Defaults to the input file name without its extension.
  #[clap(long, short = 'p')]
  pub prefix: Option<String>,

  /// Newick file with a tree to use instead of inferring one from pairwise distances
  #[clap(long, short = 't')]
  #[clap(value_hint = ValueHint::FilePath)]
  pub tree: Option<PathBuf>,

  /// WGDs double every copy number instead of adding one copy to every allele
  #[clap(long)]
  pub wgd_x2: bool,

  /// Do not allow whole-genome doublings
  #[clap(long)]
  pub no_wgd: bool,

  /// Reconstruct the copy-number events on every branch
  #[clap(long)]
  pub events: bool,

  /// Largest number of WGDs placed on a single branch when reconstructing events
  #[clap(long, default_value_t = DEFAULT_EVENT_MAX_WGD)]
  pub events_max_wgd: u8,

  /// Only infer the tree. Branch lengths are not updated and no ancestors or events are reconstructed.
  #[clap(long)]
  pub no_ancestral_reconstruction: bool,

  /// Candidate ancestors costing more than the best candidate plus this weight are discarded early during ancestral
  /// reconstruction
  #[clap(long, default_value_t = 0.0)]
  pub prune_weight: f64,
}

impl MediccRunArgs {
  pub fn medicc_params(&self, n_jobs: usize) -> MediccParams {
    MediccParams {
      normal_name: self.input.normal_name.clone(),
      prune_weight: self.prune_weight,
      no_wgd: self.no_wgd,
      wgd_x2: self.wgd_x2,
      total_cn: self.input.total_copy_numbers,
      max_cn: self.input.maxcn,
      ancestral_reconstruction: !self.no_ancestral_reconstruction,
      reconstruct_events: self.events,
      event_max_wgd: self.events_max_wgd,
      n_jobs,
    }
  }
}

#[derive(Parser, Debug, Clone)]
pub struct MediccDetectWgdArgs {
  #[clap(flatten)]
  pub input: MediccInputArgs,

  /// Sample to test. All samples except the normal sample are tested when not given.
  #[clap(long, short = 's')]
  pub sample: Option<String>,

  /// Number of WGDs the sample is known to carry already. Detects one WGD more than that.
  #[clap(long)]
  pub n_wgd: Option<u8>,

  /// WGDs double every copy number instead of adding one copy to every allele
  #[clap(long)]
  pub wgd_x2: bool,
}

impl MediccDetectWgdArgs {
  pub fn model_spec(&self) -> ModelSpec {
    ModelSpec {
      total_cn: self.input.total_copy_numbers,
      wgd_x2: self.wgd_x2,
      max_cn: self.input.maxcn,
      ..ModelSpec::default()
    }
  }
}

pub fn generate_shell_completions(shell: Shell) -> Result<(), Report> {
  let mut command = MediccArgs::command();
  let bin_name = command.get_name().to_owned();
  generate(shell, &mut command, bin_name, &mut io::stdout());
  Ok(())
}

pub fn medicc_parse_cli_args() -> Result<MediccArgs, Report> {
  let args = MediccArgs::parse();
  setup_logger(args.verbosity.get_filter_level());
  Ok(args)
}

#[cfg(test)]
mod tests {
  use super::*;
  use log::LevelFilter;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn verifies_command_definition() {
    MediccArgs::command().debug_assert();
  }

  #[rstest]
  fn parses_run_args() -> Result<(), Report> {
    let args = MediccArgs::try_parse_from([
      "medicc",
      "run",
      "input.tsv",
      "out",
      "--total-copy-numbers",
      "--input-allele-columns",
      "cn",
      "--events",
      "-j",
      "4",
      "-v",
    ])?;

    assert_eq!(args.verbosity.get_filter_level(), LevelFilter::Info);
    let MediccCommands::Run(run_args) = args.command else {
      panic!("expected the run command");
    };
    let params = run_args.medicc_params(args.jobs.jobs);
    assert!(params.total_cn);
    assert!(params.reconstruct_events);
    assert!(params.ancestral_reconstruction);
    assert_eq!(params.n_jobs, 4);
    assert_eq!(params.normal_name, "diploid");
    assert_eq!(run_args.input.input_params().allele_columns, vec!["cn".to_owned()]);
    Ok(())
  }

  #[rstest]
  fn rejects_conflicting_verbosity() {
    let result = MediccArgs::try_parse_from(["medicc", "--silent", "-v", "detect-wgd", "input.tsv"]);
    assert!(result.is_err());
  }
}
