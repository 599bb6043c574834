use crate::cli::medicc_cli::{MediccDetectWgdArgs, MediccRunArgs};
use eyre::{Report, WrapErr};
use itertools::Itertools;
use log::info;
use medicc::io::fs::basename_maybe;
use medicc::io::input::read_and_parse_input_data;
use medicc::io::nwk::create_tree_from_nwk_file;
use medicc::io::output::OutputPaths;
use medicc::make_error;
use medicc::pipeline::run::{run_medicc, write_medicc_results};
use medicc::wgd::detect::detect_wgd;
use std::path::Path;

/// File name of the input without directories and extension
fn default_prefix(input: &Path) -> String {
  basename_maybe(input)
    .and_then(|name| name.split('.').next().map(ToOwned::to_owned))
    .filter(|name| !name.is_empty() && name != "-")
    .unwrap_or_else(|| "medicc".to_owned())
}

pub fn run_medicc_command(args: &MediccRunArgs, n_jobs: usize) -> Result<(), Report> {
  let input_params = args.input.input_params();
  let table = read_and_parse_input_data(&args.input.input, &input_params)?;

  let input_tree = args
    .tree
    .as_ref()
    .map(|filepath| {
      info!("Reading input tree from {filepath:?}");
      create_tree_from_nwk_file(filepath).wrap_err_with(|| format!("When reading input tree {filepath:?}"))
    })
    .transpose()?;

  let params = args.medicc_params(n_jobs);
  let result = run_medicc(&table, input_tree, &params)?;

  let prefix = args.prefix.clone().unwrap_or_else(|| default_prefix(&args.input.input));
  let paths = OutputPaths::new(&args.output_dir, prefix);
  write_medicc_results(&result, &paths, &params.normal_name)?;

  info!("MEDICC run finished: {}", result.summary.wgd_status);
  Ok(())
}

/// Prints `sample<TAB>True|False` for every tested sample
pub fn run_detect_wgd_command(args: &MediccDetectWgdArgs) -> Result<(), Report> {
  let input_params = args.input.input_params();
  let table = read_and_parse_input_data(&args.input.input, &input_params)?;
  let normal_name = input_params.normal_name.as_str();

  let samples = match &args.sample {
    Some(sample) if sample == normal_name => {
      return make_error!("Sample '{sample}' is the normal sample and cannot be tested for WGD");
    }
    Some(sample) => vec![sample.clone()],
    None => table.sample_names().filter(|&name| name != normal_name).cloned().collect_vec(),
  };

  let spec = args.model_spec();
  for sample in samples {
    let has_wgd = detect_wgd(&table, &sample, &spec, args.n_wgd)?;
    println!("{sample}\t{}", if has_wgd { "True" } else { "False" });
  }
  Ok(())
}
