use crate::ancestral::reconstruct::{create_output_table, reconstruct_ancestors, update_branch_lengths};
use crate::distance::engine::DistanceEngine;
use crate::distance::pairwise::{
  calc_pairwise_distance_matrix, calc_pairwise_distance_matrix_parallel, DistanceMatrix,
};
use crate::encode::encoder::encode_profiles;
use crate::encode::profile::CopyNumberTable;
use crate::events::all_events::{calculate_all_cn_events, check_event_consistency, EventReconstruction};
use crate::events::models::EventModels;
use crate::io::input::validate_input;
use crate::io::nwk::{write_nwk_file, WriteNwkOptions};
use crate::io::output::{
  write_branch_lengths, write_cn_events, write_final_cn_profiles, write_pairwise_distances, write_summary,
  OutputPaths,
};
use crate::model::cost_model::CostModel;
use crate::model::med_model::MedModel;
use crate::pipeline::params::MediccParams;
use crate::pipeline::summary::{summarize_patient, PatientSummary};
use crate::tree::infer::{infer_tree_topology, prepare_input_tree};
use crate::tree::reroot::root_with_outgroup;
use crate::tree::tree::Tree;
use eyre::{Report, WrapErr};
use itertools::Itertools;
use log::info;
use std::sync::Arc;

/// Everything a run produces
#[derive(Clone, Debug)]
pub struct MediccResult {
  pub sample_labels: Vec<String>,
  /// All zeros when the tree was supplied
  pub pairwise_distances: DistanceMatrix,
  /// Topology before branch lengths were recomputed from the ancestors
  pub nj_tree: Tree,
  pub final_tree: Tree,
  /// Input samples and reconstructed ancestors. Present only with ancestral reconstruction.
  pub output_table: Option<CopyNumberTable>,
  /// Present only with ancestral and event reconstruction
  pub events: Option<EventReconstruction>,
  pub summary: PatientSummary,
}

/// Runs the whole reconstruction: distances, tree, ancestors, branch lengths and optionally events.
///
/// When `input_tree` is given, no distances are computed and its topology is used as is.
pub fn run_medicc(
  input: &CopyNumberTable,
  input_tree: Option<Tree>,
  params: &MediccParams,
) -> Result<MediccResult, Report> {
  let normal_name = params.normal_name.as_str();
  let spec = params.model_spec();
  let model = Arc::new(MedModel::new(&spec)?);
  info!("Using cost model '{}'", model.id());

  info!("Validating input.");
  validate_input(input, model.alphabet(), normal_name)?;

  info!("Encoding input profiles.");
  let profiles = encode_profiles(input, model.alphabet())?;
  let sample_labels = profiles.keys().cloned().collect_vec();
  let engine = DistanceEngine::new(Arc::clone(&model) as Arc<dyn CostModel>);

  let (pairwise_distances, mut nj_tree) = match input_tree {
    None => {
      info!("Calculating pairwise distance matrices");
      let matrix = if params.n_jobs > 1 {
        calc_pairwise_distance_matrix_parallel(&engine, &profiles, params.n_jobs)?
      } else {
        calc_pairwise_distance_matrix(&engine, &profiles)?
      };
      info!("Inferring tree topology.");
      let tree = infer_tree_topology(&matrix, normal_name)?;
      (matrix, tree)
    }
    Some(tree) => {
      info!("Tree provided, using it. No pairwise distance matrix is calculated!");
      let tree = prepare_input_tree(tree, &sample_labels, normal_name)?;
      (DistanceMatrix::zeros(sample_labels.clone()), tree)
    }
  };

  let mut final_tree = nj_tree.clone();
  let output_table = if params.ancestral_reconstruction {
    info!("Reconstructing ancestors.");
    let ancestors = reconstruct_ancestors(&final_tree, &profiles, &engine, normal_name, params.prune_weight)?;

    info!("Creating output copynumbers.");
    let output_table = create_output_table(input, &ancestors, model.as_ref())?;

    info!("Updating branch lengths of final tree using ancestors.");
    update_branch_lengths(&mut final_tree, &engine, &ancestors, normal_name)?;
    Some(output_table)
  } else {
    None
  };

  root_with_outgroup(&mut nj_tree, normal_name)?;
  root_with_outgroup(&mut final_tree, normal_name)?;

  let events = match (&output_table, params.reconstruct_events) {
    (Some(output_table), true) => {
      info!("Reconstructing events.");
      let models = EventModels::new(&spec, params.event_max_wgd)?;
      let events = calculate_all_cn_events(&final_tree, output_table, &models, normal_name)
        .wrap_err("When reconstructing copy-number events")?;
      check_event_consistency(&final_tree, &events, normal_name);
      Some(events)
    }
    _ => None,
  };

  let summary = summarize_patient(
    &final_tree,
    sample_labels.len(),
    normal_name,
    events.as_ref().map(|events| events.events.as_slice()),
  );

  Ok(MediccResult {
    sample_labels,
    pairwise_distances,
    nj_tree,
    final_tree,
    output_table,
    events,
    summary,
  })
}

/// Writes all result files of a run
pub fn write_medicc_results(result: &MediccResult, paths: &OutputPaths, normal_name: &str) -> Result<(), Report> {
  info!("Writing results to {:?}", paths.output_dir);

  write_pairwise_distances(paths.pairwise_distances(), &result.pairwise_distances)?;
  write_nwk_file(paths.final_tree(), &result.final_tree, &WriteNwkOptions::default())?;
  write_branch_lengths(paths.branch_lengths(), &result.final_tree, normal_name)?;

  if let Some(output_table) = &result.output_table {
    write_final_cn_profiles(paths.final_cn_profiles(), output_table, result.events.as_ref())?;
  }
  if let Some(events) = &result.events {
    write_cn_events(paths.cn_events(), &events.events)?;
  }
  write_summary(paths.summary(), &result.summary)?;
  Ok(())
}
