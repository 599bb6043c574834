use crate::io::input::DEFAULT_NORMAL_NAME;
use crate::model::med_model::{ModelSpec, DEFAULT_MAX_CN};
use crate::o;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Largest number of WGDs placed on a single branch during event reconstruction
pub const DEFAULT_EVENT_MAX_WGD: u8 = 1;

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct MediccParams {
  #[default(o!(DEFAULT_NORMAL_NAME))]
  pub normal_name: String,

  /// Passed to ancestor reconstruction. Candidate ancestors costing more than the best one plus this weight are
  /// discarded early.
  #[default(0.0)]
  pub prune_weight: f64,

  pub no_wgd: bool,

  /// WGDs double every copy number instead of adding one copy per allele
  pub wgd_x2: bool,

  pub total_cn: bool,

  #[default(DEFAULT_MAX_CN)]
  pub max_cn: u8,

  #[default(true)]
  pub ancestral_reconstruction: bool,

  pub reconstruct_events: bool,

  #[default(DEFAULT_EVENT_MAX_WGD)]
  pub event_max_wgd: u8,

  /// Distances are computed in parallel groups when greater than 1
  #[default(1)]
  pub n_jobs: usize,
}

impl MediccParams {
  pub fn model_spec(&self) -> ModelSpec {
    ModelSpec {
      no_wgd: self.no_wgd,
      n_wgd: None,
      total_cn: self.total_cn,
      wgd_x2: self.wgd_x2,
      max_cn: self.max_cn,
    }
  }
}
