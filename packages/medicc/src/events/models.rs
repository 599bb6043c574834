use crate::distance::engine::DistanceEngine;
use crate::model::med_model::{MedModel, ModelSpec};
use eyre::Report;
use std::sync::Arc;

/// How many WGDs the event reconstruction may place on a branch, and of which kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WgdMode {
  NoWgd,
  /// Additive WGDs on allele-specific data, up to `max_wgd` (1 to 3) per branch
  Allelic { max_wgd: u8 },
  /// Additive WGD of +2 on total copy numbers
  TotalCn,
  /// Multiplicative WGD, one or two per branch
  Doubling,
}

impl WgdMode {
  pub fn from_spec(spec: &ModelSpec, max_wgd: u8) -> Self {
    if spec.no_wgd {
      Self::NoWgd
    } else if spec.wgd_x2 {
      Self::Doubling
    } else if spec.total_cn {
      Self::TotalCn
    } else {
      Self::Allelic { max_wgd }
    }
  }
}

/// Models whose scores are compared to decide how many WGDs a branch carries
pub struct EventModels {
  pub mode: WgdMode,
  /// Model of the chosen variant without a cap on WGDs
  pub main: DistanceEngine,
  pub no_wgd: DistanceEngine,
  /// Variant capped at one WGD
  pub one_wgd: Option<DistanceEngine>,
  /// Variant capped at two WGDs
  pub two_wgd: Option<DistanceEngine>,
}

impl EventModels {
  pub fn new(spec: &ModelSpec, max_wgd: u8) -> Result<Self, Report> {
    let mode = WgdMode::from_spec(spec, max_wgd);
    let engine = |spec: ModelSpec| -> Result<DistanceEngine, Report> {
      Ok(DistanceEngine::new(Arc::new(MedModel::new(&spec)?)))
    };

    let base = ModelSpec { n_wgd: None, ..*spec };
    let (one_wgd, two_wgd) = match mode {
      WgdMode::NoWgd => (None, None),
      WgdMode::TotalCn | WgdMode::Doubling => (Some(engine(base.with_n_wgd(Some(1)))?), None),
      WgdMode::Allelic { .. } => (
        Some(engine(base.with_n_wgd(Some(1)))?),
        Some(engine(base.with_n_wgd(Some(2)))?),
      ),
    };

    Ok(Self {
      mode,
      main: engine(base)?,
      no_wgd: engine(base.no_wgd())?,
      one_wgd,
      two_wgd,
    })
  }
}
