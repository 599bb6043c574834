use crate::distance::shorten::shorten_cn_strings;
use crate::model::cost_model::{CostModel, Unreachable};
use eyre::Report;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScoreKind {
  /// Symmetric distance between two observed profiles
  Kernel,
  /// Cost of evolving the first profile into the second
  Directed,
}

type CacheKey = (String, ScoreKind, String, String);

/// Computes and memoizes distances between encoded profiles under one cost model.
///
/// The cache lives as long as the engine and is shared by all threads using it. Entries are inserted only if absent,
/// so concurrent computations of the same pair never overwrite each other.
pub struct DistanceEngine {
  model: Arc<dyn CostModel>,
  cache: RwLock<HashMap<CacheKey, Result<f64, Unreachable>>>,
}

impl DistanceEngine {
  pub fn new(model: Arc<dyn CostModel>) -> Self {
    Self {
      model,
      cache: RwLock::new(HashMap::new()),
    }
  }

  pub fn model(&self) -> &dyn CostModel {
    self.model.as_ref()
  }

  /// MED distance between two profiles
  pub fn distance(&self, a: &str, b: &str) -> Result<Result<f64, Unreachable>, Report> {
    self.cached(ScoreKind::Kernel, a, b)
  }

  /// Directed cost from `parent` to `child`, used for branch lengths
  pub fn score(&self, parent: &str, child: &str) -> Result<Result<f64, Unreachable>, Report> {
    self.cached(ScoreKind::Directed, parent, child)
  }

  pub fn cache_len(&self) -> usize {
    self.cache.read().len()
  }

  fn cached(&self, kind: ScoreKind, a: &str, b: &str) -> Result<Result<f64, Unreachable>, Report> {
    let key = (self.model.id().to_owned(), kind, a.to_owned(), b.to_owned());
    if let Some(value) = self.cache.read().get(&key) {
      return Ok(*value);
    }

    let value = if a.len() == b.len() {
      let (short_a, short_b) = shorten_cn_strings(a, b)?;
      match kind {
        ScoreKind::Kernel => self.model.kernel_score(&short_a, &short_b),
        ScoreKind::Directed => self.model.score(&short_a, &short_b),
      }
    } else {
      Err(Unreachable)
    };

    Ok(*self.cache.write().entry(key).or_insert(value))
  }
}
