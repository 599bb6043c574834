use crate::model::alphabet::Alphabet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// No sequence of events under the cost model transforms one profile into the other
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Unreachable;

impl Display for Unreachable {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "no valid edit path exists between the profiles under the cost model")
  }
}

impl Error for Unreachable {}

/// Ancestor profile minimizing the summed cost to its neighbours
#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
  pub ancestor: String,
  pub cost: f64,
}

/// Transition-cost model over encoded copy-number profiles.
///
/// Implementations are immutable and shared between threads without locking.
pub trait CostModel: Send + Sync {
  /// Stable identifier, part of the distance cache key
  fn id(&self) -> &str;

  fn alphabet(&self) -> &Alphabet;

  /// Minimal cost of evolving `parent` into `child`
  fn score(&self, parent: &str, child: &str) -> Result<f64, Unreachable>;

  /// Symmetric distance: minimal `score(x, a) + score(x, b)` over all common ancestors `x`
  fn kernel_score(&self, a: &str, b: &str) -> Result<f64, Unreachable>;

  /// Finds the ancestor minimizing `score(parent, x) + sum(score(x, child))`.
  ///
  /// A positive `prune_weight` discards partial solutions whose cost exceeds the current best by more than
  /// this value; `0` means exact search.
  fn reconstruct(
    &self,
    parent: Option<&str>,
    children: &[&str],
    prune_weight: f64,
  ) -> Result<Reconstruction, Unreachable>;
}
