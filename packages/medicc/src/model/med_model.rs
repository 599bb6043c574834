use crate::distance::shorten::informative_columns;
use crate::make_error;
use crate::model::alphabet::{Alphabet, SEPARATOR_CODE};
use crate::model::cost_model::{CostModel, Reconstruction, Unreachable};
use crate::model::lattice::{Cost, Endpoint, Lattice, Step, Term, WgdKind, INFINITE};
use eyre::Report;
use itertools::Itertools;
use log::{trace, warn};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Default copy-number cap of the alphabet
pub const DEFAULT_MAX_CN: u8 = 8;

/// Largest copy number for which reconstructions stay tractable. A query over `k` event paths keeps up to
/// `(max_cn + 1)^(2k)` lattice states per locus, so every copy number above this multiplies the run time several times.
pub const PRACTICAL_MAX_CN: u8 = 8;

/// Most WGDs the unrestricted WGD models allow on a single branch
pub const DEFAULT_MAX_WGD: u8 = 3;

const NO_WGD_PATH: &[Step] = &[Step::Gain, Step::Loss];
const WGD_PATH: &[Step] = &[Step::Loss, Step::Wgd, Step::Gain, Step::Loss];
const WGD_CHILD_PATH: &[Step] = &[Step::Wgd, Step::Gain, Step::Loss];

/// Selects one of the model variants: `no_wgd`, default, `wgd_x2` or `total_cn`, optionally with a cap on the number
/// of WGDs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, SmartDefault, Serialize, Deserialize)]
pub struct ModelSpec {
  pub no_wgd: bool,
  pub n_wgd: Option<u8>,
  pub total_cn: bool,
  pub wgd_x2: bool,
  #[default(DEFAULT_MAX_CN)]
  pub max_cn: u8,
}

impl ModelSpec {
  pub fn no_wgd(self) -> Self {
    Self {
      no_wgd: true,
      n_wgd: None,
      wgd_x2: false,
      ..self
    }
  }

  pub fn with_n_wgd(self, n_wgd: Option<u8>) -> Self {
    Self { n_wgd, ..self }
  }

  pub fn name(&self) -> String {
    let mut name = if self.no_wgd { "no_wgd".to_owned() } else { "wgd".to_owned() };
    if !self.no_wgd {
      if self.wgd_x2 {
        name.push_str("_x2");
      }
      if self.total_cn {
        name.push_str("_total_cn");
      }
      if let Some(n_wgd) = self.n_wgd {
        name.push_str(&format!("_{n_wgd}"));
      }
    }
    format!("{name}_asymm_maxcn{}", self.max_cn)
  }
}

#[derive(Clone, Copy, Debug)]
enum Query {
  /// `[parent, child]`
  Score,
  /// `[a, b]`, common ancestor unknown
  Kernel,
  /// `[parent?, children...]`, ancestor unknown
  Reconstruct { has_parent: bool },
}

/// Minimum-event model of copy-number evolution.
///
/// Events are gains and losses of one copy over a contiguous run of loci within one chromosome, each costing 1.
/// Copy number 0 is absorbing. WGD variants additionally allow up to `max_wgd` whole-genome doublings per branch,
/// each costing 1, placed after an initial round of losses and before gains and further losses.
///
/// Intermediate copy numbers never exceed the largest copy number present in the compared profiles. See
/// [`PRACTICAL_MAX_CN`] for the cost of large copy numbers.
#[derive(Clone, Debug)]
pub struct MedModel {
  name: String,
  alphabet: Alphabet,
  wgd: WgdKind,
  max_wgd: u8,
}

impl MedModel {
  pub fn new(spec: &ModelSpec) -> Result<Self, Report> {
    let ModelSpec {
      no_wgd,
      n_wgd,
      total_cn,
      wgd_x2,
      max_cn,
    } = *spec;

    if no_wgd && (wgd_x2 || n_wgd.is_some()) {
      return make_error!("Invalid model combination: 'no_wgd' cannot be combined with 'wgd_x2' or 'n_wgd'");
    }
    if wgd_x2 && total_cn {
      return make_error!("Invalid model combination: 'wgd_x2' cannot be combined with 'total_cn'");
    }
    if let Some(n_wgd) = n_wgd {
      if n_wgd == 0 || n_wgd > DEFAULT_MAX_WGD {
        return make_error!(
          "Invalid model combination: 'n_wgd' must be between 1 and {DEFAULT_MAX_WGD}, but found {n_wgd}"
        );
      }
    }

    let wgd = if no_wgd {
      WgdKind::None
    } else if wgd_x2 {
      WgdKind::Doubling
    } else if total_cn {
      WgdKind::Additive(2)
    } else {
      WgdKind::Additive(1)
    };

    if max_cn > PRACTICAL_MAX_CN {
      warn!(
        "Maximum copy number {max_cn} is above {PRACTICAL_MAX_CN}. Distances and reconstructions may be very slow. \
         Consider lowering the maximum copy number."
      );
    }

    let max_wgd = if no_wgd { 0 } else { n_wgd.unwrap_or(DEFAULT_MAX_WGD) };

    Ok(Self {
      name: spec.name(),
      alphabet: Alphabet::new(max_cn)?,
      wgd,
      max_wgd,
    })
  }

  pub const fn wgd_kind(&self) -> WgdKind {
    self.wgd
  }

  pub const fn max_wgd(&self) -> u8 {
    self.max_wgd
  }

  fn full_path(&self) -> &'static [Step] {
    match self.wgd {
      WgdKind::None => NO_WGD_PATH,
      _ => WGD_PATH,
    }
  }

  fn child_path(&self) -> &'static [Step] {
    match self.wgd {
      WgdKind::None => NO_WGD_PATH,
      _ => WGD_CHILD_PATH,
    }
  }

  fn terms<'a>(&self, query: Query, profiles: &[&'a [u8]], combo: &[u8]) -> Vec<Term<'a>> {
    let full = |source: Endpoint<'a>, target: Endpoint<'a>, n_wgd: u8| Term {
      source,
      target,
      steps: self.full_path(),
      n_wgd,
    };
    let from_ancestor = |child: &'a [u8], n_wgd: u8| Term {
      source: Endpoint::Ancestor,
      target: Endpoint::Known(child),
      steps: self.child_path(),
      n_wgd,
    };

    match query {
      Query::Score => vec![full(Endpoint::Known(profiles[0]), Endpoint::Known(profiles[1]), combo[0])],
      Query::Kernel | Query::Reconstruct { has_parent: false } => profiles
        .iter()
        .zip(combo)
        .map(|(&child, &n_wgd)| from_ancestor(child, n_wgd))
        .collect(),
      Query::Reconstruct { has_parent: true } => {
        let mut terms = vec![full(Endpoint::Known(profiles[0]), Endpoint::Ancestor, combo[0])];
        terms.extend(
          profiles[1..]
            .iter()
            .zip(&combo[1..])
            .map(|(&child, &n_wgd)| from_ancestor(child, n_wgd)),
        );
        terms
      }
    }
  }

  /// Largest copy number observed among the profiles
  fn bound(&self, profiles: &[&[u8]]) -> u8 {
    profiles
      .iter()
      .flat_map(|profile| profile.iter().copied())
      .filter(|&cn| cn != SEPARATOR_CODE)
      .max()
      .unwrap_or(1)
      .clamp(1, self.alphabet.max_cn())
  }

  /// Tries every combination of WGD multiplicities (one per term), cheapest first, and keeps the best solution
  fn solve(
    &self,
    query: Query,
    encoded: &[&str],
    prune: Option<Cost>,
    traceback: bool,
  ) -> Result<(Cost, Option<Vec<u8>>), Unreachable> {
    let profiles = encoded
      .iter()
      .map(|profile| self.alphabet.decode(profile))
      .collect::<Result<Vec<_>, _>>()?;

    let len = profiles.first().map_or(0, Vec::len);
    if profiles.iter().any(|profile| profile.len() != len) {
      return Err(Unreachable);
    }

    let full_refs = profiles.iter().map(Vec::as_slice).collect_vec();
    let columns = informative_columns(&full_refs);
    let short = profiles
      .iter()
      .map(|profile| columns.iter().map(|&i| profile[i]).collect_vec())
      .collect_vec();
    let short_refs = short.iter().map(Vec::as_slice).collect_vec();
    let bound = self.bound(&short_refs);

    let n_terms = match query {
      Query::Score => 1,
      Query::Kernel | Query::Reconstruct { .. } => short_refs.len(),
    };
    let combos = (0..n_terms)
      .map(|_| 0..=self.max_wgd)
      .multi_cartesian_product()
      .sorted_by_key(|combo| combo.iter().map(|&k| Cost::from(k)).sum::<Cost>())
      .collect_vec();

    let mut best: Option<(Cost, Option<Vec<u8>>)> = None;
    let mut error = Unreachable;
    for combo in combos {
      let wgd_cost: Cost = combo.iter().map(|&k| Cost::from(k)).sum();
      let ceiling = match &best {
        Some((best_cost, _)) if wgd_cost >= *best_cost => continue,
        Some((best_cost, _)) => best_cost - wgd_cost - 1,
        None => INFINITE,
      };

      let lattice = Lattice::new(self.terms(query, &short_refs, &combo), columns.len(), bound, self.wgd);
      trace!(
        "Model '{}': {query:?} with WGDs {combo:?} over {} states and {} loci",
        self.name,
        lattice.n_states(),
        columns.len()
      );

      match lattice.solve(ceiling, prune, traceback) {
        Ok(Some(solution)) => {
          let ancestor = solution
            .ancestor
            .map(|short_ancestor| expand_columns(&short_ancestor, &columns, len));
          best = Some((solution.cost + wgd_cost, ancestor));
        }
        Ok(None) => {}
        Err(err) => error = err,
      }
    }

    best.ok_or(error)
  }
}

impl CostModel for MedModel {
  fn id(&self) -> &str {
    &self.name
  }

  fn alphabet(&self) -> &Alphabet {
    &self.alphabet
  }

  fn score(&self, parent: &str, child: &str) -> Result<f64, Unreachable> {
    let (cost, _) = self.solve(Query::Score, &[parent, child], None, false)?;
    Ok(f64::from(cost))
  }

  fn kernel_score(&self, a: &str, b: &str) -> Result<f64, Unreachable> {
    let (cost, _) = self.solve(Query::Kernel, &[a, b], None, false)?;
    Ok(f64::from(cost))
  }

  fn reconstruct(
    &self,
    parent: Option<&str>,
    children: &[&str],
    prune_weight: f64,
  ) -> Result<Reconstruction, Unreachable> {
    let encoded = parent.into_iter().chain(children.iter().copied()).collect_vec();
    if encoded.is_empty() {
      return Err(Unreachable);
    }

    let prune = (prune_weight > 0.0).then(|| prune_weight.floor() as Cost);
    let query = Query::Reconstruct {
      has_parent: parent.is_some(),
    };
    let (cost, ancestor) = self.solve(query, &encoded, prune, true)?;
    let ancestor = ancestor.ok_or(Unreachable)?;
    Ok(Reconstruction {
      ancestor: self.alphabet.encode(&ancestor),
      cost: f64::from(cost),
    })
  }
}

/// Repeats every kept column up to the next kept one
fn expand_columns(short: &[u8], columns: &[usize], len: usize) -> Vec<u8> {
  let mut full = Vec::with_capacity(len);
  for (i, &start) in columns.iter().enumerate() {
    let end = columns.get(i + 1).copied().unwrap_or(len);
    full.extend(std::iter::repeat(short[i]).take(end - start));
  }
  full
}
