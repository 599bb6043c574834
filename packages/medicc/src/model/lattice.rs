//! Segment-count lattice shared by all scoring and reconstruction queries of the copy-number model.
//!
//! Every term of a query is an event path from a source profile to a target profile. Segmental steps (gains and
//! losses) carry a count per locus, and the cost of a step is the number of segments it opens: a count rising from
//! `a` at one locus to `b` at the next opens `max(0, b - a)` new segments. The lattice state is the vector of all
//! segmental counts of all terms at the current locus. Separators close every open segment.

use crate::model::alphabet::SEPARATOR_CODE;
use crate::model::cost_model::Unreachable;
use itertools::Itertools;
use std::collections::HashMap;

pub type Cost = u32;

pub const INFINITE: Cost = Cost::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
  Gain,
  Loss,
  Wgd,
}

impl Step {
  pub const fn is_segmental(self) -> bool {
    matches!(self, Step::Gain | Step::Loss)
  }
}

/// How a whole-genome doubling acts on a single copy number
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WgdKind {
  None,
  /// Every non-zero copy number grows by this amount
  Additive(u8),
  /// Every copy number is multiplied by two
  Doubling,
}

impl WgdKind {
  pub fn apply(self, cn: u8, times: u8) -> Option<u8> {
    match self {
      WgdKind::None => (times == 0).then_some(cn),
      WgdKind::Additive(_) if cn == 0 => Some(0),
      WgdKind::Additive(step) => step.checked_mul(times).and_then(|inc| cn.checked_add(inc)),
      WgdKind::Doubling => (times < 8).then(|| u16::from(cn) << times).and_then(|v| u8::try_from(v).ok()),
    }
  }
}

#[derive(Clone, Copy, Debug)]
pub enum Endpoint<'a> {
  Known(&'a [u8]),
  Ancestor,
}

impl<'a> Endpoint<'a> {
  fn value(&self, pos: usize, ancestor: u8) -> u8 {
    match self {
      Endpoint::Known(codes) => codes[pos],
      Endpoint::Ancestor => ancestor,
    }
  }
}

/// One event path of a query
#[derive(Clone, Debug)]
pub struct Term<'a> {
  pub source: Endpoint<'a>,
  pub target: Endpoint<'a>,
  pub steps: &'a [Step],
  pub n_wgd: u8,
}

/// Term with the set of valid local count vectors for every `(source, target)` pair
struct TermTable<'a> {
  term: Term<'a>,
  n_local: usize,
  valid: Vec<Vec<bool>>,
}

impl<'a> TermTable<'a> {
  fn new(term: Term<'a>, wgd: WgdKind, size: usize) -> Self {
    let dims = term.steps.iter().filter(|step| step.is_segmental()).count();
    let n_local = size.pow(dims as u32);
    let bound = (size - 1) as u8;
    let mut valid = vec![vec![false; n_local]; size * size];

    let mut counts = vec![0_u8; dims];
    for local in 0..n_local {
      decompose(local, size, &mut counts);
      for source in 0..=bound {
        if let Some(target) = apply_steps(source, term.steps, term.n_wgd, &counts, wgd, bound) {
          valid[source as usize * size + target as usize][local] = true;
        }
      }
    }

    Self { term, n_local, valid }
  }

  fn mask(&self, pos: usize, ancestor: u8, size: usize) -> &[bool] {
    let source = self.term.source.value(pos, ancestor) as usize;
    let target = self.term.target.value(pos, ancestor) as usize;
    &self.valid[source * size + target]
  }
}

fn apply_steps(cn: u8, steps: &[Step], n_wgd: u8, counts: &[u8], wgd: WgdKind, bound: u8) -> Option<u8> {
  let mut counts = counts.iter();
  let mut v = cn;
  for step in steps {
    v = match step {
      Step::Gain => {
        let gain = *counts.next()?;
        if v == 0 {
          0
        } else {
          v.checked_add(gain)?
        }
      }
      Step::Loss => v.saturating_sub(*counts.next()?),
      Step::Wgd => wgd.apply(v, n_wgd)?,
    };
    if v > bound {
      return None;
    }
  }
  Some(v)
}

/// Writes the base-`size` digits of `index` into `digits`, most significant first
fn decompose(mut index: usize, size: usize, digits: &mut [u8]) {
  for digit in digits.iter_mut().rev() {
    *digit = (index % size) as u8;
    index /= size;
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
  pub cost: Cost,
  /// Ancestor copy numbers per locus, present when the query has an ancestor endpoint
  pub ancestor: Option<Vec<u8>>,
}

/// A query over equal-length decoded profiles
pub struct Lattice<'a> {
  tables: Vec<TermTable<'a>>,
  len: usize,
  size: usize,
  dims: usize,
  n_states: usize,
  has_ancestor: bool,
}

impl<'a> Lattice<'a> {
  /// Copy numbers (including intermediate ones) are limited to `0..=bound`
  pub fn new(terms: Vec<Term<'a>>, len: usize, bound: u8, wgd: WgdKind) -> Self {
    let size = bound as usize + 1;
    let has_ancestor = terms
      .iter()
      .any(|term| matches!(term.source, Endpoint::Ancestor) || matches!(term.target, Endpoint::Ancestor));
    let tables = terms
      .into_iter()
      .map(|term| TermTable::new(term, wgd, size))
      .collect_vec();
    let dims = tables
      .iter()
      .map(|table| table.term.steps.iter().filter(|step| step.is_segmental()).count())
      .sum();
    let n_states = tables.iter().map(|table| table.n_local).product();
    Self {
      tables,
      len,
      size,
      dims,
      n_states,
      has_ancestor,
    }
  }

  pub const fn n_states(&self) -> usize {
    self.n_states
  }

  /// Runs the lattice. Returns `Ok(None)` as soon as every partial solution costs more than `ceiling`.
  pub fn solve(&self, ceiling: Cost, prune: Option<Cost>, traceback: bool) -> Result<Option<Solution>, Unreachable> {
    let mut layer = vec![INFINITE; self.n_states];
    layer[0] = 0;

    let mut separators = Vec::with_capacity(self.len);
    let mut layers = Vec::new();
    // valid states depend only on the known copy numbers at a locus
    let mut masks: HashMap<Vec<u8>, Vec<bool>> = HashMap::new();

    for pos in 0..self.len {
      let is_separator = self.is_separator(pos)?;
      if is_separator {
        let best = min_cost(&layer);
        layer.fill(INFINITE);
        layer[0] = best;
      } else {
        self.open_segments(&mut layer);
        let mask = masks
          .entry(self.known_values(pos))
          .or_insert_with(|| self.valid_states(pos));
        for (cost, &valid) in layer.iter_mut().zip(mask.iter()) {
          if !valid {
            *cost = INFINITE;
          }
        }
        if let Some(prune) = prune {
          let threshold = min_cost(&layer).saturating_add(prune);
          layer.iter_mut().filter(|cost| **cost > threshold).for_each(|cost| *cost = INFINITE);
        }
      }

      let best = min_cost(&layer);
      if best == INFINITE {
        return Err(Unreachable);
      }
      if best > ceiling {
        return Ok(None);
      }

      separators.push(is_separator);
      if traceback {
        layers.push(layer.clone());
      }
    }

    let cost = min_cost(&layer);
    let ancestor = (traceback && self.has_ancestor).then(|| self.trace_ancestor(&layers, &separators));
    Ok(Some(Solution { cost, ancestor }))
  }

  fn is_separator(&self, pos: usize) -> Result<bool, Unreachable> {
    let known = self
      .tables
      .iter()
      .flat_map(|table| [table.term.source, table.term.target])
      .filter_map(|endpoint| match endpoint {
        Endpoint::Known(codes) => Some(codes[pos] == SEPARATOR_CODE),
        Endpoint::Ancestor => None,
      })
      .collect_vec();

    match (known.iter().all(|&sep| sep), known.iter().any(|&sep| sep)) {
      (true, _) => Ok(true),
      (false, false) => Ok(false),
      (false, true) => Err(Unreachable),
    }
  }

  fn known_values(&self, pos: usize) -> Vec<u8> {
    self
      .tables
      .iter()
      .flat_map(|table| [table.term.source, table.term.target])
      .filter_map(|endpoint| match endpoint {
        Endpoint::Known(codes) => Some(codes[pos]),
        Endpoint::Ancestor => None,
      })
      .collect()
  }

  fn ancestor_candidates(&self) -> std::ops::RangeInclusive<u8> {
    if self.has_ancestor {
      0..=(self.size - 1) as u8
    } else {
      0..=0
    }
  }

  /// States for which some ancestor copy number makes every term valid at this locus
  fn valid_states(&self, pos: usize) -> Vec<bool> {
    let mut combined = vec![false; self.n_states];
    for ancestor in self.ancestor_candidates() {
      let mut acc = vec![true];
      for table in &self.tables {
        let local = table.mask(pos, ancestor, self.size);
        acc = acc
          .iter()
          .flat_map(|&outer| local.iter().map(move |&inner| outer && inner))
          .collect();
      }
      for (c, v) in combined.iter_mut().zip(acc) {
        *c |= v;
      }
    }
    combined
  }

  /// Applies the segment opening cost along every dimension
  fn open_segments(&self, layer: &mut [Cost]) {
    let size = self.size;
    let mut line = vec![INFINITE; size];
    let mut stride = 1;
    for _ in 0..self.dims {
      let block = stride * size;
      for outer in (0..self.n_states).step_by(block) {
        for inner in 0..stride {
          let base = outer + inner;
          for (t, item) in line.iter_mut().enumerate() {
            *item = layer[base + t * stride];
          }
          relax_line(&mut line);
          for (t, item) in line.iter().enumerate() {
            layer[base + t * stride] = *item;
          }
        }
      }
      stride = block;
    }
  }

  fn transition_cost(&self, from: usize, to: usize, from_digits: &mut [u8], to_digits: &mut [u8]) -> Cost {
    decompose(from, self.size, from_digits);
    decompose(to, self.size, to_digits);
    from_digits
      .iter()
      .zip(to_digits.iter())
      .map(|(&a, &b)| Cost::from(b.saturating_sub(a)))
      .sum()
  }

  fn trace_ancestor(&self, layers: &[Vec<Cost>], separators: &[bool]) -> Vec<u8> {
    let mut states = vec![0; self.len];
    if self.len == 0 {
      return vec![];
    }

    states[self.len - 1] = argmin_cost(&layers[self.len - 1]);
    let mut from_digits = vec![0; self.dims];
    let mut to_digits = vec![0; self.dims];
    for pos in (1..self.len).rev() {
      let state = states[pos];
      let prev = &layers[pos - 1];
      states[pos - 1] = if separators[pos] {
        argmin_cost(prev)
      } else {
        let target = layers[pos][state];
        (0..self.n_states)
          .find(|&candidate| {
            prev[candidate] != INFINITE
              && prev[candidate] + self.transition_cost(candidate, state, &mut from_digits, &mut to_digits) == target
          })
          .unwrap_or_else(|| argmin_cost(prev))
      };
    }

    states
      .iter()
      .enumerate()
      .map(|(pos, &state)| {
        if separators[pos] {
          SEPARATOR_CODE
        } else {
          self.ancestor_at(pos, state)
        }
      })
      .collect()
  }

  /// Smallest ancestor copy number consistent with the chosen state
  fn ancestor_at(&self, pos: usize, state: usize) -> u8 {
    self
      .ancestor_candidates()
      .find(|&ancestor| {
        let mut rest = state;
        self.tables.iter().rev().all(|table| {
          let local = rest % table.n_local;
          rest /= table.n_local;
          table.mask(pos, ancestor, self.size)[local]
        })
      })
      .unwrap_or(0)
  }
}

/// One-dimensional min-plus transform with the cost `max(0, to - from)`
fn relax_line(line: &mut [Cost]) {
  let n = line.len();
  let mut rising = vec![INFINITE; n];
  let mut best_below: Option<i64> = None;
  for t in 0..n {
    if line[t] != INFINITE {
      let candidate = i64::from(line[t]) - t as i64;
      best_below = Some(best_below.map_or(candidate, |best| best.min(candidate)));
    }
    if let Some(best) = best_below {
      rising[t] = (best + t as i64) as Cost;
    }
  }

  let mut best_above = INFINITE;
  for t in (0..n).rev() {
    best_above = best_above.min(line[t]);
    line[t] = best_above.min(rising[t]);
  }
}

fn min_cost(layer: &[Cost]) -> Cost {
  layer.iter().copied().min().unwrap_or(INFINITE)
}

fn argmin_cost(layer: &[Cost]) -> usize {
  layer.iter().position_min().unwrap_or(0)
}
