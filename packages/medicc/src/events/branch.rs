use crate::distance::engine::DistanceEngine;
use crate::encode::encoder::ProfileView;
use crate::encode::profile::CopyNumberTable;
use crate::events::event::{EventRecord, EventType, SegmentFlags, ALL_ALLELES, WHOLE_GENOME_CHROM};
use crate::events::models::{EventModels, WgdMode};
use crate::make_error;
use eyre::{Report, WrapErr};
use itertools::Itertools;
use log::debug;

/// Fraction of the genome that has to be gained before WGDs are considered
pub const WGD_CANDIDATE_THRESHOLD: f64 = 0.3;

/// Events on one branch and the per-segment flags of the child
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BranchEvents {
  pub events: Vec<EventRecord>,
  pub flags: Vec<SegmentFlags>,
}

struct Branch<'a> {
  table: &'a CopyNumberTable,
  child_name: &'a str,
  chrom_index: Vec<usize>,
  events: Vec<EventRecord>,
  flags: Vec<SegmentFlags>,
}

impl<'a> Branch<'a> {
  /// Groups consecutive `positions` where `mask` holds into runs, breaking runs at chromosome boundaries
  fn runs(&self, positions: &[usize], mask: &[bool]) -> Vec<Vec<usize>> {
    let mut runs: Vec<Vec<usize>> = vec![];
    let mut previous: Option<usize> = None;
    for (&pos, &hit) in positions.iter().zip(mask) {
      if hit {
        let continues = previous.map_or(false, |prev| self.chrom_index[prev] == self.chrom_index[pos]);
        match runs.last_mut() {
          Some(run) if continues => run.push(pos),
          _ => runs.push(vec![pos]),
        }
        previous = Some(pos);
      } else {
        previous = None;
      }
    }
    runs
  }

  fn push_event(&mut self, allele: &str, run: &[usize], event_type: EventType, cn_child: u8) {
    let segments = self.table.segments();
    let (Some(&first), Some(&last)) = (run.first(), run.last()) else {
      return;
    };
    self.events.push(EventRecord {
      sample_id: self.child_name.to_owned(),
      allele: allele.to_owned(),
      chrom: segments[first].chrom.clone(),
      start: segments[first].start,
      end: segments[last].end,
      event_type,
      cn_child,
    });
  }

  fn push_wgd(&mut self, count: usize) {
    let (start, end) = self.table.genome_span();
    for _ in 0..count {
      self.events.push(EventRecord {
        sample_id: self.child_name.to_owned(),
        allele: ALL_ALLELES.to_owned(),
        chrom: WHOLE_GENOME_CHROM.to_owned(),
        start,
        end,
        event_type: EventType::Wgd,
        cn_child: 0,
      });
    }
    for flags in &mut self.flags {
      flags.is_wgd = true;
    }
  }
}

fn to_signed(alleles: &[Vec<u8>]) -> Vec<Vec<i32>> {
  alleles
    .iter()
    .map(|values| values.iter().map(|&v| i32::from(v)).collect())
    .collect()
}

fn to_cn(value: i32) -> u8 {
  value.clamp(0, i32::from(u8::MAX)) as u8
}

/// Decomposes the difference between the profiles of `parent_name` and `child_name` into events.
///
/// Losses to zero (LOH) are resolved first, then whole-genome duplications, then gains and losses of each allele,
/// largest changes first.
pub fn calculate_cn_events_per_branch(
  table: &CopyNumberTable,
  parent_name: &str,
  child_name: &str,
  models: &EventModels,
) -> Result<BranchEvents, Report> {
  let (Some(parent_values), Some(child_values)) = (table.sample(parent_name), table.sample(child_name)) else {
    return make_error!("Profiles of branch '{parent_name}' -> '{child_name}' not found");
  };

  let n = table.n_segments();
  let mut parent_cn = to_signed(parent_values);
  let mut child_cn = to_signed(child_values);
  let mut branch = Branch {
    table,
    child_name,
    chrom_index: table.chromosome_index(),
    events: vec![],
    flags: vec![SegmentFlags::default(); n],
  };

  // 1. total losses (LOH)
  for (a, allele) in table.allele_columns().iter().enumerate() {
    let max_previous_cn = (0..n)
      .filter(|&i| parent_cn[a][i] != 0 && child_cn[a][i] == 0)
      .map(|i| parent_cn[a][i])
      .max();
    let Some(max_previous_cn) = max_previous_cn else {
      continue;
    };

    for loh_height in 0..max_previous_cn {
      let kept = (0..n).filter(|&i| parent_cn[a][i] != 0).collect_vec();
      let is_loss = kept.iter().map(|&i| child_cn[a][i] < parent_cn[a][i]).collect_vec();
      let loh_runs = branch
        .runs(&kept, &is_loss)
        .into_iter()
        .filter(|run| run.iter().any(|&i| child_cn[a][i] == 0))
        .collect_vec();

      for run in &loh_runs {
        branch.push_event(allele, run, EventType::Loss, to_cn(max_previous_cn - loh_height - 1));
        for &i in run {
          parent_cn[a][i] -= 1;
        }
      }
      for (&i, _) in kept.iter().zip(&is_loss).filter(|(_, loss)| **loss) {
        branch.flags[i].is_loss = true;
      }
    }
  }

  let loh_pos = parent_cn
    .iter()
    .map(|values| values.iter().map(|&v| v == 0).collect_vec())
    .collect_vec();

  // 2. whole-genome duplications
  if models.mode != WgdMode::NoWgd {
    let (fraction_gain, fraction_double_gain) = gained_fractions(table, child_values);
    if fraction_gain > WGD_CANDIDATE_THRESHOLD {
      let n_wgd = count_wgds(table, parent_name, child_name, models, fraction_double_gain)?;
      if n_wgd > 0 {
        debug!("Branch '{parent_name}' -> '{child_name}': {n_wgd} WGD(s)");
        apply_wgds(&mut parent_cn, &loh_pos, models.mode, n_wgd);
        branch.push_wgd(n_wgd);
      }
    }
  }

  // 3. gains and losses
  for (a, allele) in table.allele_columns().iter().enumerate() {
    let deltas = (0..n).map(|i| child_cn[a][i] - parent_cn[a][i]).collect_vec();
    for (flags, &delta) in branch.flags.iter_mut().zip(&deltas) {
      flags.is_loss |= delta < 0;
      flags.is_gain |= delta > 0;
    }

    let (Some(&lowest), Some(&highest)) = (deltas.iter().min(), deltas.iter().max()) else {
      continue;
    };
    let changes = (lowest.min(0)..=highest)
      .filter(|&change| change != 0)
      .sorted_by(|x, y| y.abs().cmp(&x.abs()).then(y.cmp(x)))
      .collect_vec();

    let kept = (0..n).filter(|&i| !loh_pos[a][i]).collect_vec();
    for change in changes {
      let event_type = if change > 0 { EventType::Gain } else { EventType::Loss };
      let hits = kept
        .iter()
        .map(|&i| child_cn[a][i] - parent_cn[a][i] == change)
        .collect_vec();

      for run in branch.runs(&kept, &hits) {
        branch.push_event(allele, &run, event_type, to_cn(child_cn[a][run[0]]));
        for &i in &run {
          child_cn[a][i] += if change < 0 { 1 } else { -1 };
        }
      }
    }
  }

  let Branch { mut events, flags, .. } = branch;
  events.sort();
  Ok(BranchEvents { events, flags })
}

/// Width-weighted fractions of the genome where alleles exceed one copy (averaged over alleles) and two copies
/// (summed over alleles)
fn gained_fractions(table: &CopyNumberTable, child_values: &[Vec<u8>]) -> (f64, f64) {
  let widths = table.segments().iter().map(|s| s.width() as f64).collect_vec();
  let total_width: f64 = widths.iter().sum();
  if total_width <= 0.0 {
    return (0.0, 0.0);
  }

  let weighted = |threshold: u8| -> f64 {
    widths
      .iter()
      .enumerate()
      .map(|(i, width)| {
        let count = child_values.iter().filter(|values| values[i] > threshold).count();
        count as f64 * width
      })
      .sum()
  };

  let n_alleles = table.n_alleles() as f64;
  (weighted(1) / (n_alleles * total_width), weighted(2) / total_width)
}

/// Number of WGDs needed on the branch: the largest multiplicity whose capped model scores differently from the
/// uncapped one
fn count_wgds(
  table: &CopyNumberTable,
  parent_name: &str,
  child_name: &str,
  models: &EventModels,
  fraction_double_gain: f64,
) -> Result<usize, Report> {
  let alphabet = models.main.model().alphabet();
  let parent = ProfileView::of_sample(table, parent_name)?.aggregate(alphabet)?;
  let child = ProfileView::of_sample(table, child_name)?.aggregate(alphabet)?;
  let score_wgd = models
    .main
    .score(&parent, &child)
    .wrap_err_with(|| format!("When scoring branch '{parent_name}' -> '{child_name}'"))?;

  let differs = |engine: Option<&DistanceEngine>| -> Result<bool, Report> {
    match engine {
      Some(engine) => Ok(engine.score(&parent, &child)? != score_wgd),
      None => Ok(false),
    }
  };
  let doubly_gained = fraction_double_gain > WGD_CANDIDATE_THRESHOLD;

  let n_wgd = match models.mode {
    WgdMode::NoWgd => 0,
    WgdMode::Doubling => {
      if doubly_gained && differs(models.one_wgd.as_ref())? {
        2
      } else if differs(Some(&models.no_wgd))? {
        1
      } else {
        0
      }
    }
    WgdMode::TotalCn => usize::from(differs(Some(&models.no_wgd))?),
    WgdMode::Allelic { max_wgd } => {
      if max_wgd >= 3 && doubly_gained && differs(models.two_wgd.as_ref())? {
        3
      } else if max_wgd >= 2 && doubly_gained && differs(models.one_wgd.as_ref())? {
        2
      } else if max_wgd >= 1 && differs(Some(&models.no_wgd))? {
        1
      } else {
        0
      }
    }
  };
  Ok(n_wgd)
}

/// Adjusts the parent copy numbers by the accepted WGDs
fn apply_wgds(parent_cn: &mut [Vec<i32>], loh_pos: &[Vec<bool>], mode: WgdMode, n_wgd: usize) {
  for (values, loh) in parent_cn.iter_mut().zip(loh_pos) {
    for (value, &is_loh) in values.iter_mut().zip(loh) {
      match mode {
        WgdMode::NoWgd => {}
        WgdMode::Doubling => *value *= 1 << n_wgd,
        WgdMode::TotalCn if !is_loh => *value += 2 * n_wgd as i32,
        WgdMode::Allelic { .. } if !is_loh => *value += n_wgd as i32,
        _ => {}
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encode::profile::Segment;
  use crate::model::med_model::ModelSpec;
  use crate::o;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn segments(chroms: &[&str]) -> Vec<Segment> {
    chroms
      .iter()
      .enumerate()
      .map(|(i, chrom)| Segment::new(chrom, i as u64, i as u64))
      .collect()
  }

  fn event(allele: &str, chrom: &str, start: u64, end: u64, event_type: EventType, cn_child: u8) -> EventRecord {
    EventRecord {
      sample_id: o!("t"),
      allele: allele.to_owned(),
      chrom: chrom.to_owned(),
      start,
      end,
      event_type,
      cn_child,
    }
  }

  fn allele_models() -> Result<EventModels, Report> {
    EventModels::new(&ModelSpec::default(), 1)
  }

  #[rstest]
  fn single_gain_run() -> Result<(), Report> {
    let mut table = CopyNumberTable::new(vec![o!("cn_a")], segments(&["chr1"; 10]))?;
    table.insert_sample("diploid", vec![vec![1; 10]])?;
    table.insert_sample("t", vec![vec![1, 1, 1, 2, 2, 2, 1, 1, 1, 1]])?;

    let result = calculate_cn_events_per_branch(&table, "diploid", "t", &allele_models()?)?;
    assert_eq!(result.events, vec![event("cn_a", "chr1", 3, 5, EventType::Gain, 2)]);
    let gained = result.flags.iter().map(|f| f.is_gain).collect_vec();
    assert_eq!(gained, vec![false, false, false, true, true, true, false, false, false, false]);
    assert!(result.flags.iter().all(|f| !f.is_loss && !f.is_wgd));
    Ok(())
  }

  #[rstest]
  fn runs_break_at_chromosome_boundaries() -> Result<(), Report> {
    let mut table = CopyNumberTable::new(vec![o!("cn_a")], segments(&["chr1", "chr1", "chr2", "chr2"]))?;
    table.insert_sample("diploid", vec![vec![1; 4]])?;
    table.insert_sample("t", vec![vec![1, 2, 2, 1]])?;

    let result = calculate_cn_events_per_branch(&table, "diploid", "t", &allele_models()?)?;
    assert_eq!(
      result.events,
      vec![
        event("cn_a", "chr1", 1, 1, EventType::Gain, 2),
        event("cn_a", "chr2", 2, 2, EventType::Gain, 2),
      ]
    );
    Ok(())
  }

  #[rstest]
  fn large_changes_are_split_into_unit_events() -> Result<(), Report> {
    let mut table = CopyNumberTable::new(vec![o!("cn_a")], segments(&["chr1"; 4]))?;
    table.insert_sample("p", vec![vec![1; 4]])?;
    table.insert_sample("t", vec![vec![1, 3, 2, 1]])?;

    let result = calculate_cn_events_per_branch(&table, "p", "t", &allele_models()?)?;
    assert_eq!(
      result.events,
      vec![
        event("cn_a", "chr1", 1, 1, EventType::Gain, 3),
        event("cn_a", "chr1", 1, 2, EventType::Gain, 2),
      ]
    );
    Ok(())
  }

  #[rstest]
  fn loss_to_zero_is_resolved_per_height() -> Result<(), Report> {
    let mut table = CopyNumberTable::new(vec![o!("cn_a"), o!("cn_b")], segments(&["chr1"; 3]))?;
    table.insert_sample("p", vec![vec![2, 2, 1], vec![1, 1, 1]])?;
    table.insert_sample("t", vec![vec![0, 1, 1], vec![1, 1, 1]])?;

    let result = calculate_cn_events_per_branch(&table, "p", "t", &allele_models()?)?;
    assert_eq!(
      result.events,
      vec![
        event("cn_a", "chr1", 0, 0, EventType::Loss, 0),
        event("cn_a", "chr1", 0, 1, EventType::Loss, 1),
      ]
    );
    let lost = result.flags.iter().map(|f| f.is_loss).collect_vec();
    assert_eq!(lost, vec![true, true, false]);
    Ok(())
  }

  #[rstest]
  fn doubled_genome_gives_one_wgd() -> Result<(), Report> {
    let mut table = CopyNumberTable::new(vec![o!("cn_a"), o!("cn_b")], segments(&["chr1", "chr1", "chr2", "chr3"]))?;
    table.insert_sample("diploid", vec![vec![1; 4], vec![1; 4]])?;
    table.insert_sample("t", vec![vec![2; 4], vec![2; 4]])?;

    let result = calculate_cn_events_per_branch(&table, "diploid", "t", &allele_models()?)?;
    assert_eq!(result.events, vec![event("both", "chr0", 0, 3, EventType::Wgd, 0)]);
    assert!(result.flags.iter().all(|f| f.is_wgd && !f.is_gain && !f.is_loss));
    Ok(())
  }

  #[rstest]
  fn no_wgd_mode_explains_doubling_with_gains() -> Result<(), Report> {
    let mut table = CopyNumberTable::new(vec![o!("cn_a")], segments(&["chr1", "chr2"]))?;
    table.insert_sample("diploid", vec![vec![1; 2]])?;
    table.insert_sample("t", vec![vec![2; 2]])?;

    let models = EventModels::new(&ModelSpec::default().no_wgd(), 1)?;
    let result = calculate_cn_events_per_branch(&table, "diploid", "t", &models)?;
    assert_eq!(
      result.events,
      vec![
        event("cn_a", "chr1", 0, 0, EventType::Gain, 2),
        event("cn_a", "chr2", 1, 1, EventType::Gain, 2),
      ]
    );
    Ok(())
  }

  fn wgd_event() -> EventRecord {
    event("both", "chr0", 0, 3, EventType::Wgd, 0)
  }

  fn uniform_table(columns: &[&str], parent: u8, child: u8) -> Result<CopyNumberTable, Report> {
    let columns = columns.iter().map(|&c| o!(c)).collect_vec();
    let n_alleles = columns.len();
    let mut table = CopyNumberTable::new(columns, segments(&["chr1", "chr1", "chr2", "chr3"]))?;
    table.insert_sample("p", vec![vec![parent; 4]; n_alleles])?;
    table.insert_sample("t", vec![vec![child; 4]; n_alleles])?;
    Ok(table)
  }

  #[rstest]
  fn doubled_total_copy_number_gives_one_wgd() -> Result<(), Report> {
    let table = uniform_table(&["cn"], 2, 4)?;
    let spec = ModelSpec {
      total_cn: true,
      ..ModelSpec::default()
    };
    let models = EventModels::new(&spec, 1)?;
    assert_eq!(models.mode, WgdMode::TotalCn);

    let result = calculate_cn_events_per_branch(&table, "p", "t", &models)?;
    assert_eq!(result.events, vec![wgd_event()]);
    assert!(result.flags.iter().all(|f| f.is_wgd && !f.is_gain && !f.is_loss));
    Ok(())
  }

  #[rstest]
  fn quadrupled_genome_gives_two_doublings() -> Result<(), Report> {
    let table = uniform_table(&["cn_a", "cn_b"], 1, 4)?;
    let spec = ModelSpec {
      wgd_x2: true,
      ..ModelSpec::default()
    };
    let models = EventModels::new(&spec, 1)?;
    assert_eq!(models.mode, WgdMode::Doubling);

    let result = calculate_cn_events_per_branch(&table, "p", "t", &models)?;
    assert_eq!(result.events, vec![wgd_event(), wgd_event()]);
    Ok(())
  }

  #[rstest]
  #[case(1, 2, 1)]
  #[case(1, 3, 1)]
  #[case(3, 3, 2)]
  #[case(3, 4, 3)]
  #[case(2, 4, 2)]
  fn additive_wgds_are_capped(#[case] max_wgd: u8, #[case] child: u8, #[case] expected: usize) -> Result<(), Report> {
    let table = uniform_table(&["cn_a", "cn_b"], 1, child)?;
    let models = EventModels::new(&ModelSpec::default(), max_wgd)?;
    let result = calculate_cn_events_per_branch(&table, "p", "t", &models)?;
    let n_wgd = result.events.iter().filter(|e| e.event_type == EventType::Wgd).count();
    assert_eq!(n_wgd, expected);
    Ok(())
  }

  #[rstest]
  fn more_tripled_loci_never_undo_a_second_wgd() -> Result<(), Report> {
    let models = EventModels::new(&ModelSpec::default(), 2)?;
    let chroms = ["chr1", "chr1", "chr2", "chr2", "chr3", "chr3"];

    let mut n_wgds = vec![];
    for n_tripled in 0..=chroms.len() {
      let child = (0..chroms.len()).map(|i| if i < n_tripled { 3 } else { 2 }).collect_vec();
      let mut table = CopyNumberTable::new(vec![o!("cn_a"), o!("cn_b")], segments(&chroms))?;
      table.insert_sample("p", vec![vec![1; chroms.len()]; 2])?;
      table.insert_sample("t", vec![child.clone(), child])?;

      let result = calculate_cn_events_per_branch(&table, "p", "t", &models)?;
      n_wgds.push(result.events.iter().filter(|e| e.event_type == EventType::Wgd).count());
    }

    assert_eq!(n_wgds, vec![1, 1, 1, 1, 2, 2, 2]);
    assert!(n_wgds.iter().tuple_windows().all(|(before, after)| before <= after));
    Ok(())
  }
}
