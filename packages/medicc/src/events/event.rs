use crate::encode::profile::chrom_sort_key;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum_macros::{Display, EnumString};

/// Chromosome name of whole-genome events
pub const WHOLE_GENOME_CHROM: &str = "chr0";

/// Allele name of events affecting all alleles
pub const ALL_ALLELES: &str = "both";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventType {
  Gain,
  Loss,
  Wgd,
}

/// One copy-number event on the branch leading to `sample_id`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
  pub sample_id: String,
  pub allele: String,
  pub chrom: String,
  pub start: u64,
  pub end: u64,
  #[serde(rename = "type")]
  pub event_type: EventType,
  pub cn_child: u8,
}

impl EventRecord {
  fn sort_key(&self) -> (&str, &str, (u8, u64, String), u64, u64, EventType, u8) {
    (
      &self.sample_id,
      &self.allele,
      chrom_sort_key(&self.chrom),
      self.start,
      self.end,
      self.event_type,
      self.cn_child,
    )
  }
}

impl PartialOrd for EventRecord {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for EventRecord {
  fn cmp(&self, other: &Self) -> Ordering {
    self.sort_key().cmp(&other.sort_key())
  }
}

/// Events found on one segment of one sample
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentFlags {
  pub is_gain: bool,
  pub is_loss: bool,
  pub is_wgd: bool,
}

impl SegmentFlags {
  pub const fn any(&self) -> bool {
    self.is_gain || self.is_loss || self.is_wgd
  }
}
