//! Attribution of bit flips to the aggressor sub-patterns that most likely caused them.
//!
//! A flip is attached to the sub-pattern(s) whose closest aggressor row is nearest to
//! the flipped row. By default every aggressor counts regardless of its bank; the
//! policy can restrict attribution to aggressors sharing the flip's bank.
use crate::memory::{BitFlip, DRAMAddr};
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Policy for attaching flips to sub-patterns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationPolicy {
    /// Flips whose minimum row distance exceeds this bound are rejected instead of
    /// attached. `None` attaches every flip to its nearest sub-pattern.
    #[serde(default)]
    pub max_distance: Option<usize>,
    /// Only consider aggressors in the bank of the flip. Flips in a bank without
    /// aggressor are then rejected.
    #[serde(default)]
    pub same_bank_only: bool,
}

/// One flip attached to its nearest sub-pattern(s).
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// The attached flip
    pub flip: BitFlip,
    /// Indices of all sub-patterns at minimum distance
    pub sub_patterns: Vec<usize>,
    /// Row distance to the nearest aggressor
    pub distance: usize,
}

/// Result of correlating the flips of one scan.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    /// Flips attached to at least one sub-pattern
    pub attached: Vec<Attachment>,
    /// Flips without DRAM coordinate, or turned away by the policy
    pub rejected: Vec<BitFlip>,
}

impl Correlation {
    /// Flips per sub-pattern index. A flip tied between sub-patterns appears under each.
    pub fn by_sub_pattern(&self) -> HashMap<usize, Vec<BitFlip>> {
        self.attached
            .iter()
            .flat_map(|a| a.sub_patterns.iter().map(move |&idx| (idx, a.flip)))
            .into_group_map()
    }
}

fn distance(flip: &DRAMAddr, aggressors: &[DRAMAddr], same_bank_only: bool) -> Option<usize> {
    aggressors
        .iter()
        .filter(|aggr| !same_bank_only || aggr.same_bank(flip))
        .map(|aggr| aggr.row_distance(flip))
        .min()
}

/// Attaches each flip to the sub-pattern(s) at minimum row distance.
///
/// `sub_patterns` holds the absolute aggressor addresses of each sub-pattern. Flips
/// must carry their DRAM coordinate (see [`BitFlip::locate`]).
pub fn correlate(
    sub_patterns: &[Vec<DRAMAddr>],
    flips: &[BitFlip],
    policy: CorrelationPolicy,
) -> Correlation {
    let mut out = Correlation::default();
    for flip in flips {
        let Some(dram) = flip.dram else {
            warn!("Flip at {:#x} has no DRAM coordinate, skipping", flip.addr);
            out.rejected.push(*flip);
            continue;
        };
        let distances = sub_patterns
            .iter()
            .map(|aggrs| distance(&dram, aggrs, policy.same_bank_only))
            .collect::<Vec<_>>();
        let Some(min) = distances.iter().flatten().min().copied() else {
            debug!("No aggressor to attribute flip {} to", dram);
            out.rejected.push(*flip);
            continue;
        };
        if policy.max_distance.is_some_and(|max| min > max) {
            debug!("Flip {} is {} rows from the nearest aggressor", dram, min);
            out.rejected.push(*flip);
            continue;
        }
        let sub_patterns = distances
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == Some(min))
            .map(|(idx, _)| idx)
            .collect();
        out.attached.push(Attachment {
            flip: *flip,
            sub_patterns,
            distance: min,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(bank: usize, rows: &[usize]) -> Vec<DRAMAddr> {
        rows.iter().map(|&r| DRAMAddr::new(bank, r, 0)).collect()
    }

    fn flip_at(bank: usize, row: usize) -> BitFlip {
        BitFlip {
            dram: Some(DRAMAddr::new(bank, row, 0x10)),
            ..BitFlip::new(0x1000, 0x1, 0x1)
        }
    }

    #[test]
    fn test_nearest_sub_pattern() {
        let subs = [rows(1, &[10, 12]), rows(1, &[50, 52])];
        let res = correlate(&subs, &[flip_at(1, 14)], CorrelationPolicy::default());
        assert_eq!(res.attached.len(), 1);
        assert_eq!(res.attached[0].sub_patterns, vec![0]);
        assert_eq!(res.attached[0].distance, 2);
        assert!(res.rejected.is_empty());
    }

    #[test]
    fn test_tie_attaches_to_all() {
        let subs = [rows(0, &[10, 12]), rows(0, &[16, 18])];
        let res = correlate(&subs, &[flip_at(0, 14)], CorrelationPolicy::default());
        assert_eq!(res.attached[0].sub_patterns, vec![0, 1]);
        let by_sub = res.by_sub_pattern();
        assert_eq!(by_sub[&0].len(), 1);
        assert_eq!(by_sub[&1].len(), 1);
    }

    #[test]
    fn test_no_cutoff_by_default() {
        let subs = [rows(0, &[10, 12])];
        let res = correlate(&subs, &[flip_at(0, 4000)], CorrelationPolicy::default());
        assert_eq!(res.attached[0].distance, 3988);
    }

    #[test]
    fn test_max_distance_rejects() {
        let subs = [rows(0, &[10, 12])];
        let policy = CorrelationPolicy {
            max_distance: Some(8),
            ..Default::default()
        };
        let res = correlate(&subs, &[flip_at(0, 20), flip_at(0, 21)], policy);
        assert_eq!(res.attached.len(), 1);
        assert_eq!(res.rejected.len(), 1);
        assert_eq!(res.rejected[0].dram.map(|d| d.row), Some(21));
    }

    #[test]
    fn test_other_bank_attached_by_default() {
        let subs = [rows(1, &[10, 12]), rows(1, &[50, 52])];
        let res = correlate(&subs, &[flip_at(2, 14)], CorrelationPolicy::default());
        assert_eq!(res.attached.len(), 1);
        assert_eq!(res.attached[0].sub_patterns, vec![0]);
        assert_eq!(res.attached[0].distance, 2);
        assert!(res.rejected.is_empty());
    }

    #[test]
    fn test_same_bank_only_and_unlocated_rejected() {
        let subs = [rows(0, &[10, 12])];
        let unlocated = BitFlip::new(0x2000, 0x1, 0x0);
        let policy = CorrelationPolicy {
            same_bank_only: true,
            ..Default::default()
        };
        let res = correlate(&subs, &[flip_at(3, 11), unlocated], policy);
        assert!(res.attached.is_empty());
        assert_eq!(res.rejected.len(), 2);
    }

    #[test]
    fn test_unlocated_rejected_by_default() {
        let subs = [rows(0, &[10, 12])];
        let res = correlate(
            &subs,
            &[BitFlip::new(0x2000, 0x1, 0x0)],
            CorrelationPolicy::default(),
        );
        assert!(res.attached.is_empty());
        assert_eq!(res.rejected.len(), 1);
    }
}
