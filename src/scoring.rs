//! Accuracy scoring against ground truth.
//!
//! Matching is greedy: each ground-truth point, in order, claims the closest
//! still-unclaimed marker if it lies within the threshold. Distances are
//! truncated to whole pixels before comparison and the first of several
//! equally close markers wins, so results line up with historical scores.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, distance_truncated};

/// True/false positive and false negative counts for one validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreTally {
    #[serde(rename = "tp")]
    pub true_positive: u32,
    #[serde(rename = "fp")]
    pub false_positive: u32,
    #[serde(rename = "fn")]
    pub false_negative: u32,
}

impl ScoreTally {
    /// Fraction of markers that hit something. `None` with no markers.
    pub fn precision(&self) -> Option<f32> {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// Fraction of ground truth that was found. `None` with no ground truth.
    pub fn recall(&self) -> Option<f32> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }
}

fn ratio(num: u32, den: u32) -> Option<f32> {
    (den > 0).then(|| num as f32 / den as f32)
}

/// Index-level result of greedy matching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Matching {
    /// For each ground-truth point, the index of the marker that claimed it.
    pub claimed_by: Vec<Option<usize>>,
    /// Indices of markers that matched nothing, in input order.
    pub unclaimed: Vec<usize>,
}

impl Matching {
    pub fn tally(&self) -> ScoreTally {
        let true_positive = self.claimed_by.iter().filter(|c| c.is_some()).count();
        ScoreTally {
            true_positive: count(true_positive),
            false_positive: count(self.unclaimed.len()),
            false_negative: count(self.claimed_by.len() - true_positive),
        }
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Greedily match `current` markers against `truth`.
///
/// A marker matches when its truncated distance is at most `threshold`.
pub fn match_greedy(current: &[Point], truth: &[Point], threshold: u32) -> Matching {
    let mut unclaimed: Vec<usize> = (0..current.len()).collect();
    let mut claimed_by = Vec::with_capacity(truth.len());

    for g in truth {
        let mut best: Option<(usize, u32)> = None;
        for (slot, &idx) in unclaimed.iter().enumerate() {
            let d = distance_truncated(current[idx], *g);
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((slot, d));
            }
        }

        match best {
            Some((slot, d)) if d <= threshold => {
                claimed_by.push(Some(unclaimed.remove(slot)));
            }
            _ => claimed_by.push(None),
        }
    }

    Matching {
        claimed_by,
        unclaimed,
    }
}

/// Score `current` markers against `truth`.
pub fn score(current: &[Point], truth: &[Point], threshold: u32) -> ScoreTally {
    let tally = match_greedy(current, truth, threshold).tally();
    log::debug!(
        "🎯 Score: tp={} fp={} fn={}",
        tally.true_positive,
        tally.false_positive,
        tally.false_negative
    );
    tally
}
