//! Clinical similarity between two feature records
//!
//! Two stages with distinct jobs. The hard filter answers "may these two
//! patterns be compared at all" and rejects pairs whose peak counts or
//! aligned peak heights differ beyond clinical tolerance. The weighted score
//! then grades pairs that passed the filter; it must never run on a pair the
//! filter rejected.
//!
//! Height sequences are aligned by position index and the shorter side is
//! zero-padded. Padding conflates "peak absent" with "peak of height zero";
//! the skip rules below compensate for small missing peaks. The interaction
//! is intricate but it is the documented contract - revisit alignment before
//! changing either rule in isolation.

use serde::{Deserialize, Serialize};

use crate::features::FeatureRecord;

/// Hard-filter tolerances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterThresholds {
  /// Maximum tolerated difference in detected peak count.
  pub max_peak_count_diff: usize,
  /// Maximum tolerated ratio between aligned peak heights.
  pub max_concentration_ratio: f32,
}

impl Default for FilterThresholds {
  fn default() -> Self {
    Self { max_peak_count_diff: 3, max_concentration_ratio: 2.5 }
  }
}

/// Outcome of the hard filter; consumed immediately by the ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityVerdict {
  pub is_similar: bool,
  pub reason: String,
}

impl SimilarityVerdict {
  fn accept() -> Self {
    Self { is_similar: true, reason: "Clinically similar".to_string() }
  }

  fn reject(reason: String) -> Self {
    Self { is_similar: false, reason }
  }
}

/// Per-factor breakdown of the weighted similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
  pub num_peaks: f32,
  pub heights: f32,
  pub retention_time: f32,
  pub intensity: f32,
}

/// Weighted similarity plus its factor breakdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSimilarity {
  pub score: f32,
  pub factors: FactorBreakdown,
}

const WEIGHT_NUM_PEAKS: f32 = 0.15;
const WEIGHT_HEIGHTS: f32 = 0.35;
const WEIGHT_RETENTION: f32 = 0.35;
const WEIGHT_INTENSITY: f32 = 0.15;

/// Sentinel padded into the shorter normalized-position sequence; real
/// normalized positions live in [0, 1].
const POSITION_SENTINEL: f32 = 999.0;

/// Both heights below this are mutual noise and skip the ratio check.
const NOISE_FLOOR: f32 = 0.05;
/// A height below this counts as essentially absent.
const ABSENT_FLOOR: f32 = 0.01;
/// An absent peak is non-penalizing while the other side stays below this.
const MINOR_PRESENT_CEILING: f32 = 0.15;
/// With a near-zero minimum, a maximum below this is still a minor peak.
const MINOR_PEAK_CEILING: f32 = 0.2;
/// Ratio assigned when one peak is essentially absent and the other is not.
const ABSENT_RATIO: f32 = 100.0;

/// Hard filter: may these two chromatographs be compared at all?
///
/// Symmetric in its arguments: count difference and height ratios are
/// symmetric by construction.
pub fn is_clinically_similar(
  first: &FeatureRecord,
  second: &FeatureRecord,
  thresholds: &FilterThresholds,
) -> SimilarityVerdict {
  let count_first = first.peak_count();
  let count_second = second.peak_count();
  if count_first.abs_diff(count_second) > thresholds.max_peak_count_diff {
    return SimilarityVerdict::reject(format!(
      "Peak count too different ({count_first} vs {count_second})"
    ));
  }

  if count_first == 0 || count_second == 0 {
    return SimilarityVerdict::accept();
  }

  let (heights_first, heights_second) = aligned_heights(first, second);
  for (index, (&h1, &h2)) in heights_first.iter().zip(heights_second.iter()).enumerate() {
    // Mutual noise
    if h1 < NOISE_FLOOR && h2 < NOISE_FLOOR {
      continue;
    }
    // A small missing peak is non-penalizing
    if (h1 < ABSENT_FLOOR && h2 < MINOR_PRESENT_CEILING)
      || (h2 < ABSENT_FLOOR && h1 < MINOR_PRESENT_CEILING)
    {
      continue;
    }

    let low = h1.min(h2);
    let high = h1.max(h2);
    let ratio = if low < ABSENT_FLOOR {
      if high < MINOR_PEAK_CEILING {
        continue;
      }
      ABSENT_RATIO
    } else {
      high / low
    };

    if ratio > thresholds.max_concentration_ratio {
      return SimilarityVerdict::reject(format!(
        "Peak #{} concentration too different ({:.1}% vs {:.1}%, ratio={:.1}x)",
        index + 1,
        h1 * 100.0,
        h2 * 100.0,
        ratio
      ));
    }
  }

  SimilarityVerdict::accept()
}

/// Weighted similarity over four factors (15/35/35/15). Precondition: the
/// pair already passed the hard filter.
pub fn calculate_peak_similarity(first: &FeatureRecord, second: &FeatureRecord) -> PeakSimilarity {
  let factors = FactorBreakdown {
    num_peaks: num_peaks_factor(first, second),
    heights: heights_factor(first, second),
    retention_time: retention_factor(first, second),
    intensity: intensity_factor(first, second),
  };

  let score = WEIGHT_NUM_PEAKS * factors.num_peaks
    + WEIGHT_HEIGHTS * factors.heights
    + WEIGHT_RETENTION * factors.retention_time
    + WEIGHT_INTENSITY * factors.intensity;

  PeakSimilarity { score: score.clamp(0.0, 1.0), factors }
}

fn num_peaks_factor(first: &FeatureRecord, second: &FeatureRecord) -> f32 {
  match first.peak_count().abs_diff(second.peak_count()) {
    0 => 1.0,
    1 => 0.8,
    2 => 0.6,
    _ => 0.4,
  }
}

fn heights_factor(first: &FeatureRecord, second: &FeatureRecord) -> f32 {
  if first.peak_count() == 0 || second.peak_count() == 0 {
    return 0.0;
  }

  let (heights_first, heights_second) = aligned_heights(first, second);
  let similarities: Vec<f32> = heights_first
    .iter()
    .zip(heights_second.iter())
    .map(|(&h1, &h2)| {
      if h1 < ABSENT_FLOOR && h2 < ABSENT_FLOOR {
        return 1.0;
      }
      let ratio = h1.max(h2) / (h1.min(h2) + 1e-6);
      match ratio {
        r if r < 1.5 => 1.0,
        r if r < 2.0 => 0.85,
        r if r < 3.0 => 0.6,
        _ => 0.3,
      }
    })
    .collect();

  mean(&similarities)
}

fn retention_factor(first: &FeatureRecord, second: &FeatureRecord) -> f32 {
  if first.peak_count() == 0 || second.peak_count() == 0 {
    return 0.0;
  }

  let length = first.normalized_positions.len().max(second.normalized_positions.len());
  let padded = |positions: &[f32]| -> Vec<f32> {
    let mut padded = positions.to_vec();
    padded.resize(length, POSITION_SENTINEL);
    padded
  };
  let positions_first = padded(&first.normalized_positions);
  let positions_second = padded(&second.normalized_positions);

  let similarities: Vec<f32> = positions_first
    .iter()
    .zip(positions_second.iter())
    .map(|(&p1, &p2)| {
      if p1 == POSITION_SENTINEL || p2 == POSITION_SENTINEL {
        return 0.5;
      }
      // Normalized position difference scaled to an approximate retention
      // time difference in minutes
      let time_diff = (p1 - p2).abs() * 10.0;
      match time_diff {
        d if d < 0.1 => 1.0,
        d if d < 0.2 => 0.95,
        d if d < 0.4 => 0.85,
        d if d < 0.6 => 0.6,
        _ => 0.3,
      }
    })
    .collect();

  mean(&similarities)
}

fn intensity_factor(first: &FeatureRecord, second: &FeatureRecord) -> f32 {
  (-2.0 * (first.mean_intensity - second.mean_intensity).abs()).exp()
}

/// Height sequences aligned by position index, zero-padded to equal length.
fn aligned_heights(first: &FeatureRecord, second: &FeatureRecord) -> (Vec<f32>, Vec<f32>) {
  let mut heights_first = first.heights();
  let mut heights_second = second.heights();
  let length = heights_first.len().max(heights_second.len());
  heights_first.resize(length, 0.0);
  heights_second.resize(length, 0.0);
  (heights_first, heights_second)
}

fn mean(values: &[f32]) -> f32 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f32>() / values.len() as f32
}
