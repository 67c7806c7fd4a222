//! Adaptive peak detection over signal profiles
//!
//! Peak measurement follows the classic prominence pipeline: plateau-aware
//! local maxima, a minimum-height cut, a highest-first minimum-spacing cut,
//! prominence against the nearest enclosing higher samples, and half-prominence
//! interpolated widths.
//!
//! Detection parameters that work for a crisp lab printout miss everything on
//! a faded photocopy, so detection escalates through an ordered ladder of
//! parameter rungs until enough peaks emerge. Tight parameters run first:
//! a false peak is clinically worse than a missed one, and misses self-correct
//! through escalation.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::signal::{self, SignalProfile};

/// Escalation stops once a rung yields at least this many peaks.
pub const MIN_EXPECTED_PEAKS: usize = 3;

/// One measured peak. Height is a fraction of the profile's own dynamic
/// range; width is the half-prominence width in samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
  pub position: usize,
  pub height: f32,
  pub width: f32,
  pub area: f32,
}

/// Peaks ordered by position, strictly increasing.
pub type PeakSet = Vec<Peak>;

/// Which rung of the sensitivity ladder produced a peak set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
  Strict,
  Sensitive,
  VerySensitive,
  UltraSensitive,
  UltraSensitiveWide,
}

/// Detection parameter tuple for a single pass.
#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
  pub prominence: f32,
  pub min_height: f32,
  pub min_distance: usize,
  pub min_width: f32,
}

/// A ladder rung: parameters plus an optional smoothing override that
/// re-derives the profile before detecting.
#[derive(Debug, Clone, Copy)]
struct Rung {
  mode: DetectionMode,
  params: DetectionParams,
  sigma: Option<f32>,
}

const LADDER: [Rung; 5] = [
  Rung {
    mode: DetectionMode::Strict,
    params: DetectionParams { prominence: 0.15, min_height: 0.10, min_distance: 20, min_width: 5.0 },
    sigma: None,
  },
  Rung {
    mode: DetectionMode::Sensitive,
    params: DetectionParams { prominence: 0.05, min_height: 0.05, min_distance: 15, min_width: 3.0 },
    sigma: None,
  },
  Rung {
    mode: DetectionMode::VerySensitive,
    params: DetectionParams { prominence: 0.02, min_height: 0.02, min_distance: 8, min_width: 2.0 },
    sigma: None,
  },
  // Lighter smoothing keeps narrow shoulders that sigma 2.0 flattens away
  Rung {
    mode: DetectionMode::UltraSensitive,
    params: DetectionParams { prominence: 0.01, min_height: 0.01, min_distance: 5, min_width: 1.0 },
    sigma: Some(1.0),
  },
  // Heavier smoothing merges jitter so broad faint humps survive the cut
  Rung {
    mode: DetectionMode::UltraSensitiveWide,
    params: DetectionParams {
      prominence: 0.005,
      min_height: 0.005,
      min_distance: 4,
      min_width: 1.0,
    },
    sigma: Some(3.0),
  },
];

/// Result of one run of the detection ladder.
#[derive(Debug, Clone)]
pub struct Detection {
  pub peaks: PeakSet,
  pub mode: DetectionMode,
}

/// Escalating peak detector over a region's intensity matrix.
#[derive(Debug, Clone, Copy)]
pub struct AdaptivePeakDetector {
  min_peaks: usize,
}

impl Default for AdaptivePeakDetector {
  fn default() -> Self {
    Self { min_peaks: MIN_EXPECTED_PEAKS }
  }
}

impl AdaptivePeakDetector {
  pub fn new(min_peaks: usize) -> Self {
    Self { min_peaks }
  }

  /// Run the ladder. `base` is the default-smoothed profile of `matrix`;
  /// rungs that override the smoothing re-derive their profile from the
  /// matrix. Returns the first rung's result with enough peaks, or the last
  /// rung's result if none reaches the target.
  pub fn detect(
    &self,
    matrix: &Array2<f32>,
    base: &SignalProfile,
  ) -> Result<Detection, AnalysisError> {
    let first = &LADDER[0];
    let mut detection =
      Detection { peaks: detect_peaks(base, &first.params), mode: first.mode };

    for rung in &LADDER[1..] {
      if detection.peaks.len() >= self.min_peaks {
        break;
      }
      let peaks = match rung.sigma {
        Some(sigma) => detect_peaks(&signal::extract_profile(matrix, sigma)?, &rung.params),
        None => detect_peaks(base, &rung.params),
      };
      detection = Detection { peaks, mode: rung.mode };
    }

    Ok(detection)
  }
}

/// Single-pass peak detection with the given parameters. Returned peaks are
/// ordered by position, strictly increasing.
pub fn detect_peaks(profile: &SignalProfile, params: &DetectionParams) -> PeakSet {
  let samples = profile.samples();

  let mut candidates = local_maxima(samples);
  candidates.retain(|&position| samples[position] >= params.min_height);
  let candidates = enforce_distance(samples, candidates, params.min_distance);

  let mut peaks = Vec::with_capacity(candidates.len());
  for position in candidates {
    let (prominence, left_base, right_base) = prominence_and_bases(samples, position);
    if prominence < params.prominence {
      continue;
    }
    let width = width_at_half_prominence(samples, position, prominence, left_base, right_base);
    if width < params.min_width {
      continue;
    }
    let height = samples[position];
    peaks.push(Peak { position, height, width, area: height * width });
  }
  peaks
}

/// Indices of local maxima; plateaus resolve to their midpoint. Boundary
/// samples cannot be maxima.
fn local_maxima(samples: &[f32]) -> Vec<usize> {
  let mut maxima = Vec::new();
  if samples.len() < 3 {
    return maxima;
  }

  let last = samples.len() - 1;
  let mut i = 1;
  while i < last {
    if samples[i - 1] < samples[i] {
      let mut ahead = i + 1;
      while ahead < last && samples[ahead] == samples[i] {
        ahead += 1;
      }
      if samples[ahead] < samples[i] {
        maxima.push((i + ahead - 1) / 2);
        i = ahead;
      }
    }
    i += 1;
  }
  maxima
}

/// Keep the tallest peak of any cluster closer together than `min_distance`.
/// Candidates must be ascending; the result stays ascending.
fn enforce_distance(samples: &[f32], candidates: Vec<usize>, min_distance: usize) -> Vec<usize> {
  if min_distance <= 1 || candidates.len() < 2 {
    return candidates;
  }

  let mut priority: Vec<usize> = (0..candidates.len()).collect();
  priority.sort_by(|&a, &b| {
    samples[candidates[a]]
      .partial_cmp(&samples[candidates[b]])
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let mut keep = vec![true; candidates.len()];
  for &index in priority.iter().rev() {
    if !keep[index] {
      continue;
    }
    let position = candidates[index];

    let mut left = index;
    while left > 0 {
      left -= 1;
      if position - candidates[left] >= min_distance {
        break;
      }
      keep[left] = false;
    }

    let mut right = index + 1;
    while right < candidates.len() {
      if candidates[right] - position >= min_distance {
        break;
      }
      keep[right] = false;
      right += 1;
    }
  }

  candidates.into_iter().enumerate().filter(|(i, _)| keep[*i]).map(|(_, p)| p).collect()
}

/// Prominence of a peak plus the base positions bounding it: walk outward
/// while samples stay at or below the peak, tracking the minima; prominence
/// is the drop to the higher of the two minima.
fn prominence_and_bases(samples: &[f32], peak: usize) -> (f32, usize, usize) {
  let peak_height = samples[peak];

  let mut left_min = peak_height;
  let mut left_base = peak;
  let mut i = peak as isize;
  while i >= 0 && samples[i as usize] <= peak_height {
    if samples[i as usize] < left_min {
      left_min = samples[i as usize];
      left_base = i as usize;
    }
    i -= 1;
  }

  let mut right_min = peak_height;
  let mut right_base = peak;
  let mut j = peak;
  while j < samples.len() && samples[j] <= peak_height {
    if samples[j] < right_min {
      right_min = samples[j];
      right_base = j;
    }
    j += 1;
  }

  (peak_height - left_min.max(right_min), left_base, right_base)
}

/// Width of a peak at half its prominence, with linear interpolation at the
/// crossing points.
fn width_at_half_prominence(
  samples: &[f32],
  peak: usize,
  prominence: f32,
  left_base: usize,
  right_base: usize,
) -> f32 {
  let eval_height = samples[peak] - prominence * 0.5;

  let mut i = peak;
  while i > left_base && samples[i] > eval_height {
    i -= 1;
  }
  let mut left_ip = i as f32;
  if samples[i] < eval_height {
    left_ip += (eval_height - samples[i]) / (samples[i + 1] - samples[i]);
  }

  let mut j = peak;
  while j < right_base && samples[j] > eval_height {
    j += 1;
  }
  let mut right_ip = j as f32;
  if samples[j] < eval_height {
    right_ip -= (eval_height - samples[j]) / (samples[j - 1] - samples[j]);
  }

  right_ip - left_ip
}
