//! Engine configuration
//!
//! Plain structs with sensible defaults, optionally loaded from a JSON file
//! and overridable through `HEMOGRAPH_*` environment variables. Everything is
//! constructed explicitly and passed down; there is no ambient global state.

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::peaks::MIN_EXPECTED_PEAKS;
use crate::similarity::FilterThresholds;

/// Feature-extraction knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
  /// Gaussian spread for the default profile smoothing pass, in samples.
  pub smoothing_sigma: f32,
  /// Bottom fraction of the chromatograph that holds the trace.
  pub graph_region_fraction: f32,
  /// Inputs taller than this are treated as full pages and cropped first.
  pub full_page_height: u32,
  /// Detection escalates until at least this many peaks are found.
  pub min_peaks: usize,
}

impl Default for AnalyzerConfig {
  fn default() -> Self {
    Self {
      smoothing_sigma: crate::signal::DEFAULT_SMOOTHING_SIGMA,
      graph_region_fraction: 0.6,
      full_page_height: 800,
      min_peaks: MIN_EXPECTED_PEAKS,
    }
  }
}

/// Hybrid ranking knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
  /// Weight of the externally supplied embedding similarity.
  pub embedding_weight: f32,
  /// Weight of the clinical peak similarity.
  pub peak_weight: f32,
  /// Permissive pre-filter: only extreme outliers are dropped here, the
  /// optional screening stage applies the strict judgment.
  pub prefilter: FilterThresholds,
  /// Screening covers the top `requested * screen_window_multiplier`.
  pub screen_window_multiplier: usize,
  /// Per-call timeout for the remote screening vote.
  pub screen_timeout_secs: u64,
}

impl Default for RankerConfig {
  fn default() -> Self {
    Self {
      embedding_weight: 0.40,
      peak_weight: 0.60,
      prefilter: FilterThresholds { max_peak_count_diff: 5, max_concentration_ratio: 10.0 },
      screen_window_multiplier: 2,
      screen_timeout_secs: 30,
    }
  }
}

/// Query orchestration knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  /// Fetch `requested * fetch_multiplier` neighbors for re-ranking headroom.
  pub fetch_multiplier: usize,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self { fetch_multiplier: 3 }
  }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub analyzer: AnalyzerConfig,
  pub ranker: RankerConfig,
  pub search: SearchConfig,
}

impl EngineConfig {
  /// Load from a JSON file, falling back to defaults when `path` is `None`.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut config = match path {
      Some(path) => {
        let raw = std::fs::read_to_string(path)
          .map_err(|e| anyhow!("failed to read config {}: {e}", path.display()))?;
        serde_json::from_str(&raw)
          .map_err(|e| anyhow!("failed to parse config {}: {e}", path.display()))?
      }
      None => Self::default(),
    };
    config.apply_env();
    Ok(config)
  }

  /// Environment overrides for the knobs operators actually turn.
  fn apply_env(&mut self) {
    if let Some(value) = env_f32("HEMOGRAPH_EMBEDDING_WEIGHT") {
      self.ranker.embedding_weight = value;
    }
    if let Some(value) = env_f32("HEMOGRAPH_PEAK_WEIGHT") {
      self.ranker.peak_weight = value;
    }
    if let Some(value) = env_f32("HEMOGRAPH_SMOOTHING_SIGMA") {
      self.analyzer.smoothing_sigma = value;
    }
    if let Some(value) = env_u64("HEMOGRAPH_SCREEN_TIMEOUT_SECS") {
      self.ranker.screen_timeout_secs = value;
    }
  }
}

fn env_f32(name: &str) -> Option<f32> {
  std::env::var(name).ok()?.parse().ok()
}

fn env_u64(name: &str) -> Option<u64> {
  std::env::var(name).ok()?.parse().ok()
}
