//! CLI command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::DynamicImage;

use crate::cli::display;
use crate::config::EngineConfig;
use crate::features::{ChromatographAnalyzer, FeatureRecord};
use crate::ranker::HybridRanker;
use crate::services::index::{DirectoryStore, ScoredCandidate};
use crate::services::ocr::NullOcr;
use crate::services::vision::{self, JudgeConfig, OpenRouterJudge, VisionJudge};
use crate::similarity::{self, FilterThresholds};

fn open_image(path: &Path) -> Result<DynamicImage> {
  image::open(path).map_err(|e| anyhow!("failed to open {}: {e}", path.display()))
}

fn analyzer(config: &EngineConfig) -> ChromatographAnalyzer {
  ChromatographAnalyzer::new(Arc::new(NullOcr), config.analyzer)
}

fn analyze_file(analyzer: &ChromatographAnalyzer, path: &Path) -> Result<FeatureRecord> {
  let image = open_image(path)?;
  Ok(analyzer.analyze(&analyzer.prepare(&image))?)
}

/// Analyze a single chromatograph image and print its feature record.
pub async fn analyze(path: &Path, config: Option<&Path>, json: bool) -> Result<()> {
  let config = EngineConfig::load(config)?;
  let record = analyze_file(&analyzer(&config), path)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&record)?);
  } else {
    display::show_features(path, &record);
  }
  Ok(())
}

/// Compare two chromatograph images: hard-filter verdict plus, when the pair
/// is comparable, the weighted factor breakdown.
pub async fn compare(first: &Path, second: &Path, config: Option<&Path>) -> Result<()> {
  let config = EngineConfig::load(config)?;
  let analyzer = analyzer(&config);

  let record_first = analyze_file(&analyzer, first)?;
  let record_second = analyze_file(&analyzer, second)?;

  let verdict =
    similarity::is_clinically_similar(&record_first, &record_second, &FilterThresholds::default());
  if !verdict.is_similar {
    display::show_verdict(&verdict);
    return Ok(());
  }

  let similarity = similarity::calculate_peak_similarity(&record_first, &record_second);
  display::show_verdict(&verdict);
  display::show_similarity(&similarity);
  Ok(())
}

/// Rank manifest candidates against a query image. The manifest is the
/// serialized answer of the external vector index: one entry per candidate
/// with its precomputed embedding similarity.
#[allow(clippy::too_many_arguments)]
pub async fn rank(
  query: &Path,
  manifest: &Path,
  top_k: usize,
  screen: bool,
  main_dir: &Path,
  reference_dir: &Path,
  config: Option<&Path>,
  json: bool,
) -> Result<()> {
  let config = EngineConfig::load(config)?;
  let analyzer = analyzer(&config);

  let raw = std::fs::read_to_string(manifest)
    .map_err(|e| anyhow!("failed to read manifest {}: {e}", manifest.display()))?;
  let candidates: Vec<ScoredCandidate> = serde_json::from_str(&raw)
    .map_err(|e| anyhow!("failed to parse manifest {}: {e}", manifest.display()))?;

  let judge: Option<Arc<dyn VisionJudge>> = if screen {
    Some(Arc::new(OpenRouterJudge::new(JudgeConfig::from_env()?)?))
  } else {
    None
  };

  let store = Arc::new(DirectoryStore::new(main_dir, reference_dir));
  let ranker = HybridRanker::new(config.ranker, store, judge);

  let query_image = open_image(query)?;
  let prepared = analyzer.prepare(&query_image);
  let query_features = analyzer.analyze(&prepared)?;
  let query_png = vision::encode_png(&prepared)?;

  quill::info!(&format!(
    "query: {} peaks, {:?} detection",
    query_features.peak_count(),
    query_features.detection_mode
  ));

  let matches = ranker.rank(&analyzer, &query_features, &query_png, candidates, top_k).await;

  if json {
    println!("{}", serde_json::to_string_pretty(&matches)?);
  } else {
    display::show_matches(&query_features, &matches);
  }
  Ok(())
}
