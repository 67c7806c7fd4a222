//! Query orchestration
//!
//! Wires the collaborators into the full search flow: embed the query image,
//! fetch nearest neighbors from the index, analyze the query's peaks, and
//! hand everything to the hybrid ranker. Collaborators are injected at
//! construction; every request computes its own feature records.

use std::sync::Arc;

use anyhow::Result;

use crate::config::EngineConfig;
use crate::features::{ChromatographAnalyzer, FeatureRecord};
use crate::ranker::{HybridRanker, RankedMatch};
use crate::services::index::{CandidateStore, ImageEmbedder, VectorIndex};
use crate::services::ocr::OcrEngine;
use crate::services::vision::{self, VisionJudge};

/// Final answer for one query: ranked matches plus the query's own feature
/// summary for display and debugging.
#[derive(Debug)]
pub struct SearchOutcome {
  pub matches: Vec<RankedMatch>,
  pub query_features: FeatureRecord,
}

/// Hybrid visual + clinical similarity search over stored chromatographs.
pub struct HybridSearchEngine {
  analyzer: ChromatographAnalyzer,
  embedder: Arc<dyn ImageEmbedder>,
  index: Arc<dyn VectorIndex>,
  ranker: HybridRanker,
  config: EngineConfig,
}

impl HybridSearchEngine {
  pub fn new(
    config: EngineConfig,
    ocr: Arc<dyn OcrEngine>,
    embedder: Arc<dyn ImageEmbedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn CandidateStore>,
    judge: Option<Arc<dyn VisionJudge>>,
  ) -> Self {
    let analyzer = ChromatographAnalyzer::new(ocr, config.analyzer);
    let ranker = HybridRanker::new(config.ranker, store, judge);
    Self { analyzer, embedder, index, ranker, config }
  }

  /// Run one query end to end. Only an unreadable query image aborts; every
  /// per-candidate failure is absorbed downstream.
  pub async fn search(
    &self,
    image: &image::DynamicImage,
    requested: usize,
  ) -> Result<SearchOutcome> {
    let prepared = self.analyzer.prepare(image);

    let embedding = self.embedder.embed(&prepared)?;
    let fetch = requested * self.config.search.fetch_multiplier;
    let candidates = self.index.nearest(&embedding, fetch).await?;
    quill::info!(&format!("fetched {} candidates from the index", candidates.len()));

    let query_features = self.analyzer.analyze(&prepared)?;
    quill::info!(&format!(
      "query: {} peaks, {:?} detection",
      query_features.peak_count(),
      query_features.detection_mode
    ));

    let query_png = vision::encode_png(&prepared)?;
    let matches =
      self.ranker.rank(&self.analyzer, &query_features, &query_png, candidates, requested).await;

    quill::success!(&format!("ranked {} matches", matches.len()));
    Ok(SearchOutcome { matches, query_features })
  }
}
