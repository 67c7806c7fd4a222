//! Hybrid ranking pipeline
//!
//! Fuses the externally supplied embedding similarity with the clinical peak
//! similarity, then optionally re-screens the top of the list through the
//! remote vision judge. Ordering is fixed by the combined score before
//! screening; screening only removes candidates, never reorders survivors.
//!
//! Failure handling per candidate: feature extraction failure falls back to
//! embedding-only scoring, and any screening failure or timeout counts as an
//! approval. Neither ever aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::timeout;

use crate::config::RankerConfig;
use crate::features::{ChromatographAnalyzer, FeatureRecord};
use crate::services::index::{Candidate, CandidateStore, ScoredCandidate};
use crate::services::vision::{self, VisionJudge};
use crate::similarity::{self, FactorBreakdown};

/// One ranked result. Clinical fields are `None` when the candidate fell
/// back to embedding-only scoring.
#[derive(Debug, Clone, Serialize)]
pub struct RankedMatch {
  pub candidate: Candidate,
  pub combined_score: f32,
  pub embedding_similarity: f32,
  pub clinical_similarity: Option<f32>,
  pub factors: Option<FactorBreakdown>,
  pub peak_count: Option<usize>,
}

/// Re-ranks embedding-scored candidates by hybrid similarity.
pub struct HybridRanker {
  config: RankerConfig,
  store: Arc<dyn CandidateStore>,
  judge: Option<Arc<dyn VisionJudge>>,
}

impl HybridRanker {
  pub fn new(
    config: RankerConfig,
    store: Arc<dyn CandidateStore>,
    judge: Option<Arc<dyn VisionJudge>>,
  ) -> Self {
    Self { config, store, judge }
  }

  /// Rank candidates against the query's features and return at most
  /// `requested` matches. `query_png` is handed to the screening judge when
  /// screening is enabled.
  pub async fn rank(
    &self,
    analyzer: &ChromatographAnalyzer,
    query: &FeatureRecord,
    query_png: &[u8],
    candidates: Vec<ScoredCandidate>,
    requested: usize,
  ) -> Vec<RankedMatch> {
    let mut ranked = self.score_candidates(analyzer, query, candidates);

    ranked.sort_by(|a, b| {
      b.combined_score.partial_cmp(&a.combined_score).unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(judge) = self.judge.clone() {
      ranked = self.screen(judge, query_png, ranked, requested).await;
    }

    ranked.truncate(requested);
    ranked
  }

  /// Score every candidate: permissive hard filter, then the weighted
  /// combination. Extraction failures degrade to embedding-only scoring.
  fn score_candidates(
    &self,
    analyzer: &ChromatographAnalyzer,
    query: &FeatureRecord,
    candidates: Vec<ScoredCandidate>,
  ) -> Vec<RankedMatch> {
    let mut ranked = Vec::with_capacity(candidates.len());

    for scored in candidates {
      let embedding_similarity = scored.embedding_similarity;
      match self.candidate_features(analyzer, &scored.candidate) {
        Ok(features) => {
          let verdict = similarity::is_clinically_similar(query, &features, &self.config.prefilter);
          if !verdict.is_similar {
            quill::verbose!(&format!("filtered out {}: {}", scored.candidate.id, verdict.reason));
            continue;
          }

          let peak_similarity = similarity::calculate_peak_similarity(query, &features);
          let combined_score = self.config.embedding_weight * embedding_similarity
            + self.config.peak_weight * peak_similarity.score;

          ranked.push(RankedMatch {
            candidate: scored.candidate,
            combined_score,
            embedding_similarity,
            clinical_similarity: Some(peak_similarity.score),
            factors: Some(peak_similarity.factors),
            peak_count: Some(features.peak_count()),
          });
        }
        Err(error) => {
          quill::warn!(&format!(
            "peak analysis failed for {}: {error}; using embedding similarity only",
            scored.candidate.id
          ));
          ranked.push(RankedMatch {
            candidate: scored.candidate,
            combined_score: embedding_similarity,
            embedding_similarity,
            clinical_similarity: None,
            factors: None,
            peak_count: None,
          });
        }
      }
    }

    ranked
  }

  fn candidate_features(
    &self,
    analyzer: &ChromatographAnalyzer,
    candidate: &Candidate,
  ) -> anyhow::Result<FeatureRecord> {
    let image = self.store.load_image(candidate)?;
    Ok(analyzer.analyze(&analyzer.prepare(&image))?)
  }

  /// Screen the top of the ranking through the vision judge, all votes in
  /// flight at once, each under its own timeout. Candidates below the
  /// screening window are dropped; survivors keep their order.
  async fn screen(
    &self,
    judge: Arc<dyn VisionJudge>,
    query_png: &[u8],
    ranked: Vec<RankedMatch>,
    requested: usize,
  ) -> Vec<RankedMatch> {
    let window = ranked.len().min(requested * self.config.screen_window_multiplier);
    let limit = Duration::from_secs(self.config.screen_timeout_secs);

    let votes = join_all(
      ranked[..window]
        .iter()
        .map(|entry| self.screen_vote(judge.clone(), query_png, &entry.candidate, limit)),
    )
    .await;

    let mut survivors = Vec::with_capacity(window);
    for (entry, approved) in ranked.into_iter().take(window).zip(votes) {
      if approved {
        survivors.push(entry);
      } else {
        quill::verbose!(&format!("screening rejected {}", entry.candidate.id));
      }
    }
    survivors
  }

  /// One screening vote with fail-open mapping: timeout or error approves.
  async fn screen_vote(
    &self,
    judge: Arc<dyn VisionJudge>,
    query_png: &[u8],
    candidate: &Candidate,
    limit: Duration,
  ) -> bool {
    match timeout(limit, self.compare_candidate(judge, query_png, candidate)).await {
      Ok(Ok(approved)) => approved,
      Ok(Err(error)) => {
        quill::warn!(&format!("screening failed for {}: {error}; keeping result", candidate.id));
        true
      }
      Err(_) => {
        quill::warn!(&format!("screening timed out for {}; keeping result", candidate.id));
        true
      }
    }
  }

  async fn compare_candidate(
    &self,
    judge: Arc<dyn VisionJudge>,
    query_png: &[u8],
    candidate: &Candidate,
  ) -> anyhow::Result<bool> {
    let image = self.store.load_image(candidate)?;
    let candidate_png = vision::encode_png(&image)?;
    judge.compare(query_png, &candidate_png).await
  }
}
