//! Hybrid ranker scenarios: scoring, fallback, and screening semantics.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use hemograph::config::{AnalyzerConfig, RankerConfig};
use hemograph::features::ChromatographAnalyzer;
use hemograph::ranker::HybridRanker;
use hemograph::services::ocr::NullOcr;
use hemograph::services::vision::{self, VisionJudge};

use common::*;

fn analyzer() -> ChromatographAnalyzer {
  ChromatographAnalyzer::new(Arc::new(NullOcr), AnalyzerConfig::default())
}

fn test_config() -> RankerConfig {
  RankerConfig { screen_timeout_secs: 1, ..RankerConfig::default() }
}

fn query_png() -> Vec<u8> {
  vision::encode_png(&three_peak_image(600)).unwrap()
}

#[tokio::test]
async fn ranks_by_combined_score_descending() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  // Identical traces: clinical similarity is 1.0 for all, so the embedding
  // similarity decides the order
  let store = Arc::new(MemoryStore::with(vec![
    ("low", three_peak_image(600)),
    ("high", three_peak_image(600)),
    ("mid", three_peak_image(600)),
  ]));
  let ranker = HybridRanker::new(test_config(), store, None);

  let candidates = vec![scored("low", 0.2), scored("high", 0.9), scored("mid", 0.5)];
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 10).await;

  assert_eq!(matches.len(), 3);
  let ids: Vec<&str> = matches.iter().map(|m| m.candidate.id.as_str()).collect();
  assert_eq!(ids, vec!["high", "mid", "low"]);
  for pair in matches.windows(2) {
    assert!(pair[0].combined_score >= pair[1].combined_score);
  }

  // Identical records score clinical 1.0, so combined = 0.4*e + 0.6
  let top = &matches[0];
  assert!((top.combined_score - (0.4 * 0.9 + 0.6)).abs() < 1e-3);
  assert_eq!(top.peak_count, Some(3));
  assert!(top.factors.is_some());
}

#[tokio::test]
async fn combined_score_stays_in_unit_interval() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  let store = Arc::new(MemoryStore::with(vec![("a", three_peak_image(600))]));
  let ranker = HybridRanker::new(test_config(), store, None);

  let matches = ranker.rank(&analyzer, &query, &query_png(), vec![scored("a", 1.0)], 5).await;
  assert_eq!(matches.len(), 1);
  assert!((0.0..=1.0).contains(&matches[0].combined_score));
}

#[tokio::test]
async fn extraction_failure_falls_back_to_embedding_only() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  // "ghost" has no stored image, so analysis fails and the candidate keeps
  // its embedding score instead of being dropped
  let store = Arc::new(MemoryStore::with(vec![("real", three_peak_image(600))]));
  let ranker = HybridRanker::new(test_config(), store, None);

  let candidates = vec![scored("real", 0.4), scored("ghost", 0.3)];
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 10).await;

  assert_eq!(matches.len(), 2);
  let ghost = matches.iter().find(|m| m.candidate.id == "ghost").unwrap();
  assert_eq!(ghost.clinical_similarity, None);
  assert_eq!(ghost.peak_count, None);
  assert!(ghost.factors.is_none());
  assert!((ghost.combined_score - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn prefilter_drops_extreme_peak_count_outliers() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  // Eleven evenly spaced peaks against the query's three: count difference
  // exceeds even the permissive threshold of five
  let busy_bumps: Vec<(f32, f32, f32)> =
    (0..11).map(|i| (0.05 + i as f32 * 0.09, 0.8, 6.0)).collect();
  let busy = synthetic_chromatograph(900, 150, &busy_bumps);

  let store = Arc::new(MemoryStore::with(vec![
    ("busy", busy),
    ("normal", three_peak_image(600)),
  ]));
  let ranker = HybridRanker::new(test_config(), store, None);

  let candidates = vec![scored("busy", 0.95), scored("normal", 0.5)];
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 10).await;

  let ids: Vec<&str> = matches.iter().map(|m| m.candidate.id.as_str()).collect();
  assert_eq!(ids, vec!["normal"]);
}

#[tokio::test]
async fn screening_covers_twice_the_requested_count() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  let entries: Vec<(&str, _)> =
    ["a", "b", "c", "d", "e", "f", "g", "h"].iter().map(|id| (*id, three_peak_image(600))).collect();
  let store = Arc::new(MemoryStore::with(entries));

  let judge = Arc::new(ApproveAllJudge::default());
  let ranker = HybridRanker::new(test_config(), store, Some(judge.clone()));

  let candidates = ["a", "b", "c", "d", "e", "f", "g", "h"]
    .iter()
    .enumerate()
    .map(|(i, id)| scored(id, 0.9 - i as f32 * 0.05))
    .collect();
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 3).await;

  assert_eq!(matches.len(), 3);
  // Window is 2 x requested: only six of the eight candidates get screened
  assert_eq!(judge.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn screening_timeout_fails_open() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  // The 640-wide candidate stalls its screening call past the 1s timeout;
  // fail-open must keep it and the final list still fills the request
  let mut entries: Vec<(&str, _)> =
    ["a", "b", "c", "d", "e"].iter().map(|id| (*id, three_peak_image(600))).collect();
  entries.push(("stalled", three_peak_image(640)));
  let store = Arc::new(MemoryStore::with(entries));

  let judge: Arc<dyn VisionJudge> = Arc::new(WidthStallJudge { stall_width: 640 });
  let ranker = HybridRanker::new(test_config(), store, Some(judge));

  let candidates = vec![
    scored("a", 0.9),
    scored("stalled", 0.85),
    scored("b", 0.8),
    scored("c", 0.7),
    scored("d", 0.6),
    scored("e", 0.5),
  ];
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 3).await;

  assert_eq!(matches.len(), 3);
  assert!(matches.iter().any(|m| m.candidate.id == "stalled"));
}

#[tokio::test]
async fn screening_rejection_removes_without_reordering() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  let store = Arc::new(MemoryStore::with(vec![
    ("keep_high", three_peak_image(600)),
    ("reject_me", three_peak_image(640)),
    ("keep_low", three_peak_image(600)),
  ]));
  let judge: Arc<dyn VisionJudge> = Arc::new(WidthRejectJudge { reject_width: 640 });
  let ranker = HybridRanker::new(test_config(), store, Some(judge));

  let candidates =
    vec![scored("keep_high", 0.9), scored("reject_me", 0.8), scored("keep_low", 0.7)];
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 3).await;

  let ids: Vec<&str> = matches.iter().map(|m| m.candidate.id.as_str()).collect();
  assert_eq!(ids, vec!["keep_high", "keep_low"]);
}

#[tokio::test]
async fn broken_screening_backend_keeps_everything() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  let store = Arc::new(MemoryStore::with(vec![
    ("a", three_peak_image(600)),
    ("b", three_peak_image(600)),
  ]));
  let judge: Arc<dyn VisionJudge> = Arc::new(BrokenJudge);
  let ranker = HybridRanker::new(test_config(), store, Some(judge));

  let candidates = vec![scored("a", 0.9), scored("b", 0.8)];
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 2).await;

  assert_eq!(matches.len(), 2);
}

#[tokio::test]
async fn without_screening_the_list_truncates_to_requested() {
  let analyzer = analyzer();
  let query = analyzer.analyze(&three_peak_image(600)).unwrap();

  let entries: Vec<(&str, _)> =
    ["a", "b", "c", "d", "e"].iter().map(|id| (*id, three_peak_image(600))).collect();
  let store = Arc::new(MemoryStore::with(entries));
  let ranker = HybridRanker::new(test_config(), store, None);

  let candidates = ["a", "b", "c", "d", "e"]
    .iter()
    .enumerate()
    .map(|(i, id)| scored(id, 0.9 - i as f32 * 0.1))
    .collect();
  let matches = ranker.rank(&analyzer, &query, &query_png(), candidates, 2).await;

  assert_eq!(matches.len(), 2);
  assert_eq!(matches[0].candidate.id, "a");
}
