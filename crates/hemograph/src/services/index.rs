//! Vector index and candidate image collaborators
//!
//! The similarity index owns the stored embeddings and their metadata; this
//! core only reads from it. Candidate identities carry enough metadata to
//! locate the stored region-of-interest image for on-demand peak analysis.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// A stored chromatograph known to the external vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
  pub id: String,
  pub category: String,
  pub source: String,
  pub system_type: String,
  pub image_file: String,
}

/// Candidate paired with the externally computed embedding similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
  #[serde(flatten)]
  pub candidate: Candidate,
  pub embedding_similarity: f32,
}

/// Visual embedding model boundary.
pub trait ImageEmbedder: Send + Sync {
  fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>>;
}

/// Read-only nearest-neighbor lookup against the external index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
  async fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<ScoredCandidate>>;
}

/// On-demand access to a candidate's stored region-of-interest image.
pub trait CandidateStore: Send + Sync {
  fn load_image(&self, candidate: &Candidate) -> Result<DynamicImage>;
}

/// Convert an index distance to a similarity in (0, 1].
pub fn distance_to_similarity(distance: f32) -> f32 {
  1.0 / (1.0 + distance.max(0.0))
}

/// Candidate store over the cropped-image directories produced at index
/// build time. Filenames in the index carry a source prefix that the on-disk
/// layout does not.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
  pub main_dir: PathBuf,
  pub reference_dir: PathBuf,
}

impl DirectoryStore {
  pub fn new(main_dir: impl Into<PathBuf>, reference_dir: impl Into<PathBuf>) -> Self {
    Self { main_dir: main_dir.into(), reference_dir: reference_dir.into() }
  }

  fn resolve(&self, candidate: &Candidate) -> PathBuf {
    if candidate.source == "main_database" {
      self.main_dir.join(candidate.image_file.trim_start_matches("main_"))
    } else {
      self.reference_dir.join(candidate.image_file.trim_start_matches("reference_"))
    }
  }
}

impl CandidateStore for DirectoryStore {
  fn load_image(&self, candidate: &Candidate) -> Result<DynamicImage> {
    let path = self.resolve(candidate);
    image::open(&path)
      .map_err(|e| anyhow!("failed to open candidate image {}: {e}", path.display()))
  }
}
