//! Shared fixtures: synthetic chromatograph images and mock collaborators.
#![allow(dead_code)] // each test binary uses its own subset

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};

use hemograph::services::index::{Candidate, CandidateStore, ScoredCandidate};
use hemograph::services::vision::VisionJudge;

/// Chromatograph-like synthetic scan: dark Gaussian bumps drawn as uniform
/// columns on a light page. `bumps` entries are (center fraction, height
/// fraction, sigma in pixels).
pub fn synthetic_chromatograph(
  width: u32,
  height: u32,
  bumps: &[(f32, f32, f32)],
) -> DynamicImage {
  let mut gray = GrayImage::from_pixel(width, height, Luma([245]));
  for x in 0..width {
    let value: f32 = bumps
      .iter()
      .map(|&(center, peak_height, sigma)| {
        let d = (x as f32 - center * width as f32) / sigma;
        peak_height * (-0.5 * d * d).exp()
      })
      .sum();
    let shade = 245.0 - (value.min(1.0) * 235.0);
    for y in 0..height {
      gray.put_pixel(x, y, Luma([shade as u8]));
    }
  }
  DynamicImage::ImageLuma8(gray)
}

/// Standard three-peak trace used as the query in most scenarios.
pub fn three_peak_image(width: u32) -> DynamicImage {
  synthetic_chromatograph(width, 150, &[(0.2, 0.9, 10.0), (0.5, 0.6, 10.0), (0.8, 0.4, 10.0)])
}

pub fn candidate(id: &str) -> Candidate {
  Candidate {
    id: id.to_string(),
    category: "hb_e".to_string(),
    source: "main_database".to_string(),
    system_type: "biorad".to_string(),
    image_file: format!("main_{id}.png"),
  }
}

pub fn scored(id: &str, embedding_similarity: f32) -> ScoredCandidate {
  ScoredCandidate { candidate: candidate(id), embedding_similarity }
}

/// In-memory candidate store keyed by candidate id. Missing entries error,
/// which exercises the embedding-only fallback path.
#[derive(Default)]
pub struct MemoryStore {
  images: HashMap<String, DynamicImage>,
}

impl MemoryStore {
  pub fn with(entries: Vec<(&str, DynamicImage)>) -> Self {
    Self { images: entries.into_iter().map(|(id, image)| (id.to_string(), image)).collect() }
  }
}

impl CandidateStore for MemoryStore {
  fn load_image(&self, candidate: &Candidate) -> Result<DynamicImage> {
    self
      .images
      .get(&candidate.id)
      .cloned()
      .ok_or_else(|| anyhow!("no stored image for {}", candidate.id))
  }
}

/// Judge that approves everything and counts its calls.
#[derive(Default)]
pub struct ApproveAllJudge {
  pub calls: AtomicUsize,
}

#[async_trait]
impl VisionJudge for ApproveAllJudge {
  async fn compare(&self, _query_png: &[u8], _candidate_png: &[u8]) -> Result<bool> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(true)
  }
}

/// Judge that rejects candidates whose image decodes to the given width.
/// Width is the only channel a judge has to tell candidates apart, since it
/// only ever sees encoded bytes.
pub struct WidthRejectJudge {
  pub reject_width: u32,
}

#[async_trait]
impl VisionJudge for WidthRejectJudge {
  async fn compare(&self, _query_png: &[u8], candidate_png: &[u8]) -> Result<bool> {
    let image = image::load_from_memory(candidate_png)?;
    Ok(image.width() != self.reject_width)
  }
}

/// Judge that hangs forever on candidates of the given width and approves
/// the rest instantly. Drives the per-call timeout path.
pub struct WidthStallJudge {
  pub stall_width: u32,
}

#[async_trait]
impl VisionJudge for WidthStallJudge {
  async fn compare(&self, _query_png: &[u8], candidate_png: &[u8]) -> Result<bool> {
    let image = image::load_from_memory(candidate_png)?;
    if image.width() == self.stall_width {
      tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    Ok(true)
  }
}

/// Judge whose every call errors. Fail-open must keep all candidates.
pub struct BrokenJudge;

#[async_trait]
impl VisionJudge for BrokenJudge {
  async fn compare(&self, _query_png: &[u8], _candidate_png: &[u8]) -> Result<bool> {
    Err(anyhow!("screening backend unreachable"))
  }
}
