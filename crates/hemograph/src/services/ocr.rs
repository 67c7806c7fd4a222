//! Text recognition collaborator boundary

use anyhow::Result;
use image::GrayImage;

/// Text recognition over an image region.
///
/// Implementations must tolerate garbage input: an empty string is always an
/// acceptable answer. Callers treat recognized text as a best-effort
/// auxiliary signal, never as ground truth.
pub trait OcrEngine: Send + Sync {
  fn recognize(&self, image: &GrayImage) -> Result<String>;
}

/// Backend that recognizes nothing. Used when no OCR engine is wired in;
/// label recovery and system-type detection then degrade gracefully.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOcr;

impl OcrEngine for NullOcr {
  fn recognize(&self, _image: &GrayImage) -> Result<String> {
    Ok(String::new())
  }
}
