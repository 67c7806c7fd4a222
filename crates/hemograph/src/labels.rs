//! Printed concentration label recovery
//!
//! Lab printouts usually carry the measured A2% and F% as text near the
//! trace. Recovery is strictly best effort: a handful of candidate crops are
//! binarized, run through OCR, and pattern-matched. A missing label is
//! `None`, never an error, and must never fail the enclosing analysis.

use anyhow::Result;
use image::{DynamicImage, GrayImage};
use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::services::ocr::OcrEngine;

/// Neighborhood size for the adaptive binarization pass.
const BINARIZE_WINDOW: u32 = 35;
/// Offset subtracted from the local mean before thresholding.
const BINARIZE_OFFSET: f32 = 11.0;

// Explicit "A2 Concentration 3.4 %" phrasing first, bare "A2 3.4%" fallback;
// same two-stage scheme for F.
static A2_EXPLICIT: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)A2\s*Concentration[^0-9]*([0-9]+\.?[0-9]*)\s*%?").expect("valid A2 pattern")
});
static A2_BARE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)A2[^\d]*([0-9]+\.?[0-9]*)\s*%?").expect("valid A2 pattern"));
static F_EXPLICIT: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)F\s*Concentration[^0-9]*([0-9]+\.?[0-9]*)\s*%?").expect("valid F pattern")
});
static F_BARE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\bF[^\d]*([0-9]+\.?[0-9]*)\s*%?").expect("valid F pattern"));

/// Recovered printed concentrations, either of which may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConcentrationLabels {
  pub a2: Option<f32>,
  pub f: Option<f32>,
}

/// Recover printed A2/F concentrations from a chromatograph image.
pub fn read_labels(ocr: &dyn OcrEngine, image: &DynamicImage) -> ConcentrationLabels {
  let text = match collect_text(ocr, image) {
    Ok(text) => text,
    Err(error) => {
      quill::verbose!(&format!("label OCR failed: {error}"));
      return ConcentrationLabels::default();
    }
  };

  ConcentrationLabels {
    a2: match_concentration(&text, &A2_EXPLICIT, &A2_BARE),
    f: match_concentration(&text, &F_EXPLICIT, &F_BARE),
  }
}

/// OCR every candidate crop and concatenate the recognized text.
fn collect_text(ocr: &dyn OcrEngine, image: &DynamicImage) -> Result<String> {
  let mut texts = Vec::new();
  for crop in candidate_crops(image) {
    let binary = adaptive_binarize(&crop, BINARIZE_WINDOW, BINARIZE_OFFSET);
    texts.push(ocr.recognize(&binary)?);
  }
  Ok(texts.join("\n"))
}

/// Crops likely to contain the printed labels: the full image, the top 70%,
/// a middle band, and the band directly above the graph.
fn candidate_crops(image: &DynamicImage) -> Vec<GrayImage> {
  let gray = image.to_luma8();
  let (w, h) = gray.dimensions();

  let band = |x: u32, y: u32, width: u32, height: u32| -> GrayImage {
    image::imageops::crop_imm(&gray, x, y, width.max(1), height.max(1)).to_image()
  };

  vec![
    gray.clone(),
    band(0, 0, w, (h as f32 * 0.7) as u32),
    band(0, (h as f32 * 0.3) as u32, w, (h as f32 * 0.5) as u32),
    band(
      (w as f32 * 0.05) as u32,
      (h as f32 * 0.45) as u32,
      (w as f32 * 0.9) as u32,
      (h as f32 * 0.3) as u32,
    ),
  ]
}

fn match_concentration(text: &str, explicit: &Regex, bare: &Regex) -> Option<f32> {
  let captures = explicit.captures(text).or_else(|| bare.captures(text))?;
  captures.get(1)?.as_str().parse().ok()
}

/// Local-mean threshold binarization: a pixel survives when it is brighter
/// than its neighborhood mean minus the offset. Lifts faint label text out
/// of uneven backgrounds before recognition.
pub fn adaptive_binarize(gray: &GrayImage, window: u32, offset: f32) -> GrayImage {
  let (width, height) = gray.dimensions();
  if width == 0 || height == 0 {
    return gray.clone();
  }

  // Summed-area table, one row/column of zero padding
  let mut integral = Array2::<f64>::zeros((height as usize + 1, width as usize + 1));
  for y in 0..height as usize {
    let mut row_sum = 0.0;
    for x in 0..width as usize {
      row_sum += f64::from(gray.get_pixel(x as u32, y as u32)[0]);
      integral[[y + 1, x + 1]] = integral[[y, x + 1]] + row_sum;
    }
  }

  let radius = (window / 2) as i64;
  let mut out = GrayImage::new(width, height);
  for y in 0..height as i64 {
    for x in 0..width as i64 {
      let x0 = (x - radius).max(0) as usize;
      let y0 = (y - radius).max(0) as usize;
      let x1 = ((x + radius).min(width as i64 - 1) + 1) as usize;
      let y1 = ((y + radius).min(height as i64 - 1) + 1) as usize;

      let sum =
        integral[[y1, x1]] - integral[[y0, x1]] - integral[[y1, x0]] + integral[[y0, x0]];
      let count = ((x1 - x0) * (y1 - y0)) as f64;
      let mean = (sum / count) as f32;

      let pixel = f32::from(gray.get_pixel(x as u32, y as u32)[0]);
      let value = if pixel > mean - offset { 255u8 } else { 0u8 };
      out.put_pixel(x as u32, y as u32, image::Luma([value]));
    }
  }
  out
}
