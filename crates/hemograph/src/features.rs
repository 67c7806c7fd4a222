//! Feature extraction pipeline
//!
//! Turns a chromatograph image into a self-contained, comparable
//! `FeatureRecord`: crop to the graph region, collapse to a signal profile,
//! run the adaptive detection ladder, gather intensity statistics, and
//! best-effort recover the printed concentrations. Records are computed
//! fresh per request and never shared mutably.

use std::sync::Arc;

use image::{imageops, DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::labels;
use crate::peaks::{AdaptivePeakDetector, DetectionMode, PeakSet};
use crate::services::ocr::OcrEngine;
use crate::signal;

/// Header band inspected when classifying the source instrument.
const HEADER_HEIGHT: u32 = 250;
/// Full-page crop: bottom fraction start for Bio-Rad style reports.
const PAGE_CROP_TOP: f32 = 0.4;
/// Full-page crop: vertical band for Sebia style reports.
const SEBIA_CROP_TOP: f32 = 0.15;
const SEBIA_CROP_BOTTOM: f32 = 0.85;

/// Instrument family that produced a printout, recovered from header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
  BioRad,
  Sebia,
  Unknown,
}

impl SystemType {
  /// Classify recognized header text by instrument keywords.
  pub fn from_header_text(text: &str) -> Self {
    let text = text.to_uppercase();
    if text.contains("BIO-RAD") || text.contains("BIORAD") || text.contains("CDM") {
      SystemType::BioRad
    } else if text.contains("SEBIA") || text.contains("CAPILLARYS") || text.contains("CAPILLARY") {
      SystemType::Sebia
    } else {
      SystemType::Unknown
    }
  }
}

/// Quantitative fingerprint of one chromatograph image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
  pub peaks: PeakSet,
  /// Peak positions divided by the profile length, each in [0, 1].
  pub normalized_positions: Vec<f32>,
  pub total_intensity: f32,
  pub mean_intensity: f32,
  pub std_intensity: f32,
  pub detection_mode: DetectionMode,
  pub a2_concentration: Option<f32>,
  pub f_concentration: Option<f32>,
  pub system_type: SystemType,
}

impl FeatureRecord {
  pub fn peak_count(&self) -> usize {
    self.peaks.len()
  }

  /// Peak heights in position order.
  pub fn heights(&self) -> Vec<f32> {
    self.peaks.iter().map(|peak| peak.height).collect()
  }
}

/// Analysis front door: owns the OCR collaborator and the detection ladder.
pub struct ChromatographAnalyzer {
  ocr: Arc<dyn OcrEngine>,
  config: AnalyzerConfig,
  detector: AdaptivePeakDetector,
}

impl ChromatographAnalyzer {
  pub fn new(ocr: Arc<dyn OcrEngine>, config: AnalyzerConfig) -> Self {
    let detector = AdaptivePeakDetector::new(config.min_peaks);
    Self { ocr, config, detector }
  }

  /// Crop a full-page scan down to the chromatograph; pass already-cropped
  /// images through untouched.
  pub fn prepare(&self, image: &DynamicImage) -> DynamicImage {
    if image.height() > self.config.full_page_height {
      self.crop_chromatograph(image)
    } else {
      image.clone()
    }
  }

  /// Analyze a chromatograph image into a feature record.
  ///
  /// Only unreadable input aborts; label recovery and instrument detection
  /// degrade to `None` / `Unknown` on their own failures.
  pub fn analyze(&self, image: &DynamicImage) -> Result<FeatureRecord, AnalysisError> {
    let system_type = self.detect_system_type(image);

    let gray = image.to_luma8();
    let graph = graph_region(&gray, self.config.graph_region_fraction);
    let matrix = signal::intensity_matrix(&graph)?;
    let base = signal::extract_profile(&matrix, self.config.smoothing_sigma)?;

    let detection = self.detector.detect(&matrix, &base)?;

    let samples = base.samples();
    let total_intensity: f32 = samples.iter().sum();
    let mean_intensity = total_intensity / samples.len() as f32;
    let variance = samples.iter().map(|v| (v - mean_intensity).powi(2)).sum::<f32>()
      / samples.len() as f32;

    let concentrations = labels::read_labels(self.ocr.as_ref(), image);

    let length = samples.len() as f32;
    let normalized_positions =
      detection.peaks.iter().map(|peak| peak.position as f32 / length).collect();

    Ok(FeatureRecord {
      peaks: detection.peaks,
      normalized_positions,
      total_intensity,
      mean_intensity,
      std_intensity: variance.sqrt(),
      detection_mode: detection.mode,
      a2_concentration: concentrations.a2,
      f_concentration: concentrations.f,
      system_type,
    })
  }

  /// Classify the source instrument from the printout header. Best effort:
  /// OCR failure means `Unknown`.
  pub fn detect_system_type(&self, image: &DynamicImage) -> SystemType {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
      return SystemType::Unknown;
    }
    let header = imageops::crop_imm(&gray, 0, 0, width, height.min(HEADER_HEIGHT)).to_image();
    match self.ocr.recognize(&header) {
      Ok(text) => SystemType::from_header_text(&text),
      Err(error) => {
        quill::verbose!(&format!("header OCR failed: {error}"));
        SystemType::Unknown
      }
    }
  }

  /// Cut a full page down to the chromatograph region using the instrument
  /// family's layout: Sebia prints the trace mid-page, Bio-Rad (and unknown)
  /// at the bottom.
  pub fn crop_chromatograph(&self, image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let (top, bottom) = match self.detect_system_type(image) {
      SystemType::Sebia => {
        ((height as f32 * SEBIA_CROP_TOP) as u32, (height as f32 * SEBIA_CROP_BOTTOM) as u32)
      }
      SystemType::BioRad | SystemType::Unknown => {
        ((height as f32 * PAGE_CROP_TOP) as u32, height)
      }
    };
    image.crop_imm(0, top, width, bottom.saturating_sub(top).max(1))
  }
}

/// Bottom fraction of the chromatograph that holds the actual trace.
fn graph_region(gray: &GrayImage, fraction: f32) -> GrayImage {
  let (width, height) = gray.dimensions();
  let top = (height as f32 * (1.0 - fraction.clamp(0.0, 1.0))) as u32;
  imageops::crop_imm(gray, 0, top.min(height.saturating_sub(1)), width, (height - top).max(1))
    .to_image()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::ocr::NullOcr;
  use anyhow::Result;
  use image::Luma;

  /// Chromatograph-like synthetic scan: dark Gaussian bumps drawn as columns
  /// on a light page.
  fn synthetic_chromatograph(width: u32, height: u32, bumps: &[(f32, f32, f32)]) -> DynamicImage {
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

  struct HeaderOcr(&'static str);

  impl OcrEngine for HeaderOcr {
    fn recognize(&self, _image: &GrayImage) -> Result<String> {
      Ok(self.0.to_string())
    }
  }

  fn analyzer() -> ChromatographAnalyzer {
    ChromatographAnalyzer::new(Arc::new(NullOcr), AnalyzerConfig::default())
  }

  #[test]
  fn analysis_finds_drawn_peaks() {
    let image =
      synthetic_chromatograph(600, 200, &[(0.2, 0.9, 10.0), (0.5, 0.6, 10.0), (0.8, 0.4, 10.0)]);
    let record = analyzer().analyze(&image).unwrap();

    assert_eq!(record.peak_count(), 3);
    assert_eq!(record.detection_mode, DetectionMode::Strict);
    for pair in record.peaks.windows(2) {
      assert!(pair[0].position < pair[1].position);
    }
    for &position in &record.normalized_positions {
      assert!((0.0..=1.0).contains(&position));
    }
  }

  #[test]
  fn analysis_is_idempotent() {
    let image = synthetic_chromatograph(500, 150, &[(0.3, 0.8, 8.0), (0.7, 0.5, 8.0)]);
    let analyzer = analyzer();
    let first = analyzer.analyze(&image).unwrap();
    let second = analyzer.analyze(&image).unwrap();
    assert_eq!(first.peaks, second.peaks);
    assert_eq!(first.detection_mode, second.detection_mode);
    assert_eq!(first.mean_intensity, second.mean_intensity);
  }

  #[test]
  fn intensity_statistics_are_unit_scaled() {
    let image = synthetic_chromatograph(400, 120, &[(0.5, 0.9, 12.0)]);
    let record = analyzer().analyze(&image).unwrap();
    assert!((0.0..=1.0).contains(&record.mean_intensity));
    assert!(record.std_intensity >= 0.0);
    assert!(record.total_intensity >= record.mean_intensity);
  }

  #[test]
  fn empty_image_is_an_input_failure() {
    let image = DynamicImage::new_luma8(0, 0);
    assert!(analyzer().analyze(&image).is_err());
  }

  #[test]
  fn system_type_classifies_known_headers() {
    assert_eq!(SystemType::from_header_text("BIO-RAD CDM System"), SystemType::BioRad);
    assert_eq!(SystemType::from_header_text("sebia capillarys 2"), SystemType::Sebia);
    assert_eq!(SystemType::from_header_text("something else"), SystemType::Unknown);
  }

  #[test]
  fn sebia_pages_crop_to_the_middle_band() {
    let analyzer =
      ChromatographAnalyzer::new(Arc::new(HeaderOcr("SEBIA CAPILLARYS")), AnalyzerConfig::default());
    let page = DynamicImage::new_luma8(400, 1000);
    let cropped = analyzer.prepare(&page);
    assert_eq!(cropped.height(), 700);
  }

  #[test]
  fn unknown_pages_crop_to_the_bottom() {
    let page = DynamicImage::new_luma8(400, 1000);
    let cropped = analyzer().prepare(&page);
    assert_eq!(cropped.height(), 600);
  }

  #[test]
  fn small_images_pass_through_unscaled() {
    let image = DynamicImage::new_luma8(400, 300);
    let prepared = analyzer().prepare(&image);
    assert_eq!((prepared.width(), prepared.height()), (400, 300));
  }

  #[test]
  fn records_round_trip_through_serde() {
    let image = synthetic_chromatograph(500, 150, &[(0.3, 0.8, 8.0), (0.7, 0.5, 8.0)]);
    let record = analyzer().analyze(&image).unwrap();
    let json = serde_json::to_string(&record).unwrap();
    let back: FeatureRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back.peak_count(), record.peak_count());
    assert_eq!(back.detection_mode, record.detection_mode);
  }
}
