//! Region-of-interest image to 1-D intensity profile conversion
//!
//! A chromatograph trace is a curve over horizontal position, so the graph
//! region collapses naturally to one intensity sample per column. The profile
//! is smoothed to suppress pixel noise and normalized against its own
//! dynamic range so peak heights are comparable across scans.

use image::GrayImage;
use ndarray::Array2;

use crate::error::AnalysisError;

/// Default Gaussian spread for profile smoothing, in samples.
pub const DEFAULT_SMOOTHING_SIGMA: f32 = 2.0;

/// Smoothing kernels are truncated at this many standard deviations.
const GAUSSIAN_TRUNCATE: f32 = 4.0;

/// Midpoint of the 8-bit dynamic range; above it the background is light.
const LIGHT_BACKGROUND_MEAN: f32 = 127.5;

/// Normalized 1-D intensity curve extracted from a chromatograph region.
///
/// Samples live in [0, 1] (min-subtracted, max-divided); the index is the
/// horizontal pixel position. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalProfile {
  samples: Vec<f32>,
}

impl SignalProfile {
  pub fn samples(&self) -> &[f32] {
    &self.samples
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }
}

/// Convert a grayscale region into a row-major intensity matrix with peaks
/// as positive excursions. Light-background scans (dark trace on white
/// paper) are inverted so the trace carries the signal.
pub fn intensity_matrix(region: &GrayImage) -> Result<Array2<f32>, AnalysisError> {
  let (width, height) = region.dimensions();
  if width == 0 || height == 0 {
    return Err(AnalysisError::EmptyRegion { width, height });
  }

  let mut matrix = Array2::<f32>::zeros((height as usize, width as usize));
  for (x, y, pixel) in region.enumerate_pixels() {
    matrix[[y as usize, x as usize]] = f32::from(pixel[0]);
  }

  let mean = matrix.mean().unwrap_or(0.0);
  if mean > LIGHT_BACKGROUND_MEAN {
    matrix.mapv_inplace(|v| 255.0 - v);
  }

  Ok(matrix)
}

/// Collapse an intensity matrix to one sample per column, smooth with a
/// Gaussian of the given spread, and normalize to [0, 1].
pub fn extract_profile(matrix: &Array2<f32>, sigma: f32) -> Result<SignalProfile, AnalysisError> {
  if matrix.ncols() == 0 || matrix.nrows() == 0 {
    return Err(AnalysisError::EmptySignal);
  }

  let rows = matrix.nrows() as f32;
  let collapsed: Vec<f32> = matrix.columns().into_iter().map(|column| column.sum() / rows).collect();

  let smoothed = gaussian_smooth(&collapsed, sigma);
  Ok(SignalProfile { samples: normalize(smoothed) })
}

/// 1-D Gaussian convolution with reflected boundaries.
fn gaussian_smooth(samples: &[f32], sigma: f32) -> Vec<f32> {
  if sigma <= 0.0 || samples.len() < 2 {
    return samples.to_vec();
  }

  let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
  let kernel = gaussian_kernel(sigma, radius);

  let n = samples.len();
  let mut smoothed = Vec::with_capacity(n);
  for i in 0..n as isize {
    let mut acc = 0.0;
    for (k, weight) in kernel.iter().enumerate() {
      let offset = k as isize - radius;
      acc += weight * samples[reflect(i + offset, n)];
    }
    smoothed.push(acc);
  }
  smoothed
}

fn gaussian_kernel(sigma: f32, radius: isize) -> Vec<f32> {
  let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
  for offset in -radius..=radius {
    let x = offset as f32 / sigma;
    kernel.push((-0.5 * x * x).exp());
  }
  let sum: f32 = kernel.iter().sum();
  for weight in kernel.iter_mut() {
    *weight /= sum;
  }
  kernel
}

/// Mirror an out-of-range index back into [0, len).
fn reflect(mut index: isize, len: usize) -> usize {
  let len = len as isize;
  loop {
    if index < 0 {
      index = -index - 1;
    } else if index >= len {
      index = 2 * len - 1 - index;
    } else {
      return index as usize;
    }
  }
}

/// Min-subtract and max-divide so the curve spans its own dynamic range.
fn normalize(mut samples: Vec<f32>) -> Vec<f32> {
  let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
  let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let range = (max - min) + 1e-6;
  for sample in samples.iter_mut() {
    *sample = (*sample - min) / range;
  }
  samples
}
