//! Input-failure errors for the analysis pipeline
//!
//! Only unreadable or malformed inputs abort a request. Every other failure
//! class (per-candidate extraction, label recovery, external screening) is
//! absorbed locally by the component that hit it.

use thiserror::Error;

/// Errors raised while turning an image into a feature record.
#[derive(Debug, Error)]
pub enum AnalysisError {
  #[error("region of interest is empty ({width}x{height})")]
  EmptyRegion { width: u32, height: u32 },

  #[error("signal profile has no samples")]
  EmptySignal,
}
