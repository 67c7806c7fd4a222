//! Hemograph - clinical chromatograph similarity engine
//!
//! Turns a hemoglobin chromatograph image into a quantitative peak
//! fingerprint and ranks stored records against it by fusing visual-embedding
//! similarity with a peak-based clinical similarity score.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod labels;
pub mod peaks;
pub mod ranker;
pub mod services;
pub mod signal;
pub mod similarity;
