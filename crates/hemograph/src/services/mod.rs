//! Collaborator boundaries: OCR, the remote vision judge, and the vector
//! index with its candidate image store. All of them are long-lived,
//! externally owned services injected at construction.

pub mod index;
pub mod ocr;
pub mod vision;
