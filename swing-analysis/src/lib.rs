//! Golf swing analysis.
//!
//! Turns raw per-frame keypoint detections into joint angles, center-of-mass
//! stability metrics and an annotated overlay video, and orchestrates the
//! external detector, embedding extractors and classifier for a full run.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::{AnalysisError, AnalysisResult};
