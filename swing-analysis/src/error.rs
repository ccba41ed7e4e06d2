use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the swing analysis stages.
///
/// Geometry and statistics never produce an error for degenerate input;
/// those cases surface as `None` values instead.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unsupported keypoint table layout: {0}")]
    Schema(String),

    #[error("{step} reported success but did not produce {}", .path.display())]
    MissingArtifact { step: String, path: PathBuf },

    #[error("{step} failed with exit code {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    ExternalProcess {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("No valid person detected in {0}")]
    NoPersonDetected(String),

    #[error("Invalid crop region: {0}")]
    InvalidCrop(String),

    #[error("Video error: {0}")]
    Video(String),

    #[error("Invalid result record: {0}")]
    InvalidResult(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn missing_artifact(step: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        AnalysisError::MissingArtifact {
            step: step.into(),
            path: path.into(),
        }
    }

    /// Soft errors are recorded in the result instead of aborting the run.
    pub fn is_soft(&self) -> bool {
        matches!(self, AnalysisError::Classifier(_))
    }
}
