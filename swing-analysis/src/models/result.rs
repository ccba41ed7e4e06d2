use super::report::{AngleEntry, StabilityScore};
use serde::{Deserialize, Serialize};

pub const RESULT_VERSION: u32 = 1;

/// Keys every persisted result must carry
pub const REQUIRED_RESULT_KEYS: [&str; 8] = [
    "user_id",
    "openpose_skeleton_video_h264",
    "crop_video",
    "crop_csv",
    "embedding_timesformer",
    "embedding_stgcn",
    "mlp_result",
    "status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Success => "success",
            AnalysisStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(AnalysisStatus::Success),
            "error" => Some(AnalysisStatus::Error),
            _ => None,
        }
    }
}

/// Binary swing classification. All fields are null when the classifier
/// failed, with the reason in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub prob_true: Option<f64>,
    pub prob_false: Option<f64>,
    pub pred: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassifierOutput {
    pub fn from_probabilities(prob_false: f64, prob_true: f64, threshold: f64) -> Self {
        Self {
            prob_true: Some(prob_true),
            prob_false: Some(prob_false),
            pred: Some(u8::from(prob_true > threshold)),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            prob_true: None,
            prob_false: None,
            pred: None,
            error: Some(message.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Final record of a successful analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub user_id: Option<String>,
    #[serde(rename = "openpose_skeleton_video_h264")]
    pub overlay_video: String,
    pub crop_video: String,
    pub crop_csv: String,
    #[serde(rename = "embedding_timesformer")]
    pub appearance_embedding: String,
    #[serde(rename = "embedding_stgcn")]
    pub skeleton_embedding: String,
    #[serde(rename = "mlp_result")]
    pub classifier: ClassifierOutput,
    pub status: AnalysisStatus,
    pub result_version: u32,
    /// File name of the angle document, not a full path
    pub angle_json: Option<String>,
    pub skeleton_video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angles: Option<Vec<AngleEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub com_stability_scores: Vec<StabilityScore>,
    #[serde(
        rename = "mlp_error_detail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub classifier_error_detail: Option<String>,
}

/// Record persisted when a run fails before a result could be assembled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub status: AnalysisStatus,
    pub error: String,
    pub cmd_error: String,
    /// Pipeline stage that failed
    pub stage: String,
    pub traceback: String,
    pub user_id: Option<String>,
}
