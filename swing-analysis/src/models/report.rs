use super::angles::AngleRecord;
use super::com::{ComMovement, ComPoint};
use super::features::FeatureRow;
use serde::{Deserialize, Serialize};

/// Angle/COM document written next to every analyzed video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleReport {
    pub fps: u32,
    pub angles: Vec<AngleEntry>,
    pub com_movement: ComMovement,
    pub com_stability: Option<f64>,
    pub com_frames: Vec<ComFrame>,
    pub com_stability_scores: Vec<StabilityScore>,
}

/// One frame of the `angles` sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleEntry {
    pub frame: i64,
    #[serde(flatten)]
    pub angles: AngleRecord,
    pub com: ComPoint,
}

impl From<&FeatureRow> for AngleEntry {
    fn from(row: &FeatureRow) -> Self {
        Self {
            frame: row.frame,
            angles: row.angles,
            com: row.com,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComFrame {
    pub frame: i64,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl From<&FeatureRow> for ComFrame {
    fn from(row: &FeatureRow) -> Self {
        Self {
            frame: row.frame,
            x: row.com.x,
            y: row.com.y,
            z: row.com.z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityScore {
    pub frame: i64,
    pub score: Option<f64>,
}
