#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Once;
use swing_analysis::models::{Joint, KeypointSchema};

static INIT: Once = Once::new();

/// Initialize test logging
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .init();
    });
}

/// One CSV row: frame index plus the detected joints as (joint, x, y, confidence)
pub struct CsvFrame {
    pub frame: i64,
    pub joints: Vec<(Joint, f64, f64, f64)>,
}

impl CsvFrame {
    pub fn new(frame: i64) -> Self {
        Self {
            frame,
            joints: Vec::new(),
        }
    }

    pub fn with(mut self, joint: Joint, x: f64, y: f64) -> Self {
        self.joints.push((joint, x, y, 0.9));
        self
    }

    pub fn with_confidence(mut self, joint: Joint, x: f64, y: f64, confidence: f64) -> Self {
        self.joints.push((joint, x, y, confidence));
        self
    }
}

/// Write a keypoint CSV in `schema`'s layout with a leading `frame` column.
/// Joints not listed in a row are written as `0,0,0`.
pub fn write_keypoint_csv(path: &Path, schema: KeypointSchema, frames: &[CsvFrame]) {
    let headers = schema.headers();
    let mut out = String::from("frame,");
    out.push_str(&headers.join(","));
    out.push('\n');

    for frame in frames {
        let mut cells = vec!["0".to_string(); headers.len()];
        for (joint, x, y, confidence) in &frame.joints {
            let position = |column: String| headers.iter().position(|h| *h == column).unwrap();
            cells[position(schema.x_column(*joint))] = x.to_string();
            cells[position(schema.y_column(*joint))] = y.to_string();
            cells[position(schema.confidence_column(*joint))] = confidence.to_string();
        }
        out.push_str(&frame.frame.to_string());
        out.push(',');
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    fs::write(path, out).unwrap();
}

/// A standing golfer in pixel coordinates whose left elbow opens by half a
/// degree per frame, starting at 90 degrees
pub fn swinging_frame(frame: i64) -> CsvFrame {
    let theta = (90.0 + 0.5 * frame as f64).to_radians();
    let (elbow_x, elbow_y) = (300.0, 400.0);

    CsvFrame::new(frame)
        .with(Joint::Nose, 320.0, 200.0)
        .with(Joint::LShoulder, elbow_x, 300.0)
        .with(Joint::RShoulder, 360.0, 300.0)
        .with(Joint::LElbow, elbow_x, elbow_y)
        .with(
            Joint::LWrist,
            elbow_x + 100.0 * theta.sin(),
            elbow_y - 100.0 * theta.cos(),
        )
        .with(Joint::RElbow, 370.0, 400.0)
        .with(Joint::RWrist, 380.0, 480.0)
        .with(Joint::LHip, 310.0, 500.0)
        .with(Joint::RHip, 350.0, 500.0)
        .with(Joint::LKnee, 305.0, 600.0)
        .with(Joint::RKnee, 355.0, 600.0)
        .with(Joint::LAnkle, 300.0, 700.0)
        .with(Joint::RAnkle, 360.0, 700.0)
}
