/// Integration tests for the angle report
///
/// Tests cover:
/// - Named pixel CSV with a run of dropped frames
/// - Linear interpolation of angle features across the gap
/// - Stability scores reported for recorded frames only
/// - Indexed normalized CSV with depth
/// - Imputation ahead of overlay rendering
mod common;

use common::{init_test_logging, swinging_frame, write_keypoint_csv, CsvFrame};
use pretty_assertions::assert_eq;
use serde_json::Value;
use swing_analysis::config::ThresholdConfig;
use swing_analysis::models::{CoordinateSpace, Joint, KeypointSchema};
use swing_analysis::services::imputation::impute_missing;
use swing_analysis::services::{load_keypoint_table, AngleReportService};
use tempfile::TempDir;

fn gapped_swing() -> Vec<CsvFrame> {
    (0..60)
        .filter(|f| !(10..=15).contains(f))
        .map(swinging_frame)
        .collect()
}

/// Test a full report over a 60-frame swing with frames 10-15 missing
#[test]
fn test_report_fills_dropped_frames() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("swing_crop.csv");
    let json_path = dir.path().join("angle").join("swing_angles.json");
    write_keypoint_csv(&csv_path, KeypointSchema::Named, &gapped_swing());

    let report = AngleReportService::default()
        .generate(&csv_path, &json_path, 30)
        .expect("report should be generated");

    assert_eq!(report.fps, 30);
    assert_eq!(report.angles.len(), 60);
    let frames: Vec<i64> = report.angles.iter().map(|a| a.frame).collect();
    assert_eq!(frames, (0..60).collect::<Vec<_>>());

    for entry in &report.angles {
        let expected = 90.0 + 0.5 * entry.frame as f64;
        let actual = entry.angles.left_elbow_flexion.unwrap();
        assert!(
            (actual - expected).abs() < 1e-6,
            "frame {}: expected {}, got {}",
            entry.frame,
            expected,
            actual
        );
    }

    // Scores come from the recorded frames only
    assert_eq!(report.com_stability_scores.len(), 54);
    assert!(report.com_stability_scores.iter().all(|s| !(10..=15).contains(&s.frame)));

    // The body does not move, so the COM is perfectly stable
    assert!(report.com_movement.stable);
    assert!(report.com_stability.unwrap() < 1e-9);
    assert_eq!(report.com_frames.len(), 60);
    assert!(report.com_frames.iter().all(|c| c.z.is_none()));
}

/// Test frames 10-15 present as rows with every joint zeroed out
#[test]
fn test_report_fills_zeroed_rows() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("swing_crop.csv");
    let json_path = dir.path().join("swing_angles.json");
    let frames: Vec<CsvFrame> = (0..60)
        .map(|f| {
            if (10..=15).contains(&f) {
                CsvFrame::new(f)
            } else {
                swinging_frame(f)
            }
        })
        .collect();
    write_keypoint_csv(&csv_path, KeypointSchema::Named, &frames);

    let report = AngleReportService::default()
        .generate(&csv_path, &json_path, 30)
        .unwrap();

    assert_eq!(report.angles.len(), 60);
    let elbow = |f: usize| report.angles[f].angles.left_elbow_flexion.unwrap();
    let (start, end) = (elbow(9), elbow(16));
    assert!((start - 94.5).abs() < 1e-6);
    assert!((end - 98.0).abs() < 1e-6);
    for f in 10..=15 {
        let expected = start + (end - start) * (f - 9) as f64 / 7.0;
        assert!((elbow(f) - expected).abs() < 1e-6, "frame {}", f);
    }

    // Zeroed rows are still recorded frames, with no COM to score
    assert_eq!(report.com_stability_scores.len(), 60);
    for score in &report.com_stability_scores {
        if (10..=15).contains(&score.frame) {
            assert!(score.score.is_none(), "frame {}", score.frame);
        } else {
            assert!(score.score.is_some(), "frame {}", score.frame);
        }
    }
}

/// Test the document on disk carries exactly the expected keys
#[test]
fn test_report_document_layout() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("swing_crop.csv");
    let json_path = dir.path().join("swing_angles.json");
    write_keypoint_csv(&csv_path, KeypointSchema::Named, &gapped_swing());

    AngleReportService::default()
        .generate(&csv_path, &json_path, 24)
        .unwrap();

    let document: Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    let mut keys: Vec<&str> = document.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "angles",
            "com_frames",
            "com_movement",
            "com_stability",
            "com_stability_scores",
            "fps",
        ]
    );
    assert_eq!(document["fps"], 24);
    assert!(document["com_movement"]["range"]["x_range"].is_number());
    assert!(document["com_movement"]["range"]["z_range"].is_null());
    assert!(document["angles"][12]["left_hip_flexion"].is_null());
}

/// Test an indexed normalized table with depth computes hip flexion in 3D
#[test]
fn test_indexed_depth_table() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("indexed.csv");

    let schema = KeypointSchema::Indexed { has_depth: true };
    let headers = schema.headers();
    let mut row = vec!["0".to_string(); headers.len()];
    let mut set = |column: String, value: f64| {
        let i = headers.iter().position(|h| *h == column).unwrap();
        row[i] = value.to_string();
    };
    for (joint, x, y, z) in [
        (Joint::LShoulder, 0.40, 0.30, 0.0),
        (Joint::LHip, 0.40, 0.50, 0.0),
        (Joint::LKnee, 0.40, 0.50, 0.2),
    ] {
        set(schema.x_column(joint), x);
        set(schema.y_column(joint), y);
        set(schema.confidence_column(joint), 0.9);
        set(schema.z_column(joint).unwrap(), z);
    }
    let mut content = headers.join(",");
    content.push('\n');
    content.push_str(&row.join(","));
    content.push('\n');
    std::fs::write(&csv_path, content).unwrap();

    let table = load_keypoint_table(&csv_path, 0.01).unwrap();
    assert_eq!(table.schema, KeypointSchema::Indexed { has_depth: true });
    assert_eq!(table.space, CoordinateSpace::Normalized);

    let report = AngleReportService::new(&ThresholdConfig::default()).build(&table, 30);
    let hip = report.angles[0].angles.left_hip_flexion.unwrap();
    // Shoulder straight up the y axis, knee straight out along z
    assert!((hip - 90.0).abs() < 1e-9);
    assert!(report.angles[0].angles.left_knee_flexion.is_none());
}

/// Test imputation fills a joint that drops out between detections
#[test]
fn test_imputation_bridges_missing_joint() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("imputed.csv");
    let frames = vec![
        CsvFrame::new(0).with(Joint::RWrist, 100.0, 200.0),
        CsvFrame::new(1).with_confidence(Joint::RWrist, 150.0, 250.0, 0.0),
        CsvFrame::new(2),
        CsvFrame::new(3).with(Joint::RWrist, 160.0, 260.0),
    ];
    write_keypoint_csv(&csv_path, KeypointSchema::Named, &frames);

    let table = load_keypoint_table(&csv_path, 0.01).unwrap();
    assert!(table.frames[1].get(Joint::RWrist).is_none());
    assert!(table.frames[2].get(Joint::RWrist).is_none());

    let imputed = impute_missing(&table);
    let wrist = |i: usize| imputed.frames[i].get(Joint::RWrist).map(|kp| kp.xy());
    assert_eq!(wrist(0), Some([100.0, 200.0]));
    assert_eq!(wrist(1), Some([120.0, 220.0]));
    assert_eq!(wrist(2), Some([140.0, 240.0]));
    assert_eq!(wrist(3), Some([160.0, 260.0]));
    // Joints never seen stay absent
    assert!(imputed.frames[1].get(Joint::Nose).is_none());
}
