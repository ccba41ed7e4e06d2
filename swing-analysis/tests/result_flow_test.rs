/// Integration tests for result assembly and repair
///
/// Tests cover:
/// - Angle report, classifier and artifacts combined into a persisted record
/// - Soft classifier failure producing a success record
/// - The embed-angles repair of a record written without angle data
/// - Locating the newest result file
mod common;

use common::{init_test_logging, swinging_frame, write_keypoint_csv};
use ndarray::Array1;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use swing_analysis::config::{ClassifierConfig, ClassifierMode};
use swing_analysis::models::{ClassifierOutput, KeypointSchema};
use swing_analysis::services::json_store::read_json;
use swing_analysis::services::result_assembler::{
    angle_json_name, assemble_result, embed_angles, latest_result, persist_result, RunArtifacts,
};
use swing_analysis::services::{build_classifier, classify_soft, AngleReportService};
use tempfile::TempDir;

// Two inputs, one hidden unit per input, then two logits favoring the
// positive class when the first input is large
const HEAD: &str = r#"{
    "scaler": {"mean": [0.0, 0.0], "scale": [1.0, 1.0]},
    "layers": [
        {"weight": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0]},
        {"weight": [[-1.0, 0.0], [1.0, 0.0]], "bias": [0.0, 0.0]}
    ]
}"#;

struct Run {
    _root: TempDir,
    angle_dir: PathBuf,
    result_dir: PathBuf,
    artifacts: RunArtifacts,
    weights: PathBuf,
}

fn prepared_run() -> Run {
    let root = TempDir::new().unwrap();
    let angle_dir = root.path().join("angle");
    let result_dir = root.path().join("result");
    let embedding_dir = root.path().join("embedding");
    fs::create_dir_all(&result_dir).unwrap();
    fs::create_dir_all(&embedding_dir).unwrap();

    let crop_csv = root.path().join("swing_crop.csv");
    let frames: Vec<_> = (0..20).map(swinging_frame).collect();
    write_keypoint_csv(&crop_csv, KeypointSchema::Named, &frames);

    let skeleton_embedding = embedding_dir.join("swing_stgcn.npy");
    ndarray_npy::write_npy(&skeleton_embedding, &Array1::from(vec![3.0f32, 0.5])).unwrap();

    let weights = root.path().join("mlp_head.json");
    fs::write(&weights, HEAD).unwrap();

    let artifacts = RunArtifacts {
        overlay_video: root.path().join("skeleton_video/swing_crop_openpose_skeleton_h264.mp4"),
        crop_video: root.path().join("crop_video/swing_crop.mp4"),
        crop_csv,
        appearance_embedding: embedding_dir.join("swing_timesformer.npy"),
        skeleton_embedding,
        angle_json: None,
    };

    Run {
        _root: root,
        angle_dir,
        result_dir,
        artifacts,
        weights,
    }
}

fn mlp_config(weights: &Path) -> ClassifierConfig {
    ClassifierConfig {
        mode: ClassifierMode::Mlp,
        weights: weights.to_path_buf(),
        command: None,
    }
}

/// Test a complete success record built from real intermediate files
#[test]
fn test_success_record_round_trip() {
    init_test_logging();
    let mut run = prepared_run();

    let angle_path = run.angle_dir.join(angle_json_name("swing"));
    let report = AngleReportService::default()
        .generate(&run.artifacts.crop_csv, &angle_path, 30)
        .unwrap();
    run.artifacts.angle_json = Some(angle_path);

    let classifier = build_classifier(&mlp_config(&run.weights)).unwrap();
    let output = classify_soft(classifier.as_ref(), &run.artifacts.skeleton_embedding);
    assert_eq!(output.pred, Some(1));
    assert!(output.prob_true.unwrap() > 0.9);

    let record = assemble_result(
        Some("golfer-7".to_string()),
        &run.artifacts,
        output,
        Some(&report),
        &run.angle_dir,
    );
    let result_path = run.result_dir.join("result_swing.mp4.json");
    persist_result(&result_path, &record, None).unwrap();

    let saved: Value = read_json(&result_path).unwrap();
    assert_eq!(saved["status"], "success");
    assert_eq!(saved["user_id"], "golfer-7");
    assert_eq!(saved["angle_json"], "swing_angles.json");
    assert_eq!(saved["fps"], 30);
    assert_eq!(saved["angles"].as_array().unwrap().len(), 20);
    assert_eq!(saved["com_stability_scores"].as_array().unwrap().len(), 20);
    assert_eq!(saved["mlp_result"]["pred"], 1);
}

/// Test a broken model file still yields a valid success record
#[test]
fn test_classifier_failure_is_recorded() {
    let run = prepared_run();
    fs::write(&run.weights, "{\"layers\": []}").unwrap();

    let output = match build_classifier(&mlp_config(&run.weights)) {
        Ok(classifier) => classify_soft(classifier.as_ref(), &run.artifacts.skeleton_embedding),
        Err(e) => ClassifierOutput::failed(e.to_string()),
    };
    assert!(output.is_failure());

    let record = assemble_result(None, &run.artifacts, output, None, &run.angle_dir);
    let result_path = run.result_dir.join("result_swing.mp4.json");
    persist_result(&result_path, &record, None).unwrap();

    let saved: Value = read_json(&result_path).unwrap();
    assert_eq!(saved["status"], "success");
    assert!(saved["mlp_result"]["prob_true"].is_null());
    assert!(saved["mlp_result"]["pred"].is_null());
    assert!(saved["mlp_error_detail"].as_str().unwrap().contains("no layers"));
}

/// Test embed-angles fills a record that only references its angle file
#[test]
fn test_embed_angles_repairs_record() {
    let run = prepared_run();
    let angle_path = run.angle_dir.join(angle_json_name("swing"));
    AngleReportService::default()
        .generate(&run.artifacts.crop_csv, &angle_path, 60)
        .unwrap();

    // An angle document from an earlier run is picked up by name
    let record = assemble_result(
        None,
        &run.artifacts,
        ClassifierOutput::failed("skipped"),
        None,
        &run.angle_dir,
    );
    assert_eq!(record.angle_json.as_deref(), Some("swing_angles.json"));
    assert!(record.angles.is_none());

    let result_path = run.result_dir.join("result_swing.mp4.json");
    persist_result(&result_path, &record, None).unwrap();

    let summary = embed_angles(&result_path, &[run.angle_dir.clone()])
        .unwrap()
        .expect("record references an angle file");
    assert_eq!(summary.fps, Some(60));
    assert_eq!(summary.angle_count, 20);
    assert_eq!(summary.score_count, 20);
    assert_eq!(summary.angle_file, angle_path);

    let saved: Value = read_json(&result_path).unwrap();
    assert_eq!(saved["fps"], 60);
    assert_eq!(saved["angles"][0]["frame"], 0);

    assert_eq!(latest_result(&run.result_dir).unwrap(), Some(result_path));
}
