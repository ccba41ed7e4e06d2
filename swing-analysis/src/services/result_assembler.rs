/// Result Assembler
///
/// Builds the record persisted for every analyzed video:
/// - Success records combining artifact paths, angle data and classifier output
/// - Error records with the failing stage and the error chain
/// - Validation against the result schema before anything is written
/// - The `embed-angles` repair of an already persisted record
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::report::AngleReport;
use crate::models::result::{
    AnalysisStatus, ClassifierOutput, ErrorRecord, ResultRecord, REQUIRED_RESULT_KEYS,
    RESULT_VERSION,
};
use crate::services::json_store::{read_json, write_json_atomic};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Paths produced by a successful run
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    pub overlay_video: PathBuf,
    pub crop_video: PathBuf,
    pub crop_csv: PathBuf,
    pub appearance_embedding: PathBuf,
    pub skeleton_embedding: PathBuf,
    /// Angle document, when the angle stage succeeded
    pub angle_json: Option<PathBuf>,
}

/// Name of the angle document for a video basename
pub fn angle_json_name(basename: &str) -> String {
    format!("{}_angles.json", basename)
}

pub fn assemble_result(
    user_id: Option<String>,
    artifacts: &RunArtifacts,
    classifier: ClassifierOutput,
    report: Option<&AngleReport>,
    angle_dir: &Path,
) -> ResultRecord {
    let angle_json = match &artifacts.angle_json {
        Some(path) => Some(file_name(path)),
        None => {
            // A document from an earlier run may still sit in the angle folder
            let stem = file_stem(&artifacts.crop_video);
            let basename = stem.strip_suffix("_crop").unwrap_or(&stem);
            let candidate = angle_dir.join(angle_json_name(basename));
            candidate.exists().then(|| file_name(&candidate))
        }
    };

    let classifier_error_detail = classifier.error.clone();

    ResultRecord {
        user_id,
        overlay_video: display(&artifacts.overlay_video),
        crop_video: display(&artifacts.crop_video),
        crop_csv: display(&artifacts.crop_csv),
        appearance_embedding: display(&artifacts.appearance_embedding),
        skeleton_embedding: display(&artifacts.skeleton_embedding),
        classifier,
        status: AnalysisStatus::Success,
        result_version: RESULT_VERSION,
        angle_json,
        skeleton_video: None,
        angles: report.map(|r| r.angles.clone()),
        fps: report.map(|r| r.fps),
        com_stability_scores: report
            .map(|r| r.com_stability_scores.clone())
            .unwrap_or_default(),
        classifier_error_detail,
    }
}

/// Error record for a run that failed at `stage`
pub fn error_record(error: &anyhow::Error, stage: &str, user_id: Option<String>) -> ErrorRecord {
    ErrorRecord {
        status: AnalysisStatus::Error,
        error: error.to_string(),
        cmd_error: format!("{:#}", error),
        stage: stage.to_string(),
        traceback: format!("{:?}", error),
        user_id,
    }
}

/// Check a serialized record before it is persisted.
///
/// When `schema` points to an existing JSON schema file its `required`
/// keys and `status` enum are enforced; otherwise the built-in key list and
/// status values are.
pub fn validate_result(value: &Value, schema: Option<&Path>) -> AnalysisResult<()> {
    let object = value
        .as_object()
        .ok_or_else(|| AnalysisError::InvalidResult("result is not a JSON object".to_string()))?;

    let (required, statuses) = match schema.filter(|p| p.exists()) {
        Some(path) => {
            debug!("Validating result against {:?}", path);
            schema_rules(&read_json(path)?)
        }
        None => (
            REQUIRED_RESULT_KEYS.iter().map(|k| k.to_string()).collect(),
            vec![
                AnalysisStatus::Success.as_str().to_string(),
                AnalysisStatus::Error.as_str().to_string(),
            ],
        ),
    };

    if let Some(key) = required.iter().find(|k| !object.contains_key(k.as_str())) {
        return Err(AnalysisError::InvalidResult(format!(
            "result missing required key: {}",
            key
        )));
    }

    let status = object.get("status").and_then(Value::as_str);
    if !statuses.is_empty() && !status.is_some_and(|s| statuses.iter().any(|v| v == s)) {
        return Err(AnalysisError::InvalidResult(format!(
            "invalid status {:?}; must be one of {}",
            status,
            statuses.join(", ")
        )));
    }
    Ok(())
}

fn schema_rules(schema: &Value) -> (Vec<String>, Vec<String>) {
    let strings = |v: Option<&Value>| -> Vec<String> {
        v.and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    (
        strings(schema.get("required")),
        strings(schema.pointer("/properties/status/enum")),
    )
}

/// Validate then write atomically
pub fn persist_result<T: Serialize>(
    path: &Path,
    record: &T,
    schema: Option<&Path>,
) -> AnalysisResult<()> {
    let value = serde_json::to_value(record)?;
    validate_result(&value, schema)?;
    write_json_atomic(path, &value)?;
    info!("Saved result {:?}", path);
    Ok(())
}

/// What `embed_angles` copied into a record
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedSummary {
    pub angle_file: PathBuf,
    pub fps: Option<u64>,
    pub angle_count: usize,
    pub score_count: usize,
}

/// Copy `fps`, `angles` and `com_stability_scores` from the angle document a
/// persisted result references. The document is looked up as stored, then
/// by file name in the result's directory and each of `angle_dirs`.
///
/// Returns `None` when the record references no angle document.
pub fn embed_angles(result_path: &Path, angle_dirs: &[PathBuf]) -> AnalysisResult<Option<EmbedSummary>> {
    let mut record: Value = read_json(result_path)?;
    let Some(reference) = record.get("angle_json").and_then(Value::as_str).map(PathBuf::from) else {
        info!("No angle_json field in {:?}; nothing to do", result_path);
        return Ok(None);
    };

    let angle_file = locate_angle_file(&reference, result_path, angle_dirs).ok_or_else(|| {
        AnalysisError::missing_artifact("embed-angles", reference.clone())
    })?;
    let angle_data: Value = read_json(&angle_file)?;

    let field = |name: &str| angle_data.get(name).cloned().unwrap_or(Value::Null);
    let object = record
        .as_object_mut()
        .ok_or_else(|| AnalysisError::InvalidResult("result is not a JSON object".to_string()))?;
    object.insert("fps".to_string(), field("fps"));
    object.insert("angles".to_string(), field("angles"));
    object.insert("com_stability_scores".to_string(), field("com_stability_scores"));
    object.insert("angle_json".to_string(), Value::String(file_name(&angle_file)));

    write_json_atomic(result_path, &record)?;

    let count = |name: &str| record.get(name).and_then(Value::as_array).map_or(0, Vec::len);
    let summary = EmbedSummary {
        fps: record.get("fps").and_then(Value::as_u64),
        angle_count: count("angles"),
        score_count: count("com_stability_scores"),
        angle_file,
    };
    info!(
        "Embedded angles into {:?}: fps={:?}, {} angles, {} scores",
        result_path, summary.fps, summary.angle_count, summary.score_count
    );
    Ok(Some(summary))
}

fn locate_angle_file(reference: &Path, result_path: &Path, angle_dirs: &[PathBuf]) -> Option<PathBuf> {
    if reference.is_file() {
        return Some(reference.to_path_buf());
    }
    let name = reference.file_name()?;
    result_path
        .parent()
        .into_iter()
        .map(Path::to_path_buf)
        .chain(angle_dirs.iter().cloned())
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Most recently modified `result_*.json` in `dir`
pub fn latest_result(dir: &Path) -> AnalysisResult<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !(name.starts_with("result_") && name.ends_with(".json")) {
            continue;
        }
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(time) => time,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };
        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| display(path))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
