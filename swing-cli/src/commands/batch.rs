use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use swing_analysis::config::{AnalysisConfig, AppConfig};
use swing_analysis::models::AnalysisStatus;
use swing_analysis::services::analysis_pipeline::result_file_name;
use swing_analysis::services::json_store::{read_json, write_json_atomic};
use swing_analysis::services::log_rotation::rotate_logs;
use swing_analysis::services::{AnalysisPipeline, AnalysisRequest, PipelineOutcome};
use tracing::{info, warn};

const BATCH_USER: &str = "batch_auto";
const SUMMARY_FILE: &str = "batch_summary.json";

#[derive(Args)]
pub struct BatchCommand {
    /// Directory of uploaded videos (defaults to the configured upload dir)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Re-run videos that already have a success result
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub runs: Vec<BatchRun>,
}

#[derive(Debug, Serialize)]
pub struct BatchRun {
    pub video: String,
    pub result_file: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
}

impl BatchCommand {
    pub async fn execute(self, config: AnalysisConfig, app: &AppConfig) -> Result<()> {
        let upload_dir = self.dir.clone().unwrap_or_else(|| config.output.upload_dir());
        let result_dir = config.output.result_dir();
        let logs_dir = config.output.logs_dir();
        fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create {}", logs_dir.display()))?;

        if let Err(e) = rotate_logs(&logs_dir, app.log_keep_days) {
            warn!("Log rotation failed: {}", e);
        }

        let videos = list_videos(&upload_dir)?;
        info!("Found {} videos in {:?}", videos.len(), upload_dir);

        let pipeline = AnalysisPipeline::new(config).with_keep_work_dir(app.keep_tmp_json);
        let mut summary = BatchSummary { runs: Vec::new() };

        for video in videos {
            let name = file_name(&video);
            let result_file = result_file_name(&video);
            let result_path = result_dir.join(&result_file);

            if !self.force && already_succeeded(&result_path) {
                println!("- {} already analyzed, skipping", name);
                summary.runs.push(BatchRun {
                    video: name,
                    result_file,
                    status: "skipped-already-success".to_string(),
                    exit_code: None,
                    result: None,
                    log: None,
                });
                continue;
            }

            println!("\n=== RUNNING {}", name);
            let log_file = logs_dir.join(format!("batch_{}.log", name));
            let request = AnalysisRequest::new(&video)
                .with_user(Some(BATCH_USER.to_string()))
                .with_result_name(Some(result_file.clone()));

            let (exit_code, log_text) = match pipeline.run(&request).await {
                Ok(PipelineOutcome::Success { result_path, .. }) => {
                    (0, format!("status: success\nresult: {}\n", result_path.display()))
                }
                Ok(PipelineOutcome::Failed {
                    result_path,
                    record,
                }) => (
                    1,
                    format!(
                        "status: error\nstage: {}\nerror: {}\nresult: {}\n\n{}\n",
                        record.stage,
                        record.error,
                        result_path.display(),
                        record.traceback
                    ),
                ),
                Err(e) => (1, format!("status: error\nerror: {:#}\n", e)),
            };

            if let Err(e) = fs::write(&log_file, log_text) {
                warn!("Failed to write {:?}: {}", log_file, e);
            }

            let result = if result_path.exists() {
                Some(read_json(&result_path).unwrap_or_else(|e| {
                    serde_json::json!({ "_read_error": e.to_string() })
                }))
            } else {
                None
            };

            let status = if exit_code == 0 { "ok" } else { "fail" };
            println!("  {} ({})", status, log_file.display());
            summary.runs.push(BatchRun {
                video: name,
                result_file,
                status: status.to_string(),
                exit_code: Some(exit_code),
                result,
                log: Some(log_file),
            });
        }

        let summary_path = result_dir.join(SUMMARY_FILE);
        write_json_atomic(&summary_path, &summary).context("Failed to write batch summary")?;

        println!("\n✓ Batch finished. Summary written to {}", summary_path.display());
        println!("  Runs: {}", summary.runs.len());

        Ok(())
    }
}

/// `*.mp4` files directly inside `dir`, sorted by path
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read upload dir {}", dir.display()))?;

    let mut videos = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_mp4 = path.extension().and_then(|e| e.to_str()) == Some("mp4");
        if is_mp4 && path.is_file() {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

fn already_succeeded(result_path: &Path) -> bool {
    if !result_path.exists() {
        return false;
    }
    match read_json::<Value>(result_path) {
        Ok(record) => {
            record.get("status").and_then(Value::as_str).and_then(AnalysisStatus::parse)
                == Some(AnalysisStatus::Success)
        }
        Err(e) => {
            warn!("Unreadable result {:?}: {}", result_path, e);
            false
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
