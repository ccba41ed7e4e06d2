/// Analysis Pipeline
///
/// Runs one swing video end to end:
/// - Re-encode, detect, crop to the main subject and detect again
/// - Crop keypoint table, points-only overlay and the angle document
/// - Appearance and skeleton embeddings through external extractors
/// - Classification, result assembly, validation and persistence
///
/// A failing stage never leaves the caller without a result file: the
/// failure is written as an error record naming the stage.
use crate::config::{AnalysisConfig, CommandTemplate};
use crate::error::AnalysisError;
use crate::models::report::AngleReport;
use crate::models::result::{ClassifierOutput, ErrorRecord, ResultRecord};
use crate::services::angle_report::AngleReportService;
use crate::services::classifier::{build_classifier, classify_soft};
use crate::services::external_process::run_step;
use crate::services::imputation::impute_missing;
use crate::services::json_store::write_json_atomic;
use crate::services::overlay_renderer::{OverlayOptions, OverlayOutcome, OverlayRenderer};
use crate::services::person_crop::{read_detector_frames, write_crop_csv, PersonCropService};
use crate::services::result_assembler::{
    angle_json_name, assemble_result, error_record, validate_result, RunArtifacts,
};
use crate::services::schema_resolver::load_keypoint_table;
use crate::services::video_processing_service::VideoProcessingService;
use crate::services::work_dir::WorkDir;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// One video to analyze
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub video: PathBuf,
    pub user_id: Option<String>,
    /// File name of the result JSON inside the result directory
    pub result_name: Option<String>,
}

impl AnalysisRequest {
    pub fn new(video: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            user_id: None,
            result_name: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_result_name(mut self, name: Option<String>) -> Self {
        self.result_name = name;
        self
    }

    /// Video file stem used to name every artifact
    pub fn basename(&self) -> String {
        self.video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// Default result file name for a video: `result_{file name}.json`
pub fn result_file_name(video: &Path) -> String {
    let name = video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    format!("result_{}.json", name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Success {
        result_path: PathBuf,
        record: Box<ResultRecord>,
    },
    Failed {
        result_path: PathBuf,
        record: ErrorRecord,
    },
}

impl PipelineOutcome {
    pub fn result_path(&self) -> &Path {
        match self {
            PipelineOutcome::Success { result_path, .. } => result_path,
            PipelineOutcome::Failed { result_path, .. } => result_path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }
}

/// Stage currently running, for error attribution
struct StageTracker {
    current: &'static str,
}

impl StageTracker {
    fn enter(&mut self, stage: &'static str) {
        self.current = stage;
        info!(stage, "Starting {}", stage);
    }
}

pub struct AnalysisPipeline {
    config: AnalysisConfig,
    keep_work_dir: bool,
    impute: bool,
    video: VideoProcessingService,
    crop: PersonCropService,
    angles: AngleReportService,
    overlay: OverlayRenderer,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        let video = VideoProcessingService::from_tools(&config.tools);
        Self {
            crop: PersonCropService::new(config.crop.clone()),
            angles: AngleReportService::new(&config.thresholds),
            overlay: OverlayRenderer::new(video.clone()),
            video,
            keep_work_dir: false,
            impute: false,
            config,
        }
    }

    /// Keep the per-run working directory after the run
    pub fn with_keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    /// Fill missing joints before rendering the overlay
    pub fn with_imputation(mut self, impute: bool) -> Self {
        self.impute = impute;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one video and persist its result record.
    ///
    /// Returns an error only when not even the error record could be
    /// written.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<PipelineOutcome> {
        let result_dir = self.config.output.result_dir();
        let result_name = request
            .result_name
            .as_deref()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| result_file_name(&request.video));
        let result_path = result_dir.join(result_name);

        let mut stages = StageTracker { current: "workdir" };
        match self.run_stages(request, &result_path, &mut stages).await {
            Ok(record) => {
                info!("Analysis done: {:?}", result_path);
                Ok(PipelineOutcome::Success {
                    result_path,
                    record: Box::new(record),
                })
            }
            Err(e) => {
                error!(stage = stages.current, "Analysis of {:?} failed: {:#}", request.video, e);
                let record = error_record(&e, stages.current, request.user_id.clone());
                fs::create_dir_all(&result_dir)
                    .with_context(|| format!("Failed to create {:?}", result_dir))?;
                write_json_atomic(&result_path, &record)
                    .with_context(|| format!("Failed to write error record {:?}", result_path))?;
                warn!("Wrote error record to {:?}", result_path);
                Ok(PipelineOutcome::Failed {
                    result_path,
                    record,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        request: &AnalysisRequest,
        result_path: &Path,
        stages: &mut StageTracker,
    ) -> Result<ResultRecord> {
        let output = &self.config.output;
        let tools = &self.config.tools;
        let basename = request.basename();

        stages.enter("workdir");
        if !request.video.is_file() {
            return Err(AnalysisError::missing_artifact("input", &request.video).into());
        }
        for dir in output.run_dirs() {
            fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let work = WorkDir::create(&output.root, &basename, self.keep_work_dir)?;

        stages.enter("reencode");
        let reencoded = work.path().join(format!("{}_reencoded.mp4", basename));
        self.video
            .reencode_h264(&request.video, &reencoded)
            .await
            .context("Re-encoding the input video failed")?;

        stages.enter("detect");
        let raw_json = work.subdir(&format!("raw_{}", basename))?;
        run_step(&tools.detector, "detect", &reencoded, &raw_json).await?;

        stages.enter("crop");
        let detections = read_detector_frames(&raw_json)?;
        let boxes = self.crop.main_person_boxes(&detections)?;
        if boxes.is_empty() {
            return Err(AnalysisError::NoPersonDetected(request.video.display().to_string()).into());
        }
        let info = self.video.probe(&reencoded).await?;
        let region = self.crop.crop_region(&boxes, info.width, info.height)?;
        let crop_video = output.crop_video_dir().join(format!("{}_crop.mp4", basename));
        self.video.crop(&reencoded, &crop_video, &region).await?;
        require(&crop_video, "crop")?;

        stages.enter("detect crop");
        let crop_json = work.subdir(&format!("crop_{}", basename))?;
        run_step(&tools.detector, "detect crop", &crop_video, &crop_json).await?;

        stages.enter("crop csv");
        let crop_csv = output.crop_csv_dir().join(format!("{}_crop.csv", basename));
        write_crop_csv(&read_detector_frames(&crop_json)?, &crop_csv)?;
        require(&crop_csv, "crop csv")?;

        stages.enter("overlay");
        let overlay_video = output
            .skeleton_video_dir()
            .join(format!("{}_crop_openpose_skeleton_h264.mp4", basename));
        let mut table = load_keypoint_table(&crop_csv, self.config.thresholds.confidence_cutoff)?;
        if self.impute {
            table = impute_missing(&table);
        }
        let options = OverlayOptions::from_config(&self.config.overlay).with_points_only(true);
        if let OverlayOutcome::Aborted =
            self.overlay.render(&crop_video, &table, &overlay_video, &options).await?
        {
            warn!("Overlay video was not written: {:?}", overlay_video);
        }

        stages.enter("angles");
        let angle_path = output.angle_dir().join(angle_json_name(&basename));
        let report = self.angle_report(&crop_video, &crop_csv, &angle_path).await;

        stages.enter("appearance embedding");
        let appearance_embedding = output
            .embedding_dir()
            .join(format!("{}_timesformer.npy", basename));
        extract_embedding(
            &tools.appearance_embedding,
            "appearance embedding",
            &crop_video,
            &appearance_embedding,
        )
        .await?;

        stages.enter("skeleton embedding");
        let skeleton_embedding = output.embedding_dir().join(format!("{}_stgcn.npy", basename));
        extract_embedding(
            &tools.skeleton_embedding,
            "skeleton embedding",
            &crop_csv,
            &skeleton_embedding,
        )
        .await?;

        stages.enter("classify");
        let classifier_output = self.classify(&skeleton_embedding).await;

        stages.enter("assemble");
        let artifacts = RunArtifacts {
            overlay_video,
            crop_video,
            crop_csv,
            appearance_embedding,
            skeleton_embedding,
            angle_json: report.as_ref().map(|_| angle_path),
        };
        let record = assemble_result(
            request.user_id.clone(),
            &artifacts,
            classifier_output,
            report.as_ref(),
            &output.angle_dir(),
        );

        stages.enter("validate");
        let value = serde_json::to_value(&record)?;
        validate_result(&value, output.result_schema.as_deref())?;

        stages.enter("persist");
        write_json_atomic(result_path, &value)?;
        Ok(record)
    }

    /// Angle document for the crop; failures are logged and skipped
    async fn angle_report(&self, crop_video: &Path, crop_csv: &Path, out: &Path) -> Option<AngleReport> {
        let fps = self.video.frame_rate(crop_video).await;
        match self.angles.generate(crop_csv, out, fps) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(stage = "angles", "Angle JSON generation failed: {}", e);
                None
            }
        }
    }

    async fn classify(&self, embedding: &Path) -> ClassifierOutput {
        let config = self.config.classifier.clone();
        let embedding = embedding.to_path_buf();
        let task = tokio::task::spawn_blocking(move || match build_classifier(&config) {
            Ok(classifier) => classify_soft(classifier.as_ref(), &embedding),
            Err(e) => {
                error!(stage = "classify", "Could not load classifier: {}", e);
                ClassifierOutput::failed(e.to_string())
            }
        });
        match task.await {
            Ok(output) => output,
            Err(e) => ClassifierOutput::failed(format!("classifier task failed: {}", e)),
        }
    }
}

/// Run an embedding extractor and check that it wrote `output`
async fn extract_embedding(
    template: &CommandTemplate,
    step: &str,
    input: &Path,
    output: &Path,
) -> Result<(), AnalysisError> {
    run_step(template, step, input, output).await?;
    require(output, step)
}

/// Fail when a step reported success without producing `path`
fn require(path: &Path, step: &str) -> Result<(), AnalysisError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AnalysisError::missing_artifact(step, path))
    }
}
