// Keypoint processing, video collaborators and run orchestration

pub mod analysis_pipeline;
pub mod angle_engine;
pub mod angle_report;
pub mod classifier;
pub mod com_analyzer;
pub mod external_process;
pub mod gap_filler;
pub mod imputation;
pub mod json_store;
pub mod log_rotation;
pub mod overlay_renderer;
pub mod person_crop;
pub mod result_assembler;
pub mod schema_resolver;
pub mod video_processing_service;
pub mod work_dir;

pub use analysis_pipeline::{AnalysisPipeline, AnalysisRequest, PipelineOutcome};
pub use angle_report::AngleReportService;
pub use classifier::{build_classifier, classify_soft, MlpHead, SwingClassifier};
pub use com_analyzer::ComStabilityAnalyzer;
pub use external_process::{run_step, ExternalCommand, RetryPolicy};
pub use overlay_renderer::{JointRemap, OverlayOptions, OverlayOutcome, OverlayRenderer};
pub use person_crop::PersonCropService;
pub use schema_resolver::{load_keypoint_table, KeypointTableLoader};
pub use video_processing_service::{VideoCodec, VideoInfo, VideoProcessingService};
pub use work_dir::WorkDir;
