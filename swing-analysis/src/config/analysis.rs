use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Settings for a full analysis run, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub crop: CropConfig,

    #[serde(default)]
    pub overlay: OverlayConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Keypoints at or below this confidence are treated as undetected
    #[serde(default = "default_confidence_cutoff")]
    pub confidence_cutoff: f64,

    /// Every COM axis range must stay strictly below this to count as stable
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropConfig {
    #[serde(default = "default_anchor_confidence")]
    pub min_anchor_confidence: f64,

    #[serde(default = "default_joint_confidence")]
    pub min_joint_confidence: f64,

    /// Neighborhood radius in pixels for clustering subject centers
    #[serde(default = "default_cluster_tolerance")]
    pub cluster_tolerance: f64,

    #[serde(default = "default_cluster_min_points")]
    pub cluster_min_points: usize,

    #[serde(default = "default_pad_ratio")]
    pub pad_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    #[serde(default = "default_joint_radius")]
    pub joint_radius: i32,

    #[serde(default = "default_line_thickness")]
    pub line_thickness: u32,

    #[serde(default = "default_true")]
    pub points_only: bool,
}

/// External programs invoked by the pipeline.
///
/// Arguments may contain `{input}` and `{output}` placeholders which are
/// substituted per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_detector")]
    pub detector: CommandTemplate,

    #[serde(default = "default_appearance_embedding")]
    pub appearance_embedding: CommandTemplate,

    #[serde(default = "default_skeleton_embedding")]
    pub skeleton_embedding: CommandTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Extra attempts after the first failure
    #[serde(default)]
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// Evaluate an exported MLP head in-process
    Mlp,
    /// Run an external command that prints the classifier JSON on stdout
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_mode")]
    pub mode: ClassifierMode,

    #[serde(default = "default_weights_path")]
    pub weights: PathBuf,

    #[serde(default)]
    pub command: Option<CommandTemplate>,
}

/// Output directory layout, relative to `root` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_crop_video_dir")]
    pub crop_video_dir: PathBuf,

    #[serde(default = "default_crop_csv_dir")]
    pub crop_csv_dir: PathBuf,

    #[serde(default = "default_skeleton_video_dir")]
    pub skeleton_video_dir: PathBuf,

    #[serde(default = "default_embedding_dir")]
    pub embedding_dir: PathBuf,

    #[serde(default = "default_angle_dir")]
    pub angle_dir: PathBuf,

    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// JSON schema checked before a result is persisted
    #[serde(default)]
    pub result_schema: Option<PathBuf>,
}

// Default value functions
fn default_confidence_cutoff() -> f64 {
    0.01
}

fn default_stability_threshold() -> f64 {
    0.05
}

fn default_anchor_confidence() -> f64 {
    0.10
}

fn default_joint_confidence() -> f64 {
    0.05
}

fn default_cluster_tolerance() -> f64 {
    100.0
}

fn default_cluster_min_points() -> usize {
    5
}

fn default_pad_ratio() -> f64 {
    0.10
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

fn default_joint_radius() -> i32 {
    4
}

fn default_line_thickness() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_detector() -> CommandTemplate {
    CommandTemplate {
        program: "openpose".to_string(),
        args: [
            "--video",
            "{input}",
            "--write_json",
            "{output}",
            "--display",
            "0",
            "--render_pose",
            "0",
            "--number_people_max",
            "1",
            "--model_pose",
            "COCO",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        cwd: None,
        env: BTreeMap::new(),
        retries: 1,
    }
}

fn embedding_command(script: &str) -> CommandTemplate {
    CommandTemplate {
        program: "python".to_string(),
        args: vec![
            "-u".to_string(),
            script.to_string(),
            "{input}".to_string(),
            "{output}".to_string(),
        ],
        cwd: None,
        env: BTreeMap::from([("PYTHONIOENCODING".to_string(), "utf-8".to_string())]),
        retries: 0,
    }
}

fn default_appearance_embedding() -> CommandTemplate {
    embedding_command("extract_timesformer_single.py")
}

fn default_skeleton_embedding() -> CommandTemplate {
    embedding_command("extract_stgcn_single.py")
}

fn default_classifier_mode() -> ClassifierMode {
    ClassifierMode::Mlp
}

fn default_weights_path() -> PathBuf {
    PathBuf::from("models/mlp_head.json")
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_crop_video_dir() -> PathBuf {
    PathBuf::from("crop_video")
}

fn default_crop_csv_dir() -> PathBuf {
    PathBuf::from("crop_csv")
}

fn default_skeleton_video_dir() -> PathBuf {
    PathBuf::from("skeleton_video")
}

fn default_embedding_dir() -> PathBuf {
    PathBuf::from("embedding")
}

fn default_angle_dir() -> PathBuf {
    PathBuf::from("angle")
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("result")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploaded-videos")
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            crop: CropConfig::default(),
            overlay: OverlayConfig::default(),
            tools: ToolsConfig::default(),
            classifier: ClassifierConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            confidence_cutoff: default_confidence_cutoff(),
            stability_threshold: default_stability_threshold(),
        }
    }
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            min_anchor_confidence: default_anchor_confidence(),
            min_joint_confidence: default_joint_confidence(),
            cluster_tolerance: default_cluster_tolerance(),
            cluster_min_points: default_cluster_min_points(),
            pad_ratio: default_pad_ratio(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            joint_radius: default_joint_radius(),
            line_thickness: default_line_thickness(),
            points_only: default_true(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            detector: default_detector(),
            appearance_embedding: default_appearance_embedding(),
            skeleton_embedding: default_skeleton_embedding(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: default_classifier_mode(),
            weights: default_weights_path(),
            command: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            crop_video_dir: default_crop_video_dir(),
            crop_csv_dir: default_crop_csv_dir(),
            skeleton_video_dir: default_skeleton_video_dir(),
            embedding_dir: default_embedding_dir(),
            angle_dir: default_angle_dir(),
            result_dir: default_result_dir(),
            upload_dir: default_upload_dir(),
            result_schema: None,
        }
    }
}

impl OutputConfig {
    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        }
    }

    pub fn crop_video_dir(&self) -> PathBuf {
        self.resolve(&self.crop_video_dir)
    }

    pub fn crop_csv_dir(&self) -> PathBuf {
        self.resolve(&self.crop_csv_dir)
    }

    pub fn skeleton_video_dir(&self) -> PathBuf {
        self.resolve(&self.skeleton_video_dir)
    }

    pub fn embedding_dir(&self) -> PathBuf {
        self.resolve(&self.embedding_dir)
    }

    pub fn angle_dir(&self) -> PathBuf {
        self.resolve(&self.angle_dir)
    }

    pub fn result_dir(&self) -> PathBuf {
        self.resolve(&self.result_dir)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.resolve(&self.upload_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.result_dir().join("logs")
    }

    /// Every directory a run writes into
    pub fn run_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.crop_video_dir(),
            self.crop_csv_dir(),
            self.skeleton_video_dir(),
            self.embedding_dir(),
            self.angle_dir(),
            self.result_dir(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.thresholds.confidence_cutoff, 0.01);
        assert_eq!(config.thresholds.stability_threshold, 0.05);
        assert_eq!(config.crop.cluster_min_points, 5);
        assert_eq!(config.overlay.max_width, 1920);
        assert_eq!(config.tools.detector.retries, 1);
        assert_eq!(config.tools.skeleton_embedding.retries, 0);
        assert_eq!(config.classifier.mode, ClassifierMode::Mlp);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"thresholds": {"stability_threshold": 0.1}, "output": {"root": "/srv/golf"}}"#,
        )
        .unwrap();
        assert_eq!(config.thresholds.stability_threshold, 0.1);
        assert_eq!(config.thresholds.confidence_cutoff, 0.01);
        assert_eq!(config.output.angle_dir(), PathBuf::from("/srv/golf/angle"));
        assert_eq!(config.output.logs_dir(), PathBuf::from("/srv/golf/result/logs"));
    }

    #[test]
    fn test_absolute_dirs_are_kept() {
        let mut output = OutputConfig::default();
        output.embedding_dir = PathBuf::from("/data/embedding");
        assert_eq!(output.embedding_dir(), PathBuf::from("/data/embedding"));
        assert_eq!(output.run_dirs().len(), 6);
    }
}
