pub mod analysis;
pub mod app;

pub use analysis::{
    AnalysisConfig, ClassifierConfig, ClassifierMode, CommandTemplate, CropConfig, OutputConfig,
    OverlayConfig, ThresholdConfig, ToolsConfig,
};
pub use app::AppConfig;
