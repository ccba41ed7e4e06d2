use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use swing_analysis::config::AnalysisConfig;
use swing_analysis::services::imputation::impute_missing;
use swing_analysis::services::{
    load_keypoint_table, JointRemap, OverlayOptions, OverlayOutcome, OverlayRenderer,
    VideoProcessingService,
};

#[derive(Args)]
pub struct OverlayCommand {
    /// Input video
    input_video: PathBuf,

    /// Keypoint CSV for the video
    csv: PathBuf,

    /// Output overlay video
    output_video: PathBuf,

    /// JSON object mapping label index to skeleton joint index
    #[arg(long = "map")]
    map_json: Option<PathBuf>,

    /// Fill missing joints by temporal interpolation
    #[arg(long)]
    impute: bool,

    /// Draw only the joints, without connecting lines
    #[arg(long)]
    points_only: bool,
}

impl OverlayCommand {
    pub async fn execute(self, config: &AnalysisConfig) -> Result<()> {
        let mut table = load_keypoint_table(&self.csv, config.thresholds.confidence_cutoff)
            .with_context(|| format!("Failed to read keypoints from {}", self.csv.display()))?;
        if self.impute {
            table = impute_missing(&table);
        }

        let remap = self
            .map_json
            .as_deref()
            .map(JointRemap::load)
            .transpose()
            .context("Failed to read joint map")?;

        let options = OverlayOptions::from_config(&config.overlay)
            .with_points_only(self.points_only || config.overlay.points_only)
            .with_remap(remap);

        let renderer = OverlayRenderer::new(VideoProcessingService::from_tools(&config.tools));
        match renderer
            .render(&self.input_video, &table, &self.output_video, &options)
            .await?
        {
            OverlayOutcome::Written {
                path,
                frames,
                annotated,
                codec,
            } => {
                println!("✓ Overlay video saved: {}", path.display());
                println!(
                    "  {} frames ({} annotated), encoder {}",
                    frames,
                    annotated,
                    codec.encoder_name()
                );
            }
            OverlayOutcome::Aborted => {
                println!("✗ No usable video encoder; overlay not written");
            }
        }

        Ok(())
    }
}
