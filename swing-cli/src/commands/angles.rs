use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use swing_analysis::config::AnalysisConfig;
use swing_analysis::services::AngleReportService;

#[derive(Args)]
pub struct AnglesCommand {
    /// Keypoint CSV (indexed or named layout)
    csv: PathBuf,

    /// Output angle JSON
    out: PathBuf,

    /// Frame rate recorded in the document
    #[arg(long, default_value = "30")]
    fps: u32,
}

impl AnglesCommand {
    pub async fn execute(self, config: &AnalysisConfig) -> Result<()> {
        let report = AngleReportService::new(&config.thresholds)
            .generate(&self.csv, &self.out, self.fps)
            .with_context(|| format!("Failed to build angle report from {}", self.csv.display()))?;

        println!("✓ Saved angles: {}", self.out.display());
        println!("  Frames: {}", report.angles.len());
        println!("  COM stable: {}", report.com_movement.stable);
        match report.com_stability {
            Some(stability) => println!("  COM stability: {:.4}", stability),
            None => println!("  COM stability: n/a"),
        }

        Ok(())
    }
}
