use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use swing_analysis::config::AnalysisConfig;
use swing_analysis::services::result_assembler::{embed_angles, latest_result};

#[derive(Args)]
pub struct EmbedAnglesCommand {
    /// Result file to repair (defaults to the newest result in the result dir)
    result: Option<PathBuf>,
}

impl EmbedAnglesCommand {
    pub async fn execute(self, config: &AnalysisConfig) -> Result<()> {
        let result_dir = config.output.result_dir();
        let result_path = match self.result {
            Some(path) => path,
            None => latest_result(&result_dir)
                .with_context(|| format!("Failed to scan {}", result_dir.display()))?
                .with_context(|| format!("No result files found in {}", result_dir.display()))?,
        };

        let search_dirs = vec![config.output.angle_dir(), result_dir];
        match embed_angles(&result_path, &search_dirs)
            .with_context(|| format!("Failed to embed angles into {}", result_path.display()))?
        {
            Some(summary) => {
                println!("✓ Embedded angles into {}", result_path.display());
                println!("  Angle file: {}", summary.angle_file.display());
                match summary.fps {
                    Some(fps) => println!("  FPS: {}", fps),
                    None => println!("  FPS: n/a"),
                }
                println!("  Angles: {}", summary.angle_count);
                println!("  Stability scores: {}", summary.score_count);
            }
            None => println!("No angle_json field in {}; nothing to do", result_path.display()),
        }

        Ok(())
    }
}
