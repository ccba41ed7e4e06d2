use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use swing_analysis::config::{AnalysisConfig, AppConfig};
use swing_analysis::services::log_rotation::rotate_logs;

#[derive(Args)]
pub struct RotateLogsCommand {
    /// Remove log files older than this many days (defaults to LOG_KEEP_DAYS)
    #[arg(long)]
    keep_days: Option<u64>,

    /// Log directory (defaults to <result dir>/logs)
    #[arg(long)]
    dir: Option<PathBuf>,
}

impl RotateLogsCommand {
    pub async fn execute(self, config: &AnalysisConfig, app: &AppConfig) -> Result<()> {
        let dir = self.dir.unwrap_or_else(|| config.output.logs_dir());
        let keep_days = self.keep_days.unwrap_or(app.log_keep_days);

        let removed = rotate_logs(&dir, keep_days)
            .with_context(|| format!("Failed to rotate logs in {}", dir.display()))?;

        for path in &removed {
            println!("Removed old log: {}", path.display());
        }
        println!("✓ {} log files older than {} days removed", removed.len(), keep_days);

        Ok(())
    }
}
