use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use swing_analysis::config::{AnalysisConfig, AppConfig};
use swing_analysis::services::{AnalysisPipeline, AnalysisRequest, PipelineOutcome};

#[derive(Args)]
pub struct AnalyzeCommand {
    /// Video to analyze
    #[arg(long)]
    video: PathBuf,

    /// Result file name, written inside the result directory
    #[arg(long)]
    out: Option<String>,

    /// User ID stored in the result
    #[arg(long)]
    user: Option<String>,

    /// Fill missing joints before rendering the overlay
    #[arg(long)]
    impute: bool,

    /// Keep the per-run working directory
    #[arg(long)]
    keep_tmp: bool,
}

impl AnalyzeCommand {
    pub async fn execute(self, config: AnalysisConfig, app: &AppConfig) -> Result<()> {
        println!("Analyzing {}", self.video.display());

        let pipeline = AnalysisPipeline::new(config)
            .with_keep_work_dir(self.keep_tmp || app.keep_tmp_json)
            .with_imputation(self.impute);
        let request = AnalysisRequest::new(&self.video)
            .with_user(self.user)
            .with_result_name(self.out);

        match pipeline.run(&request).await? {
            PipelineOutcome::Success {
                result_path,
                record,
            } => {
                println!("✓ Analysis done: {}", result_path.display());
                match (record.classifier.pred, record.classifier.prob_true) {
                    (Some(pred), Some(prob)) => {
                        println!("  Prediction: {} (p = {:.3})", pred, prob)
                    }
                    _ => println!(
                        "  Classifier unavailable: {}",
                        record.classifier_error_detail.as_deref().unwrap_or("unknown error")
                    ),
                }
                if let Some(angle_json) = &record.angle_json {
                    println!("  Angles: {}", angle_json);
                }
                Ok(())
            }
            PipelineOutcome::Failed {
                result_path,
                record,
            } => {
                println!("✗ Analysis failed at stage '{}': {}", record.stage, record.error);
                println!("  Error record: {}", result_path.display());
                bail!("analysis failed at stage {}", record.stage)
            }
        }
    }
}
