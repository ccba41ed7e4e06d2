mod analyze;
mod angles;
mod batch;
mod config_cmd;
mod embed_angles;
mod overlay;
mod rotate_logs;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use swing_analysis::config::AppConfig;

use crate::config;

pub use analyze::AnalyzeCommand;
pub use angles::AnglesCommand;
pub use batch::BatchCommand;
pub use embed_angles::EmbedAnglesCommand;
pub use overlay::OverlayCommand;
pub use rotate_logs::RotateLogsCommand;

#[derive(Parser)]
#[command(name = "swing")]
#[command(about = "Golf swing video analysis", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(long, global = true, env = "SWING_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis for one video
    Analyze(AnalyzeCommand),

    /// Compute joint angles and COM stability from a keypoint CSV
    Angles(AnglesCommand),

    /// Render a skeleton overlay video from a keypoint CSV
    Overlay(OverlayCommand),

    /// Analyze every uploaded video without a success result
    Batch(BatchCommand),

    /// Copy angle data into a persisted result
    EmbedAngles(EmbedAnglesCommand),

    /// Delete old batch logs
    RotateLogs(RotateLogsCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigSubcommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Show current configuration
    Show,

    /// Edit configuration file
    Edit,

    /// Initialize configuration with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub async fn execute(self) -> Result<()> {
        if self.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        let explicit = self.config.as_deref();
        let app = AppConfig::from_env()?;

        match self.command {
            Commands::Analyze(cmd) => cmd.execute(config::load(explicit)?, &app).await,
            Commands::Angles(cmd) => cmd.execute(&config::load(explicit)?).await,
            Commands::Overlay(cmd) => cmd.execute(&config::load(explicit)?).await,
            Commands::Batch(cmd) => cmd.execute(config::load(explicit)?, &app).await,
            Commands::EmbedAngles(cmd) => cmd.execute(&config::load(explicit)?).await,
            Commands::RotateLogs(cmd) => cmd.execute(&config::load(explicit)?, &app).await,
            Commands::Config(subcmd) => match subcmd {
                ConfigSubcommands::Show => config_cmd::show_config(explicit).await,
                ConfigSubcommands::Edit => config_cmd::edit_config(explicit).await,
                ConfigSubcommands::Init { force } => config_cmd::init_config(explicit, force).await,
            },
            Commands::Completions { shell } => {
                generate_completions(shell);
                Ok(())
            }
        }
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
