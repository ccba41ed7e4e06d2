use anyhow::Result;
use std::path::Path;
use std::process::Command;
use swing_analysis::config::AnalysisConfig;

use crate::config;

pub async fn show_config(explicit: Option<&Path>) -> Result<()> {
    let config = config::load(explicit)?;
    let config_str = toml::to_string_pretty(&config)?;

    println!("Current Configuration ({})", config::config_file(explicit)?.display());
    println!("────────────────────────────────");
    println!();
    println!("{}", config_str);

    Ok(())
}

pub async fn edit_config(explicit: Option<&Path>) -> Result<()> {
    let config_file = config::config_file(explicit)?;

    if !config_file.exists() {
        config::save(&AnalysisConfig::default(), &config_file)?;
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());
    Command::new(editor).arg(&config_file).status()?;

    // Surface syntax errors right away instead of on the next run
    config::parse_file(&config_file)?;
    println!("✓ Configuration saved!");

    Ok(())
}

pub async fn init_config(explicit: Option<&Path>, force: bool) -> Result<()> {
    let config_file = config::config_file(explicit)?;

    if config_file.exists() && !force {
        println!(
            "Configuration file already exists at: {}",
            config_file.display()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    config::save(&AnalysisConfig::default(), &config_file)?;

    println!("✓ Configuration initialized at: {}", config_file.display());
    println!();
    println!("You can edit it with: swing config edit");

    Ok(())
}
