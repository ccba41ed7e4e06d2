use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use swing_analysis::config::AnalysisConfig;

/// Get config directory path (~/.swing-analysis/)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".swing-analysis"))
}

/// Config file to use: the explicit path when given, else
/// ~/.swing-analysis/config.toml
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config_dir()?.join("config.toml")),
    }
}

/// Load configuration, falling back to defaults when the file is absent
pub fn load(explicit: Option<&Path>) -> Result<AnalysisConfig> {
    let config_file = config_file(explicit)?;

    if !config_file.exists() {
        if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", config_file.display());
        }
        tracing::info!("Config file not found, using defaults");
        return Ok(AnalysisConfig::default());
    }

    parse_file(&config_file)
}

pub fn parse_file(path: &Path) -> Result<AnalysisConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AnalysisConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &AnalysisConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, contents).context("Failed to write config file")?;

    Ok(())
}
