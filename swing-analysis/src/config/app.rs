use anyhow::Result;
use std::env;

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Keep per-run working directories instead of deleting them (`KEEP_TMP_JSON=1`)
    pub keep_tmp_json: bool,
    /// Age in days after which batch logs are rotated out (`LOG_KEEP_DAYS`)
    pub log_keep_days: u64,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let keep_tmp_json = env::var("KEEP_TMP_JSON")
            .map(|v| v.trim() == "1")
            .unwrap_or(false);
        let log_keep_days = env::var("LOG_KEEP_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .trim()
            .parse()
            .unwrap_or(30);
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(AppConfig {
            keep_tmp_json,
            log_keep_days,
            log_level,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keep_tmp_json: false,
            log_keep_days: 30,
            log_level: "info".to_string(),
        }
    }
}
