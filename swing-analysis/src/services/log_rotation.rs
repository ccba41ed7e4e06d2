use crate::error::AnalysisResult;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_KEEP_DAYS: u64 = 36_500;

/// Delete regular files in `dir` last modified more than `keep_days` days
/// before `now`. A missing directory is not an error.
pub fn rotate_logs_at(dir: &Path, keep_days: u64, now: DateTime<Utc>) -> AnalysisResult<Vec<PathBuf>> {
    if !dir.exists() {
        info!("No logs dir: {:?}", dir);
        return Ok(Vec::new());
    }

    let cutoff = now - Duration::days(keep_days.min(MAX_KEEP_DAYS) as i64);
    let mut removed = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let modified: DateTime<Utc> = metadata.modified()?.into();
        if modified >= cutoff {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }

    info!("Removed {} log files older than {} days from {:?}", removed.len(), keep_days, dir);
    Ok(removed)
}

pub fn rotate_logs(dir: &Path, keep_days: u64) -> AnalysisResult<Vec<PathBuf>> {
    rotate_logs_at(dir, keep_days, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_old_files_are_removed() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("batch_swing.mp4.log");
        fs::write(&log, "done").unwrap();
        fs::create_dir(dir.path().join("archive")).unwrap();

        // Nothing is older than 30 days yet
        assert!(rotate_logs(dir.path(), 30).unwrap().is_empty());
        assert!(log.exists());

        // Seen from 31 days in the future, the log has expired
        let later = Utc::now() + Duration::days(31);
        let removed = rotate_logs_at(dir.path(), 30, later).unwrap();
        assert_eq!(removed, vec![log.clone()]);
        assert!(!log.exists());
        assert!(dir.path().join("archive").exists());
    }

    #[test]
    fn test_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(rotate_logs(&dir.path().join("logs"), 30).unwrap().is_empty());
    }
}
