use crate::error::AnalysisResult;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_BACKOFF: Duration = Duration::from_millis(200);

/// Per-run scratch directory, removed when dropped unless `keep` is set
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create `{parent}/_tmp_json_{basename}`
    pub fn create(parent: &Path, basename: &str, keep: bool) -> AnalysisResult<Self> {
        let path = parent.join(format!("_tmp_json_{}", basename));
        fs::create_dir_all(&path)?;
        debug!("Created work dir {:?} (keep={})", path, keep);
        Ok(Self { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create and return a subdirectory
    pub fn subdir(&self, name: &str) -> AnalysisResult<PathBuf> {
        let dir = self.path.join(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn keep(&self) -> bool {
        self.keep
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            debug!("KEEP_TMP_JSON set, preserving {:?}", self.path);
            return;
        }
        if let Err(e) = remove_dir_forced(&self.path) {
            warn!("Failed to remove work dir {:?}: {}", self.path, e);
        }
    }
}

/// Remove a directory tree, making entries writable and retrying with a
/// short backoff when removal fails
pub fn remove_dir_forced(path: &Path) -> io::Result<()> {
    let mut last_error = None;
    for attempt in 0..=REMOVE_ATTEMPTS {
        if attempt > 0 {
            thread::sleep(REMOVE_BACKOFF);
            make_writable(path);
        }
        match fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::other("removal failed")))
}

fn make_writable(path: &Path) {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return;
    };
    if metadata.file_type().is_symlink() {
        return;
    }

    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if metadata.is_dir() { 0o700 } else { 0o600 };
        permissions.set_mode(permissions.mode() | mode);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    let _ = fs::set_permissions(path, permissions);

    if metadata.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable(&entry.path());
            }
        }
    }
}
