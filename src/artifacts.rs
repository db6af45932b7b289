use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_TEMP_DIR: &str = "temp_images";

/// A downloaded image waiting for its cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempArtifact {
    pub path: PathBuf,
    pub created_at: SystemTime,
}

/// Owns the directory that holds downloaded images.
///
/// Files are only ever created under a fresh name and later deleted, so
/// concurrent fetches and cleanups never touch the same path.
#[derive(Debug, Clone)]
pub struct TempArtifacts {
    root: PathBuf,
}

impl Default for TempArtifacts {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_DIR)
    }
}

impl TempArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory if needed. Safe to call any number of times.
    /// Failures are logged, and the return value says whether the directory
    /// is usable.
    pub async fn ensure_directory(&self) -> bool {
        match fs::create_dir_all(&self.root).await {
            Ok(()) => {
                info!(dir = %self.root.display(), "Temp image directory ready");
                true
            }
            Err(e) => {
                error!(
                    dir = %self.root.display(),
                    error = %e,
                    "Failed to create temp image directory"
                );
                false
            }
        }
    }

    /// Reserves a collision-free path `<uuid>.<ext>` inside the directory.
    /// Nothing is created on disk.
    pub fn allocate(&self, extension: &str) -> TempArtifact {
        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        TempArtifact {
            path: self.root.join(filename),
            created_at: SystemTime::now(),
        }
    }

    /// Deletes `path` after `delay` on a detached task. The caller may drop
    /// the handle; it is returned for callers that want to observe it.
    pub fn schedule_cleanup(&self, path: PathBuf, delay: Duration) -> JoinHandle<()> {
        debug!(path = %path.display(), delay_secs = delay.as_secs(), "Scheduled temp file cleanup");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            remove_artifact(&path).await;
        })
    }

    /// Deletes every file in the directory, then the directory itself.
    /// A file that cannot be removed is logged and skipped.
    #[instrument(level = "debug", skip(self), fields(dir = %self.root.display()))]
    pub async fn purge_all(&self) {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Temp image directory already gone");
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to read temp image directory");
                return;
            }
        };

        let mut removed = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read temp directory entry");
                    break;
                }
            };

            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|ft| ft.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete temp file");
                }
            }
        }

        match fs::remove_dir(&self.root).await {
            Ok(()) => {
                info!(removed = removed, "Cleaned up temp image directory");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                error!(error = %e, "Failed to remove temp image directory");
            }
        }
    }
}

/// Best-effort delete of one artifact. Never fails the caller.
pub(crate) async fn remove_artifact(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Deleted temp file");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Temp file already removed");
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to delete temp file");
        }
    }
}
