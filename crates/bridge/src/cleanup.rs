use std::io;
use std::path::Path;
use std::time::Duration;
use log::{error, info, warn};
use crate::config::CleanupConfig;

/// Filesystem seam for deleting the uploaded recording
pub trait FileRemover {
    fn remove(&mut self, path: &Path) -> io::Result<()>;
}

/// Deletes through `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove(&mut self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// What happened to the local recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Deletion is switched off
    Disabled,
    Deleted { attempts: u32 },
    /// A non-lock error ended the cleanup; the file stays
    Aborted { attempts: u32, reason: String },
    /// Still locked after the last attempt; the file stays
    Exhausted { attempts: u32 },
}

/// Whether an error means "someone still has the file open"
pub fn is_lock_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION on Windows, EBUSY elsewhere
    match err.raw_os_error() {
        Some(32) | Some(33) if cfg!(windows) => true,
        Some(16) if cfg!(unix) => true,
        _ => false,
    }
}

pub struct CleanupAgent<'a, R: FileRemover> {
    cfg: &'a CleanupConfig,
    remover: R,
}

impl<'a, R: FileRemover> CleanupAgent<'a, R> {
    pub fn new(cfg: &'a CleanupConfig, remover: R) -> Self {
        Self { cfg, remover }
    }

    /// Delete the recording if configured, retrying while it is locked.
    ///
    /// Never fails; anything short of deletion is logged and reported.
    pub async fn delete_if_configured(&mut self, path: &Path) -> CleanupOutcome {
        if !self.cfg.delete_after_upload {
            return CleanupOutcome::Disabled;
        }

        if self.cfg.delay_secs > 0 {
            info!("Waiting {}s before deleting {}", self.cfg.delay_secs, path.display());
            tokio::time::sleep(Duration::from_secs(self.cfg.delay_secs)).await;
        }

        let retry_interval = Duration::from_secs(self.cfg.retry_interval_secs);
        for attempt in 1..=self.cfg.max_attempts {
            match self.remover.remove(path) {
                Ok(()) => {
                    info!("Deleted {} (attempt {})", path.display(), attempt);
                    return CleanupOutcome::Deleted { attempts: attempt };
                }
                Err(e) if is_lock_error(&e) => {
                    warn!(
                        "{} is locked (attempt {}/{}): {}",
                        path.display(),
                        attempt,
                        self.cfg.max_attempts,
                        e
                    );
                    if attempt < self.cfg.max_attempts {
                        tokio::time::sleep(retry_interval).await;
                    }
                }
                Err(e) => {
                    error!("Failed to delete {}: {}; leaving it in place", path.display(), e);
                    return CleanupOutcome::Aborted {
                        attempts: attempt,
                        reason: e.to_string(),
                    };
                }
            }
        }

        warn!(
            "Gave up deleting {} after {} attempts; leaving it in place",
            path.display(),
            self.cfg.max_attempts
        );
        CleanupOutcome::Exhausted {
            attempts: self.cfg.max_attempts,
        }
    }
}
