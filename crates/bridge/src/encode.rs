use std::time::Duration;
use log::{error, info, warn};
use crate::backend::{BackendClient, EncodeRequest};
use crate::config::EncodeConfig;
use crate::error::{BridgeError, BridgeResult, Stage};

/// Encode defaults, built independently of the recording context
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub parent_dir: String,
    pub directory: Option<String>,
    pub save_same_directory: bool,
    pub mode: String,
    pub remove_original: bool,
    pub lookup_attempts: u32,
    pub lookup_backoff: Duration,
}

impl From<&EncodeConfig> for EncodeSettings {
    fn from(cfg: &EncodeConfig) -> Self {
        Self {
            parent_dir: cfg.parent_dir.clone(),
            directory: cfg.directory.clone().filter(|d| !d.trim().is_empty()),
            save_same_directory: cfg.save_same_directory,
            mode: cfg.mode.clone(),
            remove_original: cfg.remove_original,
            lookup_attempts: cfg.lookup_attempts,
            lookup_backoff: Duration::from_secs(cfg.lookup_backoff_secs),
        }
    }
}

/// Result of the encode phase; none of these stop the process
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    /// Encoding is switched off
    Skipped,
    Submitted { source_video_file_id: u64 },
    /// Backend refused the job
    Rejected { source_video_file_id: u64, reason: String },
    /// Phase ended before a job was submitted
    Aborted { reason: String },
}

pub struct EncodeSubmitter<'a> {
    client: &'a BackendClient,
    settings: EncodeSettings,
}

impl<'a> EncodeSubmitter<'a> {
    pub fn new(client: &'a BackendClient, settings: EncodeSettings) -> Self {
        Self { client, settings }
    }

    /// Look up the id of the first video file stored for the recording.
    ///
    /// The backend may still be indexing the upload, so lookups are retried
    /// with a fixed backoff up to `lookup_attempts` times.
    pub async fn resolve_source_video_file_id(&self, recorded_id: u64) -> BridgeResult<u64> {
        let attempts = self.settings.lookup_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client.get_recorded(recorded_id).await {
                Ok(item) => match item.video_files.first() {
                    Some(file) => {
                        info!("Recorded {} has video file {}", recorded_id, file.id);
                        return Ok(file.id);
                    }
                    None => last_error = "no video files registered yet".to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                "Video file lookup for recorded {} failed (attempt {}/{}): {}",
                recorded_id, attempt, attempts, last_error
            );
            if attempt < attempts {
                tokio::time::sleep(self.settings.lookup_backoff).await;
            }
        }

        Err(BridgeError::Transient {
            stage: Stage::Encode,
            message: format!(
                "video file of recorded {} unresolved after {} attempts: {}",
                recorded_id, attempts, last_error
            ),
        })
    }

    /// Build the encode job; ids and mode are required
    pub fn build_request(&self, recorded_id: u64, source_video_file_id: u64) -> BridgeResult<EncodeRequest> {
        if recorded_id == 0 || source_video_file_id == 0 || self.settings.mode.trim().is_empty() {
            return Err(BridgeError::config(format!(
                "invalid encode request: recordedId={} sourceVideoFileId={} mode='{}'",
                recorded_id, source_video_file_id, self.settings.mode
            )));
        }

        Ok(EncodeRequest {
            recorded_id,
            source_video_file_id,
            parent_dir: self.settings.parent_dir.clone(),
            directory: self.settings.directory.clone(),
            is_save_same_directory: self.settings.save_same_directory,
            mode: self.settings.mode.clone(),
            remove_original: self.settings.remove_original,
        })
    }

    /// Fire the encode job once; a refusal is logged, never retried
    pub async fn submit(&self, request: &EncodeRequest) -> EncodeOutcome {
        match self.client.submit_encode(request).await {
            Ok(()) => {
                info!(
                    "Encode '{}' queued for recorded {} (video file {})",
                    request.mode, request.recorded_id, request.source_video_file_id
                );
                EncodeOutcome::Submitted {
                    source_video_file_id: request.source_video_file_id,
                }
            }
            Err(e) => {
                error!("Encode submission for recorded {} failed: {}", request.recorded_id, e);
                EncodeOutcome::Rejected {
                    source_video_file_id: request.source_video_file_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Resolve the video file and submit; failures end only this phase
    pub async fn run(&self, recorded_id: u64) -> EncodeOutcome {
        let request = match self.resolve_source_video_file_id(recorded_id).await {
            Ok(file_id) => self.build_request(recorded_id, file_id),
            Err(e) => Err(e),
        };

        match request {
            Ok(request) => self.submit(&request).await,
            Err(e) => {
                error!("Encode phase aborted: {}", e);
                EncodeOutcome::Aborted { reason: e.to_string() }
            }
        }
    }
}
