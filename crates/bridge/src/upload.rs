use std::time::Duration;
use log::{info, warn};
use tokio::time::Instant;
use crate::backend::{BackendClient, UploadRequest, SUCCESS_CODE};
use crate::config::UploadRetryPolicy;
use crate::error::{BridgeError, BridgeResult, Stage};

/// Outcome of a confirmed upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    /// Number of transfers performed, including the successful one
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Transfers the recording and repeats the whole transfer until the backend reports success
pub struct UploadExecutor<'a> {
    client: &'a BackendClient,
    policy: &'a UploadRetryPolicy,
}

impl<'a> UploadExecutor<'a> {
    pub fn new(client: &'a BackendClient, policy: &'a UploadRetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Upload until the embedded status code is [`SUCCESS_CODE`].
    ///
    /// Transport failures and unparseable responses are returned immediately.
    /// Rejections are retried until the policy's attempt or time budget runs out.
    pub async fn upload(&self, request: &UploadRequest) -> BridgeResult<UploadResult> {
        let started = Instant::now();
        let mut attempts = 0u32;

        info!(
            "Uploading {} as recorded {} into '{}'",
            request.file_path.display(),
            request.recorded_id,
            request.parent_directory_name
        );

        loop {
            attempts += 1;
            let status = self.client.upload_video(request).await?;

            if status.code == SUCCESS_CODE {
                let elapsed = started.elapsed();
                info!("Upload confirmed after {} attempt(s) in {:?}", attempts, elapsed);
                return Ok(UploadResult { attempts, elapsed });
            }

            let detail = status.message.as_deref().unwrap_or("");
            warn!(
                "Upload attempt {} rejected with code {} {}; retrying",
                attempts, status.code, detail
            );

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return Err(BridgeError::Upstream {
                        stage: Stage::Upload,
                        message: format!("still rejected (code {}) after {} attempts", status.code, attempts),
                    });
                }
            }
            if let Some(limit) = self.policy.max_elapsed() {
                if started.elapsed() >= limit {
                    return Err(BridgeError::Upstream {
                        stage: Stage::Upload,
                        message: format!("still rejected (code {}) after {:?}", status.code, limit),
                    });
                }
            }

            let backoff = self.policy.backoff();
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
