//! HTTP client for the recording-management backend.
//!
//! Every call maps to one REST endpoint. Retry decisions are left to the
//! pipeline components; this layer only classifies failures into
//! [`BridgeError`] variants.

use std::path::Path;
use std::time::Duration;
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use crate::config::BackendConfig;
use crate::error::{BridgeError, BridgeResult, Stage};

/// Status code the backend embeds in a successful upload response
pub const SUCCESS_CODE: i64 = 200;

/// Body of POST /api/recorded
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRegistration {
    pub channel_id: i64,
    pub start_at: i64,
    pub end_at: i64,
    pub name: String,
    pub description: String,
    pub extended: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    recorded_id: serde_json::Value,
}

/// Multipart fields of POST /api/videos/upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub recorded_id: u64,
    pub file_path: std::path::PathBuf,
    pub parent_directory_name: String,
    pub view_name: String,
    pub file_type: String,
}

/// Status the backend embeds in the upload response body
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedStatus {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Subset of GET /api/recorded/{id}
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedItem {
    pub id: u64,
    #[serde(default)]
    pub video_files: Vec<VideoFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoFile {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
}

/// Body of POST /api/encode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    pub recorded_id: u64,
    pub source_video_file_id: u64,
    pub parent_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    pub is_save_same_directory: bool,
    pub mode: String,
    pub remove_original: bool,
}

/// Thin wrapper over reqwest bound to the backend base URL
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(cfg: &BackendConfig) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .build()
            .map_err(|e| BridgeError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST /api/recorded, returning the new recorded id
    pub async fn register_recorded(&self, body: &RecordedRegistration) -> BridgeResult<u64> {
        let stage = Stage::Register;
        let response = self
            .client
            .post(self.url("/api/recorded"))
            .json(body)
            .send()
            .await
            .map_err(|e| BridgeError::unexpected(stage, "registration request failed", e))?;

        let text = read_success_body(stage, response).await?;
        let parsed: RegistrationResponse = serde_json::from_str(&text)
            .map_err(|e| BridgeError::unexpected(stage, format!("malformed registration response: {}", text), e))?;

        parse_recorded_id(&parsed.recorded_id).ok_or_else(|| BridgeError::Unexpected {
            stage,
            message: format!("recordedId is not a positive integer: {}", parsed.recorded_id),
            source: None,
        })
    }

    /// POST /api/videos/upload once, returning the status embedded in the body
    pub async fn upload_video(&self, request: &UploadRequest) -> BridgeResult<EmbeddedStatus> {
        let stage = Stage::Upload;
        let file = tokio::fs::File::open(&request.file_path).await.map_err(|e| {
            BridgeError::unexpected(stage, format!("cannot open {}", request.file_path.display()), e)
        })?;
        let length = file
            .metadata()
            .await
            .map_err(|e| BridgeError::unexpected(stage, format!("cannot stat {}", request.file_path.display()), e))?
            .len();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length).file_name(file_name_of(&request.file_path));
        let form = Form::new()
            .text("recordedId", request.recorded_id.to_string())
            .text("parentDirectoryName", request.parent_directory_name.clone())
            .text("viewName", request.view_name.clone())
            .text("fileType", request.file_type.clone())
            .part("file", part);

        debug!("Uploading {} ({} bytes) for recorded {}", request.file_path.display(), length, request.recorded_id);

        let response = self
            .client
            .post(self.url("/api/videos/upload"))
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| BridgeError::unexpected(stage, "upload transfer failed", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::unexpected(stage, "failed to read upload response", e))?;
        debug!("Upload response: HTTP {} {}", status, text);

        serde_json::from_str::<EmbeddedStatus>(&text).map_err(|e| {
            BridgeError::unexpected(stage, format!("unparseable upload response (HTTP {}): {}", status, text), e)
        })
    }

    /// GET /api/recorded/{id}
    pub async fn get_recorded(&self, recorded_id: u64) -> BridgeResult<RecordedItem> {
        let stage = Stage::Encode;
        let response = self
            .client
            .get(self.url(&format!("/api/recorded/{}", recorded_id)))
            .query(&[("isHalfWidth", "false")])
            .send()
            .await
            .map_err(|e| BridgeError::unexpected(stage, "recorded lookup failed", e))?;

        let text = read_success_body(stage, response).await?;
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::unexpected(stage, format!("malformed recorded item: {}", text), e))
    }

    /// POST /api/encode
    pub async fn submit_encode(&self, request: &EncodeRequest) -> BridgeResult<()> {
        let stage = Stage::Encode;
        let response = self
            .client
            .post(self.url("/api/encode"))
            .json(request)
            .send()
            .await
            .map_err(|e| BridgeError::unexpected(stage, "encode request failed", e))?;

        read_success_body(stage, response).await.map(|_| ())
    }
}

/// Body text of a 2xx response, or an upstream error carrying status and body
async fn read_success_body(stage: Stage, response: reqwest::Response) -> BridgeResult<String> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| BridgeError::unexpected(stage, "failed to read response body", e))?;
    debug!("{} response: HTTP {} {}", stage, status, text);

    if status.is_success() {
        Ok(text)
    } else {
        Err(BridgeError::Upstream {
            stage,
            message: format!("HTTP {}: {}", status, text),
        })
    }
}

/// Accepts both `42` and `"42"`
fn parse_recorded_id(value: &serde_json::Value) -> Option<u64> {
    let id = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording.ts".to_string())
}
