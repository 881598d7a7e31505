use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::error::BridgeError;

/// Configuration for the recording bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub backend: BackendConfig,
    pub upload: UploadConfig,
    pub sidecar: SidecarConfig,
    pub cleanup: CleanupConfig,
    pub gate: GateConfig,
    pub encode: EncodeConfig,
    pub log: LogConfig,
}

/// Recording-management backend location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. http://localhost:8888
    pub base_url: String,
    /// Connect timeout for every request
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

/// Where and how the uploaded file shows up in the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Storage directory name as listed by the backend
    pub parent_directory_name: String,
    /// Name shown on the play button
    pub view_name: String,
    /// File type tag, `ts` or `encoded`
    pub file_type: String,
    pub retry: UploadRetryPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            parent_directory_name: "recorded".to_string(),
            view_name: "TS".to_string(),
            file_type: "ts".to_string(),
            retry: UploadRetryPolicy::default(),
        }
    }
}

/// Retry policy for the upload loop.
///
/// The default retries forever without delay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRetryPolicy {
    /// Maximum number of transfers, None for unbounded
    pub max_attempts: Option<u32>,
    /// Delay between a rejected transfer and the next one
    pub backoff_secs: u64,
    /// Give up once this much wall-clock time has passed, None for unbounded
    pub max_elapsed_secs: Option<u64>,
}

impl UploadRetryPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_elapsed_secs.is_none()
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_secs.map(Duration::from_secs)
    }
}

/// Program description sidecar handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Folder holding `.program.txt` / `.err` files when not next to the recording
    pub folder: Option<PathBuf>,
    /// Text encoding label of the sidecar files
    pub encoding: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            folder: None,
            encoding: "utf-8".to_string(),
        }
    }
}

/// Local file removal after upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub delete_after_upload: bool,
    /// One-off delay before the first delete attempt
    pub delay_secs: u64,
    pub max_attempts: u32,
    /// Wait between attempts while the file is locked
    pub retry_interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            delete_after_upload: false,
            delay_secs: 0,
            max_attempts: 10,
            retry_interval_secs: 30,
        }
    }
}

/// Host conditions required before an upload starts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Wait for the recorder process to exit
    pub wait_for_process: bool,
    /// Recorder-controller process name
    pub process_name: String,
    pub poll_interval_secs: u64,
    /// Upper bound of the random jitter added to every poll
    pub jitter_max_secs: u64,
    pub cpu_ceiling_percent: f32,
    /// Window a single CPU sample is measured over
    pub cpu_sample_window_ms: u64,
    /// Pause after a sample at or above the ceiling
    pub cpu_cooldown_secs: u64,
    /// Stop waiting for the recorder process after this long, None to wait forever
    pub max_process_wait_secs: Option<u64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            wait_for_process: true,
            process_name: "EpgDataCap_Bon".to_string(),
            poll_interval_secs: 30,
            jitter_max_secs: 30,
            cpu_ceiling_percent: 80.0,
            cpu_sample_window_ms: 1000,
            cpu_cooldown_secs: 30,
            max_process_wait_secs: None,
        }
    }
}

impl GateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn jitter_max(&self) -> Duration {
        Duration::from_secs(self.jitter_max_secs)
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_window_ms)
    }

    pub fn cpu_cooldown(&self) -> Duration {
        Duration::from_secs(self.cpu_cooldown_secs)
    }
}

/// Transcode job defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub run_encode: bool,
    pub parent_dir: String,
    pub directory: Option<String>,
    pub save_same_directory: bool,
    /// Encode preset name as configured in the backend
    pub mode: String,
    pub remove_original: bool,
    pub lookup_attempts: u32,
    pub lookup_backoff_secs: u64,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            run_encode: false,
            parent_dir: "recorded".to_string(),
            directory: None,
            save_same_directory: false,
            mode: "H.264".to_string(),
            remove_original: false,
            lookup_attempts: 5,
            lookup_backoff_secs: 30,
        }
    }
}

/// Log file settings, consumed by the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file path, defaults to `recbridge.log` next to the executable
    pub path: Option<PathBuf>,
    /// Filter used when RUST_LOG is unset
    pub level: String,
    /// Rotate once the file grows past this size
    pub max_bytes: u64,
    /// Number of rotated generations kept
    pub keep: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: "info".to_string(),
            max_bytes: 5 * 1024 * 1024,
            keep: 3,
        }
    }
}

impl BridgeConfig {
    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), BridgeError> {
        let url = reqwest::Url::parse(&self.backend.base_url)
            .map_err(|e| BridgeError::config(format!("backend.base_url '{}': {}", self.backend.base_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(BridgeError::config(format!(
                "backend.base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        for (field, value) in [
            ("upload.parent_directory_name", &self.upload.parent_directory_name),
            ("upload.view_name", &self.upload.view_name),
            ("upload.file_type", &self.upload.file_type),
        ] {
            if value.trim().is_empty() {
                return Err(BridgeError::config(format!("{} must not be empty", field)));
            }
        }

        if self.upload.retry.max_attempts == Some(0) {
            return Err(BridgeError::config("upload.retry.max_attempts must be at least 1"));
        }

        if encoding_rs::Encoding::for_label(self.sidecar.encoding.as_bytes()).is_none() {
            return Err(BridgeError::config(format!(
                "sidecar.encoding '{}' is not a known text encoding",
                self.sidecar.encoding
            )));
        }

        if self.cleanup.max_attempts == 0 {
            return Err(BridgeError::config("cleanup.max_attempts must be at least 1"));
        }

        let ceiling = self.gate.cpu_ceiling_percent;
        if !(ceiling > 0.0 && ceiling <= 100.0) {
            return Err(BridgeError::config(format!(
                "gate.cpu_ceiling_percent must be in (0, 100], got {}",
                ceiling
            )));
        }
        if self.gate.cpu_sample_window() < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL {
            return Err(BridgeError::config(format!(
                "gate.cpu_sample_window_ms must be at least {} ms, got {}",
                sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.as_millis(),
                self.gate.cpu_sample_window_ms
            )));
        }
        if self.gate.wait_for_process && self.gate.process_name.trim().is_empty() {
            return Err(BridgeError::config("gate.process_name must not be empty when wait_for_process is set"));
        }

        if self.encode.run_encode {
            if self.encode.mode.trim().is_empty() {
                return Err(BridgeError::config("encode.mode must not be empty when run_encode is set"));
            }
            if self.encode.lookup_attempts == 0 {
                return Err(BridgeError::config("encode.lookup_attempts must be at least 1"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = BridgeConfig::default_config();
        cfg.validate().unwrap();
        assert!(cfg.upload.retry.is_unbounded());
        assert_eq!(cfg.cleanup.max_attempts, 10);
        assert_eq!(cfg.encode.lookup_attempts, 5);
        assert!(cfg.gate.max_process_wait_secs.is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = BridgeConfig::load_config(Some(Path::new("/nonexistent/recbridge.toml"))).unwrap();
        assert_eq!(cfg.backend.base_url, "http://localhost:8888");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
base_url = "http://epg.local:8888"

[cleanup]
delete_after_upload = true
delay_secs = 60

[upload.retry]
max_attempts = 3
"#
        )
        .unwrap();

        let cfg = BridgeConfig::load_config(Some(file.path())).unwrap();
        assert_eq!(cfg.backend.base_url, "http://epg.local:8888");
        assert!(cfg.cleanup.delete_after_upload);
        assert_eq!(cfg.cleanup.delay_secs, 60);
        assert_eq!(cfg.cleanup.max_attempts, 10);
        assert_eq!(cfg.upload.retry.max_attempts, Some(3));
        assert_eq!(cfg.upload.view_name, "TS");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_json_config() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"encode": {{"run_encode": true, "mode": "H.265"}}}}"#).unwrap();

        let cfg = BridgeConfig::load_config(Some(file.path())).unwrap();
        assert!(cfg.encode.run_encode);
        assert_eq!(cfg.encode.mode, "H.265");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = BridgeConfig::default_config();
        cfg.backend.base_url = "ftp://example".to_string();
        assert!(matches!(cfg.validate(), Err(BridgeError::Configuration(_))));

        let mut cfg = BridgeConfig::default_config();
        cfg.gate.cpu_ceiling_percent = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default_config();
        cfg.sidecar.encoding = "klingon".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default_config();
        cfg.encode.run_encode = true;
        cfg.encode.mode = " ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::default_config();
        cfg.cleanup.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_cpu_sample_window_floor() {
        let mut cfg = BridgeConfig::default_config();
        cfg.gate.cpu_sample_window_ms = 0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(ref m) if m.contains("cpu_sample_window_ms")));

        cfg.gate.cpu_sample_window_ms = (sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.as_micros() as u64).div_ceil(1000);
        cfg.validate().unwrap();
    }
}
