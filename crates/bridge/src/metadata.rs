//! Recording metadata assembled from the recorder controller's trigger context.
//!
//! The controller exports discrete environment variables (`ONID10`, `SDYYYY`, ...)
//! and leaves a program description sidecar next to the recording. This module
//! turns both into a [`RecordingMetadata`] record.

use std::path::{Path, PathBuf};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use log::debug;
use crate::error::{BridgeError, BridgeResult};
use crate::sidecar::ProgramText;

/// Broadcast time zone, UTC+09:00
pub fn broadcast_offset() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("+09:00 is a valid offset")
}

/// Metadata describing one finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMetadata {
    pub title: String,
    pub original_network_id: String,
    /// Service id, zero-padded to 5 digits
    pub service_id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub description: String,
    pub extended: String,
}

/// Trigger context: the recording file plus its metadata
#[derive(Debug, Clone)]
pub struct RecordingContext {
    pub file_path: PathBuf,
    pub metadata: RecordingMetadata,
}

impl RecordingMetadata {
    /// Backend channel id: network id followed by the 5-digit service id
    pub fn channel_id(&self) -> BridgeResult<i64> {
        channel_id(&self.original_network_id, &self.service_id)
    }

    pub fn start_at_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_at_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Attach description and extended text parsed from the sidecar
    pub fn with_program_text(mut self, program: ProgramText) -> Self {
        self.description = program.description;
        self.extended = program.extended;
        self
    }
}

/// Concatenate the network id and the zero-padded service id into a channel id
pub fn channel_id(original_network_id: &str, service_id: &str) -> BridgeResult<i64> {
    let onid = original_network_id.trim();
    let sid = service_id.trim();
    if onid.is_empty() || !onid.chars().all(|c| c.is_ascii_digit()) {
        return Err(BridgeError::config(format!("invalid original network id '{}'", original_network_id)));
    }
    if sid.is_empty() || !sid.chars().all(|c| c.is_ascii_digit()) {
        return Err(BridgeError::config(format!("invalid service id '{}'", service_id)));
    }

    let joined = format!("{}{:0>5}", onid, sid);
    joined
        .parse::<i64>()
        .map_err(|e| BridgeError::config(format!("channel id '{}' out of range: {}", joined, e)))
}

/// Reads trigger variables through a lookup function
pub struct TriggerEnv<F>
where
    F: Fn(&str) -> Option<String>,
{
    lookup: F,
}

impl TriggerEnv<fn(&str) -> Option<String>> {
    /// Read from the real process environment
    pub fn process() -> Self {
        fn from_env(name: &str) -> Option<String> {
            std::env::var(name).ok()
        }
        TriggerEnv { lookup: from_env }
    }
}

impl<F> TriggerEnv<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn from_lookup(lookup: F) -> Self {
        TriggerEnv { lookup }
    }

    /// Variable must be exported, an empty value is accepted
    fn present(&self, name: &str) -> BridgeResult<String> {
        (self.lookup)(name).ok_or_else(|| {
            BridgeError::config(format!(
                "environment variable {} is not set; was the bridge started by the recorder?",
                name
            ))
        })
    }

    fn required(&self, name: &str) -> BridgeResult<String> {
        let value = self.present(name)?;
        if value.trim().is_empty() {
            return Err(BridgeError::config(format!("environment variable {} is empty", name)));
        }
        Ok(value)
    }

    fn number(&self, name: &str) -> BridgeResult<u32> {
        let raw = self.required(name)?;
        raw.trim()
            .parse::<u32>()
            .map_err(|_| BridgeError::config(format!("environment variable {}='{}' is not a number", name, raw)))
    }

    /// Path of the finished recording
    pub fn file_path(&self) -> BridgeResult<PathBuf> {
        self.required("FILEPATH").map(PathBuf::from)
    }

    fn timestamp(&self, prefix: char) -> BridgeResult<DateTime<FixedOffset>> {
        let year = self.number(&format!("{}DYYYY", prefix))?;
        let month = self.number(&format!("{}DMM", prefix))?;
        let day = self.number(&format!("{}DDD", prefix))?;
        let hour = self.number(&format!("{}THH", prefix))?;
        let minute = self.number(&format!("{}TMM", prefix))?;
        let second = self.number(&format!("{}TSS", prefix))?;

        let naive = NaiveDate::from_ymd_opt(year as i32, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .ok_or_else(|| {
                BridgeError::config(format!(
                    "invalid {} time {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    if prefix == 'S' { "start" } else { "end" },
                    year, month, day, hour, minute, second
                ))
            })?;

        broadcast_offset()
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| BridgeError::config("ambiguous broadcast time"))
    }

    /// Assemble metadata from the trigger variables.
    ///
    /// Description and extended text are left empty; they come from the sidecar.
    pub fn metadata(&self) -> BridgeResult<RecordingMetadata> {
        let original_network_id = self.required("ONID10")?.trim().to_string();
        let raw_sid = self.required("SID10")?;
        let service_id = format!("{:0>5}", raw_sid.trim());
        channel_id(&original_network_id, &service_id)?;

        let title = self
            .present("TITLE")?
            .replace('\u{200b}', " ");

        let start = self.timestamp('S')?;
        let end = self.timestamp('E')?;
        if end < start {
            return Err(BridgeError::config(format!("recording ends ({}) before it starts ({})", end, start)));
        }

        debug!("Trigger metadata: onid={} sid={} start={} end={}", original_network_id, service_id, start, end);

        Ok(RecordingMetadata {
            title,
            original_network_id,
            service_id,
            start,
            end,
            description: String::new(),
            extended: String::new(),
        })
    }
}

/// The recording must exist and be non-empty before it is registered
pub fn check_recording_file(path: &Path) -> BridgeResult<u64> {
    let size = std::fs::metadata(path)
        .map_err(|e| BridgeError::config(format!("recording {} is not readable: {}", path.display(), e)))?
        .len();
    if size == 0 {
        return Err(BridgeError::config(format!("recording {} is empty", path.display())));
    }
    Ok(size)
}
