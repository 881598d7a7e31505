use std::path::{Path, PathBuf};
use std::fs;
use encoding_rs::Encoding;
use log::{debug, warn};
use crate::config::SidecarConfig;
use crate::error::{BridgeError, BridgeResult};

/// Marker line preceding the extended description
const EXTENDED_MARKER: &str = "詳細情報\n";
/// Marker line following the extended description
const GENRE_MARKER: &str = "ジャンル : \n";
/// Zero-based line index of the short description
const DESCRIPTION_LINE: usize = 4;

/// Human-readable program text read from the sidecar files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramText {
    pub description: String,
    pub extended: String,
}

/// Append a suffix to the full file name (`news.ts` -> `news.ts.program.txt`)
fn sidecar_path(file_path: &Path, folder: Option<&Path>, suffix: &str) -> PathBuf {
    let mut name = file_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);

    match folder {
        Some(dir) => dir.join(name),
        None => file_path.with_file_name(name),
    }
}

/// Get the path to the program description file for a recording
pub fn program_txt_path(file_path: &Path, folder: Option<&Path>) -> PathBuf {
    sidecar_path(file_path, folder, ".program.txt")
}

/// Get the path to the error/drop log for a recording
pub fn err_log_path(file_path: &Path, folder: Option<&Path>) -> PathBuf {
    sidecar_path(file_path, folder, ".err")
}

/// Decode sidecar bytes with the configured encoding; a BOM overrides the label
pub fn decode_text(bytes: &[u8], label: &str) -> BridgeResult<String> {
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| BridgeError::config(format!("unknown sidecar encoding '{}'", label)))?;
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("Sidecar text contained bytes invalid in {}; replaced", used.name());
    }
    Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Split program text into the short description and extended description
pub fn parse_program_text(text: &str) -> ProgramText {
    let description = text
        .split('\n')
        .nth(DESCRIPTION_LINE)
        .unwrap_or_default()
        .to_string();

    let extended = match text.split_once(EXTENDED_MARKER) {
        Some((_, rest)) => {
            let body = match rest.split_once(GENRE_MARKER) {
                Some((body, _)) => body,
                None => rest,
            };
            body.trim_end_matches('\n').to_string()
        }
        None => String::new(),
    };

    ProgramText { description, extended }
}

/// Read the program sidecar and the error log for a recording.
///
/// A missing program file yields empty text; the recording is registered anyway.
pub fn read_program_text(file_path: &Path, cfg: &SidecarConfig) -> BridgeResult<ProgramText> {
    let folder = cfg.folder.as_deref();
    let program_path = program_txt_path(file_path, folder);

    let mut program = if program_path.exists() {
        debug!("Reading program sidecar: {}", program_path.display());
        let bytes = fs::read(&program_path).map_err(|e| {
            BridgeError::config(format!("failed to read {}: {}", program_path.display(), e))
        })?;
        parse_program_text(&decode_text(&bytes, &cfg.encoding)?)
    } else {
        warn!("Program sidecar not found: {}", program_path.display());
        ProgramText::default()
    };

    let err_path = err_log_path(file_path, folder);
    if err_path.exists() {
        match fs::read(&err_path) {
            Ok(bytes) => {
                let err_text = decode_text(&bytes, &cfg.encoding)?;
                let err_text = err_text.trim_end_matches('\n');
                if !err_text.is_empty() {
                    if !program.extended.is_empty() {
                        program.extended.push_str("\n\n");
                    }
                    program.extended.push_str(err_text);
                }
            }
            Err(e) => warn!("Failed to read error log {}: {}", err_path.display(), e),
        }
    }

    Ok(program)
}
