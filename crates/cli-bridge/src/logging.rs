use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use bridge::config::LogConfig;

/// `recbridge.log.3` style path for a rotated generation
fn generation_path(path: &Path, generation: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", generation));
    PathBuf::from(name)
}

/// Shift `log -> log.1 -> log.2 ...` once the file exceeds `max_bytes`
pub fn rotate_if_needed(path: &Path, max_bytes: u64, keep: u32) -> Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };
    if size < max_bytes {
        return Ok(false);
    }

    if keep == 0 {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove log file: {}", path.display()))?;
        return Ok(true);
    }

    let oldest = generation_path(path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest)
            .with_context(|| format!("Failed to remove old log: {}", oldest.display()))?;
    }
    for generation in (1..keep).rev() {
        let from = generation_path(path, generation);
        if from.exists() {
            let to = generation_path(path, generation + 1);
            fs::rename(&from, &to)
                .with_context(|| format!("Failed to rotate {} -> {}", from.display(), to.display()))?;
        }
    }
    let first = generation_path(path, 1);
    fs::rename(path, &first)
        .with_context(|| format!("Failed to rotate {} -> {}", path.display(), first.display()))?;
    Ok(true)
}

/// Default log location: next to the executable, falling back to the working directory
pub fn default_log_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("recbridge.log")))
        .unwrap_or_else(|| PathBuf::from("recbridge.log"))
}

/// Initialize env_logger writing to the (rotated) log file
pub fn init(cfg: &LogConfig, verbose: bool) -> Result<PathBuf> {
    let path = cfg.path.clone().unwrap_or_else(default_log_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    let rotated = rotate_if_needed(&path, cfg.max_bytes, cfg.keep)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&cfg.level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {}:{} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .context("Failed to initialize logger")?;

    if rotated {
        log::info!("Log rotated; previous output moved to {}", generation_path(&path, 1).display());
    }
    Ok(path)
}
