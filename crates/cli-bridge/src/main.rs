mod logging;

use anyhow::{Context, Result};
use bridge::{
    config::{BridgeConfig, LogConfig},
    metadata::{self, TriggerEnv},
    sidecar, Pipeline,
};
use clap::Parser;
use log::{error, info};
use std::path::{Path, PathBuf};

/// Registers a finished recording with the backend, uploads it and queues an encode
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recording file, overrides the FILEPATH variable
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (cfg, log_path) = bootstrap(args.config.as_deref(), args.verbose, &LogConfig::default())?;

    info!("Recording bridge starting (log: {})", log_path.display());

    run(&args, &cfg).await.map_err(|e| {
        error!("Bridge failed: {:#}", e);
        e
    })
}

/// Load the configuration and start logging.
///
/// A configuration that fails to load is still written to the log, using `fallback_log`.
fn bootstrap(config: Option<&Path>, verbose: bool, fallback_log: &LogConfig) -> Result<(BridgeConfig, PathBuf)> {
    match BridgeConfig::load_config(config).context("Failed to load configuration") {
        Ok(cfg) => {
            let log_path = logging::init(&cfg.log, verbose)?;
            Ok((cfg, log_path))
        }
        Err(e) => {
            if logging::init(fallback_log, verbose).is_ok() {
                error!("Bridge failed: {:#}", e);
            }
            Err(e)
        }
    }
}

async fn run(args: &Args, cfg: &BridgeConfig) -> Result<()> {
    cfg.validate().context("Invalid configuration")?;
    info!("Configuration loaded:");
    info!("  Backend: {}", cfg.backend.base_url);
    info!("  Upload target: {} / {} ({})", cfg.upload.parent_directory_name, cfg.upload.view_name, cfg.upload.file_type);
    if cfg.upload.retry.is_unbounded() {
        info!("  Upload retries: unbounded (backoff {}s)", cfg.upload.retry.backoff_secs);
    } else {
        info!("  Upload retries: {:?}", cfg.upload.retry);
    }
    info!("  Delete after upload: {} (delay {}s)", cfg.cleanup.delete_after_upload, cfg.cleanup.delay_secs);
    info!("  Encode: {} (mode {})", cfg.encode.run_encode, cfg.encode.mode);

    let env = TriggerEnv::process();
    let file_path = match &args.file {
        Some(path) => path.clone(),
        None => env.file_path().context("No recording file given")?,
    };
    let size = metadata::check_recording_file(&file_path)?;
    info!("Recording: {} ({} bytes)", file_path.display(), size);

    let program = sidecar::read_program_text(&file_path, &cfg.sidecar)
        .context("Failed to read program sidecar")?;
    let recording = env
        .metadata()
        .context("Failed to read trigger metadata")?
        .with_program_text(program);
    info!("Program: '{}' {} - {}", recording.title, recording.start, recording.end);

    let context = metadata::RecordingContext {
        file_path,
        metadata: recording,
    };
    let report = Pipeline::from_config(cfg)?
        .run(context)
        .await
        .context("Pipeline aborted")?;

    info!(
        "Finished recorded {}: {} upload attempt(s), cleanup {:?}, encode {:?}",
        report.recorded.recorded_id(),
        report.upload.attempts,
        report.cleanup,
        report.encode
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_unparseable_config_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("recbridge.toml");
        fs::write(&config, "this is = = not toml").unwrap();
        let log_path = dir.path().join("logs").join("recbridge.log");
        let fallback = LogConfig {
            path: Some(log_path.clone()),
            ..LogConfig::default()
        };

        let err = bootstrap(Some(&config), false, &fallback).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse TOML config"));

        let logged = fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("ERROR"));
        assert!(logged.contains("Failed to load configuration"));
        assert!(logged.contains("Failed to parse TOML config"));
    }
}
