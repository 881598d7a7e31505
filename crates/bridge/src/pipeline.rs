//! Orchestrator: Registrar -> ResourceGate -> UploadExecutor -> CleanupAgent -> EncodeSubmitter.
//!
//! Stages run strictly one after another. Registration and upload failures
//! end the run with an error; cleanup and encode problems are folded into
//! the returned [`PipelineReport`].

use log::info;
use crate::backend::{BackendClient, UploadRequest};
use crate::cleanup::{CleanupAgent, CleanupOutcome, FileRemover, FsRemover};
use crate::config::BridgeConfig;
use crate::encode::{EncodeOutcome, EncodeSettings, EncodeSubmitter};
use crate::error::BridgeResult;
use crate::gate::{GateReport, ResourceGate};
use crate::host::{HostProbe, SysinfoProbe};
use crate::metadata::RecordingContext;
use crate::registrar::{RecordedEntry, RecordingRegistrar};
use crate::upload::{UploadExecutor, UploadResult};

/// Everything that happened in one run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub recorded: RecordedEntry,
    pub gate: GateReport,
    pub upload: UploadResult,
    pub cleanup: CleanupOutcome,
    pub encode: EncodeOutcome,
}

pub struct Pipeline<'a, P: HostProbe, R: FileRemover> {
    cfg: &'a BridgeConfig,
    client: BackendClient,
    probe: P,
    remover: R,
}

impl<'a> Pipeline<'a, SysinfoProbe, FsRemover> {
    /// Pipeline against the real host and filesystem
    pub fn from_config(cfg: &'a BridgeConfig) -> BridgeResult<Self> {
        Ok(Self::new(cfg, BackendClient::new(&cfg.backend)?, SysinfoProbe::new(), FsRemover))
    }
}

impl<'a, P: HostProbe, R: FileRemover> Pipeline<'a, P, R> {
    pub fn new(cfg: &'a BridgeConfig, client: BackendClient, probe: P, remover: R) -> Self {
        Self {
            cfg,
            client,
            probe,
            remover,
        }
    }

    pub async fn run(self, context: RecordingContext) -> BridgeResult<PipelineReport> {
        let Pipeline {
            cfg,
            client,
            probe,
            remover,
        } = self;
        let encode_settings = EncodeSettings::from(&cfg.encode);

        let recorded = RecordingRegistrar::new(&client).register(&context.metadata).await?;
        let recorded_id = recorded.recorded_id();

        let gate = ResourceGate::new(&cfg.gate, probe).await_clearance().await;

        let request = UploadRequest {
            recorded_id,
            file_path: context.file_path.clone(),
            parent_directory_name: cfg.upload.parent_directory_name.clone(),
            view_name: cfg.upload.view_name.clone(),
            file_type: cfg.upload.file_type.clone(),
        };
        let upload = UploadExecutor::new(&client, &cfg.upload.retry).upload(&request).await?;

        let cleanup = CleanupAgent::new(&cfg.cleanup, remover)
            .delete_if_configured(&context.file_path)
            .await;

        let encode = if cfg.encode.run_encode {
            EncodeSubmitter::new(&client, encode_settings).run(recorded_id).await
        } else {
            EncodeOutcome::Skipped
        };

        info!(
            "Recorded {} done: upload attempts={}, cleanup={:?}, encode={:?}",
            recorded_id, upload.attempts, cleanup, encode
        );

        Ok(PipelineReport {
            recorded,
            gate,
            upload,
            cleanup,
            encode,
        })
    }
}
