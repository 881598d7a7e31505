pub mod config;
pub mod error;
pub mod metadata;
pub mod sidecar;
pub mod backend;
pub mod host;
pub mod gate;
pub mod upload;
pub mod cleanup;
pub mod registrar;
pub mod encode;
pub mod pipeline;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, Stage};
pub use metadata::{RecordingContext, RecordingMetadata, TriggerEnv};
pub use pipeline::{Pipeline, PipelineReport};
