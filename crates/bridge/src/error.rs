use thiserror::Error;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    Register,
    Upload,
    Cleanup,
    Encode,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Metadata => "metadata",
            Stage::Register => "register",
            Stage::Upload => "upload",
            Stage::Cleanup => "cleanup",
            Stage::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Errors raised by the bridge pipeline
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Trigger context or configuration is missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Condition expected to clear on its own (file lock, backend still indexing)
    #[error("transient error during {stage}: {message}")]
    Transient { stage: Stage, message: String },

    /// Backend answered with a non-success indication
    #[error("backend rejected {stage} request: {message}")]
    Upstream { stage: Stage, message: String },

    /// Transport failure, malformed response, or anything else unexpected
    #[error("unexpected error during {stage}: {message}")]
    Unexpected {
        stage: Stage,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BridgeError {
    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Configuration(message.into())
    }

    pub fn unexpected(
        stage: Stage,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BridgeError::Unexpected {
            stage,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Stage the error belongs to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BridgeError::Configuration(_) => None,
            BridgeError::Transient { stage, .. }
            | BridgeError::Upstream { stage, .. }
            | BridgeError::Unexpected { stage, .. } => Some(*stage),
        }
    }

    /// Whether the error terminates the whole process rather than a single phase.
    ///
    /// Encode-phase and cleanup-phase errors only end their own phase.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.stage(), Some(Stage::Encode) | Some(Stage::Cleanup))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_follows_stage() {
        assert!(BridgeError::config("ONID10 missing").is_fatal());
        assert!(BridgeError::Upstream {
            stage: Stage::Register,
            message: "500".into()
        }
        .is_fatal());
        assert!(BridgeError::Upstream {
            stage: Stage::Upload,
            message: "retry budget exhausted".into()
        }
        .is_fatal());
        assert!(!BridgeError::Transient {
            stage: Stage::Encode,
            message: "no video files yet".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_names_stage() {
        let err = BridgeError::Upstream {
            stage: Stage::Register,
            message: "HTTP 503".into(),
        };
        assert_eq!(err.to_string(), "backend rejected register request: HTTP 503");
    }
}
