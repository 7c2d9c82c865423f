use thiserror::Error;

/// Errors surfaced by the detection engine.
///
/// Only upstream data unavailability fails a caller-visible operation;
/// detector failures, missing model artifacts, and persistence problems are
/// recovered at the orchestrator boundary and logged instead.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("metrics feed unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("metrics feed fetch exceeded the {0}s deadline")]
    DeadlineExceeded(u64),

    #[error("result sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
