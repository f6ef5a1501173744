use thiserror::Error;

/// Engine-level failures. Row-level problems are recoverable (the pass
/// skips and counts them); the other variants abort the attempted pass
/// and leave the previously committed snapshot in place.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed source record: {0}")]
    MalformedRecord(String),

    #[error("another aggregation pass is already running")]
    ConcurrentPass,

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}
