use thiserror::Error;

/// Failures that end an analysis. Upstream faults inside a stage never
/// surface here; they degrade to an empty stage result instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid post url: {0}")]
    InvalidUrl(String),

    #[error("too many requests, try again in a minute")]
    Throttled,

    #[error("temporarily blocked after repeated failures")]
    Blocked,

    #[error("failed to persist results: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("counter store unavailable: {0}")]
    Counter(#[source] anyhow::Error),
}
