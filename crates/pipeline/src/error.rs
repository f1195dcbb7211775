use thiserror::Error;

/// Failure taxonomy for the submission pipeline.
///
/// Transport failures (the server never answered) are kept separate from
/// HTTP error responses (the server answered with a non-2xx status) and from
/// application errors (a well-formed success response that is semantically
/// invalid, such as an empty request-id list).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any network activity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A submission is already in flight on this orchestrator.
    #[error("another submission is already in flight")]
    Busy,

    #[error("no response from server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("{0}")]
    Application(String),

    /// The active poller was cancelled through its handle.
    #[error("polling cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
