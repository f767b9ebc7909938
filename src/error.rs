//! Error taxonomy shared by the queue, the strategies and the backend.

use crate::source::SourceType;

/// Errors produced while importing documents.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Caller-initiated cancellation. Always recoverable by retry.
    #[error("aborted")]
    Aborted,

    /// Transport failure talking to the backend.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status or an error envelope.
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    /// An asynchronous backend job reported `failed`.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// Orchestrator invoked for a source that has no handler for the stage.
    #[error("{kind} does not support {operation}")]
    UnsupportedSource {
        kind: SourceType,
        operation: &'static str,
    },

    /// A required input was missing before any task was created.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ImportError {
    /// Whether this rejection belongs to the abort class.
    pub fn is_abort(&self) -> bool {
        matches!(self, ImportError::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
