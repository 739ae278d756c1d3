//! Error types for the patching front-end.

/// Everything that can go wrong between the form and the diagram.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A numeric form field did not parse.
    #[error("{field} must be {expected}, got '{value}'")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    /// A numeric form field parsed but is outside what the model accepts.
    #[error("{field} is {value}, but must be below {limit}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        limit: i64,
    },

    /// Transport failure talking to the backend.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Backend answered 2xx but reported a failure in its envelope.
    #[error("backend error: {0}")]
    Backend(String),

    /// Response body was not the expected JSON.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The worker thread hung up.
    #[error("patch worker is no longer running")]
    WorkerGone,
}

pub type Result<T> = std::result::Result<T, PatchError>;
