use thiserror::Error;

/// Errors from the fetch layer. `retryable` decides whether the fetcher
/// spends another attempt or fails the branch immediately.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed response for {url}: {detail}")]
    Malformed { url: String, detail: String },

    #[error("retry budget exhausted for {key} after {attempts} attempts: {last}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        last: String,
    },
}

impl FetchError {
    /// Connect/timeout failures, 429 and 5xx are transient; everything
    /// else is terminal on the first occurrence.
    pub fn retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Malformed { .. } | FetchError::RetriesExhausted { .. } => false,
        }
    }
}

/// Run-setup errors. Branch-level fetch and store failures never bubble
/// up this far; the orchestrator records them as `BranchFailure`s.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown source provider '{0}' (expected 'live' or 'archive')")]
    UnknownProvider(String),
}
