use thiserror::Error;

/// Typed fetch errors enabling retry classification.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Http { source: reqwest::Error, url: String },

    #[error("Disk error writing {path}: {source}")]
    Disk {
        path: String,
        source: std::io::Error,
    },

    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Request to {url} cancelled by shutdown")]
    Cancelled { url: String },
}

impl FetchError {
    /// Whether another attempt is worth making.
    ///
    /// Every HTTP status is retried, client errors included: a 404 burns the
    /// whole attempt budget exactly like a 503. Local disk failures and
    /// shutdown abort straight away.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { .. } => true,
            FetchError::Http { .. } => true,
            FetchError::Disk { .. } => false,
            FetchError::RetriesExhausted { .. } => false,
            FetchError::Cancelled { .. } => false,
        }
    }
}
