use thiserror::Error;

/// Errors returned by a `ConversionUploader`.
///
/// Both kinds are retryable; callers bound the number of attempts.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Network failure or timeout before a response arrived.
    #[error("ads transport failure: {0}")]
    Transport(String),

    /// The platform answered with a non-success status.
    #[error(
        "ads platform rejected the request (HTTP {status}, code {}, request id {}): {message}",
        code.as_deref().unwrap_or("-"),
        request_id.as_deref().unwrap_or("-")
    )]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
    },
}

impl UploadError {
    /// Platform request id, for support tickets.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Rejected { request_id, .. } => request_id.as_deref(),
            Self::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("timed out: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}
