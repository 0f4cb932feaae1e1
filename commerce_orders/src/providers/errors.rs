use thiserror::Error;

/// Errors that can occur within an `OrderProvider` implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, timeout, or a 5xx answer. Safe to retry later.
    #[error("transient commerce API failure: {0}")]
    Transient(String),

    /// The API kept answering 429 after the in-process backoff was used up.
    #[error("commerce API still throttling after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// A bot-protection challenge page (HTML 403). Retrying makes it worse.
    #[error("request blocked by bot protection (HTTP {status})")]
    Blocked { status: u16 },

    /// Credentials were rejected. Needs operator action.
    #[error("commerce API rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success answer; `body` is truncated for diagnostics.
    #[error("commerce API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl ProviderError {
    /// Whether a later attempt may succeed without anyone intervening.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transient(format!("timed out: {e}"))
        } else {
            Self::Transient(e.to_string())
        }
    }
}
