use thiserror::Error;

/// Delivery failures of the liveness ping or alert channel. Never
/// propagated past the reporter; logged instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid monitor URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl MonitorError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => match e.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => e.is_timeout() || e.is_connect() || e.is_request(),
            },
            Self::InvalidUrl { .. } => false,
        }
    }
}
