use chrono::NaiveDate;
use spendnorm_core::StoreError;
use thiserror::Error;

/// Errors returned by the rate provider client and the resolver.
#[derive(Debug, Error)]
pub enum FxError {
    /// Network, TLS, timeout, or non-2xx status from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned an error envelope instead of rate data.
    #[error("rate provider error: {0}")]
    Api(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The provider published a value that is not a positive decimal.
    #[error("invalid rate for {currency} on {date}: {value}")]
    InvalidRate {
        currency: String,
        date: NaiveDate,
        value: String,
    },

    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error("invalid provider base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// No rate could be resolved for the requested day or any day in the
    /// fallback window, or the provider kept failing.
    #[error("no {currency} rate available for {date}: {reason}")]
    RateUnavailable {
        currency: String,
        date: NaiveDate,
        reason: String,
    },
}

impl FxError {
    /// Whether a retry might succeed: timeouts, connection failures, 5xx and
    /// 429 responses, and transient store errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status.as_u16() == 429
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            Self::Store(e) => e.transient,
            _ => false,
        }
    }
}
