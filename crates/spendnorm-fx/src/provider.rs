//! HTTP client for the historical exchange-rate provider.
//!
//! Requests one `(currency, date)` quote at a time, expressed directly as
//! the amount of USD one unit of the currency buys. The API key travels in
//! the `apikey` header, never in the request URL. Concurrency against
//! the provider is bounded by a semaphore because the upstream plan is
//! rate-limited.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use spendnorm_core::USD;
use tokio::sync::Semaphore;

use crate::error::FxError;
use crate::types::HistoricalResponse;

const DEFAULT_BASE_URL: &str = "https://api.currencyapi.com/v3/";

/// Source of historical currency→USD quotes.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Short name recorded next to persisted rates.
    fn name(&self) -> &str;

    /// Quote for exactly `date`, or `None` when the provider publishes
    /// nothing for that day.
    async fn fetch_rate(&self, currency: &str, date: NaiveDate)
        -> Result<Option<Decimal>, FxError>;
}

/// Client for the `currencyapi` historical endpoint.
///
/// Use [`HttpRateProvider::new`] for production or
/// [`HttpRateProvider::with_base_url`] to point at a mock server in tests.
pub struct HttpRateProvider {
    client: Client,
    api_key: String,
    base_url: Url,
    permits: Arc<Semaphore>,
}

impl HttpRateProvider {
    /// Creates a client pointed at the production provider.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed.
    pub fn new(api_key: &str, timeout_secs: u64, max_concurrent: usize) -> Result<Self, FxError> {
        Self::with_base_url(api_key, timeout_secs, max_concurrent, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::Http`] if the `reqwest::Client` cannot be built, or
    /// [`FxError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        max_concurrent: usize,
        base_url: &str,
    ) -> Result<Self, FxError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("spendnorm/0.1 (fx-rates)")
            .build()?;

        // Exactly one trailing slash so `join` appends rather than replaces
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| FxError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Builds the historical request URL with percent-encoded query
    /// parameters.
    fn build_url(&self, currency: &str, date: NaiveDate) -> Result<Url, FxError> {
        let mut url = self
            .base_url
            .join("historical")
            .map_err(|e| FxError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("base_currency", currency);
            pairs.append_pair("currencies", USD);
            pairs.append_pair("date", &date.format("%Y-%m-%d").to_string());
        }
        Ok(url)
    }

    /// Sends a GET request and parses the body as JSON.
    ///
    /// Returns `Ok(None)` on 404, which the provider uses for days it has no
    /// data for.
    async fn request_json(&self, url: &Url) -> Result<Option<serde_json::Value>, FxError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FxError::Api("rate provider client is shut down".to_owned()))?;

        let response = self
            .client
            .get(url.clone())
            .header("apikey", &self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| FxError::Deserialize {
                context: url.to_string(),
                source: e,
            })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    fn name(&self) -> &str {
        "currencyapi"
    }

    async fn fetch_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError> {
        let url = self.build_url(currency, date)?;
        let Some(body) = self.request_json(&url).await? else {
            return Ok(None);
        };

        if let Some(message) = body.get("message").and_then(serde_json::Value::as_str) {
            if body.get("data").is_none() {
                return Err(FxError::Api(message.to_owned()));
            }
        }

        let envelope: HistoricalResponse =
            serde_json::from_value(body).map_err(|e| FxError::Deserialize {
                context: format!("historical(currency={currency}, date={date})"),
                source: e,
            })?;

        let Some(text) = envelope.data.get(USD).and_then(|v| v.as_text()) else {
            return Ok(None);
        };
        parse_rate(currency, date, &text).map(Some)
    }
}

/// Parses a provider quote, rejecting anything that is not a positive
/// decimal.
pub(crate) fn parse_rate(currency: &str, date: NaiveDate, text: &str) -> Result<Decimal, FxError> {
    let invalid = || FxError::InvalidRate {
        currency: currency.to_owned(),
        date,
        value: text.to_owned(),
    };
    let rate = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| invalid())?;
    if rate <= Decimal::ZERO {
        return Err(invalid());
    }
    Ok(rate.normalize())
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
