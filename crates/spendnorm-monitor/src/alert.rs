//! Diagnostic notifications for partial and failed runs.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Serialize;
use spendnorm_core::{RunRecord, RunStatus};

use crate::error::MonitorError;

const TOP_REASONS: usize = 5;
const SAMPLE_FAILURES: usize = 10;

/// Content of one alert, derived from a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub run_id: i64,
    pub status: RunStatus,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub row_count: i64,
    pub written_count: i64,
    pub failed_count: i64,
    /// `(reason, count)`, most frequent first.
    pub top_reasons: Vec<(String, usize)>,
    /// Distinct unrecognised timezone tags seen in the window.
    pub unknown_timezones: Vec<String>,
    pub run_error: Option<String>,
    /// A few failed rows, formatted for humans.
    pub sample_failures: Vec<String>,
}

impl Alert {
    /// Builds the alert for `run`, or `None` when the status does not need one.
    #[must_use]
    pub fn from_run(run: &RunRecord) -> Option<Self> {
        if !run.status.needs_alert() {
            return None;
        }
        let summary = &run.error_summary;
        Some(Self {
            run_id: run.run_id,
            status: run.status,
            window_start: run.window_start,
            window_end: run.window_end,
            row_count: run.row_count,
            written_count: run.written_count,
            failed_count: run.failed_count,
            top_reasons: summary
                .top_reasons(TOP_REASONS)
                .into_iter()
                .map(|(reason, n)| (reason.as_str().to_owned(), n))
                .collect(),
            unknown_timezones: summary.unknown_timezones(),
            run_error: summary.run_error.clone(),
            sample_failures: summary
                .failures
                .iter()
                .take(SAMPLE_FAILURES)
                .map(|f| {
                    format!(
                        "account={} campaign={} ts={} currency={} tz={}: {} ({})",
                        f.account_id,
                        f.campaign_id,
                        f.timestamp_source,
                        f.currency,
                        f.source_timezone,
                        f.reason,
                        f.detail
                    )
                })
                .collect(),
        })
    }

    #[must_use]
    pub fn subject(&self) -> String {
        format!(
            "spend normalization run {} {}: window {} to {}",
            self.run_id,
            self.status,
            self.window_start.to_rfc3339(),
            self.window_end.to_rfc3339()
        )
    }

    /// Plain-text body listing counts, reasons, and sample rows.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = self.subject();
        let _ = write!(
            out,
            "\nrows fetched: {}, written: {}, failed: {}",
            self.row_count, self.written_count, self.failed_count
        );
        if let Some(err) = &self.run_error {
            let _ = write!(out, "\nrun error: {err}");
        }
        if !self.top_reasons.is_empty() {
            out.push_str("\ntop reasons:");
            for (reason, n) in &self.top_reasons {
                let _ = write!(out, "\n  {reason}: {n}");
            }
        }
        if !self.unknown_timezones.is_empty() {
            let _ = write!(
                out,
                "\nunknown timezones: {}",
                self.unknown_timezones.join(", ")
            );
        }
        if !self.sample_failures.is_empty() {
            out.push_str("\nsample rows:");
            for line in &self.sample_failures {
                let _ = write!(out, "\n  {line}");
            }
        }
        out
    }
}

/// Outbound notification transport.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, alert: &Alert) -> Result<(), MonitorError>;
}

/// Writes alerts to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<(), MonitorError> {
        tracing::warn!(
            run_id = alert.run_id,
            status = %alert.status,
            failed_count = alert.failed_count,
            unknown_timezones = ?alert.unknown_timezones,
            "{}",
            alert.render_text()
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    alert: &'a Alert,
}

/// Posts alerts as JSON to a chat-style incoming webhook: a `text` field
/// with the rendered message plus the structured alert.
pub struct WebhookAlertChannel {
    client: Client,
    url: Url,
}

impl WebhookAlertChannel {
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidUrl`] if `url` does not parse, or
    /// [`MonitorError::Http`] if the HTTP client cannot be built.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("spendnorm/0.1 (alerts)")
            .build()?;
        let url = Url::parse(url).map_err(|e| MonitorError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertChannel for WebhookAlertChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), MonitorError> {
        let payload = WebhookPayload {
            text: alert.render_text(),
            alert,
        };
        self.client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "alert_test.rs"]
mod tests;
