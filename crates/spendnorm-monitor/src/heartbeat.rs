//! Liveness ping to a healthchecks-style endpoint.
//!
//! Success and partial runs POST to the configured URL; failed runs POST to
//! `<url>/fail`. The body carries a small JSON summary of the run.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Serialize;
use spendnorm_core::{RunRecord, RunStatus};

use crate::error::MonitorError;

#[derive(Debug, Serialize)]
struct PingBody<'a> {
    run_id: i64,
    status: &'a str,
    window_start: String,
    window_end: String,
    row_count: i64,
    written_count: i64,
    failed_count: i64,
}

pub struct HeartbeatClient {
    client: Client,
    url: Url,
}

impl HeartbeatClient {
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidUrl`] if `url` does not parse, or
    /// [`MonitorError::Http`] if the HTTP client cannot be built.
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("spendnorm/0.1 (heartbeat)")
            .build()?;
        let url = Url::parse(url.trim_end_matches('/')).map_err(|e| MonitorError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, url })
    }

    /// Endpoint for `status`: the base URL, or its `/fail` variant.
    #[must_use]
    pub fn endpoint(&self, status: RunStatus) -> String {
        if status == RunStatus::Failed {
            format!("{}/fail", self.url.as_str().trim_end_matches('/'))
        } else {
            self.url.to_string()
        }
    }

    /// Sends one ping describing `run`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Http`] on network failure or a non-2xx status.
    pub async fn ping(&self, run: &RunRecord) -> Result<(), MonitorError> {
        let body = PingBody {
            run_id: run.run_id,
            status: run.status.as_str(),
            window_start: run.window_start.to_rfc3339(),
            window_end: run.window_end.to_rfc3339(),
            row_count: run.row_count,
            written_count: run.written_count,
            failed_count: run.failed_count,
        };
        self.client
            .post(self.endpoint(run.status))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
