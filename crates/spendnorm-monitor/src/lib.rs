//! Heartbeat and alerting for finished normalization runs.

pub mod alert;
pub mod error;
pub mod heartbeat;
pub mod reporter;

use std::sync::Arc;

use spendnorm_core::{AppConfig, BackoffPolicy};

pub use alert::{Alert, AlertChannel, LogAlertChannel, WebhookAlertChannel};
pub use error::MonitorError;
pub use heartbeat::HeartbeatClient;
pub use reporter::Reporter;

/// Builds the reporter described by `config`: a heartbeat client when a URL
/// is set, and a webhook alert channel or the log-only fallback.
///
/// # Errors
///
/// Returns [`MonitorError`] if a configured URL is invalid.
pub fn reporter_from_config(config: &AppConfig) -> Result<Reporter, MonitorError> {
    let heartbeat = config
        .heartbeat_url
        .as_deref()
        .map(|url| HeartbeatClient::new(url, config.heartbeat_timeout_secs))
        .transpose()?;

    let alerts: Arc<dyn AlertChannel> = match config.alert_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookAlertChannel::new(url, config.heartbeat_timeout_secs)?),
        None => {
            tracing::info!("no alert webhook configured; alerts go to the log");
            Arc::new(LogAlertChannel)
        }
    };

    let backoff = BackoffPolicy::new(config.external_max_retries, config.external_backoff_base_ms);
    Ok(Reporter::new(heartbeat, alerts, backoff))
}
