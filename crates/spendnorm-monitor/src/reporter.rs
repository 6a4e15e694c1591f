//! [`Reporter`]: the run outcome sink wired into the batch runner.

use std::sync::Arc;

use async_trait::async_trait;
use spendnorm_core::{retry_with_backoff, BackoffPolicy, RunRecord, RunReporter, RunStatus};

use crate::alert::{Alert, AlertChannel};
use crate::error::MonitorError;
use crate::heartbeat::HeartbeatClient;

pub struct Reporter {
    heartbeat: Option<HeartbeatClient>,
    alerts: Arc<dyn AlertChannel>,
    backoff: BackoffPolicy,
}

impl Reporter {
    #[must_use]
    pub fn new(
        heartbeat: Option<HeartbeatClient>,
        alerts: Arc<dyn AlertChannel>,
        backoff: BackoffPolicy,
    ) -> Self {
        if heartbeat.is_none() {
            tracing::info!("no heartbeat URL configured; liveness pings disabled");
        }
        Self {
            heartbeat,
            alerts,
            backoff,
        }
    }

    async fn ping(&self, run: &RunRecord) {
        let Some(heartbeat) = &self.heartbeat else {
            return;
        };
        let result = retry_with_backoff("heartbeat", self.backoff, MonitorError::is_transient, || {
            heartbeat.ping(run)
        })
        .await;
        match result {
            Ok(()) => tracing::debug!(run_id = run.run_id, status = %run.status, "heartbeat sent"),
            Err(e) => tracing::error!(
                run_id = run.run_id,
                error = %e,
                "monitor unreachable; heartbeat not delivered"
            ),
        }
    }

    async fn alert(&self, run: &RunRecord) {
        let Some(alert) = Alert::from_run(run) else {
            return;
        };
        let channel = self.alerts.name();
        let result = retry_with_backoff("alert", self.backoff, MonitorError::is_transient, || {
            self.alerts.send(&alert)
        })
        .await;
        match result {
            Ok(()) => tracing::info!(run_id = run.run_id, channel, "alert sent"),
            Err(e) => tracing::error!(
                run_id = run.run_id,
                channel,
                error = %e,
                "alert channel unreachable; alert not delivered"
            ),
        }
    }
}

#[async_trait]
impl RunReporter for Reporter {
    /// Heartbeat for every finished run (the failure endpoint for `failed`),
    /// then an alert for `partial` and `failed`. Delivery errors are logged.
    async fn report(&self, run: &RunRecord) {
        if run.status == RunStatus::Running {
            tracing::warn!(run_id = run.run_id, "refusing to report a run that is still running");
            return;
        }
        self.ping(run).await;
        self.alert(run).await;
    }
}
