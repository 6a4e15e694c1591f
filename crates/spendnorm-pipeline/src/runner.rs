//! One normalization run: window → lock → fetch → transform → write →
//! report.
//!
//! Run-level failures never escape as errors once the run record exists:
//! they become a `failed` run that is finalized and reported like any
//! other. Only problems that prevent a run record from being created at
//! all are returned as [`RunnerError`].

use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use spendnorm_core::{
    retry_with_backoff, AppConfig, BackoffPolicy, CanonicalSink, CanonicalSpendRecord,
    RawSpendRecord, RowFailure, RunLedger, RunRecord, RunReporter, RunStatus, SpendFeed,
    StoreError, TriggerSource, Window,
};
use uuid::Uuid;

use crate::error::{RunnerError, TransformError};
use crate::shutdown::ShutdownSignal;
use crate::transformer::RecordTransformer;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Name of the persisted window boundary and prefix of the lock key.
    pub pipeline: String,
    /// Window start used before any boundary has been committed.
    pub initial_window_start: DateTime<Utc>,
    pub concurrency: usize,
    /// Upper bound on each external call attempt.
    pub external_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub lock_ttl: Duration,
    /// How far behind now an open-ended window stops, so rows whose ingest
    /// transaction is still in flight land in the next window.
    pub ingest_grace: Duration,
}

impl RunnerSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pipeline: config.pipeline_name.clone(),
            initial_window_start: config.initial_window_start,
            concurrency: config.transform_concurrency.max(1),
            external_timeout: Duration::from_secs(config.external_timeout_secs),
            backoff: BackoffPolicy::new(
                config.external_max_retries,
                config.external_backoff_base_ms,
            ),
            lock_ttl: Duration::from_secs(config.run_lock_ttl_secs),
            ingest_grace: Duration::from_secs(config.ingest_grace_secs),
        }
    }
}

/// What to process. The default request is a scheduled run over
/// `[boundary, now)`.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub trigger: TriggerSource,
    /// Explicit window; replaces the persisted boundary.
    pub window: Option<Window>,
    pub account_id: Option<String>,
    /// End of the window when no explicit window is given. Defaults to now
    /// minus the ingest grace period.
    pub until: Option<DateTime<Utc>>,
}

impl RunRequest {
    #[must_use]
    pub fn scheduled() -> Self {
        Self {
            trigger: TriggerSource::Scheduler,
            window: None,
            account_id: None,
            until: None,
        }
    }

    #[must_use]
    pub fn cli() -> Self {
        Self {
            trigger: TriggerSource::Cli,
            ..Self::scheduled()
        }
    }

    #[must_use]
    pub fn replay(window: Option<Window>, account_id: Option<String>) -> Self {
        Self {
            trigger: TriggerSource::Replay,
            window,
            account_id,
            until: None,
        }
    }

    /// Only complete, boundary-driven runs may move the boundary. Replays
    /// and account-filtered runs cover a subset of the data.
    #[must_use]
    pub fn advances_boundary(&self) -> bool {
        self.trigger != TriggerSource::Replay && self.window.is_none() && self.account_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Fetching,
    Transforming,
    Writing,
    Reporting,
}

impl RunPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Writing => "writing",
            Self::Reporting => "reporting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyWindow,
    /// Another holder owns the lock for this window start.
    LockHeld,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        run: RunRecord,
        /// Phases visited, in order, starting and ending at `Idle`.
        phases: Vec<RunPhase>,
    },
    Skipped(SkipReason),
}

impl RunOutcome {
    #[must_use]
    pub fn run(&self) -> Option<&RunRecord> {
        match self {
            Self::Completed { run, .. } => Some(run),
            Self::Skipped(_) => None,
        }
    }
}

struct PhaseLog {
    run_id: i64,
    phases: Vec<RunPhase>,
}

impl PhaseLog {
    fn new(run_id: i64) -> Self {
        Self {
            run_id,
            phases: vec![RunPhase::Idle],
        }
    }

    fn enter(&mut self, next: RunPhase) {
        let from = self.phases.last().copied().unwrap_or(RunPhase::Idle);
        tracing::debug!(
            run_id = self.run_id,
            from = from.as_str(),
            to = next.as_str(),
            "run phase"
        );
        self.phases.push(next);
    }
}

pub struct BatchRunner {
    feed: Arc<dyn SpendFeed>,
    sink: Arc<dyn CanonicalSink>,
    ledger: Arc<dyn RunLedger>,
    reporter: Arc<dyn RunReporter>,
    transformer: Arc<RecordTransformer>,
    settings: RunnerSettings,
}

impl BatchRunner {
    #[must_use]
    pub fn new(
        feed: Arc<dyn SpendFeed>,
        sink: Arc<dyn CanonicalSink>,
        ledger: Arc<dyn RunLedger>,
        reporter: Arc<dyn RunReporter>,
        transformer: Arc<RecordTransformer>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            feed,
            sink,
            ledger,
            reporter,
            transformer,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Executes one run for `request`.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::InvalidWindow`] if an explicit window ends before it
    ///   starts.
    /// - [`RunnerError::Ledger`] if the boundary, the lock, or the run record
    ///   cannot be read or created. No run is recorded in that case.
    pub async fn run_once(
        &self,
        request: &RunRequest,
        shutdown: &ShutdownSignal,
    ) -> Result<RunOutcome, RunnerError> {
        let window = self.select_window(request).await?;
        if window.is_empty() {
            tracing::info!(window = %window, "nothing to process; window is empty");
            return Ok(RunOutcome::Skipped(SkipReason::EmptyWindow));
        }

        let lock_key = window.lock_key(&self.settings.pipeline);
        let holder = Uuid::new_v4();
        let acquired = self
            .ledger
            .try_acquire_lock(&lock_key, holder, self.settings.lock_ttl)
            .await
            .map_err(RunnerError::Ledger)?;
        if !acquired {
            tracing::warn!(lock_key = %lock_key, "another run holds the lock for this window; skipping");
            return Ok(RunOutcome::Skipped(SkipReason::LockHeld));
        }

        let outcome = self.execute(request, window, shutdown).await;

        if let Err(e) = self.ledger.release_lock(&lock_key, holder).await {
            tracing::error!(lock_key = %lock_key, error = %e, "failed to release run lock; it will expire");
        }
        outcome
    }

    async fn select_window(&self, request: &RunRequest) -> Result<Window, RunnerError> {
        if let Some(window) = request.window {
            if window.start > window.end {
                return Err(RunnerError::InvalidWindow {
                    start: window.start.to_rfc3339(),
                    end: window.end.to_rfc3339(),
                });
            }
            return Ok(window);
        }

        let pipeline = self.settings.pipeline.as_str();
        let start = self
            .call_with_retry("read window boundary", || self.ledger.last_boundary(pipeline))
            .await
            .map_err(RunnerError::Ledger)?
            .unwrap_or(self.settings.initial_window_start);
        let end = match request.until {
            Some(end) => end,
            None => {
                let grace = TimeDelta::from_std(self.settings.ingest_grace)
                    .unwrap_or(TimeDelta::zero());
                Utc::now() - grace
            }
        };
        Ok(Window::new(start, end))
    }

    async fn execute(
        &self,
        request: &RunRequest,
        window: Window,
        shutdown: &ShutdownSignal,
    ) -> Result<RunOutcome, RunnerError> {
        let mut run = self
            .ledger
            .begin_run(&window, request.trigger.as_str())
            .await
            .map_err(RunnerError::Ledger)?;
        let mut phases = PhaseLog::new(run.run_id);
        tracing::info!(
            run_id = run.run_id,
            window_start = %window.start,
            window_end = %window.end,
            trigger = request.trigger.as_str(),
            account_id = request.account_id.as_deref().unwrap_or("*"),
            "normalization run started"
        );

        if let Err(e) = self
            .process(&mut run, &mut phases, request, window, shutdown)
            .await
        {
            tracing::error!(run_id = run.run_id, error = %e, "normalization run failed");
            run.status = RunStatus::Failed;
            run.error_summary.run_error = Some(e.to_string());
        }

        phases.enter(RunPhase::Reporting);
        run.completed_at = Some(Utc::now());
        let finalized = &run;
        if let Err(e) = self
            .call_with_retry("finalize run", || self.ledger.finalize_run(finalized))
            .await
        {
            tracing::error!(run_id = run.run_id, error = %e, "failed to persist run outcome");
        }
        self.reporter.report(&run).await;
        tracing::info!(
            run_id = run.run_id,
            status = run.status.as_str(),
            row_count = run.row_count,
            written_count = run.written_count,
            failed_count = run.failed_count,
            "normalization run finished"
        );
        phases.enter(RunPhase::Idle);

        Ok(RunOutcome::Completed {
            run,
            phases: phases.phases,
        })
    }

    /// Drives fetch, transform, and write, filling in `run` as it goes.
    /// An error means the run failed as a whole and must not advance the
    /// boundary.
    async fn process(
        &self,
        run: &mut RunRecord,
        phases: &mut PhaseLog,
        request: &RunRequest,
        window: Window,
        shutdown: &ShutdownSignal,
    ) -> Result<(), RunnerError> {
        let run_id = run.run_id;

        phases.enter(RunPhase::Fetching);
        let account = request.account_id.as_deref();
        let raw = self
            .call_with_retry("fetch raw window", || {
                self.feed.fetch_window(&window, account)
            })
            .await
            .map_err(RunnerError::IngestionUnavailable)?;
        run.row_count = count(raw.len());
        tracing::info!(run_id, rows = raw.len(), "fetched raw rows");

        phases.enter(RunPhase::Transforming);
        let (rows, failures) = self.transform_all(&raw, shutdown).await;
        for failure in &failures {
            tracing::warn!(
                run_id,
                account_id = %failure.account_id,
                campaign_id = %failure.campaign_id,
                timestamp_source = %failure.timestamp_source,
                currency = %failure.currency,
                reason = failure.reason.as_str(),
                detail = %failure.detail,
                "row excluded from canonical write"
            );
        }
        run.failed_count = count(failures.len());
        let any_failed = !failures.is_empty();
        run.error_summary.failures = failures;

        if shutdown.is_triggered() {
            return Err(RunnerError::Cancelled);
        }
        if rows.is_empty() && !raw.is_empty() {
            return Err(RunnerError::AllRowsFailed(run.row_count));
        }

        if !rows.is_empty() {
            phases.enter(RunPhase::Writing);
            let changed = self
                .call_with_retry("upsert canonical rows", || self.sink.upsert_canonical(&rows))
                .await
                .map_err(RunnerError::WriteFailure)?;
            run.written_count = i64::try_from(changed).unwrap_or(i64::MAX);
        }

        if request.advances_boundary() {
            let pipeline = self.settings.pipeline.as_str();
            self.call_with_retry("commit window boundary", || {
                self.ledger.commit_boundary(pipeline, window.end, run_id)
            })
            .await
            .map_err(RunnerError::BoundaryNotCommitted)?;
        }

        run.status = if any_failed {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        Ok(())
    }

    /// Transforms every row concurrently. Once shutdown is requested no new
    /// transforms start; those already running are drained.
    async fn transform_all(
        &self,
        raw: &[RawSpendRecord],
        shutdown: &ShutdownSignal,
    ) -> (Vec<CanonicalSpendRecord>, Vec<RowFailure>) {
        let transformer = self.transformer.as_ref();
        let mut results: Vec<(usize, Result<CanonicalSpendRecord, TransformError>)> =
            stream::iter(raw.iter().enumerate())
                .take_while(|_| future::ready(!shutdown.is_triggered()))
                .map(|(index, row)| async move { (index, transformer.transform(row).await) })
                .boxed()
                .buffer_unordered(self.settings.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut rows = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (index, result) in results {
            match result {
                Ok(row) => rows.push(row),
                Err(e) => failures.push(row_failure(&raw[index], &e)),
            }
        }
        (rows, failures)
    }

    /// Runs one external call with a per-attempt timeout, retrying
    /// transient failures per the configured back-off.
    async fn call_with_retry<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.settings.external_timeout;
        retry_with_backoff(
            label,
            self.settings.backoff,
            |e: &StoreError| e.transient,
            || {
                let attempt = op();
                async move {
                    match tokio::time::timeout(timeout, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(StoreError::transient(
                            label,
                            format!("timed out after {}s", timeout.as_secs_f64()),
                        )),
                    }
                }
            },
        )
        .await
    }
}

fn row_failure(raw: &RawSpendRecord, error: &TransformError) -> RowFailure {
    RowFailure {
        account_id: raw.account_id.clone(),
        campaign_id: raw.campaign_id.clone(),
        timestamp_source: raw.timestamp_source,
        currency: raw.currency.clone(),
        source_timezone: raw.source_timezone.clone(),
        reason: error.reason(),
        detail: error.to_string(),
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plain_runs_advance_the_boundary() {
        assert!(RunRequest::scheduled().advances_boundary());
        assert!(RunRequest::cli().advances_boundary());
        assert!(!RunRequest::replay(None, None).advances_boundary());

        let filtered = RunRequest {
            account_id: Some("42".to_owned()),
            ..RunRequest::cli()
        };
        assert!(!filtered.advances_boundary());

        let explicit = RunRequest {
            window: Some(Window::new(Utc::now(), Utc::now())),
            ..RunRequest::cli()
        };
        assert!(!explicit.advances_boundary());
    }

    #[test]
    fn phase_log_starts_idle() {
        let mut log = PhaseLog::new(7);
        log.enter(RunPhase::Fetching);
        assert_eq!(log.phases, vec![RunPhase::Idle, RunPhase::Fetching]);
    }
}
