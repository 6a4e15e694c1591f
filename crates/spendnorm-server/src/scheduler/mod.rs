//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! hourly normalization run and the daily FX rate warm-up.

use std::sync::Arc;

use chrono::{Days, Utc};
use spendnorm_core::AppConfig;
use spendnorm_fx::FxRateResolver;
use spendnorm_pipeline::{BatchRunner, RunOutcome, RunRequest, ShutdownSignal};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Everything the scheduled jobs share.
///
/// `run_guard` is held for the whole of a normalization run; shutdown
/// waits on it so the process never exits mid-run.
#[derive(Clone)]
pub struct JobContext {
    pub runner: Arc<BatchRunner>,
    pub resolver: Arc<FxRateResolver>,
    pub config: Arc<AppConfig>,
    pub shutdown: ShutdownSignal,
    pub run_guard: Arc<Mutex<()>>,
}

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(ctx: JobContext) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_normalization_job(&scheduler, ctx.clone()).await?;
    register_rates_warm_job(&scheduler, ctx).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring normalization run (`SPENDNORM_SCHEDULE_CRON`,
/// hourly by default). Each tick covers `[boundary, now)`.
async fn register_normalization_job(
    scheduler: &JobScheduler,
    ctx: JobContext,
) -> Result<(), JobSchedulerError> {
    let cron = ctx.config.schedule_cron.clone();
    let ctx = Arc::new(ctx);

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let ctx = Arc::clone(&ctx);

        Box::pin(async move {
            run_normalization_tick(&ctx).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: normalization job registered");
    Ok(())
}

async fn run_normalization_tick(ctx: &JobContext) {
    if ctx.shutdown.is_triggered() {
        tracing::info!("scheduler: shutdown in progress; skipping normalization tick");
        return;
    }
    let Ok(_guard) = ctx.run_guard.try_lock() else {
        tracing::warn!("scheduler: previous normalization run still in progress; skipping tick");
        return;
    };

    tracing::info!("scheduler: starting normalization run");
    match ctx
        .runner
        .run_once(&RunRequest::scheduled(), &ctx.shutdown)
        .await
    {
        Ok(RunOutcome::Completed { run, .. }) => {
            tracing::info!(
                run_id = run.run_id,
                status = run.status.as_str(),
                "scheduler: normalization run complete"
            );
        }
        Ok(RunOutcome::Skipped(reason)) => {
            tracing::info!(reason = ?reason, "scheduler: normalization run skipped");
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: normalization run could not start");
        }
    }
}

/// Register the daily rate warm-up (`SPENDNORM_RATES_WARM_CRON`). Warms
/// the previous UTC day, the latest day with complete quotes.
async fn register_rates_warm_job(
    scheduler: &JobScheduler,
    ctx: JobContext,
) -> Result<(), JobSchedulerError> {
    let cron = ctx.config.rates_warm_cron.clone();
    let ctx = Arc::new(ctx);

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let ctx = Arc::clone(&ctx);

        Box::pin(async move {
            let Some(date) = Utc::now().date_naive().checked_sub_days(Days::new(1)) else {
                return;
            };
            tracing::info!(%date, "scheduler: warming FX rates");
            let report = ctx.resolver.warm(&ctx.config.fx_warm_currencies, date).await;
            for (currency, error) in &report.failed {
                tracing::warn!(
                    currency = %currency,
                    %date,
                    error = %error,
                    "scheduler: rate warm failed"
                );
            }
            tracing::info!(
                resolved = report.resolved.len(),
                failed = report.failed.len(),
                "scheduler: FX rate warm complete"
            );
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: rate warm job registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_cron_expressions_are_accepted() {
        for cron in ["0 5 * * * *", "0 30 0 * * *"] {
            let job = Job::new_async(cron, |_uuid, _lock| Box::pin(async {}));
            assert!(job.is_ok(), "cron '{cron}' rejected");
        }
    }

    #[tokio::test]
    async fn malformed_cron_is_rejected() {
        let job = Job::new_async("every hour", |_uuid, _lock| Box::pin(async {}));
        assert!(job.is_err());
    }
}
