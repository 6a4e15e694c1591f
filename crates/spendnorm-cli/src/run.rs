//! `run` and `runs` command handlers.

use spendnorm_core::{AppConfig, RunRecord, RunStatus, Window};
use spendnorm_pipeline::{shutdown_channel, RunOutcome, RunRequest, SkipReason};

/// Build the request for a one-shot run from the CLI flags.
pub(crate) fn build_request(window: Option<Window>, account: Option<String>) -> RunRequest {
    if window.is_none() && account.is_none() {
        RunRequest::cli()
    } else {
        RunRequest::replay(window, account)
    }
}

/// Execute one normalization run and print its outcome.
///
/// Ctrl-C stops launching new transforms and skips the write; the run is
/// recorded as failed and the boundary stays where it was.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be built, the run cannot be
/// started, or the run finishes with status `failed`.
pub(crate) async fn run_normalization(
    pool: sqlx::PgPool,
    config: &AppConfig,
    window: Option<Window>,
    account: Option<String>,
) -> anyhow::Result<()> {
    let pipeline = spendnorm_pipeline::build_pipeline(pool, config)?;
    let request = build_request(window, account);

    let (trigger, signal) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling run before write");
            trigger.trigger();
        }
    });

    match pipeline.runner.run_once(&request, &signal).await? {
        RunOutcome::Skipped(SkipReason::EmptyWindow) => {
            println!("nothing to do: window is empty");
            Ok(())
        }
        RunOutcome::Skipped(SkipReason::LockHeld) => {
            anyhow::bail!("another run is already processing this window")
        }
        RunOutcome::Completed { run, .. } => {
            print_run_summary(&run);
            if run.status == RunStatus::Failed {
                anyhow::bail!(
                    "run {} failed: {}",
                    run.run_id,
                    run.error_summary
                        .run_error
                        .as_deref()
                        .unwrap_or("see run record")
                );
            }
            Ok(())
        }
    }
}

fn print_run_summary(run: &RunRecord) {
    println!(
        "run {} {}: window {} rows={} written={} failed={}",
        run.run_id,
        run.status,
        run.window(),
        run.row_count,
        run.written_count,
        run.failed_count,
    );
    for (reason, count) in run.error_summary.top_reasons(5) {
        println!("  {reason}: {count}");
    }
    let zones = run.error_summary.unknown_timezones();
    if !zones.is_empty() {
        println!("  unknown timezone tags: {}", zones.join(", "));
    }
}

/// Print the most recent runs as a table.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn list_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = spendnorm_db::list_runs(pool, limit.clamp(1, 500)).await?;

    if runs.is_empty() {
        println!("no runs recorded yet; run `spendnorm-cli run` first");
        return Ok(());
    }

    let header = format!(
        "{:<8}{:<10}{:<11}{:<27}{:<27}{:>8}{:>9}{:>8}",
        "ID", "STATUS", "TRIGGER", "WINDOW START", "WINDOW END", "ROWS", "WRITTEN", "FAILED"
    );
    println!("{header}");
    println!("{}", "-".repeat(header.len()));
    for run in &runs {
        println!(
            "{:<8}{:<10}{:<11}{:<27}{:<27}{:>8}{:>9}{:>8}",
            run.run_id,
            run.status.as_str(),
            run.trigger_source,
            run.window_start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            run.window_end.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            run.row_count,
            run.written_count,
            run.failed_count,
        );
    }
    Ok(())
}
