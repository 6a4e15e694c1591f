//! Database operations for `normalization_runs`.

use chrono::{DateTime, Utc};
use spendnorm_core::{ErrorSummary, RunRecord, RunStatus, Window};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, window_start, window_end, status, trigger_source, \
                           row_count, written_count, failed_count, error_summary, \
                           started_at, completed_at";

/// A row from the `normalization_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NormalizationRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: String,
    pub trigger_source: String,
    pub row_count: i64,
    pub written_count: i64,
    pub failed_count: i64,
    pub error_summary: Json<ErrorSummary>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<NormalizationRunRow> for RunRecord {
    type Error = DbError;

    fn try_from(row: NormalizationRunRow) -> Result<Self, Self::Error> {
        let status = RunStatus::parse(&row.status).ok_or_else(|| DbError::Decode {
            table: "normalization_runs",
            reason: format!("unknown status '{}'", row.status),
        })?;
        Ok(Self {
            run_id: row.id,
            public_id: row.public_id,
            window_start: row.window_start,
            window_end: row.window_end,
            status,
            trigger_source: row.trigger_source,
            row_count: row.row_count,
            written_count: row.written_count,
            failed_count: row.failed_count,
            error_summary: row.error_summary.0,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Creates a run in `running` status with `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_run(
    pool: &PgPool,
    window: &Window,
    trigger_source: &str,
) -> Result<RunRecord, DbError> {
    let row = sqlx::query_as::<_, NormalizationRunRow>(&format!(
        "INSERT INTO normalization_runs (public_id, window_start, window_end, status, trigger_source) \
         VALUES ($1, $2, $3, 'running', $4) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(window.start)
    .bind(window.end)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    RunRecord::try_from(row)
}

/// Writes the terminal status, counts, and error summary of `run` and sets
/// `completed_at` (to `run.completed_at`, or `NOW()` when unset).
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn finalize_run(pool: &PgPool, run: &RunRecord) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE normalization_runs \
         SET status = $1, row_count = $2, written_count = $3, failed_count = $4, \
             error_summary = $5, completed_at = COALESCE($6, NOW()) \
         WHERE id = $7 AND status = 'running'",
    )
    .bind(run.status.as_str())
    .bind(run.row_count)
    .bind(run.written_count)
    .bind(run.failed_count)
    .bind(Json(&run.error_summary))
    .bind(run.completed_at)
    .bind(run.run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id: run.run_id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_run(pool: &PgPool, id: i64) -> Result<RunRecord, DbError> {
    let row = sqlx::query_as::<_, NormalizationRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM normalization_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    RunRecord::try_from(row)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<RunRecord>, DbError> {
    let rows = sqlx::query_as::<_, NormalizationRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM normalization_runs \
         ORDER BY started_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(RunRecord::try_from).collect()
}
