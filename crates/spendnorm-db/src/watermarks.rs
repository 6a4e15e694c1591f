//! Persisted window boundary per pipeline (`pipeline_watermarks`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// End of the last successfully written window for `pipeline`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_watermark(pool: &PgPool, pipeline: &str) -> Result<Option<DateTime<Utc>>, DbError> {
    let end = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT window_end FROM pipeline_watermarks WHERE pipeline = $1",
    )
    .bind(pipeline)
    .fetch_optional(pool)
    .await?;
    Ok(end)
}

/// Advances the boundary for `pipeline` to `window_end`. The stored value
/// never moves backwards.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_watermark(
    pool: &PgPool,
    pipeline: &str,
    window_end: DateTime<Utc>,
    run_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO pipeline_watermarks (pipeline, window_end, last_run_id) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (pipeline) DO UPDATE SET \
             window_end  = GREATEST(pipeline_watermarks.window_end, EXCLUDED.window_end), \
             last_run_id = EXCLUDED.last_run_id, \
             updated_at  = NOW()",
    )
    .bind(pipeline)
    .bind(window_end)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}
