//! Lease-style run locks in `run_locks`.
//!
//! A lock is a row keyed by name with an expiry. Acquiring succeeds when no
//! row exists, the existing lease has expired, or the caller already holds
//! it. The expiry bounds how long a crashed holder can block later runs.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Attempts to take `lock_key` for `holder` for `ttl`.
///
/// Returns `true` when the lock is now held by `holder`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn try_acquire_run_lock(
    pool: &PgPool,
    lock_key: &str,
    holder: Uuid,
    ttl: Duration,
) -> Result<bool, DbError> {
    let rows_affected = sqlx::query(
        "INSERT INTO run_locks (lock_key, holder, acquired_at, expires_at) \
         VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3)) \
         ON CONFLICT (lock_key) DO UPDATE SET \
             holder      = EXCLUDED.holder, \
             acquired_at = EXCLUDED.acquired_at, \
             expires_at  = EXCLUDED.expires_at \
         WHERE run_locks.expires_at <= NOW() OR run_locks.holder = EXCLUDED.holder",
    )
    .bind(lock_key)
    .bind(holder)
    .bind(ttl.as_secs_f64())
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Releases `lock_key` if `holder` still owns it. Releasing a lock held by
/// someone else, or not held at all, is a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn release_run_lock(pool: &PgPool, lock_key: &str, holder: Uuid) -> Result<(), DbError> {
    sqlx::query("DELETE FROM run_locks WHERE lock_key = $1 AND holder = $2")
        .bind(lock_key)
        .bind(holder)
        .execute(pool)
        .await?;
    Ok(())
}
