//! Database operations for `canonical_spend_records`.
//!
//! `canonical_timestamp` is stored as `TIMESTAMPTZ` (an instant) alongside the
//! canonical wall-clock time and its UTC offset, so downstream readers can
//! show local time without re-deriving daylight-saving rules.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use spendnorm_core::CanonicalSpendRecord;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
struct CanonicalRow {
    idempotency_key: String,
    account_id: String,
    campaign_id: String,
    canonical_timestamp: DateTime<Utc>,
    canonical_utc_offset: i32,
    amount_usd: Decimal,
    amount_original: Decimal,
    currency_original: String,
    rate_applied: Decimal,
    rate_date: NaiveDate,
    timezone_original: String,
    timestamp_source: NaiveDateTime,
}

impl TryFrom<CanonicalRow> for CanonicalSpendRecord {
    type Error = DbError;

    fn try_from(row: CanonicalRow) -> Result<Self, Self::Error> {
        let offset = FixedOffset::east_opt(row.canonical_utc_offset).ok_or_else(|| {
            DbError::Decode {
                table: "canonical_spend_records",
                reason: format!("utc offset {} out of range", row.canonical_utc_offset),
            }
        })?;
        Ok(Self {
            idempotency_key: row.idempotency_key,
            account_id: row.account_id,
            campaign_id: row.campaign_id,
            canonical_timestamp: row.canonical_timestamp.with_timezone(&offset),
            amount_usd: row.amount_usd,
            amount_original: row.amount_original,
            currency_original: row.currency_original,
            rate_applied: row.rate_applied,
            rate_date: row.rate_date,
            timezone_original: row.timezone_original,
            timestamp_source: row.timestamp_source,
        })
    }
}

/// Upserts `records` by `idempotency_key` inside one transaction.
///
/// Rows whose stored values already match are not touched, so the returned
/// count is the number of rows inserted or actually changed. Either every
/// record is applied or, on error, none is.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails.
pub async fn upsert_canonical_records(
    pool: &PgPool,
    records: &[CanonicalSpendRecord],
) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut changed = 0u64;

    for record in records {
        let ts = record.canonical_timestamp;
        changed += sqlx::query(
            "INSERT INTO canonical_spend_records \
                 (idempotency_key, account_id, campaign_id, canonical_timestamp, \
                  canonical_local_time, canonical_utc_offset, amount_usd, amount_original, \
                  currency_original, rate_applied, rate_date, timezone_original, \
                  timestamp_source) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (idempotency_key) DO UPDATE SET \
                 account_id           = EXCLUDED.account_id, \
                 campaign_id          = EXCLUDED.campaign_id, \
                 canonical_timestamp  = EXCLUDED.canonical_timestamp, \
                 canonical_local_time = EXCLUDED.canonical_local_time, \
                 canonical_utc_offset = EXCLUDED.canonical_utc_offset, \
                 amount_usd           = EXCLUDED.amount_usd, \
                 amount_original      = EXCLUDED.amount_original, \
                 currency_original    = EXCLUDED.currency_original, \
                 rate_applied         = EXCLUDED.rate_applied, \
                 rate_date            = EXCLUDED.rate_date, \
                 timezone_original    = EXCLUDED.timezone_original, \
                 timestamp_source     = EXCLUDED.timestamp_source, \
                 updated_at           = NOW() \
             WHERE (canonical_spend_records.canonical_timestamp, \
                    canonical_spend_records.canonical_utc_offset, \
                    canonical_spend_records.amount_usd, \
                    canonical_spend_records.amount_original, \
                    canonical_spend_records.rate_applied, \
                    canonical_spend_records.rate_date, \
                    canonical_spend_records.timezone_original) \
                 IS DISTINCT FROM \
                   (EXCLUDED.canonical_timestamp, EXCLUDED.canonical_utc_offset, \
                    EXCLUDED.amount_usd, EXCLUDED.amount_original, EXCLUDED.rate_applied, \
                    EXCLUDED.rate_date, EXCLUDED.timezone_original)",
        )
        .bind(&record.idempotency_key)
        .bind(&record.account_id)
        .bind(&record.campaign_id)
        .bind(ts.with_timezone(&Utc))
        .bind(ts.naive_local())
        .bind(ts.offset().local_minus_utc())
        .bind(record.amount_usd)
        .bind(record.amount_original)
        .bind(&record.currency_original)
        .bind(record.rate_applied)
        .bind(record.rate_date)
        .bind(&record.timezone_original)
        .bind(record.timestamp_source)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    Ok(changed)
}

/// Fetches one canonical row by its idempotency key.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has the key, [`DbError::Decode`]
/// if the stored offset is invalid, or [`DbError::Sqlx`] if the query fails.
pub async fn get_canonical_record(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<CanonicalSpendRecord, DbError> {
    let row = sqlx::query_as::<_, CanonicalRow>(
        "SELECT idempotency_key, account_id, campaign_id, canonical_timestamp, \
                canonical_utc_offset, amount_usd, amount_original, currency_original, \
                rate_applied, rate_date, timezone_original, timestamp_source \
         FROM canonical_spend_records \
         WHERE idempotency_key = $1",
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    CanonicalSpendRecord::try_from(row)
}

/// Total number of canonical rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_canonical_records(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM canonical_spend_records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
