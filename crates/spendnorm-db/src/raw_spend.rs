//! Reads from `raw_spend_records`, the ingestion collaborator's landing table.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use spendnorm_core::{RawSpendRecord, Window};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `raw_spend_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawSpendRow {
    pub id: i64,
    pub account_id: String,
    pub campaign_id: String,
    pub timestamp_source: NaiveDateTime,
    pub currency: String,
    pub amount: Decimal,
    pub source_timezone: String,
    pub ingestion_batch_id: String,
    pub ingested_at: DateTime<Utc>,
}

impl From<RawSpendRow> for RawSpendRecord {
    fn from(row: RawSpendRow) -> Self {
        Self {
            account_id: row.account_id,
            campaign_id: row.campaign_id,
            timestamp_source: row.timestamp_source,
            currency: row.currency,
            amount: row.amount,
            source_timezone: row.source_timezone,
            ingestion_batch_id: row.ingestion_batch_id,
            ingested_at: row.ingested_at,
        }
    }
}

/// Returns raw rows with `ingested_at` in `[window.start, window.end)`,
/// optionally limited to one account, ordered by ingestion time then `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn fetch_raw_window(
    pool: &PgPool,
    window: &Window,
    account_id: Option<&str>,
) -> Result<Vec<RawSpendRecord>, DbError> {
    let rows = sqlx::query_as::<_, RawSpendRow>(
        "SELECT id, account_id, campaign_id, timestamp_source, currency, amount, \
                source_timezone, ingestion_batch_id, ingested_at \
         FROM raw_spend_records \
         WHERE ingested_at >= $1 AND ingested_at < $2 \
           AND ($3::text IS NULL OR account_id = $3) \
         ORDER BY ingested_at, id",
    )
    .bind(window.start)
    .bind(window.end)
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(RawSpendRecord::from).collect())
}

/// Inserts a raw row, replacing amount and batch on identity conflict.
/// Used by fixtures and local backfills; production rows come from ingestion.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_raw_record(pool: &PgPool, record: &RawSpendRecord) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO raw_spend_records \
             (account_id, campaign_id, timestamp_source, currency, amount, \
              source_timezone, ingestion_batch_id, ingested_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (account_id, campaign_id, timestamp_source, currency) DO UPDATE SET \
             amount             = EXCLUDED.amount, \
             source_timezone    = EXCLUDED.source_timezone, \
             ingestion_batch_id = EXCLUDED.ingestion_batch_id, \
             ingested_at        = EXCLUDED.ingested_at \
         RETURNING id",
    )
    .bind(&record.account_id)
    .bind(&record.campaign_id)
    .bind(record.timestamp_source)
    .bind(&record.currency)
    .bind(record.amount)
    .bind(&record.source_timezone)
    .bind(&record.ingestion_batch_id)
    .bind(record.ingested_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
