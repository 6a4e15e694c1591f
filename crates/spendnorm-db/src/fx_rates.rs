//! Database operations for `fx_rates`, the persistent tier of the FX cache.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use spendnorm_core::FxRate;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `fx_rates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FxRateRow {
    pub currency_code: String,
    pub rate_date: NaiveDate,
    pub rate_to_usd: Decimal,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl From<FxRateRow> for FxRate {
    fn from(row: FxRateRow) -> Self {
        Self {
            currency_code: row.currency_code,
            rate_date: row.rate_date,
            rate_to_usd: row.rate_to_usd,
        }
    }
}

/// Returns the stored quote for exactly `(currency, date)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_fx_rate(
    pool: &PgPool,
    currency: &str,
    rate_date: NaiveDate,
) -> Result<Option<FxRateRow>, DbError> {
    let row = sqlx::query_as::<_, FxRateRow>(
        "SELECT currency_code, rate_date, rate_to_usd, source, fetched_at \
         FROM fx_rates \
         WHERE currency_code = $1 AND rate_date = $2",
    )
    .bind(currency)
    .bind(rate_date)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Records a quote. An existing row for the same key is left untouched.
///
/// Returns `true` when a new row was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a non-positive
/// rate, rejected by the table's check constraint).
pub async fn insert_fx_rate(pool: &PgPool, rate: &FxRate, source: &str) -> Result<bool, DbError> {
    let rows_affected = sqlx::query(
        "INSERT INTO fx_rates (currency_code, rate_date, rate_to_usd, source) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (currency_code, rate_date) DO NOTHING",
    )
    .bind(&rate.currency_code)
    .bind(rate.rate_date)
    .bind(rate.rate_to_usd)
    .bind(source)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}
