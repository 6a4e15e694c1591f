//! Raw row → canonical row.

use std::sync::Arc;

use rust_decimal::Decimal;
use spendnorm_core::{
    idempotency_key, normalize_currency_code, AmountRounding, CanonicalSpendRecord,
    RawSpendRecord, SourceTimezone, TimezoneNormalizer,
};
use spendnorm_fx::FxRateResolver;

use crate::error::TransformError;

/// Maps one [`RawSpendRecord`] to one [`CanonicalSpendRecord`].
///
/// Validation happens before any rate lookup, so malformed rows never cost
/// a provider call. The only I/O is the resolver's.
pub struct RecordTransformer {
    resolver: Arc<FxRateResolver>,
    normalizer: TimezoneNormalizer,
    rounding: AmountRounding,
}

impl RecordTransformer {
    #[must_use]
    pub fn new(
        resolver: Arc<FxRateResolver>,
        normalizer: TimezoneNormalizer,
        rounding: AmountRounding,
    ) -> Self {
        Self {
            resolver,
            normalizer,
            rounding,
        }
    }

    /// # Errors
    ///
    /// Returns a [`TransformError`] whose [`reason`](TransformError::reason)
    /// classifies the failure. No partial output is produced.
    pub async fn transform(
        &self,
        raw: &RawSpendRecord,
    ) -> Result<CanonicalSpendRecord, TransformError> {
        let currency = normalize_currency_code(&raw.currency)
            .ok_or_else(|| TransformError::InvalidCurrency(raw.currency.clone()))?;
        if raw.amount < Decimal::ZERO {
            return Err(TransformError::InvalidAmount(raw.amount));
        }
        let source: SourceTimezone = raw.source_timezone.parse()?;
        let canonical_timestamp = self
            .normalizer
            .to_canonical(raw.timestamp_source, source)?
            .fixed_offset();

        // The trading day is the calendar date where the spend happened,
        // before any zone shift.
        let trading_day = raw.timestamp_source.date();
        let rate = self
            .resolver
            .resolve(&currency, trading_day)
            .await
            .map_err(TransformError::MissingRate)?;
        let amount_usd = self
            .rounding
            .convert(raw.amount, rate.rate_to_usd)
            .ok_or(TransformError::AmountOverflow {
                amount: raw.amount,
                rate: rate.rate_to_usd,
            })?;

        Ok(CanonicalSpendRecord {
            idempotency_key: idempotency_key(
                &raw.account_id,
                &raw.campaign_id,
                raw.timestamp_source,
                &currency,
            ),
            account_id: raw.account_id.trim().to_owned(),
            campaign_id: raw.campaign_id.trim().to_owned(),
            canonical_timestamp,
            amount_usd,
            amount_original: raw.amount,
            currency_original: currency,
            rate_applied: rate.rate_to_usd,
            rate_date: rate.rate_date,
            timezone_original: source.code().to_owned(),
            timestamp_source: raw.timestamp_source,
        })
    }
}

#[cfg(test)]
#[path = "transformer_test.rs"]
mod tests;
