//! FX rate resolution with a two-tier cache and backward fallback.
//!
//! Lookup order for one `(currency, date)`:
//!
//! 1. process memory (positive and negative results),
//! 2. the persistent [`RateStore`],
//! 3. the external [`RateProvider`], retried with back-off.
//!
//! When the exact day has no quote the resolver walks back one day at a
//! time, up to `fallback_days`, and returns the first quote it finds
//! together with the date it actually came from.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use spendnorm_core::{
    normalize_currency_code, retry_with_backoff, BackoffPolicy, FxRate, RateStore, USD,
};

use crate::error::FxError;
use crate::provider::RateProvider;

/// A rate that was found for a requested `(currency, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRate {
    pub currency: String,
    pub requested_date: NaiveDate,
    /// Day the quote was published for; earlier than `requested_date` when
    /// the fallback scan was used.
    pub rate_date: NaiveDate,
    pub rate_to_usd: Decimal,
}

impl ResolvedRate {
    /// Days between the requested date and the quote actually used.
    #[must_use]
    pub fn fallback_days(&self) -> i64 {
        (self.requested_date - self.rate_date).num_days()
    }
}

/// Outcome of [`FxRateResolver::warm`].
#[derive(Debug, Default)]
pub struct WarmReport {
    pub resolved: Vec<ResolvedRate>,
    pub failed: Vec<(String, String)>,
}

type CacheKey = (String, NaiveDate);

pub struct FxRateResolver {
    provider: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    memory: RwLock<HashMap<CacheKey, Option<Decimal>>>,
    fallback_days: u32,
    backoff: BackoffPolicy,
}

impl FxRateResolver {
    pub fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
        fallback_days: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            memory: RwLock::new(HashMap::new()),
            fallback_days,
            backoff,
        }
    }

    /// Resolves the currency→USD rate for `date`.
    ///
    /// USD always resolves to `1` without any lookup.
    ///
    /// # Errors
    ///
    /// - [`FxError::InvalidCurrency`] if `currency` is not a three-letter code.
    /// - [`FxError::RateUnavailable`] if no quote exists within the fallback
    ///   window, or the provider kept failing after retries.
    pub async fn resolve(&self, currency: &str, date: NaiveDate) -> Result<ResolvedRate, FxError> {
        let code = normalize_currency_code(currency)
            .ok_or_else(|| FxError::InvalidCurrency(currency.to_owned()))?;

        if code == USD {
            return Ok(ResolvedRate {
                currency: code,
                requested_date: date,
                rate_date: date,
                rate_to_usd: Decimal::ONE,
            });
        }

        for back in 0..=u64::from(self.fallback_days) {
            let Some(day) = date.checked_sub_days(Days::new(back)) else {
                break;
            };
            if let Some(rate) = self.lookup(&code, day).await? {
                if back > 0 {
                    tracing::debug!(
                        currency = %code,
                        requested = %date,
                        used = %day,
                        "using most recent prior rate"
                    );
                }
                return Ok(ResolvedRate {
                    currency: code,
                    requested_date: date,
                    rate_date: day,
                    rate_to_usd: rate,
                });
            }
        }

        Err(FxError::RateUnavailable {
            currency: code,
            date,
            reason: format!("no quote within {} day(s) before", self.fallback_days),
        })
    }

    /// Resolves and persists rates for each of `currencies` on `date`.
    /// Individual failures are collected rather than returned.
    pub async fn warm(&self, currencies: &[String], date: NaiveDate) -> WarmReport {
        let mut report = WarmReport::default();
        for currency in currencies {
            match self.resolve(currency, date).await {
                Ok(rate) => {
                    tracing::info!(
                        currency = %rate.currency,
                        date = %date,
                        rate_date = %rate.rate_date,
                        rate = %rate.rate_to_usd,
                        "rate warmed"
                    );
                    report.resolved.push(rate);
                }
                Err(e) => {
                    tracing::warn!(currency = %currency, date = %date, error = %e, "rate warm failed");
                    report.failed.push((currency.clone(), e.to_string()));
                }
            }
        }
        report
    }

    /// Number of `(currency, date)` keys held in process memory.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Quote for exactly `day`, consulting each cache tier in turn.
    async fn lookup(&self, code: &str, day: NaiveDate) -> Result<Option<Decimal>, FxError> {
        let key = (code.to_owned(), day);
        if let Some(hit) = self.memory_get(&key) {
            return Ok(hit);
        }

        match self.store.get_rate(code, day).await {
            Ok(Some(stored)) => {
                self.memory_put(key, Some(stored.rate_to_usd));
                return Ok(Some(stored.rate_to_usd));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(currency = %code, date = %day, error = %e, "rate store read failed; asking provider");
            }
        }

        let label = format!("fx {code} {day}");
        let fetched = retry_with_backoff(&label, self.backoff, FxError::is_transient, || {
            self.provider.fetch_rate(code, day)
        })
        .await
        .map_err(|e| FxError::RateUnavailable {
            currency: code.to_owned(),
            date: day,
            reason: e.to_string(),
        })?;

        match fetched {
            Some(rate) => {
                let record = FxRate {
                    currency_code: code.to_owned(),
                    rate_date: day,
                    rate_to_usd: rate,
                };
                if let Err(e) = self.store.put_rate(&record, self.provider.name()).await {
                    tracing::warn!(currency = %code, date = %day, error = %e, "failed to persist rate");
                }
                self.memory_put(key, Some(rate));
            }
            None => {
                // Today's quote may still be published later.
                if day < Utc::now().date_naive() {
                    self.memory_put(key, None);
                }
            }
        }
        Ok(fetched)
    }

    fn memory_get(&self, key: &CacheKey) -> Option<Option<Decimal>> {
        self.memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn memory_put(&self, key: CacheKey, value: Option<Decimal>) {
        self.memory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
