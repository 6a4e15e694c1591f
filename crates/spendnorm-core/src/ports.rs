//! Collaborator contracts used by the resolver and the batch runner.
//!
//! Postgres implementations live in `spendnorm-db`; the monitor crate
//! implements [`RunReporter`]. Tests substitute in-memory versions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{CanonicalSpendRecord, FxRate, RawSpendRecord, RunRecord, Window};

/// Failure of a storage collaborator.
///
/// `transient` marks conditions worth retrying (connection loss, pool
/// timeout); everything else is treated as a hard rejection.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct StoreError {
    pub context: String,
    pub transient: bool,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StoreError {
    pub fn new(
        context: impl Into<String>,
        transient: bool,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            context: context.into(),
            transient,
            source: source.into(),
        }
    }

    pub fn transient(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(context, true, source)
    }

    pub fn permanent(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(context, false, source)
    }
}

/// Raw input feed owned by the ingestion collaborator.
#[async_trait]
pub trait SpendFeed: Send + Sync {
    /// Raw rows whose ingestion time falls in `window`, optionally limited
    /// to one account, in a stable order.
    async fn fetch_window(
        &self,
        window: &Window,
        account_id: Option<&str>,
    ) -> Result<Vec<RawSpendRecord>, StoreError>;
}

/// Canonical output store.
#[async_trait]
pub trait CanonicalSink: Send + Sync {
    /// Upserts `rows` by `idempotency_key` as a single unit: either every
    /// row is applied or none is. Returns how many stored rows changed.
    async fn upsert_canonical(&self, rows: &[CanonicalSpendRecord]) -> Result<u64, StoreError>;
}

/// Persistent tier of the FX cache.
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn get_rate(&self, currency: &str, date: NaiveDate)
        -> Result<Option<FxRate>, StoreError>;

    /// Records a published rate. Rates never change once recorded, so a
    /// second write for the same key is a no-op.
    async fn put_rate(&self, rate: &FxRate, source: &str) -> Result<(), StoreError>;
}

/// Run bookkeeping: window boundary, run lock, and run records.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// End of the last successfully written window, if any.
    async fn last_boundary(&self, pipeline: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn commit_boundary(
        &self,
        pipeline: &str,
        window_end: DateTime<Utc>,
        run_id: i64,
    ) -> Result<(), StoreError>;

    /// Takes the lock named `key` for `holder` unless another holder has an
    /// unexpired claim. Returns whether the lock was acquired.
    async fn try_acquire_lock(
        &self,
        key: &str,
        holder: Uuid,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError>;

    async fn release_lock(&self, key: &str, holder: Uuid) -> Result<(), StoreError>;

    /// Creates the run record in `running` status.
    async fn begin_run(&self, window: &Window, trigger_source: &str)
        -> Result<RunRecord, StoreError>;

    /// Persists the final status, counts, and error summary of `run`.
    async fn finalize_run(&self, run: &RunRecord) -> Result<(), StoreError>;
}

/// Outcome signalling for a finished run. Implementations must not fail:
/// delivery problems are logged and swallowed.
#[async_trait]
pub trait RunReporter: Send + Sync {
    async fn report(&self, run: &RunRecord);
}
