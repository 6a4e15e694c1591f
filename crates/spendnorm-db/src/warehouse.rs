//! [`PgWarehouse`]: the Postgres-backed implementation of every storage port.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use spendnorm_core::{
    CanonicalSink, CanonicalSpendRecord, FxRate, RateStore, RawSpendRecord, RunLedger, RunRecord,
    SpendFeed, StoreError, Window,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{canonical, fx_rates, locks, raw_spend, runs, watermarks};

#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SpendFeed for PgWarehouse {
    async fn fetch_window(
        &self,
        window: &Window,
        account_id: Option<&str>,
    ) -> Result<Vec<RawSpendRecord>, StoreError> {
        raw_spend::fetch_raw_window(&self.pool, window, account_id)
            .await
            .map_err(|e| e.into_store("fetch raw spend window"))
    }
}

#[async_trait]
impl CanonicalSink for PgWarehouse {
    async fn upsert_canonical(&self, rows: &[CanonicalSpendRecord]) -> Result<u64, StoreError> {
        canonical::upsert_canonical_records(&self.pool, rows)
            .await
            .map_err(|e| e.into_store("upsert canonical records"))
    }
}

#[async_trait]
impl RateStore for PgWarehouse {
    async fn get_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<FxRate>, StoreError> {
        fx_rates::get_fx_rate(&self.pool, currency, date)
            .await
            .map(|row| row.map(FxRate::from))
            .map_err(|e| e.into_store("read fx rate"))
    }

    async fn put_rate(&self, rate: &FxRate, source: &str) -> Result<(), StoreError> {
        fx_rates::insert_fx_rate(&self.pool, rate, source)
            .await
            .map(|_| ())
            .map_err(|e| e.into_store("write fx rate"))
    }
}

#[async_trait]
impl RunLedger for PgWarehouse {
    async fn last_boundary(&self, pipeline: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        watermarks::get_watermark(&self.pool, pipeline)
            .await
            .map_err(|e| e.into_store("read window boundary"))
    }

    async fn commit_boundary(
        &self,
        pipeline: &str,
        window_end: DateTime<Utc>,
        run_id: i64,
    ) -> Result<(), StoreError> {
        watermarks::set_watermark(&self.pool, pipeline, window_end, run_id)
            .await
            .map_err(|e| e.into_store("commit window boundary"))
    }

    async fn try_acquire_lock(
        &self,
        key: &str,
        holder: Uuid,
        ttl: std::time::Duration,
    ) -> Result<bool, StoreError> {
        locks::try_acquire_run_lock(&self.pool, key, holder, ttl)
            .await
            .map_err(|e| e.into_store("acquire run lock"))
    }

    async fn release_lock(&self, key: &str, holder: Uuid) -> Result<(), StoreError> {
        locks::release_run_lock(&self.pool, key, holder)
            .await
            .map_err(|e| e.into_store("release run lock"))
    }

    async fn begin_run(
        &self,
        window: &Window,
        trigger_source: &str,
    ) -> Result<RunRecord, StoreError> {
        runs::create_run(&self.pool, window, trigger_source)
            .await
            .map_err(|e| e.into_store("create run record"))
    }

    async fn finalize_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        runs::finalize_run(&self.pool, run)
            .await
            .map_err(|e| e.into_store("finalize run record"))
    }
}
