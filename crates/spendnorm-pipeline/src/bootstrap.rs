//! Production wiring: Postgres-backed ports, the HTTP rate provider, and
//! the configured reporter.

use std::sync::Arc;

use spendnorm_core::{AppConfig, BackoffPolicy, RateStore, TimezoneNormalizer};
use spendnorm_db::PgWarehouse;
use spendnorm_fx::{FxRateResolver, HttpRateProvider};
use sqlx::PgPool;

use crate::error::BootstrapError;
use crate::runner::{BatchRunner, RunnerSettings};
use crate::transformer::RecordTransformer;

/// A runner plus the resolver it shares, so callers can warm or query
/// rates against the same cache.
pub struct Pipeline {
    pub runner: BatchRunner,
    pub resolver: Arc<FxRateResolver>,
}

/// Builds the FX resolver over the persisted rate cache.
///
/// # Errors
///
/// Returns [`spendnorm_fx::FxError`] if the HTTP client or base URL is
/// invalid.
pub fn build_resolver(
    store: Arc<dyn RateStore>,
    config: &AppConfig,
) -> Result<FxRateResolver, spendnorm_fx::FxError> {
    let provider = HttpRateProvider::with_base_url(
        &config.fx_api_key,
        config.fx_request_timeout_secs,
        config.fx_max_concurrent_requests,
        &config.fx_api_url,
    )?;
    Ok(FxRateResolver::new(
        Arc::new(provider),
        store,
        config.fx_fallback_days,
        BackoffPolicy::new(config.fx_max_retries, config.fx_retry_backoff_base_ms),
    ))
}

/// Wires every collaborator from `config` onto `pool`.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the rate provider or a monitor endpoint
/// cannot be configured.
pub fn build_pipeline(pool: PgPool, config: &AppConfig) -> Result<Pipeline, BootstrapError> {
    let warehouse = Arc::new(PgWarehouse::new(pool));
    let resolver = Arc::new(build_resolver(
        Arc::clone(&warehouse) as Arc<dyn RateStore>,
        config,
    )?);
    let transformer = RecordTransformer::new(
        Arc::clone(&resolver),
        TimezoneNormalizer::new(config.canonical_timezone, config.dst_policy),
        config.rounding,
    );
    let reporter = spendnorm_monitor::reporter_from_config(config)?;
    if config.heartbeat_url.is_none() {
        tracing::warn!("SPENDNORM_HEARTBEAT_URL not set; liveness pings are disabled");
    }

    let runner = BatchRunner::new(
        Arc::clone(&warehouse) as _,
        Arc::clone(&warehouse) as _,
        warehouse,
        Arc::new(reporter),
        Arc::new(transformer),
        RunnerSettings::from_config(config),
    );
    Ok(Pipeline { runner, resolver })
}
