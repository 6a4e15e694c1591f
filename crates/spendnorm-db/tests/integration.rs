//! Offline unit tests for spendnorm-db pool configuration and row types.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chrono::{TimeZone, Utc};
use spendnorm_core::{
    AmountRounding, AppConfig, DstPolicy, Environment, ErrorSummary, RunRecord, RunStatus,
};
use spendnorm_db::{NormalizationRunRow, PoolConfig};
use sqlx::types::Json;
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        api_keys: vec![],
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        fx_api_url: "http://localhost".to_string(),
        fx_api_key: "key".to_string(),
        fx_request_timeout_secs: 30,
        fx_max_retries: 3,
        fx_retry_backoff_base_ms: 1000,
        fx_fallback_days: 7,
        fx_max_concurrent_requests: 2,
        fx_warm_currencies: vec!["EUR".to_string()],
        canonical_timezone: chrono_tz::America::Los_Angeles,
        dst_policy: DstPolicy::default(),
        rounding: AmountRounding::default(),
        pipeline_name: "spend_normalization".to_string(),
        initial_window_start: Utc.timestamp_opt(0, 0).unwrap(),
        transform_concurrency: 16,
        external_timeout_secs: 60,
        external_max_retries: 3,
        external_backoff_base_ms: 1000,
        run_lock_ttl_secs: 3600,
        ingest_grace_secs: 120,
        schedule_cron: "0 5 * * * *".to_string(),
        rates_warm_cron: "0 30 0 * * *".to_string(),
        heartbeat_url: None,
        heartbeat_timeout_secs: 10,
        alert_webhook_url: None,
    }
}

fn run_row(status: &str) -> NormalizationRunRow {
    NormalizationRunRow {
        id: 7,
        public_id: Uuid::new_v4(),
        window_start: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
        window_end: Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap(),
        status: status.to_string(),
        trigger_source: "scheduler".to_string(),
        row_count: 10,
        written_count: 9,
        failed_count: 1,
        error_summary: Json(ErrorSummary::default()),
        started_at: Utc.with_ymd_and_hms(2024, 3, 10, 1, 5, 0).unwrap(),
        completed_at: None,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn run_row_converts_to_run_record() {
    let record = RunRecord::try_from(run_row("partial")).expect("known status");
    assert_eq!(record.run_id, 7);
    assert_eq!(record.status, RunStatus::Partial);
    assert_eq!(record.window().end, Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap());
    assert_eq!(record.failed_count, 1);
}

#[test]
fn run_row_with_unknown_status_is_rejected() {
    let result = RunRecord::try_from(run_row("succeeded"));
    assert!(result.is_err());
}
