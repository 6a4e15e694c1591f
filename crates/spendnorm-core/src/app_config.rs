use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::amount::AmountRounding;
use crate::timezone::DstPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub api_keys: Vec<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub fx_api_url: String,
    pub fx_api_key: String,
    pub fx_request_timeout_secs: u64,
    pub fx_max_retries: u32,
    pub fx_retry_backoff_base_ms: u64,
    pub fx_fallback_days: u32,
    pub fx_max_concurrent_requests: usize,
    pub fx_warm_currencies: Vec<String>,

    pub canonical_timezone: Tz,
    pub dst_policy: DstPolicy,
    pub rounding: AmountRounding,

    pub pipeline_name: String,
    pub initial_window_start: DateTime<Utc>,
    pub transform_concurrency: usize,
    pub external_timeout_secs: u64,
    pub external_max_retries: u32,
    pub external_backoff_base_ms: u64,
    pub run_lock_ttl_secs: u64,
    pub ingest_grace_secs: u64,
    pub schedule_cron: String,
    pub rates_warm_cron: String,

    pub heartbeat_url: Option<String>,
    pub heartbeat_timeout_secs: u64,
    pub alert_webhook_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("fx_api_url", &self.fx_api_url)
            .field("fx_api_key", &"[redacted]")
            .field("fx_request_timeout_secs", &self.fx_request_timeout_secs)
            .field("fx_max_retries", &self.fx_max_retries)
            .field("fx_retry_backoff_base_ms", &self.fx_retry_backoff_base_ms)
            .field("fx_fallback_days", &self.fx_fallback_days)
            .field(
                "fx_max_concurrent_requests",
                &self.fx_max_concurrent_requests,
            )
            .field("fx_warm_currencies", &self.fx_warm_currencies)
            .field("canonical_timezone", &self.canonical_timezone)
            .field("dst_policy", &self.dst_policy)
            .field("rounding", &self.rounding)
            .field("pipeline_name", &self.pipeline_name)
            .field("initial_window_start", &self.initial_window_start)
            .field("transform_concurrency", &self.transform_concurrency)
            .field("external_timeout_secs", &self.external_timeout_secs)
            .field("external_max_retries", &self.external_max_retries)
            .field("external_backoff_base_ms", &self.external_backoff_base_ms)
            .field("run_lock_ttl_secs", &self.run_lock_ttl_secs)
            .field("ingest_grace_secs", &self.ingest_grace_secs)
            .field("schedule_cron", &self.schedule_cron)
            .field("rates_warm_cron", &self.rates_warm_cron)
            .field(
                "heartbeat_url",
                &self.heartbeat_url.as_ref().map(|_| "[redacted]"),
            )
            .field("heartbeat_timeout_secs", &self.heartbeat_timeout_secs)
            .field(
                "alert_webhook_url",
                &self.alert_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
