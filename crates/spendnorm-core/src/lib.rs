//! Shared domain types, configuration, and pure normalization helpers for
//! the spend normalization pipeline.
//!
//! Everything in this crate is free of I/O except [`retry`], which only
//! sleeps between attempts. Collaborators (raw feed, warehouse, rate store,
//! reporter) are described by the traits in [`ports`] and implemented in
//! the `spendnorm-db` and `spendnorm-monitor` crates.

pub mod amount;
pub mod app_config;
pub mod config;
pub mod keys;
pub mod model;
pub mod ports;
pub mod retry;
pub mod timezone;

use thiserror::Error;

pub use amount::{AmountRounding, RoundingRule};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use keys::idempotency_key;
pub use model::{
    normalize_currency_code, CanonicalSpendRecord, ErrorSummary, FailureReason, FxRate,
    RawSpendRecord, RowFailure, RunRecord, RunStatus, TriggerSource, Window, USD,
};
pub use ports::{CanonicalSink, RateStore, RunLedger, RunReporter, SpendFeed, StoreError};
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use timezone::{
    AmbiguousTimePolicy, DstPolicy, SkippedTimePolicy, SourceTimezone, TimezoneError,
    TimezoneNormalizer,
};

/// Errors raised while loading [`AppConfig`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
