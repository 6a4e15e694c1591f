use rust_decimal::Decimal;
use spendnorm_core::{FailureReason, StoreError, TimezoneError};
use spendnorm_fx::FxError;
use spendnorm_monitor::MonitorError;
use thiserror::Error;

/// Why one raw row could not become a canonical row. The row is excluded
/// from the write and recorded in the run's error summary.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),

    #[error("invalid amount {0}: spend must not be negative")]
    InvalidAmount(Decimal),

    #[error("invalid amount {amount}: conversion at rate {rate} overflows")]
    AmountOverflow { amount: Decimal, rate: Decimal },

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error("missing rate: {0}")]
    MissingRate(#[source] FxError),
}

impl TransformError {
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InvalidCurrency(_) => FailureReason::InvalidCurrency,
            Self::InvalidAmount(_) | Self::AmountOverflow { .. } => FailureReason::InvalidAmount,
            Self::Timezone(TimezoneError::UnknownTimezone(_)) => FailureReason::UnknownTimezone,
            Self::Timezone(TimezoneError::NonexistentLocalTime { .. }) => {
                FailureReason::NonexistentLocalTime
            }
            Self::MissingRate(_) => FailureReason::MissingRate,
        }
    }
}

/// Run-level failures. None of these advance the window boundary.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("raw feed unavailable: {0}")]
    IngestionUnavailable(#[source] StoreError),

    #[error("canonical write failed: {0}")]
    WriteFailure(#[source] StoreError),

    #[error("run bookkeeping failed: {0}")]
    Ledger(#[source] StoreError),

    #[error("rows written but window boundary not committed: {0}")]
    BoundaryNotCommitted(#[source] StoreError),

    #[error("all {0} rows failed transformation")]
    AllRowsFailed(i64),

    #[error("cancelled by shutdown before write")]
    Cancelled,

    #[error("invalid window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },
}

/// Wiring failures while building the pipeline from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Fx(#[from] FxError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}
