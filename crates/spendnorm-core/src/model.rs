//! Domain records flowing through the normalization pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The canonical reporting currency.
pub const USD: &str = "USD";

/// Uppercases and validates an ISO-4217-style currency code (three ASCII
/// letters). Returns `None` for anything else.
#[must_use]
pub fn normalize_currency_code(raw: &str) -> Option<String> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// One row of spend as delivered by the ingestion collaborator.
///
/// `timestamp_source` is naive wall-clock time in the account's zone, which
/// is carried as the raw tag in `source_timezone` and only validated when the
/// row is transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpendRecord {
    pub account_id: String,
    pub campaign_id: String,
    pub timestamp_source: NaiveDateTime,
    pub currency: String,
    pub amount: Decimal,
    pub source_timezone: String,
    pub ingestion_batch_id: String,
    /// When ingestion landed the row; windows are cut on this column.
    pub ingested_at: DateTime<Utc>,
}

/// A historical currency→USD rate as published by the rate provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxRate {
    pub currency_code: String,
    pub rate_date: NaiveDate,
    pub rate_to_usd: Decimal,
}

/// A spend row normalized to the canonical zone and USD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSpendRecord {
    pub idempotency_key: String,
    pub account_id: String,
    pub campaign_id: String,
    pub canonical_timestamp: DateTime<FixedOffset>,
    pub amount_usd: Decimal,
    pub amount_original: Decimal,
    pub currency_original: String,
    pub rate_applied: Decimal,
    /// Date of the published rate actually used; earlier than the spend
    /// date when the resolver fell back over a weekend or holiday.
    pub rate_date: NaiveDate,
    pub timezone_original: String,
    pub timestamp_source: NaiveDateTime,
}

/// Half-open ingestion-time range `[start, end)` a run is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Key used for the run lock: two runs starting from the same boundary
    /// are competing for the same data regardless of where they end.
    #[must_use]
    pub fn lock_key(&self, pipeline: &str) -> String {
        format!("{pipeline}:{}", self.start.to_rfc3339())
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// `partial` and `failed` runs page a human.
    #[must_use]
    pub fn needs_alert(self) -> bool {
        matches!(self, Self::Partial | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduler,
    Cli,
    Replay,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Cli => "cli",
            Self::Replay => "replay",
        }
    }
}

/// Machine-readable reason a row was excluded from a canonical write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MissingRate,
    UnknownTimezone,
    InvalidCurrency,
    InvalidAmount,
    NonexistentLocalTime,
}

impl FailureReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingRate => "missing_rate",
            Self::UnknownTimezone => "unknown_timezone",
            Self::InvalidCurrency => "invalid_currency",
            Self::InvalidAmount => "invalid_amount",
            Self::NonexistentLocalTime => "nonexistent_local_time",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw row that could not be transformed, kept for manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub account_id: String,
    pub campaign_id: String,
    pub timestamp_source: NaiveDateTime,
    pub currency: String,
    pub source_timezone: String,
    pub reason: FailureReason,
    pub detail: String,
}

/// Row-level failures plus the run-level error (if any) for one run.
/// Persisted as JSON on the run record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    #[serde(default)]
    pub failures: Vec<RowFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_error: Option<String>,
}

impl ErrorSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.run_error.is_none()
    }

    /// Failure reasons ordered by descending count, ties by reason name.
    #[must_use]
    pub fn top_reasons(&self, limit: usize) -> Vec<(FailureReason, usize)> {
        let mut counts: BTreeMap<FailureReason, usize> = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.reason).or_default() += 1;
        }
        let mut ranked: Vec<(FailureReason, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Distinct timezone tags that failed with `unknown_timezone`, sorted.
    #[must_use]
    pub fn unknown_timezones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self
            .failures
            .iter()
            .filter(|f| f.reason == FailureReason::UnknownTimezone)
            .map(|f| f.source_timezone.clone())
            .collect();
        zones.sort();
        zones.dedup();
        zones
    }
}

/// Operational record of a single runner execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: i64,
    pub public_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: RunStatus,
    pub trigger_source: String,
    /// Raw rows fetched for the window.
    pub row_count: i64,
    /// Canonical rows whose stored values changed on this run.
    pub written_count: i64,
    pub failed_count: i64,
    pub error_summary: ErrorSummary,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    #[must_use]
    pub fn window(&self) -> Window {
        Window::new(self.window_start, self.window_end)
    }
}
