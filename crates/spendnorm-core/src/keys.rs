use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

/// Deterministic identity of a canonical row, derived from the raw row's
/// identity `(account_id, campaign_id, timestamp_source, currency)`.
///
/// Fields are trimmed, the currency is uppercased, and the timestamp is
/// rendered with fractional seconds only when present, so the same raw row
/// always hashes to the same key.
#[must_use]
pub fn idempotency_key(
    account_id: &str,
    campaign_id: &str,
    timestamp_source: NaiveDateTime,
    currency: &str,
) -> String {
    let input = format!(
        "{}\x00{}\x00{}\x00{}",
        account_id.trim(),
        campaign_id.trim(),
        timestamp_source.format("%Y-%m-%dT%H:%M:%S%.f"),
        currency.trim().to_ascii_uppercase(),
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
