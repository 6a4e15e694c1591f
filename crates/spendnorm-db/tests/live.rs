//! Live integration tests for spendnorm-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/spendnorm-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use spendnorm_core::{
    CanonicalSink, CanonicalSpendRecord, ErrorSummary, FailureReason, FxRate, RateStore,
    RawSpendRecord, RowFailure, RunLedger, RunStatus, SpendFeed, Window,
};
use spendnorm_db::{
    count_canonical_records, create_run, fetch_raw_window, finalize_run, get_canonical_record,
    get_fx_rate, get_run, get_watermark, insert_fx_rate, insert_raw_record, list_runs,
    release_run_lock, set_watermark, try_acquire_run_lock, upsert_canonical_records, DbError,
    PgWarehouse,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn naive(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn raw(account: &str, ts: &str, ingested_at: DateTime<Utc>) -> RawSpendRecord {
    RawSpendRecord {
        account_id: account.to_string(),
        campaign_id: "cmp-1".to_string(),
        timestamp_source: naive(ts),
        currency: "EUR".to_string(),
        amount: dec!(100),
        source_timezone: "EST".to_string(),
        ingestion_batch_id: "batch-1".to_string(),
        ingested_at,
    }
}

fn canonical(key: &str, amount_usd: rust_decimal::Decimal) -> CanonicalSpendRecord {
    let pdt = FixedOffset::west_opt(7 * 3600).unwrap();
    CanonicalSpendRecord {
        idempotency_key: key.to_string(),
        account_id: "42".to_string(),
        campaign_id: "cmp-1".to_string(),
        canonical_timestamp: pdt.with_ymd_and_hms(2024, 3, 10, 0, 30, 0).unwrap(),
        amount_usd,
        amount_original: dec!(100),
        currency_original: "EUR".to_string(),
        rate_applied: dec!(1.08),
        rate_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        timezone_original: "EST".to_string(),
        timestamp_source: naive("2024-03-10T02:30:00"),
    }
}

fn window() -> Window {
    Window::new(utc(2024, 3, 10, 0), utc(2024, 3, 10, 1))
}

// ---------------------------------------------------------------------------
// Section 1: Run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn run_lifecycle_running_to_partial(pool: sqlx::PgPool) {
    let mut run = create_run(&pool, &window(), "scheduler")
        .await
        .expect("create_run failed");
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());

    run.status = RunStatus::Partial;
    run.row_count = 3;
    run.written_count = 2;
    run.failed_count = 1;
    run.error_summary = ErrorSummary {
        failures: vec![RowFailure {
            account_id: "42".to_string(),
            campaign_id: "cmp-1".to_string(),
            timestamp_source: naive("2024-03-10T00:00:00"),
            currency: "JPY".to_string(),
            source_timezone: "EST".to_string(),
            reason: FailureReason::MissingRate,
            detail: "no quote".to_string(),
        }],
        run_error: None,
    };
    finalize_run(&pool, &run).await.expect("finalize_run failed");

    let stored = get_run(&pool, run.run_id).await.expect("get_run failed");
    assert_eq!(stored.status, RunStatus::Partial);
    assert_eq!(stored.written_count, 2);
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.error_summary.failures.len(), 1);
    assert_eq!(
        stored.error_summary.failures[0].reason,
        FailureReason::MissingRate
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn finalize_twice_is_invalid_transition(pool: sqlx::PgPool) {
    let mut run = create_run(&pool, &window(), "cli").await.unwrap();
    run.status = RunStatus::Success;
    finalize_run(&pool, &run).await.unwrap();

    let err = finalize_run(&pool, &run).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidRunTransition {
            expected_status: "running",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_missing_run_is_not_found(pool: sqlx::PgPool) {
    assert!(matches!(get_run(&pool, 999).await, Err(DbError::NotFound)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_runs_is_newest_first_and_limited(pool: sqlx::PgPool) {
    let first = create_run(&pool, &window(), "scheduler").await.unwrap();
    let second = create_run(&pool, &window(), "replay").await.unwrap();
    let _third = create_run(&pool, &window(), "cli").await.unwrap();

    let runs = list_runs(&pool, 2).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.run_id != first.run_id));
    assert!(runs.iter().any(|r| r.run_id == second.run_id));
}

// ---------------------------------------------------------------------------
// Section 2: FX rates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn fx_rate_first_write_wins(pool: sqlx::PgPool) {
    let day = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    let rate = FxRate {
        currency_code: "JPY".to_string(),
        rate_date: day,
        rate_to_usd: dec!(0.0068),
    };
    assert!(insert_fx_rate(&pool, &rate, "currencyapi").await.unwrap());

    let again = FxRate {
        rate_to_usd: dec!(0.0070),
        ..rate.clone()
    };
    assert!(!insert_fx_rate(&pool, &again, "currencyapi").await.unwrap());

    let stored = get_fx_rate(&pool, "JPY", day).await.unwrap().unwrap();
    assert_eq!(stored.rate_to_usd, dec!(0.0068));
    assert_eq!(stored.source, "currencyapi");
}

#[sqlx::test(migrations = "../../migrations")]
async fn fx_rate_rejects_non_positive(pool: sqlx::PgPool) {
    let rate = FxRate {
        currency_code: "EUR".to_string(),
        rate_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
        rate_to_usd: dec!(0),
    };
    assert!(insert_fx_rate(&pool, &rate, "test").await.is_err());
}

// ---------------------------------------------------------------------------
// Section 3: Canonical upserts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn canonical_upsert_is_idempotent(pool: sqlx::PgPool) {
    let rows = vec![canonical("k1", dec!(108.00)), canonical("k2", dec!(54.00))];

    assert_eq!(upsert_canonical_records(&pool, &rows).await.unwrap(), 2);
    assert_eq!(upsert_canonical_records(&pool, &rows).await.unwrap(), 0);
    assert_eq!(count_canonical_records(&pool).await.unwrap(), 2);

    let changed = vec![canonical("k1", dec!(109.00)), canonical("k2", dec!(54.00))];
    assert_eq!(upsert_canonical_records(&pool, &changed).await.unwrap(), 1);
    assert_eq!(count_canonical_records(&pool).await.unwrap(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn canonical_round_trip_keeps_offset(pool: sqlx::PgPool) {
    let row = canonical("k1", dec!(108.00));
    upsert_canonical_records(&pool, std::slice::from_ref(&row))
        .await
        .unwrap();

    let stored = get_canonical_record(&pool, "k1").await.unwrap();
    assert_eq!(stored, row);
    assert_eq!(
        stored.canonical_timestamp.to_rfc3339(),
        "2024-03-10T00:30:00-07:00"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_upsert_is_a_no_op(pool: sqlx::PgPool) {
    assert_eq!(upsert_canonical_records(&pool, &[]).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Section 4: Boundary and locks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn watermark_never_moves_backwards(pool: sqlx::PgPool) {
    let run = create_run(&pool, &window(), "scheduler").await.unwrap();
    assert!(get_watermark(&pool, "p").await.unwrap().is_none());

    set_watermark(&pool, "p", utc(2024, 3, 10, 2), run.run_id)
        .await
        .unwrap();
    set_watermark(&pool, "p", utc(2024, 3, 10, 1), run.run_id)
        .await
        .unwrap();

    assert_eq!(
        get_watermark(&pool, "p").await.unwrap(),
        Some(utc(2024, 3, 10, 2))
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn run_lock_excludes_other_holders(pool: sqlx::PgPool) {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let ttl = Duration::from_secs(600);

    assert!(try_acquire_run_lock(&pool, "w1", a, ttl).await.unwrap());
    assert!(!try_acquire_run_lock(&pool, "w1", b, ttl).await.unwrap());
    assert!(try_acquire_run_lock(&pool, "w1", a, ttl).await.unwrap());
    assert!(try_acquire_run_lock(&pool, "w2", b, ttl).await.unwrap());

    release_run_lock(&pool, "w1", b).await.unwrap();
    assert!(!try_acquire_run_lock(&pool, "w1", b, ttl).await.unwrap());

    release_run_lock(&pool, "w1", a).await.unwrap();
    assert!(try_acquire_run_lock(&pool, "w1", b, ttl).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn expired_run_lock_can_be_taken_over(pool: sqlx::PgPool) {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(try_acquire_run_lock(&pool, "w1", a, Duration::ZERO)
        .await
        .unwrap());
    assert!(try_acquire_run_lock(&pool, "w1", b, Duration::from_secs(60))
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Section 5: Raw feed and the port implementations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn raw_window_is_half_open_and_filters_account(pool: sqlx::PgPool) {
    insert_raw_record(&pool, &raw("42", "2024-03-09T10:00:00", utc(2024, 3, 10, 0)))
        .await
        .unwrap();
    insert_raw_record(&pool, &raw("43", "2024-03-09T11:00:00", utc(2024, 3, 10, 0)))
        .await
        .unwrap();
    // Exactly at window end: excluded.
    insert_raw_record(&pool, &raw("42", "2024-03-09T12:00:00", utc(2024, 3, 10, 1)))
        .await
        .unwrap();

    let all = fetch_raw_window(&pool, &window(), None).await.unwrap();
    assert_eq!(all.len(), 2);

    let one = fetch_raw_window(&pool, &window(), Some("43")).await.unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].account_id, "43");
}

#[sqlx::test(migrations = "../../migrations")]
async fn warehouse_implements_ports(pool: sqlx::PgPool) {
    let warehouse = PgWarehouse::new(pool.clone());

    insert_raw_record(&pool, &raw("42", "2024-03-09T10:00:00", utc(2024, 3, 10, 0)))
        .await
        .unwrap();
    let rows = warehouse.fetch_window(&window(), None).await.unwrap();
    assert_eq!(rows.len(), 1);

    let rate = FxRate {
        currency_code: "EUR".to_string(),
        rate_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        rate_to_usd: dec!(1.08),
    };
    warehouse.put_rate(&rate, "test").await.unwrap();
    assert_eq!(
        warehouse.get_rate("EUR", rate.rate_date).await.unwrap(),
        Some(rate)
    );

    let run = warehouse.begin_run(&window(), "cli").await.unwrap();
    assert_eq!(
        warehouse
            .upsert_canonical(&[canonical("k1", dec!(108.00))])
            .await
            .unwrap(),
        1
    );
    warehouse
        .commit_boundary("p", window().end, run.run_id)
        .await
        .unwrap();
    assert_eq!(
        warehouse.last_boundary("p").await.unwrap(),
        Some(window().end)
    );
}
