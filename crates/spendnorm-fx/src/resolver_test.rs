use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use spendnorm_core::StoreError;

use super::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[derive(Default)]
struct FakeProvider {
    quotes: HashMap<CacheKey, Decimal>,
    /// Number of leading calls that fail with a transient error.
    transient_failures: AtomicU32,
    /// Whether every call fails with a non-retriable error.
    always_fail: bool,
    calls: Mutex<Vec<CacheKey>>,
}

impl FakeProvider {
    fn with_quote(mut self, currency: &str, day: NaiveDate, rate: Decimal) -> Self {
        self.quotes.insert((currency.to_owned(), day), rate);
        self
    }

    fn calls(&self) -> Vec<CacheKey> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, FxError> {
        self.calls
            .lock()
            .unwrap()
            .push((currency.to_owned(), date));
        if self.always_fail {
            return Err(FxError::Api("quota exceeded".to_owned()));
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FxError::Store(StoreError::transient(
                "upstream",
                "connection reset",
            )));
        }
        Ok(self.quotes.get(&(currency.to_owned(), date)).copied())
    }
}

#[derive(Default)]
struct MemoryStore {
    rates: Mutex<HashMap<CacheKey, FxRate>>,
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn get_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<FxRate>, StoreError> {
        Ok(self
            .rates
            .lock()
            .unwrap()
            .get(&(currency.to_owned(), date))
            .cloned())
    }

    async fn put_rate(&self, rate: &FxRate, _source: &str) -> Result<(), StoreError> {
        self.rates
            .lock()
            .unwrap()
            .entry((rate.currency_code.clone(), rate.rate_date))
            .or_insert_with(|| rate.clone());
        Ok(())
    }
}

fn resolver(provider: Arc<FakeProvider>, store: Arc<MemoryStore>) -> FxRateResolver {
    FxRateResolver::new(provider, store, 7, BackoffPolicy::immediate(3))
}

#[tokio::test]
async fn usd_resolves_to_one_without_lookup() {
    let provider = Arc::new(FakeProvider::default());
    let r = resolver(Arc::clone(&provider), Arc::new(MemoryStore::default()));

    let rate = r.resolve("usd", date(2024, 3, 10)).await.unwrap();
    assert_eq!(rate.rate_to_usd, Decimal::ONE);
    assert_eq!(rate.rate_date, date(2024, 3, 10));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn exact_date_hit_is_fetched_once_and_persisted() {
    let provider =
        Arc::new(FakeProvider::default().with_quote("EUR", date(2024, 3, 10), dec!(1.08)));
    let store = Arc::new(MemoryStore::default());
    let r = resolver(Arc::clone(&provider), Arc::clone(&store));

    for _ in 0..3 {
        let rate = r.resolve("EUR", date(2024, 3, 10)).await.unwrap();
        assert_eq!(rate.rate_to_usd, dec!(1.08));
        assert_eq!(rate.fallback_days(), 0);
    }

    assert_eq!(provider.calls().len(), 1);
    let persisted = store.get_rate("EUR", date(2024, 3, 10)).await.unwrap();
    assert_eq!(persisted.map(|r| r.rate_to_usd), Some(dec!(1.08)));
}

#[tokio::test]
async fn persisted_rate_skips_provider() {
    let provider = Arc::new(FakeProvider::default());
    let store = Arc::new(MemoryStore::default());
    store
        .put_rate(
            &FxRate {
                currency_code: "GBP".to_owned(),
                rate_date: date(2024, 1, 2),
                rate_to_usd: dec!(1.27),
            },
            "seed",
        )
        .await
        .unwrap();
    let r = resolver(Arc::clone(&provider), store);

    let rate = r.resolve("GBP", date(2024, 1, 2)).await.unwrap();
    assert_eq!(rate.rate_to_usd, dec!(1.27));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn sunday_falls_back_to_friday() {
    // 2024-03-10 is a Sunday.
    let provider =
        Arc::new(FakeProvider::default().with_quote("JPY", date(2024, 3, 8), dec!(0.0068)));
    let store = Arc::new(MemoryStore::default());
    let r = resolver(Arc::clone(&provider), Arc::clone(&store));

    let rate = r.resolve("JPY", date(2024, 3, 10)).await.unwrap();
    assert_eq!(rate.rate_date, date(2024, 3, 8));
    assert_eq!(rate.requested_date, date(2024, 3, 10));
    assert_eq!(rate.fallback_days(), 2);
    assert_eq!(
        provider.calls(),
        vec![
            ("JPY".to_owned(), date(2024, 3, 10)),
            ("JPY".to_owned(), date(2024, 3, 9)),
            ("JPY".to_owned(), date(2024, 3, 8)),
        ]
    );

    // Only the real quote date is persisted.
    assert!(store.get_rate("JPY", date(2024, 3, 10)).await.unwrap().is_none());
    assert!(store.get_rate("JPY", date(2024, 3, 8)).await.unwrap().is_some());

    // Negative lookups are memoized too: a second resolve calls nothing.
    r.resolve("JPY", date(2024, 3, 10)).await.unwrap();
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn no_quote_within_window_is_rate_unavailable() {
    let provider =
        Arc::new(FakeProvider::default().with_quote("JPY", date(2024, 3, 1), dec!(0.0067)));
    let r = resolver(Arc::clone(&provider), Arc::new(MemoryStore::default()));

    let err = r.resolve("JPY", date(2024, 3, 10)).await.unwrap_err();
    assert!(matches!(err, FxError::RateUnavailable { ref currency, .. } if currency == "JPY"));
    // Requested day plus seven prior days.
    assert_eq!(provider.calls().len(), 8);
}

#[tokio::test]
async fn transient_provider_errors_are_retried() {
    let provider = Arc::new(FakeProvider {
        transient_failures: AtomicU32::new(2),
        ..FakeProvider::default().with_quote("CAD", date(2024, 5, 1), dec!(0.73))
    });
    let r = resolver(Arc::clone(&provider), Arc::new(MemoryStore::default()));

    let rate = r.resolve("CAD", date(2024, 5, 1)).await.unwrap();
    assert_eq!(rate.rate_to_usd, dec!(0.73));
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_rate_unavailable_and_are_not_cached() {
    let provider = Arc::new(FakeProvider {
        transient_failures: AtomicU32::new(10),
        ..FakeProvider::default().with_quote("CAD", date(2024, 5, 1), dec!(0.73))
    });
    let r = resolver(Arc::clone(&provider), Arc::new(MemoryStore::default()));

    let err = r.resolve("CAD", date(2024, 5, 1)).await.unwrap_err();
    assert!(matches!(err, FxError::RateUnavailable { .. }));
    assert_eq!(provider.calls().len(), 4, "1 try + 3 retries, no fallback scan");
    assert_eq!(r.cached_len(), 0);
}

#[tokio::test]
async fn permanent_provider_errors_are_not_retried() {
    let provider = Arc::new(FakeProvider {
        always_fail: true,
        ..FakeProvider::default()
    });
    let r = resolver(Arc::clone(&provider), Arc::new(MemoryStore::default()));

    let err = r.resolve("EUR", date(2024, 5, 1)).await.unwrap_err();
    assert!(matches!(err, FxError::RateUnavailable { ref reason, .. } if reason.contains("quota")));
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test]
async fn invalid_currency_is_rejected_before_lookup() {
    let provider = Arc::new(FakeProvider::default());
    let r = resolver(Arc::clone(&provider), Arc::new(MemoryStore::default()));

    let err = r.resolve("EURO", date(2024, 5, 1)).await.unwrap_err();
    assert!(matches!(err, FxError::InvalidCurrency(_)));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn warm_collects_successes_and_failures() {
    let provider = Arc::new(
        FakeProvider::default()
            .with_quote("EUR", date(2024, 5, 1), dec!(1.07))
            .with_quote("GBP", date(2024, 5, 1), dec!(1.25)),
    );
    let store = Arc::new(MemoryStore::default());
    let r = FxRateResolver::new(
        Arc::clone(&provider) as Arc<dyn RateProvider>,
        Arc::clone(&store) as Arc<dyn RateStore>,
        0,
        BackoffPolicy::immediate(0),
    );

    let currencies = vec!["EUR".to_owned(), "GBP".to_owned(), "HKD".to_owned()];
    let report = r.warm(&currencies, date(2024, 5, 1)).await;

    assert_eq!(report.resolved.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "HKD");
    assert!(store.get_rate("GBP", date(2024, 5, 1)).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_agree_and_fill_the_cache() {
    let provider = Arc::new(
        FakeProvider::default()
            .with_quote("EUR", date(2024, 3, 10), dec!(1.08))
            .with_quote("JPY", date(2024, 3, 8), dec!(0.0068)),
    );
    let store = Arc::new(MemoryStore::default());
    let r = Arc::new(resolver(Arc::clone(&provider), Arc::clone(&store)));

    let tasks = (0..32).map(|i| {
        let r = Arc::clone(&r);
        let currency = if i % 2 == 0 { "EUR" } else { "JPY" };
        tokio::spawn(async move { r.resolve(currency, date(2024, 3, 10)).await })
    });
    let results = futures::future::join_all(tasks).await;

    for result in results {
        let rate = result.expect("task panicked").expect("rate resolves");
        match rate.currency.as_str() {
            "EUR" => {
                assert_eq!(rate.rate_to_usd, dec!(1.08));
                assert_eq!(rate.rate_date, date(2024, 3, 10));
            }
            "JPY" => {
                assert_eq!(rate.rate_to_usd, dec!(0.0068));
                assert_eq!(rate.rate_date, date(2024, 3, 8));
            }
            other => panic!("unexpected currency {other}"),
        }
    }

    // Racing fills may duplicate provider calls, but once settled every
    // lookup is served from the cache.
    let settled = provider.calls().len();
    r.resolve("EUR", date(2024, 3, 10)).await.unwrap();
    r.resolve("JPY", date(2024, 3, 10)).await.unwrap();
    assert_eq!(provider.calls().len(), settled);
    assert_eq!(r.cached_len(), 4, "EUR 03-10 plus JPY 03-10, 03-09, 03-08");
    assert!(store.get_rate("JPY", date(2024, 3, 8)).await.unwrap().is_some());
}
