use rust_decimal_macros::dec;

use super::*;

fn test_client(base_url: &str) -> HttpRateProvider {
    HttpRateProvider::with_base_url("test-key", 30, 2, base_url)
        .expect("client construction should not fail")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn build_url_constructs_correct_query_string() {
    let client = test_client("https://api.currencyapi.com/v3");
    let url = client.build_url("EUR", date(2024, 3, 10)).unwrap();
    assert_eq!(
        url.as_str(),
        "https://api.currencyapi.com/v3/historical?base_currency=EUR&currencies=USD&date=2024-03-10"
    );
}

#[test]
fn build_url_strips_duplicate_trailing_slashes() {
    let client = test_client("https://api.currencyapi.com/v3//");
    let url = client.build_url("JPY", date(2024, 3, 8)).unwrap();
    assert!(
        url.as_str()
            .starts_with("https://api.currencyapi.com/v3/historical?"),
        "unexpected url: {url}"
    );
}

#[test]
fn with_base_url_rejects_garbage() {
    let result = HttpRateProvider::with_base_url("k", 30, 1, "not a url");
    assert!(matches!(result, Err(FxError::InvalidBaseUrl { .. })));
}

#[test]
fn build_url_never_carries_api_key() {
    let client = test_client("https://api.currencyapi.com/v3");
    let url = client.build_url("EUR", date(2024, 3, 10)).unwrap();
    assert!(!url.as_str().contains("test-key"));
    assert!(url.as_str().contains("base_currency=EUR"));
}

#[test]
fn parse_rate_accepts_plain_and_scientific() {
    assert_eq!(parse_rate("EUR", date(2024, 3, 10), "1.0800").unwrap(), dec!(1.08));
    assert_eq!(
        parse_rate("JPY", date(2024, 3, 8), "6.7e-3").unwrap(),
        dec!(0.0067)
    );
}

#[test]
fn parse_rate_rejects_zero_negative_and_text() {
    for bad in ["0", "-1.2", "n/a"] {
        assert!(
            matches!(
                parse_rate("EUR", date(2024, 3, 10), bad),
                Err(FxError::InvalidRate { .. })
            ),
            "{bad} should be rejected"
        );
    }
}
