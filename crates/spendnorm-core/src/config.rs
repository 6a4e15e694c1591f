use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::amount::{AmountRounding, RoundingRule};
use crate::app_config::{AppConfig, Environment};
use crate::model::normalize_currency_code;
use crate::timezone::{AmbiguousTimePolicy, DstPolicy, SkippedTimePolicy};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_num<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| invalid(var, e))
}

/// Parsing and validation, decoupled from the process environment so it can
/// be tested against a plain `HashMap`.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let fx_api_key = require("SPENDNORM_FX_API_KEY")?;

    let env = parse_environment(&or_default("SPENDNORM_ENV", "development"))?;

    let bind_addr = or_default("SPENDNORM_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("SPENDNORM_BIND_ADDR", e))?;
    let log_level = or_default("SPENDNORM_LOG_LEVEL", "info");
    let api_keys: Vec<String> = or_default("SPENDNORM_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let db_max_connections: u32 = parse_num(
        "SPENDNORM_DB_MAX_CONNECTIONS",
        &or_default("SPENDNORM_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_num(
        "SPENDNORM_DB_MIN_CONNECTIONS",
        &or_default("SPENDNORM_DB_MIN_CONNECTIONS", "1"),
    )?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "SPENDNORM_DB_MIN_CONNECTIONS",
            format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        ));
    }
    let db_acquire_timeout_secs: u64 = parse_num(
        "SPENDNORM_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("SPENDNORM_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let fx_api_url = or_default("SPENDNORM_FX_API_URL", "https://api.currencyapi.com/v3/");
    let fx_request_timeout_secs: u64 = parse_num(
        "SPENDNORM_FX_REQUEST_TIMEOUT_SECS",
        &or_default("SPENDNORM_FX_REQUEST_TIMEOUT_SECS", "30"),
    )?;
    let fx_max_retries: u32 = parse_num(
        "SPENDNORM_FX_MAX_RETRIES",
        &or_default("SPENDNORM_FX_MAX_RETRIES", "3"),
    )?;
    let fx_retry_backoff_base_ms: u64 = parse_num(
        "SPENDNORM_FX_RETRY_BACKOFF_BASE_MS",
        &or_default("SPENDNORM_FX_RETRY_BACKOFF_BASE_MS", "1000"),
    )?;
    let fx_fallback_days: u32 = parse_num(
        "SPENDNORM_FX_FALLBACK_DAYS",
        &or_default("SPENDNORM_FX_FALLBACK_DAYS", "7"),
    )?;
    let fx_max_concurrent_requests: usize = parse_num(
        "SPENDNORM_FX_MAX_CONCURRENT_REQUESTS",
        &or_default("SPENDNORM_FX_MAX_CONCURRENT_REQUESTS", "2"),
    )?;
    if fx_max_concurrent_requests == 0 {
        return Err(invalid(
            "SPENDNORM_FX_MAX_CONCURRENT_REQUESTS",
            "must be at least 1",
        ));
    }
    let fx_warm_currencies = parse_currency_list(&or_default(
        "SPENDNORM_FX_WARM_CURRENCIES",
        "CAD,GBP,EUR,HKD",
    ))?;

    let canonical_timezone = or_default("SPENDNORM_CANONICAL_TZ", "America/Los_Angeles")
        .trim()
        .parse::<Tz>()
        .map_err(|e| invalid("SPENDNORM_CANONICAL_TZ", e))?;
    let dst_policy = DstPolicy {
        ambiguous: or_default("SPENDNORM_DST_AMBIGUOUS", "standard")
            .parse::<AmbiguousTimePolicy>()
            .map_err(|e| invalid("SPENDNORM_DST_AMBIGUOUS", e))?,
        skipped: or_default("SPENDNORM_DST_SKIPPED", "shift_forward")
            .parse::<SkippedTimePolicy>()
            .map_err(|e| invalid("SPENDNORM_DST_SKIPPED", e))?,
    };
    let amount_scale: u32 = parse_num(
        "SPENDNORM_AMOUNT_SCALE",
        &or_default("SPENDNORM_AMOUNT_SCALE", "2"),
    )?;
    if amount_scale > 10 {
        return Err(invalid("SPENDNORM_AMOUNT_SCALE", "scale must be between 0 and 10"));
    }
    let rounding = AmountRounding {
        scale: amount_scale,
        rule: or_default("SPENDNORM_ROUNDING", "half_even")
            .parse::<RoundingRule>()
            .map_err(|e| invalid("SPENDNORM_ROUNDING", e))?,
    };

    let pipeline_name = or_default("SPENDNORM_PIPELINE_NAME", "spend_normalization");
    let initial_window_start = DateTime::parse_from_rfc3339(
        or_default("SPENDNORM_INITIAL_WINDOW_START", "1970-01-01T00:00:00Z").trim(),
    )
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| invalid("SPENDNORM_INITIAL_WINDOW_START", e))?;
    let transform_concurrency: usize = parse_num(
        "SPENDNORM_TRANSFORM_CONCURRENCY",
        &or_default("SPENDNORM_TRANSFORM_CONCURRENCY", "16"),
    )?;
    let external_timeout_secs: u64 = parse_num(
        "SPENDNORM_EXTERNAL_TIMEOUT_SECS",
        &or_default("SPENDNORM_EXTERNAL_TIMEOUT_SECS", "60"),
    )?;
    let external_max_retries: u32 = parse_num(
        "SPENDNORM_EXTERNAL_MAX_RETRIES",
        &or_default("SPENDNORM_EXTERNAL_MAX_RETRIES", "3"),
    )?;
    let external_backoff_base_ms: u64 = parse_num(
        "SPENDNORM_EXTERNAL_BACKOFF_BASE_MS",
        &or_default("SPENDNORM_EXTERNAL_BACKOFF_BASE_MS", "1000"),
    )?;
    let run_lock_ttl_secs: u64 = parse_num(
        "SPENDNORM_RUN_LOCK_TTL_SECS",
        &or_default("SPENDNORM_RUN_LOCK_TTL_SECS", "3600"),
    )?;
    let ingest_grace_secs: u64 = parse_num(
        "SPENDNORM_INGEST_GRACE_SECS",
        &or_default("SPENDNORM_INGEST_GRACE_SECS", "120"),
    )?;
    let schedule_cron = or_default("SPENDNORM_SCHEDULE_CRON", "0 5 * * * *");
    let rates_warm_cron = or_default("SPENDNORM_RATES_WARM_CRON", "0 30 0 * * *");

    let heartbeat_url = optional("SPENDNORM_HEARTBEAT_URL");
    let heartbeat_timeout_secs: u64 = parse_num(
        "SPENDNORM_HEARTBEAT_TIMEOUT_SECS",
        &or_default("SPENDNORM_HEARTBEAT_TIMEOUT_SECS", "10"),
    )?;
    let alert_webhook_url = optional("SPENDNORM_ALERT_WEBHOOK_URL");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        fx_api_url,
        fx_api_key,
        fx_request_timeout_secs,
        fx_max_retries,
        fx_retry_backoff_base_ms,
        fx_fallback_days,
        fx_max_concurrent_requests,
        fx_warm_currencies,
        canonical_timezone,
        dst_policy,
        rounding,
        pipeline_name,
        initial_window_start,
        transform_concurrency,
        external_timeout_secs,
        external_max_retries,
        external_backoff_base_ms,
        run_lock_ttl_secs,
        ingest_grace_secs,
        schedule_cron,
        rates_warm_cron,
        heartbeat_url,
        heartbeat_timeout_secs,
        alert_webhook_url,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "SPENDNORM_ENV",
            format!("unknown environment '{other}'"),
        )),
    }
}

/// Parse a comma-separated currency list, uppercasing each code.
fn parse_currency_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|code| {
            normalize_currency_code(code).ok_or_else(|| {
                invalid(
                    "SPENDNORM_FX_WARM_CURRENCIES",
                    format!("'{code}' is not a three-letter currency code"),
                )
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
