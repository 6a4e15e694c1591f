//! `rates` command handlers: single lookups and cache warming.

use std::sync::Arc;

use chrono::NaiveDate;
use clap::Subcommand;
use spendnorm_core::{AppConfig, RateStore};
use spendnorm_db::PgWarehouse;

/// Sub-commands available under `rates`.
#[derive(Debug, Subcommand)]
pub enum RatesCommands {
    /// Resolve one currency→USD rate, using the cache and fallback scan
    Get {
        /// ISO 4217 currency code (e.g., EUR)
        #[arg(long)]
        currency: String,
        /// Trading day (YYYY-MM-DD)
        #[arg(long, value_parser = crate::parse_date)]
        date: NaiveDate,
    },
    /// Fetch and persist rates for the configured warm-up currencies
    Warm {
        /// Trading day (YYYY-MM-DD); defaults to today (UTC)
        #[arg(long, value_parser = crate::parse_date)]
        date: Option<NaiveDate>,
    },
}

/// # Errors
///
/// Returns an error if the resolver cannot be built, a `get` lookup fails,
/// or every currency fails to warm.
pub(crate) async fn run_rates(
    pool: sqlx::PgPool,
    config: &AppConfig,
    command: RatesCommands,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let store: Arc<dyn RateStore> = Arc::new(PgWarehouse::new(pool));
    let resolver = spendnorm_pipeline::build_resolver(store, config)?;

    match command {
        RatesCommands::Get { currency, date } => {
            let rate = resolver.resolve(&currency, date).await?;
            if rate.fallback_days() > 0 {
                println!(
                    "{} {} = {} USD (from {}, {} day(s) earlier)",
                    rate.currency,
                    rate.requested_date,
                    rate.rate_to_usd,
                    rate.rate_date,
                    rate.fallback_days()
                );
            } else {
                println!(
                    "{} {} = {} USD",
                    rate.currency, rate.requested_date, rate.rate_to_usd
                );
            }
        }
        RatesCommands::Warm { date } => {
            let date = date.unwrap_or(today);
            let report = resolver.warm(&config.fx_warm_currencies, date).await;
            for rate in &report.resolved {
                println!(
                    "{} {date} = {} USD (rate date {})",
                    rate.currency, rate.rate_to_usd, rate.rate_date
                );
            }
            for (currency, error) in &report.failed {
                eprintln!("error: {currency}: {error}");
            }
            if report.resolved.is_empty() && !report.failed.is_empty() {
                anyhow::bail!(
                    "all {} currencies failed to warm for {date}",
                    report.failed.len()
                );
            }
        }
    }
    Ok(())
}
