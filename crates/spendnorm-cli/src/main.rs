use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod rates;
mod run;

#[derive(Debug, Parser)]
#[command(name = "spendnorm-cli")]
#[command(about = "Spend normalization pipeline command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run one normalization pass now
    ///
    /// Without flags the run covers [boundary, now) and advances the
    /// boundary on success. With --from/--to or --account it is a replay:
    /// the boundary is left untouched.
    Run {
        /// Only process rows for this account
        #[arg(long)]
        account: Option<String>,
        /// Replay window start (RFC 3339, inclusive)
        #[arg(long, requires = "to")]
        from: Option<DateTime<Utc>>,
        /// Replay window end (RFC 3339, exclusive)
        #[arg(long, requires = "from")]
        to: Option<DateTime<Utc>>,
    },
    /// Inspect past normalization runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
    /// Query and warm the FX rate cache
    Rates {
        #[command(subcommand)]
        command: rates::RatesCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum RunsCommands {
    /// List the most recent runs
    List {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("spendnorm-cli ready; see --help for commands");
        return Ok(());
    };

    let config = spendnorm_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = spendnorm_db::connect_pool(
        &config.database_url,
        spendnorm_db::PoolConfig::from_app_config(&config),
    )
    .await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                spendnorm_db::health_check(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = spendnorm_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Run { account, from, to } => {
            spendnorm_db::run_migrations(&pool).await?;
            let window = from.zip(to).map(|(start, end)| spendnorm_core::Window::new(start, end));
            run::run_normalization(pool, &config, window, account).await?;
        }
        Commands::Runs { command } => match command {
            RunsCommands::List { limit } => run::list_runs(&pool, limit).await?,
        },
        Commands::Rates { command } => {
            rates::run_rates(pool, &config, command, Utc::now().date_naive()).await?;
        }
    }

    Ok(())
}

/// Parse a `YYYY-MM-DD` date argument.
fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}"))
}

#[cfg(test)]
mod tests;
