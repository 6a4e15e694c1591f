mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{router, AppState},
    middleware::AuthState,
    scheduler::JobContext,
};

/// How long shutdown waits for an in-flight run to drain.
const RUN_DRAIN_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(spendnorm_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = spendnorm_db::PoolConfig::from_app_config(&config);
    let pool = spendnorm_db::connect_pool(&config.database_url, pool_config).await?;
    spendnorm_db::run_migrations(&pool).await?;

    let pipeline = spendnorm_pipeline::build_pipeline(pool.clone(), &config)?;
    let (trigger, shutdown) = spendnorm_pipeline::shutdown_channel();
    let run_guard = Arc::new(Mutex::new(()));

    let mut scheduler = scheduler::build_scheduler(JobContext {
        runner: Arc::new(pipeline.runner),
        resolver: pipeline.resolver,
        config: Arc::clone(&config),
        shutdown,
        run_guard: Arc::clone(&run_guard),
    })
    .await?;

    let auth = AuthState::from_config(&config)?;
    let app = router(AppState { pool }, auth);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "spendnorm-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop new ticks, cancel the in-flight run's write, then wait for it to
    // finalize and report.
    trigger.trigger();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "scheduler did not shut down cleanly");
    }
    match tokio::time::timeout(RUN_DRAIN_TIMEOUT, run_guard.lock()).await {
        Ok(_guard) => tracing::info!("no normalization run in flight; exiting"),
        Err(_) => tracing::error!(
            timeout_secs = RUN_DRAIN_TIMEOUT.as_secs(),
            "in-flight normalization run did not drain; exiting anyway"
        ),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
