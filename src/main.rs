// =============================================================================
// Cortex Alert Engine — Main Entry Point
// =============================================================================
//
// Boots configuration, the Postgres pool, the Redis-backed market data
// cache and the upstream quote client, then wires the four long-lived
// subsystems into a Supervisor and runs it until Ctrl+C.
// =============================================================================

mod alert_evaluator;
mod config;
mod daily_refresher;
mod domain;
mod error;
mod market_data_cache;
mod notification_delivery;
mod repository;
mod sector_strategy_evaluator;
mod streamer;
mod supervisor;
mod upstream;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::alert_evaluator::AlertEvaluator;
use crate::config::Config;
use crate::daily_refresher::DailyRefresher;
use crate::market_data_cache::{MarketDataCache, RedisMarketDataCache};
use crate::notification_delivery::{LoggingEmailSender, NullUserDirectory};
use crate::repository::postgres::{
    PostgresAlertRepository, PostgresNotificationRepository, PostgresSectorRepository,
    PostgresSectorStrategyRepository,
};
use crate::sector_strategy_evaluator::SectorStrategyEvaluator;
use crate::streamer::Streamer;
use crate::supervisor::Supervisor;
use crate::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.rust_log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("cortex alert engine starting up");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let cache: Arc<dyn MarketDataCache> = Arc::new(RedisMarketDataCache::connect(&config.cache_url).await?);
    let upstream = Arc::new(UpstreamClient::new(config.upstream_api_key.clone()));

    let alert_repo: Arc<dyn repository::AlertRepository> =
        Arc::new(PostgresAlertRepository::new(pool.clone()));
    let sector_repo: Arc<dyn repository::SectorRepository> =
        Arc::new(PostgresSectorRepository::new(pool.clone()));
    let sector_strategy_repo: Arc<dyn repository::SectorStrategyRepository> =
        Arc::new(PostgresSectorStrategyRepository::new(pool.clone()));
    let notification_repo: Arc<dyn repository::NotificationRepository> =
        Arc::new(PostgresNotificationRepository::new(pool.clone()));

    // No `users` table is in scope here; a real deployment supplies its own
    // UserDirectory wired to wherever accounts actually live.
    let directory: Arc<dyn notification_delivery::UserDirectory> = Arc::new(NullUserDirectory);
    let email_sender: Arc<dyn notification_delivery::EmailSender> = Arc::new(LoggingEmailSender);

    let streamer = Streamer::new(
        &config.upstream_api_key,
        cache.clone(),
        alert_repo.clone(),
        sector_repo.clone(),
    );

    let daily_refresher = DailyRefresher::new(
        upstream.clone(),
        cache.clone(),
        alert_repo.clone(),
        sector_repo.clone(),
        config.daily_refresh_time.0,
        config.daily_refresh_time.1,
    );

    let alert_evaluator = AlertEvaluator::new(
        alert_repo.clone(),
        notification_repo.clone(),
        cache.clone(),
        upstream.clone(),
        directory.clone(),
        email_sender.clone(),
    );

    let sector_strategy_evaluator = SectorStrategyEvaluator::new(
        sector_strategy_repo.clone(),
        sector_repo.clone(),
        notification_repo.clone(),
        cache.clone(),
        upstream.clone(),
    );

    let supervisor = Supervisor::new(
        streamer,
        daily_refresher,
        alert_evaluator,
        sector_strategy_evaluator,
        config.alert_check_interval,
    );

    if let Err(e) = supervisor.run().await {
        error!(error = %e, "supervisor exited with an error");
        return Err(e);
    }

    Ok(())
}
