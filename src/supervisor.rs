// =============================================================================
// Supervisor — wires the long-lived subsystems together and runs them
// =============================================================================
//
// Four tasks run concurrently for the lifetime of the process: the
// websocket streamer, the daily previous-close refresher, and two interval
// loops driving the alert evaluator and sector strategy evaluator. A single
// `CancellationToken` carries a Ctrl+C shutdown signal to all of them, and
// the supervisor waits for every task to wind down before returning.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alert_evaluator::AlertEvaluator;
use crate::daily_refresher::DailyRefresher;
use crate::sector_strategy_evaluator::SectorStrategyEvaluator;
use crate::streamer::Streamer;

pub struct Supervisor {
    streamer: Arc<Streamer>,
    daily_refresher: Arc<DailyRefresher>,
    alert_evaluator: Arc<AlertEvaluator>,
    sector_strategy_evaluator: Arc<SectorStrategyEvaluator>,
    tick_interval: Duration,
}

impl Supervisor {
    pub fn new(
        streamer: Streamer,
        daily_refresher: DailyRefresher,
        alert_evaluator: AlertEvaluator,
        sector_strategy_evaluator: SectorStrategyEvaluator,
        tick_interval: Duration,
    ) -> Self {
        Self {
            streamer: Arc::new(streamer),
            daily_refresher: Arc::new(daily_refresher),
            alert_evaluator: Arc::new(alert_evaluator),
            sector_strategy_evaluator: Arc::new(sector_strategy_evaluator),
            tick_interval,
        }
    }

    /// Spawn every subsystem and block until a Ctrl+C signal arrives, then
    /// cancel all of them and wait for a clean exit.
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        let streamer = self.streamer.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            streamer.run(token).await;
        }));

        let daily_refresher = self.daily_refresher.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            daily_refresher.run(token).await;
        }));

        let alert_evaluator = self.alert_evaluator.clone();
        let token = shutdown.clone();
        let tick_interval = self.tick_interval;
        handles.push(tokio::spawn(async move {
            run_evaluator_loop("alert evaluator", tick_interval, token, move || {
                let evaluator = alert_evaluator.clone();
                async move {
                    evaluator.tick().await;
                }
            })
            .await;
        }));

        let sector_strategy_evaluator = self.sector_strategy_evaluator.clone();
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_evaluator_loop("sector strategy evaluator", tick_interval, token, move || {
                let evaluator = sector_strategy_evaluator.clone();
                async move {
                    evaluator.tick().await;
                }
            })
            .await;
        }));

        info!("supervisor: all subsystems running, press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        warn!("supervisor: shutdown signal received, stopping gracefully");
        shutdown.cancel();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "supervisor: a subsystem task panicked");
            }
        }

        info!("supervisor: shutdown complete");
        Ok(())
    }
}

/// Drive one evaluator's `tick()` on a fixed interval until `shutdown` is
/// cancelled. Generic over the tick closure so the same loop shape serves
/// both the alert evaluator and the sector strategy evaluator.
async fn run_evaluator_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick().await;
            }
            _ = shutdown.cancelled() => {
                info!(name, "evaluator loop: shutdown requested");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evaluator_loop_stops_on_cancellation() {
        let shutdown = CancellationToken::new();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let loop_count = count.clone();

        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            run_evaluator_loop("test", Duration::from_millis(10), token, move || {
                let c = loop_count.clone();
                async move {
                    c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(count.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }
}
