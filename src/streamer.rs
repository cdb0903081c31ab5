// =============================================================================
// Streamer — single multiplexed websocket feeding live prices into the cache
// =============================================================================
//
// A free-tier websocket connection is limited to 50 subscribed symbols, so
// unlike a per-symbol socket this keeps one connection open and subscribes
// to the full symbol set on every (re)connect: SPY/QQQ/IWM plus every
// symbol referenced by an active alert or a sector's stock list, truncated
// to 50. A dropped connection is retried after a fixed 5s backoff.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{market_index_symbols, Symbol};
use crate::market_data_cache::MarketDataCache;
use crate::repository::{AlertRepository, SectorRepository};

/// Finnhub's free tier caps a single connection at 50 subscribed symbols.
const MAX_SYMBOLS: usize = 50;

const RECONNECT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);

pub struct Streamer {
    ws_url: String,
    cache: Arc<dyn MarketDataCache>,
    alerts: Arc<dyn AlertRepository>,
    sectors: Arc<dyn SectorRepository>,
}

impl Streamer {
    pub fn new(
        api_key: &str,
        cache: Arc<dyn MarketDataCache>,
        alerts: Arc<dyn AlertRepository>,
        sectors: Arc<dyn SectorRepository>,
    ) -> Self {
        Self {
            ws_url: format!("wss://ws.finnhub.io?token={api_key}"),
            cache,
            alerts,
            sectors,
        }
    }

    /// Union SPY/QQQ/IWM with every symbol referenced by an active alert or
    /// any sector's stock list, truncated to [`MAX_SYMBOLS`].
    async fn active_symbols(&self) -> Vec<Symbol> {
        let mut symbols: HashSet<Symbol> = market_index_symbols().into_iter().collect();

        match self.alerts.find_active().await {
            Ok(alerts) => {
                for alert in alerts {
                    symbols.insert(alert.symbol);
                }
            }
            Err(e) => warn!(error = %e, "streamer: failed to load active alerts for symbol set"),
        }

        match self.sectors.all_stocks().await {
            Ok(stocks) => {
                for stock in stocks {
                    symbols.insert(stock.symbol);
                }
            }
            Err(e) => warn!(error = %e, "streamer: failed to load sector stocks for symbol set"),
        }

        symbols.into_iter().take(MAX_SYMBOLS).collect()
    }

    /// Run the reconnect loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                info!("streamer: shutdown requested, exiting");
                return;
            }

            let symbols = self.active_symbols().await;

            info!(count = symbols.len(), "streamer: connecting");

            tokio::select! {
                result = self.connect_and_stream(&symbols) => {
                    if let Err(e) = result {
                        error!(error = %e, "streamer: connection error, reconnecting in 5s");
                    } else {
                        warn!("streamer: stream ended, reconnecting in 5s");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("streamer: shutdown requested mid-connection");
                    return;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                _ = shutdown.cancelled() => return,
            }
        }
    }

    async fn connect_and_stream(&self, symbols: &[Symbol]) -> anyhow::Result<()> {
        let (ws_stream, _response) = connect_async(&self.ws_url).await?;
        info!("streamer: connected and subscribing");

        let (mut write, mut read) = ws_stream.split();

        for symbol in symbols {
            let sub_msg = json!({"type": "subscribe", "symbol": symbol.as_str()});
            write.send(Message::Text(sub_msg.to_string())).await?;
        }

        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.handle_message(&text).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }

    async fn handle_message(&self, text: &str) {
        let Ok(envelope) = serde_json::from_str::<TradeEnvelope>(text) else {
            return;
        };
        if envelope.msg_type != "trade" {
            return;
        }
        for trade in envelope.data {
            if let (Some(symbol_raw), Some(price)) = (trade.s, trade.p) {
                if let Ok(symbol) = Symbol::new(&symbol_raw) {
                    self.cache.update_live_price(&symbol, price).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TradeEnvelope {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    data: Vec<TradeEntry>,
}

#[derive(Debug, Deserialize)]
struct TradeEntry {
    s: Option<String>,
    p: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_symbols_matches_free_tier_limit() {
        assert_eq!(MAX_SYMBOLS, 50);
    }

    #[test]
    fn trade_envelope_parses_finnhub_shape() {
        let text = r#"{"type":"trade","data":[{"s":"AAPL","p":150.25,"v":10,"t":1690000000}]}"#;
        let envelope: TradeEnvelope = serde_json::from_str(text).unwrap();
        assert_eq!(envelope.msg_type, "trade");
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].s.as_deref(), Some("AAPL"));
        assert_eq!(envelope.data[0].p, Some(150.25));
    }

    #[test]
    fn trade_envelope_ignores_non_trade_types() {
        let text = r#"{"type":"ping"}"#;
        let envelope: TradeEnvelope = serde_json::from_str(text).unwrap();
        assert_eq!(envelope.msg_type, "ping");
        assert!(envelope.data.is_empty());
    }

    // S6 — a closed connection is reconnected and the full symbol set is
    // resubscribed on the new connection, not just on the first one.
    #[tokio::test]
    async fn reconnects_and_resubscribes_after_server_closes_connection() {
        use std::time::Duration;

        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        use crate::domain::{Alert, AlertKind, AlertStatus, ChannelFlags};
        use crate::market_data_cache::InMemoryMarketDataCache;
        use crate::repository::memory::{InMemoryAlertRepository, InMemorySectorRepository};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ws_url = format!("ws://{addr}");

        let subscribe_counts: Arc<std::sync::Mutex<Vec<usize>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let server_counts = subscribe_counts.clone();

        tokio::spawn(async move {
            for _ in 0..2u8 {
                let (stream, _) = match listener.accept().await {
                    Ok(c) => c,
                    Err(_) => return,
                };
                let mut ws = match accept_async(stream).await {
                    Ok(w) => w,
                    Err(_) => return,
                };

                let mut count = 0;
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(_) => {
                            count += 1;
                            if count == 4 {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                server_counts.lock().unwrap().push(count);
                let _ = ws.close(None).await;
            }
        });

        let alert = Alert {
            id: 1,
            user_id: 1,
            symbol: Symbol::new("AAPL").unwrap(),
            stock_name: None,
            kind: AlertKind::PriceAbove,
            threshold: 100.0,
            status: AlertStatus::Active,
            repeating: false,
            channels: ChannelFlags::default(),
            message: None,
            last_checked_at: None,
            triggered_at: None,
            trigger_price: None,
        };

        let streamer = Streamer {
            ws_url,
            cache: Arc::new(InMemoryMarketDataCache::new()),
            alerts: Arc::new(InMemoryAlertRepository::new(vec![alert])),
            sectors: Arc::new(InMemorySectorRepository::new(vec![], vec![])),
        };

        let shutdown = CancellationToken::new();
        let run_token = shutdown.clone();
        let run_handle = tokio::spawn(async move {
            streamer.run(run_token).await;
        });

        // One connection completes near-instantly; the second only arrives
        // after the 5s RECONNECT_BACKOFF, so give this plenty of headroom.
        tokio::time::timeout(Duration::from_secs(12), async {
            loop {
                if subscribe_counts.lock().unwrap().len() >= 2 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("streamer did not reconnect and resubscribe within the timeout");

        shutdown.cancel();
        let _ = run_handle.await;

        let counts = subscribe_counts.lock().unwrap().clone();
        assert_eq!(
            counts,
            vec![4, 4],
            "each connection (initial and reconnect) must resubscribe the full symbol set"
        );
    }
}
