use std::sync::Arc;

use dotenvy::dotenv;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dedup::ProcessedSignals;
use crate::logger::setup_logger;
use crate::models::Signal;
use crate::remote::{ExchangeGateway, SignalFeed, WallexClient};
use crate::services::{RiskManager, TradingEngine};

mod config;
mod db;
mod dedup;
mod logger;
mod models;
mod remote;
mod repositories;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logger();
    dotenv().ok();

    let config = Config::from_env();
    info!("Copy-trading engine starting up...");

    let pool = db::connect(&config.database_path).await?;
    info!("Database ready at {}", config.database_path);

    let gateway: Arc<dyn ExchangeGateway> =
        Arc::new(WallexClient::new(config.wallex_base_url.clone()));
    let feed = SignalFeed::new(config.signal_pool_url.clone());

    let engine = TradingEngine::new(pool.clone(), gateway.clone(), config.buy_timeout);
    let risk_manager = RiskManager::new(
        pool,
        gateway,
        config.chasing_attempts,
        config.chasing_delay,
        config.chase_discount,
    );

    // Dedup lives in the driver: the engine assumes its batches are fresh.
    let mut processed = ProcessedSignals::new(config.dedup_window);

    let mut tick = time::interval(config.signal_check_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_risk_check = Instant::now();

    info!(
        "Polling signals every {:?}, risk scan every {:?}",
        config.signal_check_interval, config.risk_check_interval
    );

    loop {
        tick.tick().await;

        // Phase errors are contained to the tick; the next one retries.
        route_signals(&engine, &mut processed, feed.fetch().await).await;

        if let Err(e) = engine.monitor_orders().await {
            error!("Order monitoring failed this cycle: {}", e);
        }

        if last_risk_check.elapsed() >= config.risk_check_interval {
            if let Err(e) = risk_manager.check_stop_losses().await {
                error!("Stop-loss scan failed this cycle: {}", e);
            }
            last_risk_check = Instant::now();
        }
    }
}

/// Signal phase of one tick. A key enters the dedup cache only after the
/// engine has handled its signal, so a store outage mid-batch leaves the
/// affected signals unconsumed and the next poll serves them again.
async fn route_signals(
    engine: &TradingEngine,
    processed: &mut ProcessedSignals,
    batch: Vec<Signal>,
) {
    for signal in batch {
        if processed.seen(&signal.coin, signal.signal_time) {
            continue;
        }
        match engine.process_signal(&signal).await {
            Ok(()) => {
                processed.insert(&signal.coin, signal.signal_time);
            }
            Err(e) => {
                warn!(
                    "Signal {}{} not processed this cycle, retrying next poll: {}",
                    signal.coin, signal.pair, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::remote::{MarketInfo, MockExchangeGateway};
    use crate::repositories::TradeRepository;
    use crate::repositories::subscriber_repo::testing::SubscriberSeed;

    fn btc_signal() -> Signal {
        Signal {
            coin: "BTC".into(),
            pair: "USDT".into(),
            entry_price: 50_000.0,
            target_price: 51_000.0,
            strategy_name: "Internal".into(),
            signal_grade: "Q1".into(),
            signal_time: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn store_outage_leaves_the_batch_unconsumed() {
        let mut processed = ProcessedSignals::new(Duration::from_secs(3600));

        // First tick: the store is down, every repository call errors.
        let outage_pool = db::memory_pool().await;
        outage_pool.close().await;
        let failing = TradingEngine::new(
            outage_pool,
            Arc::new(MockExchangeGateway::new()),
            Duration::from_secs(60),
        );
        route_signals(&failing, &mut processed, vec![btc_signal()]).await;
        assert!(!processed.seen("BTC", 1_700_000_000));

        // Next poll serves the same signal against a healthy store.
        let pool = db::memory_pool().await;
        SubscriberSeed::default().insert(&pool).await;
        let mut mock = MockExchangeGateway::new();
        mock.expect_market_info().returning(|_, _| {
            Some(MarketInfo {
                symbol: "BTCUSDT".into(),
                base_asset: "BTC".into(),
                quote_asset: "USDT".into(),
            })
        });
        mock.expect_place_order()
            .times(1)
            .returning(|_, _, _, _, _| Ok("buy-1".to_string()));
        let engine = TradingEngine::new(pool.clone(), Arc::new(mock), Duration::from_secs(60));

        route_signals(&engine, &mut processed, vec![btc_signal()]).await;
        assert!(processed.seen("BTC", 1_700_000_000));
        assert_eq!(TradeRepository::buys_in_flight(&pool).await.unwrap().len(), 1);

        // A re-served duplicate is dropped before it reaches the engine;
        // the place_order expectation above would panic on a second call.
        route_signals(&engine, &mut processed, vec![btc_signal()]).await;
    }
}
