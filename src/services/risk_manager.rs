use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::remote::{ExchangeGateway, OrderSide, OrderState};
use crate::repositories::TradeRepository;
use crate::repositories::trade_repo::StopLossCandidate;

/// Watches open positions for breaches of the owner's stop-loss threshold
/// and liquidates breached ones with a bounded order-chasing loop. Wallex
/// has no reliable market orders, so each chase attempt re-anchors a LIMIT
/// sell slightly below the latest price.
pub struct RiskManager {
    pool: SqlitePool,
    gateway: Arc<dyn ExchangeGateway>,
    chasing_attempts: u32,
    chasing_delay: Duration,
    chase_discount: f64,
}

impl RiskManager {
    pub fn new(
        pool: SqlitePool,
        gateway: Arc<dyn ExchangeGateway>,
        chasing_attempts: u32,
        chasing_delay: Duration,
        chase_discount: f64,
    ) -> Self {
        Self {
            pool,
            gateway,
            chasing_attempts,
            chasing_delay,
            chase_discount,
        }
    }

    /// One scan over every open position whose owner opted in. A missing
    /// price skips the trade for this cycle; a liquidation failure is logged
    /// and the scan moves on.
    pub async fn check_stop_losses(&self) -> anyhow::Result<()> {
        let candidates = TradeRepository::stop_loss_candidates(&self.pool).await?;

        for candidate in candidates {
            let symbol = candidate.trade.symbol();
            let Some(current_price) = self
                .gateway
                .last_price(&candidate.api_key, &symbol)
                .await
            else {
                debug!("No price for {} this cycle", symbol);
                continue;
            };

            let entry = candidate.trade.entry_price;
            let pnl_percent = (current_price - entry) / entry * 100.0;

            if pnl_percent <= -candidate.stop_loss_percent {
                warn!(
                    "Stop-loss breached on {}: price={} pnl={:.2}% (limit -{}%)",
                    symbol, current_price, pnl_percent, candidate.stop_loss_percent
                );
                if let Err(e) = self.liquidate(&candidate, current_price).await {
                    error!("Liquidation of trade {} failed: {}", candidate.trade.id, e);
                }
            }
        }
        Ok(())
    }

    /// Emergency exit: cancel the resting take-profit, then chase the market
    /// down for at most `chasing_attempts` placements. Exhaustion leaves the
    /// trade in STOP_LOSS_SUBMITTED with the failure recorded for an operator.
    pub async fn liquidate(
        &self,
        candidate: &StopLossCandidate,
        initial_price: f64,
    ) -> anyhow::Result<()> {
        let trade = &candidate.trade;
        let symbol = trade.symbol();

        if let Some(sell_order_id) = trade.sell_order_id.as_deref() {
            // Best effort: the goal is to avoid a double-sell, not to
            // guarantee the cancel lands.
            self.gateway.cancel_order(&candidate.api_key, sell_order_id).await;
            info!("Cancelled resting take-profit {} on {}", sell_order_id, symbol);
        }

        let mut market_price = initial_price;

        for attempt in 1..=self.chasing_attempts {
            let price = market_price * (1.0 - self.chase_discount);
            info!(
                "Emergency exit attempt {}/{} on {} at {}",
                attempt, self.chasing_attempts, symbol, price
            );

            match self
                .gateway
                .place_order(
                    &candidate.api_key,
                    &symbol,
                    OrderSide::Sell,
                    trade.quantity,
                    price,
                )
                .await
            {
                Ok(order_id) => {
                    TradeRepository::mark_stop_loss_submitted(&self.pool, trade.id, &order_id)
                        .await?;

                    tokio::time::sleep(self.chasing_delay).await;

                    let filled = matches!(
                        self.gateway
                            .order_status(&candidate.api_key, &order_id)
                            .await,
                        Ok(OrderState::Filled)
                    );
                    if filled {
                        TradeRepository::mark_stop_loss_filled(&self.pool, trade.id).await?;
                        info!("Emergency exit complete for trade {}", trade.id);
                        return Ok(());
                    }
                    // Not filled at this price. Pull the order and re-anchor.
                    self.gateway.cancel_order(&candidate.api_key, &order_id).await;
                }
                Err(e) => {
                    warn!("Chase placement {} failed on {}: {}", attempt, symbol, e);
                }
            }

            if let Some(fresh) = self.gateway.last_price(&candidate.api_key, &symbol).await {
                market_price = fresh;
            }
        }

        error!(
            "Emergency liquidation exhausted after {} attempts for trade {}; operator attention required",
            self.chasing_attempts, trade.id
        );
        TradeRepository::set_log_message(
            &self.pool,
            trade.id,
            &format!(
                "stop-loss liquidation exhausted after {} attempts",
                self.chasing_attempts
            ),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{SellStatus, TradeInsert};
    use crate::remote::{GatewayError, MockExchangeGateway};
    use crate::repositories::subscriber_repo::testing::SubscriberSeed;
    use crate::repositories::trade_repo::testing::btc_trade;
    use mockall::predicate::*;
    use sqlx::SqlitePool;

    fn manager(pool: SqlitePool, mock: MockExchangeGateway, attempts: u32) -> RiskManager {
        RiskManager::new(pool, Arc::new(mock), attempts, Duration::ZERO, 0.001)
    }

    /// Filled position with a resting take-profit, entry price 100.
    async fn open_position(pool: &SqlitePool, sub_id: i64) -> i64 {
        let insert = TradeInsert {
            entry_price: 100.0,
            target_price: 105.0,
            quantity: 0.2,
            ..btc_trade(sub_id)
        };
        let trade_id = TradeRepository::insert(pool, &insert).await.unwrap();
        TradeRepository::mark_filled_with_sell(pool, trade_id, "tp-1")
            .await
            .unwrap();
        trade_id
    }

    #[tokio::test]
    async fn loss_just_inside_the_threshold_does_not_trigger() {
        let pool = db::memory_pool().await;
        let sub_id = SubscriberSeed::default().insert(&pool).await;
        let trade_id = open_position(&pool, sub_id).await;

        let mut mock = MockExchangeGateway::new();
        // -1.99%: no liquidation, so no place/cancel expectations.
        mock.expect_last_price().returning(|_, _| Some(98.01));

        manager(pool.clone(), mock, 3).check_stop_losses().await.unwrap();

        let trade = TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap();
        assert_eq!(trade.sell_status, SellStatus::Submitted);
    }

    #[tokio::test]
    async fn exact_threshold_triggers_and_fills() {
        let pool = db::memory_pool().await;
        let sub_id = SubscriberSeed::default().insert(&pool).await;
        let trade_id = open_position(&pool, sub_id).await;

        let mut mock = MockExchangeGateway::new();
        mock.expect_last_price().returning(|_, _| Some(98.0));
        // The old take-profit goes first.
        mock.expect_cancel_order()
            .with(eq("test-key"), eq("tp-1"))
            .times(1)
            .returning(|_, _| true);
        mock.expect_place_order()
            .withf(|_, symbol, side, qty, price| {
                symbol == "BTCUSDT"
                    && *side == OrderSide::Sell
                    && *qty == 0.2
                    && *price < 98.0
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok("sl-1".to_string()));
        mock.expect_order_status()
            .with(eq("test-key"), eq("sl-1"))
            .returning(|_, _| Ok(OrderState::Filled));

        manager(pool.clone(), mock, 3).check_stop_losses().await.unwrap();

        let trade = TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap();
        assert_eq!(trade.sell_status, SellStatus::StopLossFilled);
        assert_eq!(trade.sell_order_id.as_deref(), Some("sl-1"));
    }

    #[tokio::test]
    async fn missing_price_skips_the_trade_this_cycle() {
        let pool = db::memory_pool().await;
        let sub_id = SubscriberSeed::default().insert(&pool).await;
        let trade_id = open_position(&pool, sub_id).await;

        let mut mock = MockExchangeGateway::new();
        mock.expect_last_price().returning(|_, _| None);

        manager(pool.clone(), mock, 3).check_stop_losses().await.unwrap();

        let trade = TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap();
        assert_eq!(trade.sell_status, SellStatus::Submitted);
    }

    #[tokio::test]
    async fn chase_makes_exactly_the_configured_attempts_then_stops() {
        let pool = db::memory_pool().await;
        let sub_id = SubscriberSeed::default().insert(&pool).await;
        let trade_id = open_position(&pool, sub_id).await;

        let candidate = StopLossCandidate {
            trade: TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap(),
            stop_loss_percent: 2.0,
            api_key: "test-key".into(),
        };

        let mut mock = MockExchangeGateway::new();
        mock.expect_cancel_order()
            .with(eq("test-key"), eq("tp-1"))
            .times(1)
            .returning(|_, _| true);
        let mut counter = 0u32;
        mock.expect_place_order()
            .times(3)
            .returning(move |_, _, _, _, _| {
                counter += 1;
                Ok(format!("sl-{}", counter))
            });
        // Never fills.
        mock.expect_order_status().returning(|_, _| Ok(OrderState::Open));
        // Each unfilled attempt gets pulled.
        mock.expect_cancel_order()
            .withf(|_, order_id| order_id.starts_with("sl-"))
            .times(3)
            .returning(|_, _| true);
        // Price refresh between attempts.
        mock.expect_last_price().returning(|_, _| Some(97.5));

        manager(pool.clone(), mock, 3)
            .liquidate(&candidate, 98.0)
            .await
            .unwrap();

        let trade = TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap();
        assert_eq!(trade.sell_status, SellStatus::StopLossSubmitted);
        assert_eq!(trade.sell_order_id.as_deref(), Some("sl-3"));
        assert!(trade
            .log_message
            .unwrap()
            .contains("exhausted after 3 attempts"));
    }

    #[tokio::test]
    async fn failed_placements_persist_nothing_and_keep_the_prior_state() {
        let pool = db::memory_pool().await;
        let sub_id = SubscriberSeed::default().insert(&pool).await;
        let trade_id = open_position(&pool, sub_id).await;

        let candidate = StopLossCandidate {
            trade: TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap(),
            stop_loss_percent: 2.0,
            api_key: "test-key".into(),
        };

        let mut mock = MockExchangeGateway::new();
        mock.expect_cancel_order()
            .with(eq("test-key"), eq("tp-1"))
            .times(1)
            .returning(|_, _| true);
        mock.expect_place_order()
            .times(3)
            .returning(|_, _, _, _, _| Err(GatewayError::Api("maintenance".into())));
        mock.expect_last_price().returning(|_, _| Some(97.5));

        manager(pool.clone(), mock, 3)
            .liquidate(&candidate, 98.0)
            .await
            .unwrap();

        let trade = TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap();
        // No chase order was ever accepted, so the prior state stands.
        assert_eq!(trade.sell_status, SellStatus::Submitted);
        assert_eq!(trade.sell_order_id.as_deref(), Some("tp-1"));
        assert!(trade.log_message.unwrap().contains("exhausted"));
    }

    #[tokio::test]
    async fn second_attempt_reanchors_to_the_fresh_price() {
        let pool = db::memory_pool().await;
        let sub_id = SubscriberSeed::default().insert(&pool).await;
        let trade_id = open_position(&pool, sub_id).await;

        let candidate = StopLossCandidate {
            trade: TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap(),
            stop_loss_percent: 2.0,
            api_key: "test-key".into(),
        };

        let mut mock = MockExchangeGateway::new();
        mock.expect_cancel_order().returning(|_, _| true);
        mock.expect_last_price().returning(|_, _| Some(96.0));

        let mut n = 0u32;
        mock.expect_place_order()
            .times(2)
            .returning(move |_, _, _, _, price| {
                n += 1;
                // First placement anchored at 98, second at the refreshed 96.
                if n == 1 {
                    assert!((price - 98.0 * 0.999).abs() < 1e-9);
                    Ok("sl-1".to_string())
                } else {
                    assert!((price - 96.0 * 0.999).abs() < 1e-9);
                    Ok("sl-2".to_string())
                }
            });
        let mut status_calls = 0u32;
        mock.expect_order_status().returning(move |_, _| {
            status_calls += 1;
            if status_calls == 1 {
                Ok(OrderState::Open)
            } else {
                Ok(OrderState::Filled)
            }
        });

        manager(pool.clone(), mock, 3)
            .liquidate(&candidate, 98.0)
            .await
            .unwrap();

        let trade = TradeRepository::find_by_id(&pool, trade_id).await.unwrap().unwrap();
        assert_eq!(trade.sell_status, SellStatus::StopLossFilled);
        assert_eq!(trade.sell_order_id.as_deref(), Some("sl-2"));
    }
}
