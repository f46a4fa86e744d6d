use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::models::{Signal, Subscriber, Trade, TradeInsert};
use crate::remote::{ExchangeGateway, OrderSide, OrderState};
use crate::repositories::{SubscriberRepository, TradeRepository};

/// Routes deduplicated signals to eligible subscribers and drives every
/// order through its lifecycle. All state lives in the trades table; each
/// transition is a single row update, so repeated passes are idempotent.
pub struct TradingEngine {
    pool: SqlitePool,
    gateway: Arc<dyn ExchangeGateway>,
    buy_timeout: Duration,
}

impl TradingEngine {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn ExchangeGateway>, buy_timeout: Duration) -> Self {
        Self {
            pool,
            gateway,
            buy_timeout,
        }
    }

    /// Evaluates one fresh signal against every active subscriber. An error
    /// means the store was unavailable; the caller leaves the signal
    /// unconsumed so the next poll serves it again.
    pub async fn process_signal(&self, signal: &Signal) -> anyhow::Result<()> {
        let subscribers = SubscriberRepository::active(&self.pool).await?;

        info!(
            "Signal received: {} {} entry={} target={} ({}/{})",
            signal.coin,
            signal.pair,
            signal.entry_price,
            signal.target_price,
            signal.strategy_name,
            signal.signal_grade
        );

        for subscriber in &subscribers {
            if !subscriber.accepts(signal) {
                debug!(
                    "Subscriber {} filtered out {}{}",
                    subscriber.id, signal.coin, signal.pair
                );
                continue;
            }
            if !self.can_afford(subscriber, signal).await? {
                continue;
            }
            self.submit_buy(subscriber, signal).await;
        }
        Ok(())
    }

    /// Capital check: committed notional plus this order's cost must stay
    /// within the subscriber's ceiling for the signal's pair. A rejection is
    /// a routing decision, logged and otherwise silent.
    async fn can_afford(&self, subscriber: &Subscriber, signal: &Signal) -> anyhow::Result<bool> {
        let Some(budget) = subscriber.buy_amount(&signal.pair) else {
            debug!(
                "Subscriber {} has no budget configured for pair {}",
                subscriber.id, signal.pair
            );
            return Ok(false);
        };

        let frozen =
            TradeRepository::frozen_capital(&self.pool, subscriber.id, &signal.pair).await?;
        let ceiling = subscriber.frozen_ceiling(&signal.pair);

        if frozen + budget > ceiling {
            info!(
                "Subscriber {} at capital ceiling for {}: frozen={} + order={} > max={}",
                subscriber.id, signal.pair, frozen, budget, ceiling
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Places the LIMIT buy and creates the Trade. A placement failure drops
    /// the signal for this subscriber; there is no retry at this layer.
    async fn submit_buy(&self, subscriber: &Subscriber, signal: &Signal) {
        let symbol = signal.symbol();

        if self
            .gateway
            .market_info(&subscriber.api_key, &symbol)
            .await
            .is_none()
        {
            warn!("Market {} unknown or unreachable, skipping buy", symbol);
            return;
        }

        // Quantity straight from the budget; step-size rounding is left to
        // exchange-side validation.
        let Some(budget) = subscriber.buy_amount(&signal.pair) else {
            warn!(
                "Subscriber {} has no budget for pair {}, skipping buy",
                subscriber.id, signal.pair
            );
            return;
        };
        let quantity = budget / signal.entry_price;

        match self
            .gateway
            .place_order(
                &subscriber.api_key,
                &symbol,
                OrderSide::Buy,
                quantity,
                signal.entry_price,
            )
            .await
        {
            Ok(order_id) => {
                let insert = TradeInsert {
                    subscriber_id: subscriber.id,
                    coin: signal.coin.clone(),
                    pair: signal.pair.clone(),
                    entry_price: signal.entry_price,
                    target_price: signal.target_price,
                    strategy_name: signal.strategy_name.clone(),
                    signal_grade: signal.signal_grade.clone(),
                    buy_order_id: order_id,
                    quantity,
                    buy_submit_time: Utc::now(),
                };
                match TradeRepository::insert(&self.pool, &insert).await {
                    Ok(trade_id) => info!(
                        "Buy submitted: trade={} {} qty={} for subscriber {}",
                        trade_id, symbol, quantity, subscriber.id
                    ),
                    Err(e) => error!("Failed to persist trade for {}: {}", symbol, e),
                }
            }
            Err(e) => {
                error!(
                    "Buy placement failed for subscriber {} on {}: {}",
                    subscriber.id, symbol, e
                );
            }
        }
    }

    /// One monitoring pass over all in-flight orders. Gateway read failures
    /// leave the Trade untouched until the next tick.
    pub async fn monitor_orders(&self) -> anyhow::Result<()> {
        self.monitor_buys().await?;
        self.monitor_sells().await?;
        Ok(())
    }

    async fn monitor_buys(&self) -> anyhow::Result<()> {
        let trades = TradeRepository::buys_in_flight(&self.pool).await?;

        for trade in trades {
            let Some(subscriber) =
                SubscriberRepository::find_by_id(&self.pool, trade.subscriber_id).await?
            else {
                warn!(
                    "Subscriber {} vanished; leaving trade {} for the next cycle",
                    trade.subscriber_id, trade.id
                );
                continue;
            };

            let state = match self
                .gateway
                .order_status(&subscriber.api_key, &trade.buy_order_id)
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    debug!("No status for buy order {} this cycle: {}", trade.buy_order_id, e);
                    continue;
                }
            };

            match state {
                OrderState::Filled => {
                    info!("Buy filled for {}. Submitting take-profit sell...", trade.symbol());
                    self.submit_take_profit(&subscriber.api_key, &trade).await?;
                }
                OrderState::Canceled | OrderState::Rejected => {
                    warn!(
                        "Exchange dropped buy order {} for trade {}",
                        trade.buy_order_id, trade.id
                    );
                    TradeRepository::mark_buy_failed(
                        &self.pool,
                        trade.id,
                        "buy order cancelled or rejected by the exchange",
                    )
                    .await?;
                }
                OrderState::Open => {
                    let elapsed = (Utc::now() - trade.buy_submit_time)
                        .to_std()
                        .unwrap_or_default();
                    if elapsed > self.buy_timeout {
                        info!(
                            "Buy order {} timed out after {:?}, cancelling",
                            trade.buy_order_id, elapsed
                        );
                        self.gateway
                            .cancel_order(&subscriber.api_key, &trade.buy_order_id)
                            .await;
                        TradeRepository::mark_buy_timed_out(&self.pool, trade.id).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn submit_take_profit(&self, api_key: &str, trade: &Trade) -> anyhow::Result<()> {
        match self
            .gateway
            .place_order(
                api_key,
                &trade.symbol(),
                OrderSide::Sell,
                trade.quantity,
                trade.target_price,
            )
            .await
        {
            Ok(sell_order_id) => {
                TradeRepository::mark_filled_with_sell(&self.pool, trade.id, &sell_order_id)
                    .await?;
                info!(
                    "Take-profit sell {} resting at {} for trade {}",
                    sell_order_id, trade.target_price, trade.id
                );
            }
            Err(e) => {
                // The position is now long with no resting sell. Record it
                // and leave it for an operator; the stop-loss path still
                // covers the downside.
                error!("Sell placement failed for trade {}: {}", trade.id, e);
                TradeRepository::mark_filled_without_sell(
                    &self.pool,
                    trade.id,
                    &format!("Sell Error: {}", e),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn monitor_sells(&self) -> anyhow::Result<()> {
        let trades = TradeRepository::sells_in_flight(&self.pool).await?;

        for trade in trades {
            let Some(sell_order_id) = trade.sell_order_id.as_deref() else {
                continue;
            };
            let Some(subscriber) =
                SubscriberRepository::find_by_id(&self.pool, trade.subscriber_id).await?
            else {
                continue;
            };

            match self
                .gateway
                .order_status(&subscriber.api_key, sell_order_id)
                .await
            {
                Ok(OrderState::Filled) => {
                    info!("Take-profit hit for trade {} ({})", trade.id, trade.symbol());
                    TradeRepository::mark_sell_filled(&self.pool, trade.id).await?;
                }
                Ok(OrderState::Canceled | OrderState::Rejected) => {
                    // The position is long again with no resting sell. Flag
                    // it for an operator; the stop-loss path still covers
                    // the downside while the order id stays on the row.
                    warn!(
                        "Exchange dropped take-profit {} for trade {}",
                        sell_order_id, trade.id
                    );
                    TradeRepository::set_log_message(
                        &self.pool,
                        trade.id,
                        "take-profit sell cancelled or rejected by the exchange",
                    )
                    .await?;
                }
                Ok(OrderState::Open) => {}
                Err(e) => {
                    debug!("No status for sell order {} this cycle: {}", sell_order_id, e);
                }
            }
        }
        Ok(())
    }
}
