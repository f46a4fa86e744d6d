use sqlx::{FromRow, SqlitePool};

use crate::models::{BuyStatus, SellStatus, Trade, TradeInsert};

/// A stop-loss scan row: the Trade plus what the scan needs from its owner.
#[derive(Debug, Clone, FromRow)]
pub struct StopLossCandidate {
    #[sqlx(flatten)]
    pub trade: Trade,
    pub stop_loss_percent: f64,
    pub api_key: String,
}

pub struct TradeRepository;

impl TradeRepository {
    pub async fn insert(pool: &SqlitePool, trade: &TradeInsert) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
                INSERT INTO trades (
                    subscriber_id, coin, pair, entry_price, target_price,
                    strategy_name, signal_grade,
                    buy_order_id, quantity, buy_status, buy_submit_time, sell_status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.subscriber_id)
        .bind(&trade.coin)
        .bind(&trade.pair)
        .bind(trade.entry_price)
        .bind(trade.target_price)
        .bind(&trade.strategy_name)
        .bind(&trade.signal_grade)
        .bind(&trade.buy_order_id)
        .bind(trade.quantity)
        .bind(BuyStatus::BuySubmitted)
        .bind(trade.buy_submit_time)
        .bind(SellStatus::Pending)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Committed notional for one subscriber in one pair: quantity × entry
    /// price over every Trade that still holds capital. Entry price, not
    /// market price: the ceiling is a commitment limit, not mark-to-market.
    pub async fn frozen_capital(
        pool: &SqlitePool,
        subscriber_id: i64,
        pair: &str,
    ) -> Result<f64, sqlx::Error> {
        let (sum,): (f64,) = sqlx::query_as(
            r#"
                SELECT COALESCE(SUM(quantity * entry_price), 0.0)
                FROM trades
                WHERE subscriber_id = ?
                  AND pair = ?
                  AND sell_status NOT IN ('FILLED', 'STOP_LOSS_FILLED')
                  AND buy_status != 'FAILED'
            "#,
        )
        .bind(subscriber_id)
        .bind(pair)
        .fetch_one(pool)
        .await?;

        Ok(sum)
    }

    pub async fn buys_in_flight(pool: &SqlitePool) -> Result<Vec<Trade>, sqlx::Error> {
        sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE buy_status = 'BUY_SUBMITTED'")
            .fetch_all(pool)
            .await
    }

    /// Take-profit sells still resting on the book.
    pub async fn sells_in_flight(pool: &SqlitePool) -> Result<Vec<Trade>, sqlx::Error> {
        sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE sell_status = 'SUBMITTED'")
            .fetch_all(pool)
            .await
    }

    /// Open positions eligible for the stop-loss scan: the buy filled, the
    /// sell leg has not resolved, and the owner opted in with a non-zero
    /// stop-loss percent. Deliberately ignores `is_active`: deactivating a
    /// profile must not orphan its open positions.
    pub async fn stop_loss_candidates(
        pool: &SqlitePool,
    ) -> Result<Vec<StopLossCandidate>, sqlx::Error> {
        sqlx::query_as::<_, StopLossCandidate>(
            r#"
                SELECT t.*, s.stop_loss_percent, s.api_key
                FROM trades t
                JOIN subscribers s ON s.id = t.subscriber_id
                WHERE t.buy_status = 'FILLED'
                  AND t.sell_status IN ('PENDING', 'SUBMITTED')
                  AND s.stop_loss_percent > 0
            "#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Trade>, sqlx::Error> {
        sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Buy filled and the take-profit sell accepted, in one row update.
    pub async fn mark_filled_with_sell(
        pool: &SqlitePool,
        trade_id: i64,
        sell_order_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
                UPDATE trades
                SET buy_status = 'FILLED', sell_status = 'SUBMITTED', sell_order_id = ?
                WHERE id = ?
            "#,
        )
        .bind(sell_order_id)
        .bind(trade_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Buy filled but the sell placement failed: the position is stuck with
    /// no resting order and waits for an operator (or the stop-loss path).
    pub async fn mark_filled_without_sell(
        pool: &SqlitePool,
        trade_id: i64,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trades SET buy_status = 'FILLED', log_message = ? WHERE id = ?")
            .bind(error)
            .bind(trade_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_buy_timed_out(pool: &SqlitePool, trade_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trades SET buy_status = 'TIMEOUT_CANCELLED' WHERE id = ?")
            .bind(trade_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_buy_failed(
        pool: &SqlitePool,
        trade_id: i64,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trades SET buy_status = 'FAILED', log_message = ? WHERE id = ?")
            .bind(reason)
            .bind(trade_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_sell_filled(pool: &SqlitePool, trade_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trades SET sell_status = 'FILLED' WHERE id = ?")
            .bind(trade_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_stop_loss_submitted(
        pool: &SqlitePool,
        trade_id: i64,
        sell_order_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
                UPDATE trades
                SET sell_status = 'STOP_LOSS_SUBMITTED', sell_order_id = ?
                WHERE id = ?
            "#,
        )
        .bind(sell_order_id)
        .bind(trade_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_stop_loss_filled(
        pool: &SqlitePool,
        trade_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trades SET sell_status = 'STOP_LOSS_FILLED' WHERE id = ?")
            .bind(trade_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn set_log_message(
        pool: &SqlitePool,
        trade_id: i64,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trades SET log_message = ? WHERE id = ?")
            .bind(message)
            .bind(trade_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
