use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Buy-leg lifecycle. `BuySubmitted` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
pub enum BuyStatus {
    #[sqlx(rename = "BUY_SUBMITTED")]
    BuySubmitted,
    #[sqlx(rename = "FILLED")]
    Filled,
    #[sqlx(rename = "TIMEOUT_CANCELLED")]
    TimeoutCancelled,
    /// The exchange cancelled or rejected the order on its own.
    #[sqlx(rename = "FAILED")]
    Failed,
}

/// Sell-leg lifecycle. `Filled` and `StopLossFilled` are terminal; a Trade
/// in either state no longer counts toward frozen capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
pub enum SellStatus {
    #[sqlx(rename = "PENDING")]
    Pending,
    #[sqlx(rename = "SUBMITTED")]
    Submitted,
    #[sqlx(rename = "FILLED")]
    Filled,
    #[sqlx(rename = "STOP_LOSS_SUBMITTED")]
    StopLossSubmitted,
    #[sqlx(rename = "STOP_LOSS_FILLED")]
    StopLossFilled,
}

/// One accepted signal for one subscriber: the unit of work the lifecycle
/// manager and the risk manager advance. Signal attributes are copied in at
/// creation so later edits to the subscriber or signal cannot affect it.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)]
pub struct Trade {
    pub id: i64,
    pub subscriber_id: i64,
    pub coin: String,
    pub pair: String,
    pub entry_price: f64,
    pub target_price: f64,
    pub strategy_name: String,
    pub signal_grade: String,
    pub buy_order_id: String,
    pub quantity: f64,
    pub buy_status: BuyStatus,
    pub buy_submit_time: DateTime<Utc>,
    pub sell_order_id: Option<String>,
    pub sell_status: SellStatus,
    pub log_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    pub fn symbol(&self) -> String {
        format!("{}{}", self.coin, self.pair)
    }
}

/// Fields needed to insert a fresh Trade after a successful buy placement.
#[derive(Debug, Clone)]
pub struct TradeInsert {
    pub subscriber_id: i64,
    pub coin: String,
    pub pair: String,
    pub entry_price: f64,
    pub target_price: f64,
    pub strategy_name: String,
    pub signal_grade: String,
    pub buy_order_id: String,
    pub quantity: f64,
    pub buy_submit_time: DateTime<Utc>,
}
