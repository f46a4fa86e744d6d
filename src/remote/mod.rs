pub mod signal_feed;
pub mod wallex_client;

pub use signal_feed::SignalFeed;
pub use wallex_client::WallexClient;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange rejected the request: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Exchange-side view of an order, collapsed to what the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Fully executed.
    Filled,
    /// Cancelled at the exchange (by us or by the venue).
    Canceled,
    /// Rejected or expired; never executed.
    Rejected,
    /// Still resting on the book (new / partially filled).
    Open,
}

impl OrderState {
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "FILLED" => OrderState::Filled,
            "CANCELED" | "CANCELLED" => OrderState::Canceled,
            "REJECTED" | "EXPIRED" => OrderState::Rejected,
            _ => OrderState::Open,
        }
    }
}

/// Market metadata as reported by the venue; used only to verify a symbol
/// is actually listed before placing a buy.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MarketInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

/// The engine's seam to the exchange. Every call carries the subscriber's
/// own API key since each subscriber trades on their own account. All calls
/// are blocking network requests with bounded timeouts; read failures mean
/// "no data this cycle", never a crash.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Latest traded price for a symbol, if the venue reports one.
    async fn last_price(&self, api_key: &str, symbol: &str) -> Option<f64>;

    /// Metadata for a listed market; `None` when unknown or unreachable.
    async fn market_info(&self, api_key: &str, symbol: &str) -> Option<MarketInfo>;

    /// Place a LIMIT order; returns the client order id on success.
    async fn place_order(
        &self,
        api_key: &str,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<String, GatewayError>;

    async fn order_status(&self, api_key: &str, order_id: &str)
    -> Result<OrderState, GatewayError>;

    /// Best effort: returns whether the venue acknowledged the cancel.
    async fn cancel_order(&self, api_key: &str, order_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_statuses_collapse_to_engine_states() {
        assert_eq!(OrderState::from_exchange("FILLED"), OrderState::Filled);
        assert_eq!(OrderState::from_exchange("CANCELLED"), OrderState::Canceled);
        assert_eq!(OrderState::from_exchange("EXPIRED"), OrderState::Rejected);
        assert_eq!(OrderState::from_exchange("NEW"), OrderState::Open);
        assert_eq!(
            OrderState::from_exchange("PARTIALLY_FILLED"),
            OrderState::Open
        );
    }
}
