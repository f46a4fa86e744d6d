use serde::Deserialize;

/// An external recommendation to buy `coin` at `entry_price` with a
/// take-profit at `target_price`. Produced by the signal pool, never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct Signal {
    pub coin: String,
    pub pair: String,
    pub entry_price: f64,
    pub target_price: f64,
    pub strategy_name: String,
    pub signal_grade: String,
    /// Feed timestamp (unix seconds); part of the dedup key.
    pub signal_time: i64,
}

impl Signal {
    /// Exchange symbol, e.g. "BTC" + "USDT" -> "BTCUSDT".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.coin, self.pair)
    }
}
