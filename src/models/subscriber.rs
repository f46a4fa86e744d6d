use std::collections::{HashMap, HashSet};

use sqlx::FromRow;

use crate::models::Signal;

/// Raw subscriber row as stored; the filter and capital columns are JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriberRecord {
    pub id: i64,
    pub operator_id: i64,
    pub api_key: String,
    pub buy_amounts: String,
    pub frozen_ceilings: String,
    pub stop_loss_percent: f64,
    pub allowed_strategies: String,
    pub allowed_grades: String,
    pub allowed_coins: String,
    pub is_active: bool,
}

/// A trading profile with its filter and capital columns decoded.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Subscriber {
    pub id: i64,
    pub operator_id: i64,
    pub api_key: String,
    /// Per-pair budget for one signal; a missing pair is not traded.
    pub buy_amounts: HashMap<String, f64>,
    /// Per-pair ceiling on committed notional.
    pub frozen_ceilings: HashMap<String, f64>,
    pub stop_loss_percent: f64,
    pub allowed_strategies: HashSet<String>,
    pub allowed_grades: HashSet<String>,
    pub allowed_coins: HashSet<String>,
    pub is_active: bool,
}

impl From<SubscriberRecord> for Subscriber {
    fn from(rec: SubscriberRecord) -> Self {
        Self {
            id: rec.id,
            operator_id: rec.operator_id,
            api_key: rec.api_key,
            buy_amounts: decode_json(&rec.buy_amounts),
            frozen_ceilings: decode_json(&rec.frozen_ceilings),
            stop_loss_percent: rec.stop_loss_percent,
            allowed_strategies: decode_json(&rec.allowed_strategies),
            allowed_grades: decode_json(&rec.allowed_grades),
            allowed_coins: decode_json(&rec.allowed_coins),
            is_active: rec.is_active,
        }
    }
}

/// Malformed or absent JSON decodes to the type's empty value. An
/// unconfigured filter blocks everything, it never allows everything.
fn decode_json<T: Default + serde::de::DeserializeOwned>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}

impl Subscriber {
    /// Filter check for a signal: strategy, then grade, then coin.
    /// Short-circuits on the first dimension that does not match.
    pub fn accepts(&self, signal: &Signal) -> bool {
        self.allowed_strategies.contains(&signal.strategy_name)
            && self.allowed_grades.contains(&signal.signal_grade)
            && self.allowed_coins.contains(&signal.coin)
    }

    pub fn buy_amount(&self, pair: &str) -> Option<f64> {
        self.buy_amounts.get(pair).copied()
    }

    pub fn frozen_ceiling(&self, pair: &str) -> f64 {
        self.frozen_ceilings.get(pair).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal() -> Signal {
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

    fn subscriber(strategies: &str, grades: &str, coins: &str) -> Subscriber {
        SubscriberRecord {
            id: 1,
            operator_id: 10,
            api_key: "k".into(),
            buy_amounts: r#"{"USDT": 20.0}"#.into(),
            frozen_ceilings: r#"{"USDT": 100.0}"#.into(),
            stop_loss_percent: 2.0,
            allowed_strategies: strategies.into(),
            allowed_grades: grades.into(),
            allowed_coins: coins.into(),
            is_active: true,
        }
        .into()
    }

    #[test]
    fn accepts_when_all_filters_match() {
        let sub = subscriber(r#"["Internal"]"#, r#"["Q1"]"#, r#"["BTC"]"#);
        assert!(sub.accepts(&signal()));
    }

    #[test]
    fn empty_coin_filter_matches_nothing() {
        let sub = subscriber(r#"["Internal"]"#, r#"["Q1"]"#, "[]");
        assert!(!sub.accepts(&signal()));
    }

    #[test]
    fn malformed_filter_json_is_default_deny() {
        let sub = subscriber(r#"["Internal"]"#, "not json", r#"["BTC"]"#);
        assert!(!sub.accepts(&signal()));
    }

    #[test]
    fn rejects_unlisted_strategy() {
        let sub = subscriber(r#"["Scalp"]"#, r#"["Q1"]"#, r#"["BTC"]"#);
        assert!(!sub.accepts(&signal()));
    }

    #[test]
    fn missing_pair_has_no_budget_and_zero_ceiling() {
        let sub = subscriber(r#"["Internal"]"#, r#"["Q1"]"#, r#"["BTC"]"#);
        assert_eq!(sub.buy_amount("TMN"), None);
        assert_eq!(sub.frozen_ceiling("TMN"), 0.0);
        assert_eq!(sub.buy_amount("USDT"), Some(20.0));
    }
}
