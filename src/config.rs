use std::env;
use std::time::Duration;

/// Runtime tunables, read once at startup. Every knob has a default so a
/// bare `.env` with only DATABASE_PATH and the URLs is enough to run.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub wallex_base_url: String,
    pub signal_pool_url: String,

    /// Engine tick: signal fetch + order monitoring.
    pub signal_check_interval: Duration,
    /// Slower cadence for the stop-loss scan.
    pub risk_check_interval: Duration,
    /// Domain timeout for an unfilled buy order, measured from submission.
    pub buy_timeout: Duration,

    /// Maximum placements in one emergency-liquidation chase.
    pub chasing_attempts: u32,
    /// Pause between placing a chase order and polling its status.
    pub chasing_delay: Duration,
    /// Fractional discount below last price for chase orders (0.001 = 0.1%).
    pub chase_discount: f64,

    /// How long a (coin, signal_time) key stays in the dedup cache.
    pub dedup_window: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "copy_trader.db".to_string()),
            wallex_base_url: env::var("WALLEX_BASE_URL")
                .unwrap_or_else(|_| "https://api.wallex.ir".to_string()),
            signal_pool_url: env::var("SIGNAL_POOL_URL")
                .unwrap_or_else(|_| "http://localhost:8080/signals".to_string()),
            signal_check_interval: Duration::from_secs(env_u64("SIGNAL_CHECK_INTERVAL_SECS", 5)),
            risk_check_interval: Duration::from_secs(env_u64("RISK_CHECK_INTERVAL_SECS", 30)),
            buy_timeout: Duration::from_secs(env_u64("BUY_TIMEOUT_SECONDS", 60)),
            chasing_attempts: env_u32("CHASING_ATTEMPTS", 3),
            chasing_delay: Duration::from_secs(env_u64("CHASING_DELAY_SECS", 3)),
            chase_discount: env_f64("CHASE_DISCOUNT", 0.001),
            dedup_window: Duration::from_secs(env_u64("DEDUP_WINDOW_SECS", 6 * 3600)),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_attempts_value_falls_back_to_default() {
        unsafe { env::set_var("TEST_CHASING_ATTEMPTS", "5000000000") };
        assert_eq!(env_u32("TEST_CHASING_ATTEMPTS", 3), 3);

        unsafe { env::set_var("TEST_CHASING_ATTEMPTS", "7") };
        assert_eq!(env_u32("TEST_CHASING_ATTEMPTS", 3), 7);
    }
}
