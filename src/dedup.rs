use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Bounded, time-windowed memory of already-processed signals, keyed by
/// (coin, signal_time). Owned by the poll-loop driver: the engine itself
/// assumes its input batches are already deduplicated.
pub struct ProcessedSignals {
    window: chrono::Duration,
    seen: HashMap<(String, i64), DateTime<Utc>>,
}

impl ProcessedSignals {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(6)),
            seen: HashMap::new(),
        }
    }

    /// Whether the key was already recorded inside the window. Read-only:
    /// the driver checks before handing a signal to the engine and records
    /// the key only once the engine has handled it.
    pub fn seen(&self, coin: &str, signal_time: i64) -> bool {
        let horizon = Utc::now() - self.window;
        self.seen
            .get(&(coin.to_string(), signal_time))
            .is_some_and(|first_seen| *first_seen > horizon)
    }

    /// Records the key and reports whether it was first seen now. Expired
    /// entries are pruned on insert, keeping the set bounded by the window.
    pub fn insert(&mut self, coin: &str, signal_time: i64) -> bool {
        self.insert_at(coin, signal_time, Utc::now())
    }

    fn insert_at(&mut self, coin: &str, signal_time: i64, now: DateTime<Utc>) -> bool {
        let horizon = now - self.window;
        self.seen.retain(|_, first_seen| *first_seen > horizon);

        self.seen
            .insert((coin.to_string(), signal_time), now)
            .is_none()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
