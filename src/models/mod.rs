pub mod signal;
pub mod subscriber;
pub mod trade;

pub use signal::Signal;
pub use subscriber::{Subscriber, SubscriberRecord};
pub use trade::{BuyStatus, SellStatus, Trade, TradeInsert};
