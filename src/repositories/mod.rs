pub mod subscriber_repo;
pub mod trade_repo;

pub use subscriber_repo::SubscriberRepository;
pub use trade_repo::TradeRepository;
