pub mod risk_manager;
pub mod trading_engine;

pub use risk_manager::RiskManager;
pub use trading_engine::TradingEngine;
