//! Trading Bot Client Library
//!
//! Client core for the trading-bot platform: authenticated HTTP pipeline
//! with token refresh and retry, a SQLite cache that UIs observe, and the
//! live-channel notification trigger.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod live;
pub mod notify;
pub mod observability;
pub mod repository;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use api::{ApiResult, AuthState, Authenticator, RefreshFailurePolicy, RetryPolicy, TradingApi};
pub use cache::CacheDb;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use live::{LiveEvent, LiveSocket, LiveUpdate};
pub use notify::{
    LogNotifier, NotificationChannel, NotificationPreferences, NotificationTrigger, Notifier,
};
pub use session::TradingClient;
pub use store::{TokenPair, TokenStore};
pub use types::{NotificationRecord, Strategy, StrategyStatus, Trade, TradeSide};
