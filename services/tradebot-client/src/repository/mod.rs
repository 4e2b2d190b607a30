//! Repositories: validate, call remote with retry, write through to the cache
//!
//! A repository never writes to the cache unless the remote call it depends
//! on succeeded, and never lets a transport error escape unmapped.

pub mod auth;
pub mod backtest;
pub mod market;
pub mod notification;
pub mod paging;
pub mod risk;
pub mod strategy;
pub mod trade;

pub use auth::AuthRepository;
pub use backtest::BacktestRepository;
pub use market::MarketRepository;
pub use notification::NotificationRepository;
pub use paging::{PagingConfig, TradeHistoryPager};
pub use risk::RiskRepository;
pub use strategy::StrategyRepository;
pub use trade::TradeRepository;

use std::future::Future;

use crate::api::{retry, ApiResult, RetryPolicy};
use crate::error::{ClientError, Result};

/// Run `operation` under `policy` and fold the envelope
pub(crate) async fn remote<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    retry(policy, operation).await.into_result()
}

pub(crate) fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
