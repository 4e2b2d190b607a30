use super::{remote, require};
use crate::api::dto::MarketAnalysis;
use crate::api::{RetryPolicy, TradingApi};
use crate::error::Result;

#[derive(Clone)]
pub struct MarketRepository {
    api: TradingApi,
    retry: RetryPolicy,
}

impl MarketRepository {
    pub fn new(api: TradingApi, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub async fn analysis(&self, symbol: &str, timeframe: &str) -> Result<MarketAnalysis> {
        require(symbol, "Symbol")?;
        require(timeframe, "Timeframe")?;
        let symbol = symbol.trim().to_uppercase();
        remote(&self.retry, || self.api.market_analysis(&symbol, timeframe)).await
    }
}
