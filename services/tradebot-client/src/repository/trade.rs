use futures::stream::BoxStream;

use super::paging::{PagingConfig, TradeHistoryPager};
use super::remote;
use crate::api::dto::{PnlPeriod, PnlSummary};
use crate::api::{RetryPolicy, TradingApi};
use crate::cache::CacheDb;
use crate::error::Result;
use crate::types::Trade;

#[derive(Clone)]
pub struct TradeRepository {
    api: TradingApi,
    cache: CacheDb,
    retry: RetryPolicy,
    paging: PagingConfig,
}

impl TradeRepository {
    pub fn new(api: TradingApi, cache: CacheDb, retry: RetryPolicy, paging: PagingConfig) -> Self {
        Self {
            api,
            cache,
            retry,
            paging,
        }
    }

    /// New pager over all trades, or one strategy's trades
    pub fn pager(&self, strategy_id: Option<&str>) -> TradeHistoryPager {
        TradeHistoryPager::new(
            self.api.clone(),
            self.cache.clone(),
            self.retry,
            self.paging,
            strategy_id.map(str::to_string),
        )
    }

    pub fn observe_recent(&self, limit: i64) -> BoxStream<'static, Vec<Trade>> {
        self.cache.trades().observe_recent(limit)
    }

    /// Cached trades for one strategy, newest first
    pub async fn cached_for_strategy(&self, strategy_id: &str) -> Result<Vec<Trade>> {
        Ok(self.cache.trades().for_strategy(strategy_id).await?)
    }

    pub async fn pnl_summary(
        &self,
        strategy_id: Option<&str>,
        period: PnlPeriod,
    ) -> Result<PnlSummary> {
        remote(&self.retry, || self.api.pnl_summary(period, strategy_id)).await
    }
}
