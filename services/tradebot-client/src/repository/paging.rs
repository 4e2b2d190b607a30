//! Offset paging over the remote trade history

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::remote;
use crate::api::{RetryPolicy, TradingApi};
use crate::cache::CacheDb;
use crate::error::Result;
use crate::types::Trade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub page_size: u64,
    pub initial_load_size: u64,
    pub enable_placeholders: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            initial_load_size: 60,
            enable_placeholders: false,
        }
    }
}

impl PagingConfig {
    pub fn with_page_size(page_size: u64) -> Self {
        Self {
            page_size,
            initial_load_size: page_size * 3,
            enable_placeholders: false,
        }
    }
}

/// Walks the trade history page by page, writing each page to the cache
pub struct TradeHistoryPager {
    api: TradingApi,
    cache: CacheDb,
    retry: RetryPolicy,
    config: PagingConfig,
    strategy_id: Option<String>,
    next_offset: u64,
    loaded: bool,
    exhausted: bool,
}

impl TradeHistoryPager {
    pub(crate) fn new(
        api: TradingApi,
        cache: CacheDb,
        retry: RetryPolicy,
        config: PagingConfig,
        strategy_id: Option<String>,
    ) -> Self {
        Self {
            api,
            cache,
            retry,
            config,
            strategy_id,
            next_offset: 0,
            loaded: false,
            exhausted: false,
        }
    }

    pub fn config(&self) -> &PagingConfig {
        &self.config
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Items fetched so far
    pub fn loaded_count(&self) -> u64 {
        self.next_offset
    }

    /// Start over from the newest trade with an initial-sized load
    pub async fn refresh(&mut self) -> Result<Vec<Trade>> {
        let limit = self.config.initial_load_size.max(1);
        let (trades, total) = self.fetch(0, limit).await?;

        self.loaded = true;
        self.next_offset = 0;
        self.exhausted = false;
        self.advance(trades.len(), limit, total);
        Ok(trades)
    }

    /// Load the page after the last one; empty once exhausted
    pub async fn load_next(&mut self) -> Result<Vec<Trade>> {
        if !self.loaded {
            return self.refresh().await;
        }
        if self.exhausted {
            return Ok(Vec::new());
        }

        let limit = self.config.page_size.max(1);
        let (trades, total) = self.fetch(self.next_offset, limit).await?;
        self.advance(trades.len(), limit, total);
        Ok(trades)
    }

    async fn fetch(&self, offset: u64, limit: u64) -> Result<(Vec<Trade>, Option<u64>)> {
        let strategy_id = self.strategy_id.as_deref();
        let page = remote(&self.retry, || {
            self.api.list_trades(offset, limit, strategy_id)
        })
        .await?;

        let trades: Vec<Trade> = page.items.into_iter().map(Trade::from).collect();
        self.cache.trades().upsert_all(&trades).await?;

        debug!(
            "Loaded {} trades at offset {} (total {:?})",
            trades.len(),
            offset,
            page.total
        );
        Ok((trades, page.total))
    }

    // A short page or reaching the server's total ends the history
    fn advance(&mut self, fetched: usize, requested: u64, total: Option<u64>) {
        self.next_offset += fetched as u64;
        if (fetched as u64) < requested || total.is_some_and(|t| self.next_offset >= t) {
            self.exhausted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paging_config() {
        let config = PagingConfig::default();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.initial_load_size, 3 * config.page_size);
        assert!(!config.enable_placeholders);
        assert_eq!(PagingConfig::with_page_size(20), config);
    }
}
