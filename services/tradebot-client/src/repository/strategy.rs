use futures::stream::BoxStream;
use tracing::{debug, info};

use super::{remote, require};
use crate::api::dto::{CreateStrategyRequest, UpdateStrategyRequest};
use crate::api::{RetryPolicy, TradingApi};
use crate::cache::CacheDb;
use crate::error::{ClientError, Result};
use crate::types::Strategy;

#[derive(Clone)]
pub struct StrategyRepository {
    api: TradingApi,
    cache: CacheDb,
    retry: RetryPolicy,
}

impl StrategyRepository {
    pub fn new(api: TradingApi, cache: CacheDb, retry: RetryPolicy) -> Self {
        Self { api, cache, retry }
    }

    pub fn observe_strategies(&self) -> BoxStream<'static, Vec<Strategy>> {
        self.cache.strategies().observe_all()
    }

    pub fn observe_strategy(&self, id: &str) -> BoxStream<'static, Option<Strategy>> {
        self.cache.strategies().observe(id)
    }

    /// Pull the full list and merge it into the cache
    pub async fn refresh(&self) -> Result<Vec<Strategy>> {
        let dtos = remote(&self.retry, || self.api.list_strategies()).await?;
        let strategies: Vec<Strategy> = dtos.into_iter().map(Strategy::from).collect();

        self.cache.strategies().upsert_all(&strategies).await?;
        debug!("Cached {} strategies", strategies.len());
        Ok(strategies)
    }

    pub async fn get(&self, id: &str) -> Result<Strategy> {
        require(id, "Strategy id")?;
        let strategy: Strategy = remote(&self.retry, || self.api.get_strategy(id)).await?.into();
        self.cache.strategies().upsert(&strategy).await?;
        Ok(strategy)
    }

    pub async fn create(&self, req: CreateStrategyRequest) -> Result<Strategy> {
        require(&req.name, "Name")?;
        require(&req.strategy_type, "Strategy type")?;
        require(&req.symbol, "Symbol")?;
        require(&req.timeframe, "Timeframe")?;

        let strategy: Strategy = remote(&self.retry, || self.api.create_strategy(&req))
            .await?
            .into();
        self.cache.strategies().upsert(&strategy).await?;
        info!("Created strategy {} ({})", strategy.name, strategy.id);
        Ok(strategy)
    }

    pub async fn update(&self, id: &str, req: UpdateStrategyRequest) -> Result<Strategy> {
        require(id, "Strategy id")?;
        if req.is_empty() {
            return Err(ClientError::Validation("Nothing to update".to_string()));
        }
        if let Some(name) = &req.name {
            require(name, "Name")?;
        }

        let strategy: Strategy = remote(&self.retry, || self.api.update_strategy(id, &req))
            .await?
            .into();
        self.cache.strategies().upsert(&strategy).await?;
        Ok(strategy)
    }

    /// Delete on the server first, then locally
    pub async fn delete(&self, id: &str) -> Result<()> {
        require(id, "Strategy id")?;
        remote(&self.retry, || self.api.delete_strategy(id)).await?;
        self.cache.strategies().delete(id).await?;
        info!("Deleted strategy {}", id);
        Ok(())
    }

    pub async fn start(&self, id: &str) -> Result<Strategy> {
        require(id, "Strategy id")?;
        let strategy: Strategy = remote(&self.retry, || self.api.start_strategy(id)).await?.into();
        self.cache.strategies().upsert(&strategy).await?;
        info!("Started strategy {}", id);
        Ok(strategy)
    }

    pub async fn stop(&self, id: &str) -> Result<Strategy> {
        require(id, "Strategy id")?;
        let strategy: Strategy = remote(&self.retry, || self.api.stop_strategy(id)).await?.into();
        self.cache.strategies().upsert(&strategy).await?;
        info!("Stopped strategy {}", id);
        Ok(strategy)
    }
}
