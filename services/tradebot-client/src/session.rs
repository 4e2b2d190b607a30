//! Wires config, storage, the HTTP pipeline and repositories together

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{
    build_http_client, AuthState, Authenticator, HttpPipeline, HttpTokenRefresher, TradingApi,
};
use crate::cache::CacheDb;
use crate::config::ClientConfig;
use crate::live::LiveSocket;
use crate::notify::{LogNotifier, Notifier, NotificationTrigger, PreferenceStore};
use crate::repository::{
    AuthRepository, BacktestRepository, MarketRepository, NotificationRepository, RiskRepository,
    StrategyRepository, TradeRepository,
};
use crate::store::{SecretsManager, TokenStore};

/// Everything a UI shell needs, built from one [`ClientConfig`]
pub struct TradingClient {
    config: ClientConfig,
    authenticator: Authenticator,
    cache: CacheDb,
    preferences: Arc<PreferenceStore>,
    live: LiveSocket,
    trigger: NotificationTrigger,
    auth: AuthRepository,
    strategies: StrategyRepository,
    trades: TradeRepository,
    notifications: NotificationRepository,
    risk: RiskRepository,
    backtests: BacktestRepository,
    market: MarketRepository,
}

impl TradingClient {
    pub async fn connect(config: ClientConfig) -> anyhow::Result<Self> {
        Self::with_notifier(config, Arc::new(LogNotifier)).await
    }

    pub async fn with_notifier(
        config: ClientConfig,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data dir {}", config.data_dir.display())
        })?;

        let secrets = match &config.secrets_key {
            Some(key) => SecretsManager::from_hex(key)?,
            None => SecretsManager::load_or_create(&config.key_path())?,
        };
        let tokens = Arc::new(TokenStore::open(config.token_path(), secrets)?);

        let refresher = HttpTokenRefresher::with_timeout(&config.api_base_url, config.request_timeout())?;
        let authenticator =
            Authenticator::new(tokens, Arc::new(refresher), config.refresh_failure_policy);

        let http = build_http_client(config.connect_timeout(), config.request_timeout())?;
        let api = TradingApi::new(HttpPipeline::new(http, &config.api_base_url, authenticator.clone()));

        let cache = CacheDb::open(config.cache_path())
            .await
            .context("Failed to open local cache")?;

        let preferences = Arc::new(PreferenceStore::load(config.preferences_path()));
        let live = LiveSocket::new(&config.ws_url, authenticator.clone(), config.retry)?;
        let trigger = NotificationTrigger::new(cache.clone(), notifier, preferences.subscribe());

        let retry = config.retry;
        let client = Self {
            auth: AuthRepository::new(api.clone(), authenticator.clone(), cache.clone(), retry),
            strategies: StrategyRepository::new(api.clone(), cache.clone(), retry),
            trades: TradeRepository::new(api.clone(), cache.clone(), retry, config.paging),
            notifications: NotificationRepository::new(api.clone(), cache.clone(), retry),
            risk: RiskRepository::new(api.clone(), retry),
            backtests: BacktestRepository::new(api.clone(), retry),
            market: MarketRepository::new(api, retry),
            config,
            authenticator,
            cache,
            preferences,
            live,
            trigger,
        };

        info!(
            "Trading client ready (api={}, logged_in={})",
            client.config.api_base_url,
            client.auth.is_logged_in()
        );
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn auth_state(&self) -> AuthState {
        self.authenticator.state()
    }

    pub fn cache(&self) -> &CacheDb {
        &self.cache
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn live(&self) -> &LiveSocket {
        &self.live
    }

    pub fn trigger(&self) -> &NotificationTrigger {
        &self.trigger
    }

    pub fn auth(&self) -> &AuthRepository {
        &self.auth
    }

    pub fn strategies(&self) -> &StrategyRepository {
        &self.strategies
    }

    pub fn trades(&self) -> &TradeRepository {
        &self.trades
    }

    pub fn notifications(&self) -> &NotificationRepository {
        &self.notifications
    }

    pub fn risk(&self) -> &RiskRepository {
        &self.risk
    }

    pub fn backtests(&self) -> &BacktestRepository {
        &self.backtests
    }

    pub fn market(&self) -> &MarketRepository {
        &self.market
    }

    /// Connect the live channel and start turning its events into notifications
    pub fn start_live(&self) -> bool {
        let trigger_started = self.trigger.start(self.live.subscribe());
        let socket_started = self.live.start();
        trigger_started || socket_started
    }

    pub async fn stop_live(&self) {
        self.trigger.stop();
        self.live.close().await;
    }

    /// Drop notifications older than the configured retention
    pub async fn prune_notifications(&self) -> u64 {
        let days = self.config.notification_retention_days.max(1);
        let Some(retention) = chrono::TimeDelta::try_days(days) else {
            warn!("Notification retention of {} days is out of range, skipping prune", days);
            return 0;
        };
        match self.notifications.prune(retention).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to prune notifications: {}", e);
                0
            }
        }
    }

    pub async fn shutdown(&self) {
        self.stop_live().await;
        self.cache.pool().close().await;
        info!("Trading client shut down");
    }
}
