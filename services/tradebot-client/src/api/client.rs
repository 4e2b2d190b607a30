//! Platform API Client

use reqwest::{Client, Method};
use std::time::Duration;
use tracing::debug;

use super::auth::{RefreshError, TokenRefresher};
use super::dto::*;
use super::http::{Auth, HttpPipeline};
use super::result::ApiResult;
use crate::store::TokenPair;

/// Typed endpoints of the platform API
///
/// Every method performs exactly one HTTP exchange (plus at most one
/// replay after a token refresh). Retrying is the caller's business.
#[derive(Clone)]
pub struct TradingApi {
    http: HttpPipeline,
}

impl TradingApi {
    pub fn new(http: HttpPipeline) -> Self {
        Self { http }
    }

    pub fn pipeline(&self) -> &HttpPipeline {
        &self.http
    }

    // Auth

    pub async fn login(&self, req: &LoginRequest) -> ApiResult<TokenResponse> {
        let builder = self.http.request(Method::POST, "/auth/login").json(req);
        self.http.call(builder, Auth::None).await
    }

    pub async fn register(&self, req: &RegisterRequest) -> ApiResult<TokenResponse> {
        let builder = self.http.request(Method::POST, "/auth/register").json(req);
        self.http.call(builder, Auth::None).await
    }

    pub async fn logout(&self) -> ApiResult<()> {
        let builder = self.http.request(Method::POST, "/auth/logout");
        self.http.call_empty(builder, Auth::Bearer).await
    }

    pub async fn current_user(&self) -> ApiResult<UserProfile> {
        let builder = self.http.request(Method::GET, "/me");
        self.http.call(builder, Auth::Bearer).await
    }

    // Strategies

    pub async fn list_strategies(&self) -> ApiResult<Vec<StrategyDto>> {
        let builder = self.http.request(Method::GET, "/strategies");
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn get_strategy(&self, id: &str) -> ApiResult<StrategyDto> {
        let builder = self.http.request_path(Method::GET, &["strategies", id]);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn create_strategy(&self, req: &CreateStrategyRequest) -> ApiResult<StrategyDto> {
        let builder = self.http.request(Method::POST, "/strategies").json(req);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn update_strategy(
        &self,
        id: &str,
        req: &UpdateStrategyRequest,
    ) -> ApiResult<StrategyDto> {
        let builder = self.http.request_path(Method::PUT, &["strategies", id]).json(req);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn delete_strategy(&self, id: &str) -> ApiResult<()> {
        let builder = self.http.request_path(Method::DELETE, &["strategies", id]);
        self.http.call_empty(builder, Auth::Bearer).await
    }

    pub async fn start_strategy(&self, id: &str) -> ApiResult<StrategyDto> {
        let builder = self.http.request_path(Method::POST, &["strategies", id, "start"]);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn stop_strategy(&self, id: &str) -> ApiResult<StrategyDto> {
        let builder = self.http.request_path(Method::POST, &["strategies", id, "stop"]);
        self.http.call(builder, Auth::Bearer).await
    }

    // Trades

    pub async fn list_trades(
        &self,
        offset: u64,
        limit: u64,
        strategy_id: Option<&str>,
    ) -> ApiResult<Page<TradeDto>> {
        let mut query = vec![
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(id) = strategy_id {
            query.push(("strategy_id", id.to_string()));
        }
        debug!("Fetching trades offset={} limit={}", offset, limit);
        let builder = self.http.request(Method::GET, "/trades").query(&query);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn pnl_summary(
        &self,
        period: PnlPeriod,
        strategy_id: Option<&str>,
    ) -> ApiResult<PnlSummary> {
        let mut query = vec![("period", period.as_str().to_string())];
        if let Some(id) = strategy_id {
            query.push(("strategy_id", id.to_string()));
        }
        let builder = self.http.request(Method::GET, "/trades/pnl").query(&query);
        self.http.call(builder, Auth::Bearer).await
    }

    // Notifications

    pub async fn register_device(&self, req: &RegisterDeviceRequest) -> ApiResult<()> {
        let builder = self
            .http
            .request(Method::POST, "/notifications/register")
            .json(req);
        self.http.call_empty(builder, Auth::Bearer).await
    }

    pub async fn list_notifications(
        &self,
        offset: u64,
        limit: u64,
    ) -> ApiResult<Page<NotificationDto>> {
        let builder = self
            .http
            .request(Method::GET, "/notifications")
            .query(&[("offset", offset), ("limit", limit)]);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> ApiResult<()> {
        let builder = self.http.request_path(Method::POST, &["notifications", id, "read"]);
        self.http.call_empty(builder, Auth::Bearer).await
    }

    pub async fn mark_all_notifications_read(&self) -> ApiResult<()> {
        let builder = self.http.request(Method::POST, "/notifications/read-all");
        self.http.call_empty(builder, Auth::Bearer).await
    }

    pub async fn delete_notification(&self, id: &str) -> ApiResult<()> {
        let builder = self.http.request_path(Method::DELETE, &["notifications", id]);
        self.http.call_empty(builder, Auth::Bearer).await
    }

    // Risk

    pub async fn risk_config(&self) -> ApiResult<RiskConfig> {
        let builder = self.http.request(Method::GET, "/risk/config");
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn update_risk_config(&self, config: &RiskConfig) -> ApiResult<RiskConfig> {
        let builder = self.http.request(Method::PUT, "/risk/config").json(config);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn risk_status(&self) -> ApiResult<RiskStatus> {
        let builder = self.http.request(Method::GET, "/risk/status");
        self.http.call(builder, Auth::Bearer).await
    }

    // Backtesting

    pub async fn submit_backtest(&self, req: &BacktestRequest) -> ApiResult<BacktestJob> {
        let builder = self.http.request(Method::POST, "/backtests").json(req);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn backtest(&self, id: &str) -> ApiResult<BacktestJob> {
        let builder = self.http.request_path(Method::GET, &["backtests", id]);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn submit_walk_forward(&self, req: &WalkForwardRequest) -> ApiResult<WalkForwardJob> {
        let builder = self.http.request(Method::POST, "/walk-forward").json(req);
        self.http.call(builder, Auth::Bearer).await
    }

    pub async fn walk_forward(&self, id: &str) -> ApiResult<WalkForwardJob> {
        let builder = self.http.request_path(Method::GET, &["walk-forward", id]);
        self.http.call(builder, Auth::Bearer).await
    }

    // Market

    pub async fn market_analysis(&self, symbol: &str, timeframe: &str) -> ApiResult<MarketAnalysis> {
        let builder = self
            .http
            .request(Method::GET, "/market/analysis")
            .query(&[("symbol", symbol), ("timeframe", timeframe)]);
        self.http.call(builder, Auth::Bearer).await
    }
}

/// Calls `/auth/refresh` on a client without the authenticator attached
pub struct HttpTokenRefresher {
    client: Client,
    base_url: String,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client, base_url))
    }
}

#[async_trait::async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshError> {
        let url = format!("{}/auth/refresh", self.base_url);
        let req = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        match ApiResult::<TokenResponse>::from_response(response).await {
            ApiResult::Success(tokens) => Ok(tokens.into()),
            ApiResult::Error { code, message, .. } if code >= 500 => {
                Err(RefreshError::Transport(format!("{} ({})", message, code)))
            }
            ApiResult::Error { code, message, .. } => {
                Err(RefreshError::Rejected { code, message })
            }
            ApiResult::Exception(e) => Err(RefreshError::Transport(format!("{:#}", e))),
        }
    }
}
