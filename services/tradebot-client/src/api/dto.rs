//! Wire types for the platform API
//!
//! Field names match the server's snake_case JSON. Entities that are
//! cached locally have a separate DTO converted into the domain model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::TokenPair;
use crate::types::{
    NotificationPriority, NotificationRecord, NotificationType, Strategy, StrategyStatus, Trade,
    TradeSide,
};

// Auth

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl From<TokenResponse> for TokenPair {
    fn from(resp: TokenResponse) -> Self {
        TokenPair::new(resp.access_token, resp.refresh_token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// Strategies

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub strategy_type: String,
    pub symbol: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    pub status: StrategyStatus,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub total_pnl: Option<Decimal>,
    #[serde(default)]
    pub win_rate: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

impl From<StrategyDto> for Strategy {
    fn from(dto: StrategyDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            description: dto.description,
            strategy_type: dto.strategy_type,
            symbol: dto.symbol,
            timeframe: dto.timeframe,
            status: dto.status,
            parameters: dto
                .parameters
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            total_pnl: dto.total_pnl,
            win_rate: dto.win_rate,
            updated_at: dto.updated_at.unwrap_or(dto.created_at),
            created_at: dto.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateStrategyRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub strategy_type: String,
    pub symbol: String,
    pub timeframe: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateStrategyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl UpdateStrategyRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.symbol.is_none()
            && self.timeframe.is_none()
            && self.parameters.is_none()
    }
}

// Trades

#[derive(Debug, Clone, Deserialize)]
pub struct TradeDto {
    pub id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub pnl: Option<Decimal>,
    #[serde(default)]
    pub fee: Option<Decimal>,
    #[serde(default = "default_trade_status")]
    pub status: String,
    pub executed_at: DateTime<Utc>,
}

fn default_trade_status() -> String {
    "filled".to_string()
}

impl From<TradeDto> for Trade {
    fn from(dto: TradeDto) -> Self {
        Self {
            id: dto.id,
            strategy_id: dto.strategy_id,
            symbol: dto.symbol,
            side: dto.side,
            quantity: dto.quantity,
            price: dto.price,
            pnl: dto.pnl,
            fee: dto.fee,
            status: dto.status,
            executed_at: dto.executed_at,
        }
    }
}

/// Offset-paged collection
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlPeriod {
    Day,
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl PnlPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PnlPeriod::Day => "day",
            PnlPeriod::Week => "week",
            PnlPeriod::Month => "month",
            PnlPeriod::Year => "year",
            PnlPeriod::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlSummary {
    pub total_pnl: Decimal,
    #[serde(default)]
    pub realized_pnl: Decimal,
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub win_rate: Option<f64>,
    #[serde(default)]
    pub trade_count: u64,
    #[serde(default)]
    pub daily: Vec<DailyPnl>,
}

// Notifications

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDto {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub category: Option<String>,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

impl From<NotificationDto> for NotificationRecord {
    fn from(dto: NotificationDto) -> Self {
        let notification_type = NotificationType::parse(&dto.notification_type);
        Self {
            id: dto.id,
            category: dto
                .category
                .unwrap_or_else(|| notification_type.default_category().to_string()),
            notification_type,
            title: dto.title,
            message: dto.message,
            timestamp: dto.created_at.timestamp_millis(),
            read: dto.read,
            data: dto
                .data
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            action_url: dto.action_url,
            priority: dto
                .priority
                .as_deref()
                .map(NotificationPriority::parse)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterDeviceRequest {
    pub device_token: String,
    pub platform: String,
}

// Risk

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_position_size_percent: Decimal,
    pub max_daily_loss: Decimal,
    pub max_drawdown_percent: Decimal,
    pub max_open_positions: u32,
    #[serde(default)]
    pub stop_loss_percent: Option<Decimal>,
    #[serde(default)]
    pub take_profit_percent: Option<Decimal>,
    #[serde(default = "default_true")]
    pub trading_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size_percent: Decimal::from(5),
            max_daily_loss: Decimal::from(100),
            max_drawdown_percent: Decimal::from(10),
            max_open_positions: 5,
            stop_loss_percent: None,
            take_profit_percent: None,
            trading_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub current_drawdown_percent: Decimal,
    pub daily_pnl: Decimal,
    pub open_positions: u32,
    #[serde(default)]
    pub exposure: Option<Decimal>,
    #[serde(default)]
    pub trading_halted: bool,
    #[serde(default)]
    pub halt_reason: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// Backtesting / walk-forward

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
    pub strategy_type: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_percent: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub total_return_percent: f64,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown_percent: f64,
    #[serde(default)]
    pub win_rate: Option<f64>,
    pub total_trades: u32,
    #[serde(default)]
    pub profit_factor: Option<f64>,
    pub final_equity: Decimal,
    #[serde(default)]
    pub equity_curve: Vec<EquityPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub result: Option<BacktestResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkForwardRequest {
    pub strategy_type: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub in_sample_days: u32,
    pub out_of_sample_days: u32,
    pub step_days: u32,
    pub optimization_metric: String,
    pub parameter_ranges: serde_json::Value,
    pub initial_capital: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: u32,
    pub in_sample_start: NaiveDate,
    pub in_sample_end: NaiveDate,
    pub out_of_sample_start: NaiveDate,
    pub out_of_sample_end: NaiveDate,
    #[serde(default)]
    pub best_parameters: serde_json::Value,
    pub in_sample_return_percent: f64,
    pub out_of_sample_return_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub average_out_of_sample_return_percent: f64,
    pub efficiency_ratio: f64,
    #[serde(default)]
    pub robustness_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub windows: Vec<WalkForwardWindow>,
    #[serde(default)]
    pub summary: Option<WalkForwardSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

// Market analysis

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub symbol: String,
    pub timeframe: String,
    pub trend: String,
    pub volatility: f64,
    #[serde(default)]
    pub support: Option<Decimal>,
    #[serde(default)]
    pub resistance: Option<Decimal>,
    #[serde(default)]
    pub indicators: HashMap<String, f64>,
    #[serde(default)]
    pub summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}
