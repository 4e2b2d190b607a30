//! Domain models rendered by the UI and kept in the local cache

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy lifecycle state as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Active,
    Paused,
    Stopped,
    Error,
    #[serde(other)]
    Unknown,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Active => "active",
            StrategyStatus::Paused => "paused",
            StrategyStatus::Stopped => "stopped",
            StrategyStatus::Error => "error",
            StrategyStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "active" => StrategyStatus::Active,
            "paused" => StrategyStatus::Paused,
            "stopped" => StrategyStatus::Stopped,
            "error" => StrategyStatus::Error,
            _ => StrategyStatus::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, StrategyStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub strategy_type: String,
    pub symbol: String,
    pub timeframe: String,
    pub status: StrategyStatus,
    pub parameters: serde_json::Value,
    pub total_pnl: Option<Decimal>,
    pub win_rate: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("sell") {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub pnl: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub status: String,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TradeExecuted,
    StrategyStatus,
    RiskAlert,
    System,
    PriceAlert,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::TradeExecuted => "trade_executed",
            NotificationType::StrategyStatus => "strategy_status",
            NotificationType::RiskAlert => "risk_alert",
            NotificationType::System => "system",
            NotificationType::PriceAlert => "price_alert",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "trade_executed" => NotificationType::TradeExecuted,
            "strategy_status" => NotificationType::StrategyStatus,
            "risk_alert" => NotificationType::RiskAlert,
            "price_alert" => NotificationType::PriceAlert,
            _ => NotificationType::System,
        }
    }

    /// Default category used to group notifications in the feed
    pub fn default_category(&self) -> &'static str {
        match self {
            NotificationType::TradeExecuted => "trades",
            NotificationType::StrategyStatus => "strategies",
            NotificationType::RiskAlert => "alerts",
            NotificationType::System => "system",
            NotificationType::PriceAlert => "price_alerts",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "low" => NotificationPriority::Low,
            "high" => NotificationPriority::High,
            "urgent" | "critical" => NotificationPriority::Urgent,
            _ => NotificationPriority::Normal,
        }
    }
}

/// A row in the notification feed
///
/// `read` only ever moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub notification_type: NotificationType,
    pub category: String,
    pub title: String,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub read: bool,
    pub data: serde_json::Value,
    pub action_url: Option<String>,
    pub priority: NotificationPriority,
}

impl NotificationRecord {
    /// Build an unread record synthesized on the device
    pub fn local(
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notification_type,
            category: notification_type.default_category().to_string(),
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now().timestamp_millis(),
            read: false,
            data: serde_json::Value::Object(Default::default()),
            action_url: None,
            priority: NotificationPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}
