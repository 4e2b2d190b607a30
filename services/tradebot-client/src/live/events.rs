//! Live update messages pushed by the platform

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::types::{StrategyStatus, TradeSide};

/// A trade filled by one of the user's strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub pnl: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvent {
    pub strategy_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: StrategyStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlertEvent {
    pub alert_type: String,
    #[serde(default)]
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub strategy_id: Option<String>,
}

/// Kind-specific part of a live message
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    TradeUpdate(TradeEvent),
    StrategyUpdate(StrategyEvent),
    RiskAlert(RiskAlertEvent),
    Error {
        message: String,
        code: Option<String>,
    },
    Connected,
    Disconnected {
        reason: Option<String>,
    },
}

impl LiveEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::TradeUpdate(_) => "trade_update",
            LiveEvent::StrategyUpdate(_) => "strategy_update",
            LiveEvent::RiskAlert(_) => "risk_alert",
            LiveEvent::Error { .. } => "error",
            LiveEvent::Connected => "connected",
            LiveEvent::Disconnected { .. } => "disconnected",
        }
    }
}

/// One message from the live channel
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub event: LiveEvent,
    /// Free-form key/value pairs attached by the server
    pub data: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    data: HashMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DisconnectPayload {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownKind(String),
}

impl LiveUpdate {
    pub fn new(event: LiveEvent) -> Self {
        Self {
            event,
            data: HashMap::new(),
        }
    }

    /// Decode a text frame: `{"type": ..., "payload": {...}, "data": {...}}`
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let wire: WireMessage = serde_json::from_str(text)?;

        let event = match wire.kind.as_str() {
            "trade_update" => LiveEvent::TradeUpdate(serde_json::from_value(wire.payload)?),
            "strategy_update" => LiveEvent::StrategyUpdate(serde_json::from_value(wire.payload)?),
            "risk_alert" => LiveEvent::RiskAlert(serde_json::from_value(wire.payload)?),
            "error" => {
                let p: ErrorPayload = from_optional(wire.payload)?;
                LiveEvent::Error {
                    message: p.message.unwrap_or_else(|| "Unknown error".to_string()),
                    code: p.code,
                }
            }
            "connected" => LiveEvent::Connected,
            "disconnected" => {
                let p: DisconnectPayload = from_optional(wire.payload)?;
                LiveEvent::Disconnected { reason: p.reason }
            }
            other => return Err(DecodeError::UnknownKind(other.to_string())),
        };

        let data = wire
            .data
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();

        Ok(Self { event, data })
    }
}

fn from_optional<T: Default + serde::de::DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trade_update_with_data() {
        let text = r#"{
            "type": "trade_update",
            "payload": {
                "trade_id": "t-1",
                "strategy_id": "s-1",
                "symbol": "BTC/USDT",
                "side": "buy",
                "quantity": "0.5",
                "price": "64000.10"
            },
            "data": {"exchange": "binance", "fill_count": 2}
        }"#;

        let update = LiveUpdate::from_json(text).unwrap();
        match &update.event {
            LiveEvent::TradeUpdate(t) => {
                assert_eq!(t.trade_id, "t-1");
                assert_eq!(t.side, TradeSide::Buy);
                assert_eq!(t.price, Decimal::new(6_400_010, 2));
                assert!(t.pnl.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(update.data["exchange"], "binance");
        assert_eq!(update.data["fill_count"], "2");
    }

    #[test]
    fn test_decode_error_without_payload() {
        let update = LiveUpdate::from_json(r#"{"type": "error"}"#).unwrap();
        assert_eq!(
            update.event,
            LiveEvent::Error {
                message: "Unknown error".to_string(),
                code: None
            }
        );
        assert!(update.data.is_empty());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(matches!(
            LiveUpdate::from_json(r#"{"type": "heartbeat"}"#),
            Err(DecodeError::UnknownKind(kind)) if kind == "heartbeat"
        ));
        assert!(LiveUpdate::from_json("not json").is_err());
    }

    #[test]
    fn test_risk_alert_defaults_severity() {
        let update = LiveUpdate::from_json(
            r#"{"type": "risk_alert", "payload": {"alert_type": "drawdown", "message": "Drawdown at 9%"}}"#,
        )
        .unwrap();
        match update.event {
            LiveEvent::RiskAlert(alert) => assert_eq!(alert.severity, AlertSeverity::Medium),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
