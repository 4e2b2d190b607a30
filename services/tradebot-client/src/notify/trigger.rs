//! Turns live events into feed records and device notifications

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channels::{DeepLink, NotificationChannel};
use super::preferences::NotificationPreferences;
use super::Notifier;
use crate::cache::CacheDb;
use crate::error::Result;
use crate::live::{AlertSeverity, LiveEvent, LiveUpdate};
use crate::types::{NotificationPriority, NotificationRecord, NotificationType, StrategyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Listening,
}

/// Listens to one live event source at a time
#[derive(Clone)]
pub struct NotificationTrigger {
    inner: Arc<TriggerInner>,
}

struct TriggerInner {
    cache: CacheDb,
    notifier: Arc<dyn Notifier>,
    preferences: watch::Receiver<NotificationPreferences>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationTrigger {
    pub fn new(
        cache: CacheDb,
        notifier: Arc<dyn Notifier>,
        preferences: watch::Receiver<NotificationPreferences>,
    ) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                cache,
                notifier,
                preferences,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> TriggerState {
        let task = self.inner.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match task.as_ref() {
            Some(handle) if !handle.is_finished() => TriggerState::Listening,
            _ => TriggerState::Idle,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == TriggerState::Listening
    }

    /// Begin listening to `events`; false (and `events` dropped) if already listening
    pub fn start(&self, events: broadcast::Receiver<LiveUpdate>) -> bool {
        let mut task = self.inner.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Notification trigger already listening");
            return false;
        }

        let trigger = self.clone();
        *task = Some(tokio::spawn(async move { trigger.listen(events).await }));
        info!("Notification trigger listening");
        true
    }

    /// Stop listening; false if it was idle
    pub fn stop(&self) -> bool {
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("Notification trigger stopped");
                true
            }
            _ => false,
        }
    }

    async fn listen(&self, mut events: broadcast::Receiver<LiveUpdate>) {
        loop {
            match events.recv().await {
                Ok(update) => {
                    if let Err(e) = self.handle(&update).await {
                        warn!("Failed to dispatch {} notification: {}", update.event.kind(), e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Notification trigger fell behind, dropped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Live event source closed, notification trigger idle");
                    break;
                }
            }
        }
    }

    /// Apply the preferences current right now to one event.
    ///
    /// Returns whether it produced a notification.
    pub async fn handle(&self, update: &LiveUpdate) -> Result<bool> {
        let prefs = *self.inner.preferences.borrow();
        let Some(channel) = prefs.route(&update.event) else {
            debug!("Dropping {} event", update.event.kind());
            return Ok(false);
        };
        let Some(record) = build_record(update) else {
            return Ok(false);
        };

        self.inner.cache.notifications().upsert(&record).await?;
        if let Err(e) = self.inner.notifier.notify(channel, &record).await {
            // The record is already in the feed
            warn!("Device notification on {} failed: {:#}", channel, e);
        }
        Ok(true)
    }
}

/// Feed record for an event; `None` for connection state changes
pub fn build_record(update: &LiveUpdate) -> Option<NotificationRecord> {
    let mut data: Map<String, Value> = update
        .data
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let record = match &update.event {
        LiveEvent::TradeUpdate(trade) => {
            data.insert("trade_id".to_string(), Value::String(trade.trade_id.clone()));
            data.insert("strategy_id".to_string(), Value::String(trade.strategy_id.clone()));

            let mut message = format!(
                "{} {} {} @ {}",
                trade.side.as_str().to_uppercase(),
                trade.quantity,
                trade.symbol,
                trade.price
            );
            if let Some(pnl) = trade.pnl {
                message.push_str(&format!(" (PnL {})", pnl));
            }

            NotificationRecord::local(NotificationType::TradeExecuted, "Trade executed", message)
                .with_priority(NotificationPriority::High)
                .with_action_url(DeepLink::Trade(trade.trade_id.clone()).to_url())
        }
        LiveEvent::StrategyUpdate(strategy) => {
            data.insert("strategy_id".to_string(), Value::String(strategy.strategy_id.clone()));
            data.insert("status".to_string(), Value::String(strategy.status.as_str().to_string()));

            let name = strategy.name.as_deref().unwrap_or(&strategy.strategy_id);
            let message = strategy
                .message
                .clone()
                .unwrap_or_else(|| format!("Status changed to {}", strategy.status.as_str()));
            let priority = if strategy.status == StrategyStatus::Error {
                NotificationPriority::High
            } else {
                NotificationPriority::Normal
            };

            NotificationRecord::local(
                NotificationType::StrategyStatus,
                format!("Strategy {}", name),
                message,
            )
            .with_priority(priority)
            .with_action_url(DeepLink::Strategy(strategy.strategy_id.clone()).to_url())
        }
        LiveEvent::RiskAlert(alert) => {
            data.insert("alert_type".to_string(), Value::String(alert.alert_type.clone()));
            if let Some(id) = &alert.strategy_id {
                data.insert("strategy_id".to_string(), Value::String(id.clone()));
            }

            let priority = match alert.severity {
                AlertSeverity::Critical | AlertSeverity::High => NotificationPriority::Urgent,
                AlertSeverity::Medium | AlertSeverity::Low => NotificationPriority::High,
            };

            NotificationRecord::local(NotificationType::RiskAlert, "Risk alert", alert.message.clone())
                .with_priority(priority)
                .with_action_url(DeepLink::Risk.to_url())
        }
        LiveEvent::Error { message, code } => {
            if let Some(code) = code {
                data.insert("code".to_string(), Value::String(code.clone()));
            }
            NotificationRecord::local(NotificationType::System, "Trading error", message.clone())
                .with_action_url(DeepLink::Notifications.to_url())
        }
        LiveEvent::Connected | LiveEvent::Disconnected { .. } => return None,
    };

    Some(record.with_data(Value::Object(data)))
}
