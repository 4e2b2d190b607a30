//! User switches for in-app notifications

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::warn;

use super::channels::NotificationChannel;
use crate::live::LiveEvent;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub enabled: bool,
    pub trades_enabled: bool,
    pub alerts_enabled: bool,
    pub strategy_enabled: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            trades_enabled: true,
            alerts_enabled: true,
            strategy_enabled: true,
        }
    }
}

impl NotificationPreferences {
    /// Channel an event goes to, or `None` if it must be dropped
    pub fn route(&self, event: &LiveEvent) -> Option<NotificationChannel> {
        if !self.enabled {
            return None;
        }
        match event {
            LiveEvent::TradeUpdate(_) if self.trades_enabled => Some(NotificationChannel::Trades),
            LiveEvent::StrategyUpdate(_) if self.strategy_enabled => {
                Some(NotificationChannel::Strategies)
            }
            LiveEvent::RiskAlert(_) if self.alerts_enabled => Some(NotificationChannel::Alerts),
            LiveEvent::Error { .. } if self.alerts_enabled => Some(NotificationChannel::System),
            _ => None,
        }
    }
}

/// Current preferences, observable and optionally persisted as JSON
pub struct PreferenceStore {
    path: Option<PathBuf>,
    tx: watch::Sender<NotificationPreferences>,
}

impl PreferenceStore {
    pub fn in_memory(initial: NotificationPreferences) -> Self {
        Self {
            path: None,
            tx: watch::channel(initial).0,
        }
    }

    /// Load from `path`; a missing or unreadable file yields the defaults
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = read_file(&path).unwrap_or_default();
        Self {
            path: Some(path),
            tx: watch::channel(initial).0,
        }
    }

    pub fn get(&self) -> NotificationPreferences {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationPreferences> {
        self.tx.subscribe()
    }

    pub fn set(&self, prefs: NotificationPreferences) -> Result<(), StoreError> {
        self.tx.send_replace(prefs);
        self.save(&prefs)
    }

    pub fn update(&self, f: impl FnOnce(&mut NotificationPreferences)) -> Result<(), StoreError> {
        let mut prefs = self.get();
        f(&mut prefs);
        self.set(prefs)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|p| p.enabled = enabled)
    }

    pub fn set_trades_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|p| p.trades_enabled = enabled)
    }

    pub fn set_alerts_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|p| p.alerts_enabled = enabled)
    }

    pub fn set_strategy_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.update(|p| p.strategy_enabled = enabled)
    }

    fn save(&self, prefs: &NotificationPreferences) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(prefs)?)?;
        Ok(())
    }
}

fn read_file(path: &Path) -> Option<NotificationPreferences> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read preferences {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(prefs) => Some(prefs),
        Err(e) => {
            warn!("Ignoring malformed preferences {}: {}", path.display(), e);
            None
        }
    }
}
