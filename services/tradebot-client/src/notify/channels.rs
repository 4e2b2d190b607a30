//! Device notification channels and deep links

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// OS-level importance a channel is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelImportance {
    Low,
    Default,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Trades,
    Alerts,
    Strategies,
    System,
    PriceAlerts,
}

impl NotificationChannel {
    pub const ALL: [NotificationChannel; 5] = [
        NotificationChannel::Trades,
        NotificationChannel::Alerts,
        NotificationChannel::Strategies,
        NotificationChannel::System,
        NotificationChannel::PriceAlerts,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            NotificationChannel::Trades => "trades",
            NotificationChannel::Alerts => "alerts",
            NotificationChannel::Strategies => "strategies",
            NotificationChannel::System => "system",
            NotificationChannel::PriceAlerts => "price_alerts",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NotificationChannel::Trades => "Trade executions",
            NotificationChannel::Alerts => "Risk alerts",
            NotificationChannel::Strategies => "Strategy updates",
            NotificationChannel::System => "System",
            NotificationChannel::PriceAlerts => "Price alerts",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            NotificationChannel::Trades => "Fills and closed positions from your strategies",
            NotificationChannel::Alerts => "Drawdown, loss limit and exposure warnings",
            NotificationChannel::Strategies => "Strategies starting, stopping or failing",
            NotificationChannel::System => "Connection and account messages",
            NotificationChannel::PriceAlerts => "Price levels you asked to watch",
        }
    }

    pub fn importance(&self) -> ChannelImportance {
        match self {
            NotificationChannel::Trades => ChannelImportance::High,
            // Risk alerts may break through do-not-disturb
            NotificationChannel::Alerts => ChannelImportance::Urgent,
            NotificationChannel::Strategies => ChannelImportance::Default,
            NotificationChannel::System => ChannelImportance::Low,
            NotificationChannel::PriceAlerts => ChannelImportance::High,
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

pub const DEEP_LINK_SCHEME: &str = "tradebot";

/// In-app destination a notification opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    Trade(String),
    Strategy(String),
    Risk,
    Notifications,
    Market(String),
}

impl DeepLink {
    pub fn to_url(&self) -> String {
        match self {
            DeepLink::Trade(id) => format!("{}://trades/{}", DEEP_LINK_SCHEME, id),
            DeepLink::Strategy(id) => format!("{}://strategies/{}", DEEP_LINK_SCHEME, id),
            DeepLink::Risk => format!("{}://risk", DEEP_LINK_SCHEME),
            DeepLink::Notifications => format!("{}://notifications", DEEP_LINK_SCHEME),
            DeepLink::Market(symbol) => format!("{}://market/{}", DEEP_LINK_SCHEME, symbol),
        }
    }

    pub fn parse(link: &str) -> Option<Self> {
        let url = Url::parse(link).ok()?;
        if url.scheme() != DEEP_LINK_SCHEME {
            return None;
        }

        let id = url
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        match (url.host_str()?, id) {
            ("trades", Some(id)) => Some(DeepLink::Trade(id)),
            ("strategies", Some(id)) => Some(DeepLink::Strategy(id)),
            ("market", Some(symbol)) => Some(DeepLink::Market(symbol)),
            ("risk", None) => Some(DeepLink::Risk),
            ("notifications", None) => Some(DeepLink::Notifications),
            _ => None,
        }
    }
}

impl fmt::Display for DeepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}
