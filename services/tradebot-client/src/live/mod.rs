//! Live update channel

pub mod events;
pub mod socket;

pub use events::{AlertSeverity, LiveEvent, LiveUpdate, RiskAlertEvent, StrategyEvent, TradeEvent};
pub use socket::{LiveError, LiveSocket};
