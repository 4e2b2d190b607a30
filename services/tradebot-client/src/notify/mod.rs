//! In-app notifications driven by the live channel

pub mod channels;
pub mod preferences;
pub mod trigger;

pub use channels::{ChannelImportance, DeepLink, NotificationChannel};
pub use preferences::{NotificationPreferences, PreferenceStore};
pub use trigger::{NotificationTrigger, TriggerState};

use tracing::info;

use crate::types::NotificationRecord;

/// Posts a notification to the device
///
/// The OS integration lives in the embedding shell; the library only
/// decides what to post and on which channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        channel: NotificationChannel,
        record: &NotificationRecord,
    ) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of the device
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        channel: NotificationChannel,
        record: &NotificationRecord,
    ) -> anyhow::Result<()> {
        info!(
            channel = channel.id(),
            priority = record.priority.as_str(),
            "{}: {}",
            record.title,
            record.message
        );
        Ok(())
    }
}
