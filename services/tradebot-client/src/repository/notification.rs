use chrono::Utc;
use futures::stream::BoxStream;
use tracing::{debug, info};

use super::{remote, require};
use crate::api::dto::RegisterDeviceRequest;
use crate::api::{RetryPolicy, TradingApi};
use crate::cache::CacheDb;
use crate::error::{ClientError, Result};
use crate::types::NotificationRecord;

/// Server-side notification history plus the local feed
#[derive(Clone)]
pub struct NotificationRepository {
    api: TradingApi,
    cache: CacheDb,
    retry: RetryPolicy,
}

impl NotificationRepository {
    pub fn new(api: TradingApi, cache: CacheDb, retry: RetryPolicy) -> Self {
        Self { api, cache, retry }
    }

    /// Register this device's push token
    pub async fn register_device(&self, device_token: &str, platform: &str) -> Result<()> {
        require(device_token, "Device token")?;
        require(platform, "Platform")?;

        let req = RegisterDeviceRequest {
            device_token: device_token.to_string(),
            platform: platform.to_string(),
        };
        remote(&self.retry, || self.api.register_device(&req)).await?;
        info!("Registered device for push ({})", platform);
        Ok(())
    }

    /// Fetch the newest `limit` notifications and merge them into the feed
    pub async fn refresh_history(&self, limit: u64) -> Result<usize> {
        if limit == 0 {
            return Err(ClientError::Validation("Limit must be positive".to_string()));
        }

        let page = remote(&self.retry, || self.api.list_notifications(0, limit)).await?;
        let records: Vec<NotificationRecord> =
            page.items.into_iter().map(NotificationRecord::from).collect();

        self.cache.notifications().upsert_all(&records).await?;
        debug!("Cached {} notifications", records.len());
        Ok(records.len())
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        require(id, "Notification id")?;
        remote(&self.retry, || self.api.mark_notification_read(id)).await?;
        self.cache.notifications().mark_read(id).await?;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        remote(&self.retry, || self.api.mark_all_notifications_read()).await?;
        Ok(self.cache.notifications().mark_all_read().await?)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        require(id, "Notification id")?;
        remote(&self.retry, || self.api.delete_notification(id)).await?;
        self.cache.notifications().delete(id).await?;
        Ok(())
    }

    pub fn observe_notifications(&self) -> BoxStream<'static, Vec<NotificationRecord>> {
        self.cache.notifications().observe_all()
    }

    pub fn observe_unread_count(&self) -> BoxStream<'static, i64> {
        self.cache.notifications().observe_unread_count()
    }

    /// Drop local records older than `max_age`
    pub async fn prune(&self, max_age: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .ok_or_else(|| {
                ClientError::Validation(format!("Retention of {} is out of range", max_age))
            })?
            .timestamp_millis();
        let removed = self.cache.notifications().delete_older_than(cutoff).await?;
        if removed > 0 {
            info!("Pruned {} old notifications", removed);
        }
        Ok(removed)
    }
}
