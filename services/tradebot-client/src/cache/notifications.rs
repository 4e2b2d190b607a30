use futures::stream::BoxStream;
use sqlx::{Sqlite, Transaction};

use super::{corrupt, CacheDb, Result, Table};
use crate::types::{NotificationPriority, NotificationRecord, NotificationType};

const TABLE: &str = "notifications";

#[derive(Debug, Clone, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    #[sqlx(rename = "type")]
    notification_type: String,
    category: String,
    title: String,
    message: String,
    timestamp: i64,
    read: bool,
    data: String,
    action_url: Option<String>,
    priority: String,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = super::CacheError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(NotificationRecord {
            notification_type: NotificationType::parse(&row.notification_type),
            priority: NotificationPriority::parse(&row.priority),
            data: serde_json::from_str(&row.data).map_err(|e| corrupt(TABLE, e))?,
            id: row.id,
            category: row.category,
            title: row.title,
            message: row.message,
            timestamp: row.timestamp,
            read: row.read,
            action_url: row.action_url,
        })
    }
}

// `read` is sticky: a re-delivered unread copy never marks a read row unread
const UPSERT: &str = r#"
INSERT INTO notifications (
    id, type, category, title, message, timestamp, read, data, action_url, priority
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(id) DO UPDATE SET
    type = excluded.type,
    category = excluded.category,
    title = excluded.title,
    message = excluded.message,
    timestamp = excluded.timestamp,
    read = MAX(notifications.read, excluded.read),
    data = excluded.data,
    action_url = excluded.action_url,
    priority = excluded.priority
"#;

/// Notification feed table access
#[derive(Clone)]
pub struct NotificationDao {
    db: CacheDb,
}

impl NotificationDao {
    pub(super) fn new(db: CacheDb) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, record: &NotificationRecord) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        upsert_in(&mut tx, record).await?;
        tx.commit().await?;
        self.db.notify(Table::Notifications);
        Ok(())
    }

    pub async fn upsert_all(&self, records: &[NotificationRecord]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        for record in records {
            upsert_in(&mut tx, record).await?;
        }
        tx.commit().await?;
        self.db.notify(Table::Notifications);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query_as::<_, NotificationRow>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(NotificationRecord::try_from).transpose()
    }

    /// Whole feed, newest first
    pub async fn all(&self) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications ORDER BY timestamp DESC, id",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(NotificationRecord::try_from).collect()
    }

    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND read = 0")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() > 0 {
            self.db.notify(Table::Notifications);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE read = 0")
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() > 0 {
            self.db.notify(Table::Notifications);
        }
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        self.db.notify(Table::Notifications);
        Ok(result.rows_affected() > 0)
    }

    /// Drop records older than `cutoff_ms` (epoch millis); returns how many went
    pub async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE timestamp < ?")
            .bind(cutoff_ms)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() > 0 {
            self.db.notify(Table::Notifications);
        }
        Ok(result.rows_affected())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM notifications")
            .execute(self.db.pool())
            .await?;
        self.db.notify(Table::Notifications);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub async fn unread_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE read = 0")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub fn observe_all(&self) -> BoxStream<'static, Vec<NotificationRecord>> {
        self.db.observe(Table::Notifications, |db| async move {
            db.notifications().all().await
        })
    }

    pub fn observe_unread_count(&self) -> BoxStream<'static, i64> {
        self.db.observe(Table::Notifications, |db| async move {
            db.notifications().unread_count().await
        })
    }
}

async fn upsert_in(tx: &mut Transaction<'_, Sqlite>, record: &NotificationRecord) -> Result<()> {
    let data = serde_json::to_string(&record.data).map_err(|e| corrupt(TABLE, e))?;
    sqlx::query(UPSERT)
        .bind(&record.id)
        .bind(record.notification_type.as_str())
        .bind(&record.category)
        .bind(&record.title)
        .bind(&record.message)
        .bind(record.timestamp)
        .bind(record.read)
        .bind(data)
        .bind(&record.action_url)
        .bind(record.priority.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn record(id: &str, timestamp: i64) -> NotificationRecord {
        let mut r = NotificationRecord::local(NotificationType::TradeExecuted, "Filled", "BTC buy filled")
            .with_priority(NotificationPriority::High)
            .with_action_url("tradebot://trades/t1")
            .with_data(serde_json::json!({"trade_id": "t1"}));
        r.id = id.to_string();
        r.timestamp = timestamp;
        r
    }

    #[tokio::test]
    async fn test_round_trip() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let r = record("n1", 1_000);
        db.notifications().upsert(&r).await.unwrap();
        assert_eq!(db.notifications().get("n1").await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn test_read_never_reverts() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dao = db.notifications();
        dao.upsert(&record("n1", 1_000)).await.unwrap();
        assert!(dao.mark_read("n1").await.unwrap());

        // Server re-sends the same notification as unread
        let mut resent = record("n1", 1_000);
        resent.title = "Filled (updated)".to_string();
        dao.upsert_all(&[resent]).await.unwrap();

        let stored = dao.get("n1").await.unwrap().unwrap();
        assert!(stored.read);
        assert_eq!(stored.title, "Filled (updated)");
        assert_eq!(dao.unread_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_all_read_and_prune() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dao = db.notifications();
        dao.upsert_all(&[record("old", 100), record("mid", 200), record("new", 300)])
            .await
            .unwrap();

        assert_eq!(dao.mark_all_read().await.unwrap(), 3);
        assert_eq!(dao.mark_all_read().await.unwrap(), 0);

        assert_eq!(dao.delete_older_than(250).await.unwrap(), 2);
        let ids: Vec<String> = dao.all().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[tokio::test]
    async fn test_observe_unread_count() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dao = db.notifications();
        let mut unread = dao.observe_unread_count();
        assert_eq!(unread.next().await, Some(0));

        dao.upsert(&record("n1", 1)).await.unwrap();
        assert_eq!(unread.next().await, Some(1));

        dao.mark_read("n1").await.unwrap();
        assert_eq!(unread.next().await, Some(0));
    }
}
