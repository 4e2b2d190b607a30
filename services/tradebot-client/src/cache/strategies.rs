use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;

use super::{corrupt, CacheDb, Result, Table};
use crate::types::{Strategy, StrategyStatus};

const TABLE: &str = "strategies";

/// Database representation of a strategy
#[derive(Debug, Clone, sqlx::FromRow)]
struct StrategyRow {
    id: String,
    name: String,
    description: Option<String>,
    strategy_type: String,
    symbol: String,
    timeframe: String,
    status: String,
    parameters: String,
    total_pnl: Option<String>,
    win_rate: Option<f64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<StrategyRow> for Strategy {
    type Error = super::CacheError;

    fn try_from(row: StrategyRow) -> Result<Self> {
        Ok(Strategy {
            parameters: serde_json::from_str(&row.parameters).map_err(|e| corrupt(TABLE, e))?,
            total_pnl: row
                .total_pnl
                .as_deref()
                .map(Decimal::from_str)
                .transpose()
                .map_err(|e| corrupt(TABLE, e))?,
            status: StrategyStatus::parse(&row.status),
            created_at: millis_to_utc(row.created_at)?,
            updated_at: millis_to_utc(row.updated_at)?,
            id: row.id,
            name: row.name,
            description: row.description,
            strategy_type: row.strategy_type,
            symbol: row.symbol,
            timeframe: row.timeframe,
            win_rate: row.win_rate,
        })
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt(TABLE, format!("bad timestamp {}", ms)))
}

const UPSERT: &str = r#"
INSERT OR REPLACE INTO strategies (
    id, name, description, strategy_type, symbol, timeframe, status,
    parameters, total_pnl, win_rate, created_at, updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Strategy table access
#[derive(Clone)]
pub struct StrategyDao {
    db: CacheDb,
}

impl StrategyDao {
    pub(super) fn new(db: CacheDb) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, strategy: &Strategy) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        upsert_in(&mut tx, strategy).await?;
        tx.commit().await?;
        self.db.notify(Table::Strategies);
        Ok(())
    }

    /// Write every strategy in one transaction; rows not in `strategies` are kept
    pub async fn upsert_all(&self, strategies: &[Strategy]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;
        for strategy in strategies {
            upsert_in(&mut tx, strategy).await?;
        }
        tx.commit().await?;
        self.db.notify(Table::Strategies);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Strategy>> {
        let row = sqlx::query_as::<_, StrategyRow>("SELECT * FROM strategies WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(Strategy::try_from).transpose()
    }

    /// All strategies, newest first
    pub async fn all(&self) -> Result<Vec<Strategy>> {
        let rows = sqlx::query_as::<_, StrategyRow>(
            "SELECT * FROM strategies ORDER BY created_at DESC, id",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(Strategy::try_from).collect()
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM strategies WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        self.db.notify(Table::Strategies);
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM strategies")
            .execute(self.db.pool())
            .await?;
        self.db.notify(Table::Strategies);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM strategies")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub fn observe_all(&self) -> BoxStream<'static, Vec<Strategy>> {
        self.db
            .observe(Table::Strategies, |db| async move { db.strategies().all().await })
    }

    pub fn observe(&self, id: &str) -> BoxStream<'static, Option<Strategy>> {
        let id = id.to_string();
        self.db.observe(Table::Strategies, move |db| {
            let id = id.clone();
            async move { db.strategies().get(&id).await }
        })
    }
}

async fn upsert_in(tx: &mut Transaction<'_, Sqlite>, strategy: &Strategy) -> Result<()> {
    let parameters = serde_json::to_string(&strategy.parameters).map_err(|e| corrupt(TABLE, e))?;
    sqlx::query(UPSERT)
        .bind(&strategy.id)
        .bind(&strategy.name)
        .bind(&strategy.description)
        .bind(&strategy.strategy_type)
        .bind(&strategy.symbol)
        .bind(&strategy.timeframe)
        .bind(strategy.status.as_str())
        .bind(parameters)
        .bind(strategy.total_pnl.map(|d| d.to_string()))
        .bind(strategy.win_rate)
        .bind(strategy.created_at.timestamp_millis())
        .bind(strategy.updated_at.timestamp_millis())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use futures::StreamExt;

    fn strategy(id: &str, minutes: i64) -> Strategy {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Strategy {
            id: id.to_string(),
            name: format!("Strategy {}", id),
            description: None,
            strategy_type: "grid".to_string(),
            symbol: "BTC/USDT".to_string(),
            timeframe: "1h".to_string(),
            status: StrategyStatus::Active,
            parameters: serde_json::json!({"levels": 10}),
            total_pnl: Some(Decimal::new(1250, 2)),
            win_rate: Some(0.6),
            created_at: created + Duration::minutes(minutes),
            updated_at: created + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_upsert_round_trips_all_fields() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let s = strategy("s1", 0);
        db.strategies().upsert(&s).await.unwrap();
        assert_eq!(db.strategies().get("s1").await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn test_upsert_all_keeps_rows_missing_from_batch() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dao = db.strategies();
        dao.upsert(&strategy("stale", 0)).await.unwrap();

        dao.upsert_all(&[strategy("a", 1), strategy("b", 2)])
            .await
            .unwrap();

        let ids: Vec<String> = dao.all().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a", "stale"]);
    }

    #[tokio::test]
    async fn test_last_write_replaces_row() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dao = db.strategies();

        let mut local = strategy("s1", 10);
        local.status = StrategyStatus::Active;
        dao.upsert(&local).await.unwrap();

        // The server copy wins even when its timestamp is older
        let mut fetched = strategy("s1", 10);
        fetched.status = StrategyStatus::Stopped;
        fetched.updated_at = local.updated_at - Duration::days(31);
        dao.upsert_all(std::slice::from_ref(&fetched)).await.unwrap();

        assert_eq!(dao.get("s1").await.unwrap(), Some(fetched));
        assert_eq!(dao.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_observe_single_strategy() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let dao = db.strategies();
        let mut stream = dao.observe("s1");

        assert_eq!(stream.next().await, Some(None));
        dao.upsert(&strategy("s1", 0)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().id, "s1");
        dao.delete("s1").await.unwrap();
        assert_eq!(stream.next().await, Some(None));
    }
}
