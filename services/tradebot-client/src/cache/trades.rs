use chrono::DateTime;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::{corrupt, CacheDb, Result, Table};
use crate::types::{Trade, TradeSide};

const TABLE: &str = "trades";

#[derive(Debug, Clone, sqlx::FromRow)]
struct TradeRow {
    id: String,
    strategy_id: String,
    symbol: String,
    side: String,
    quantity: String,
    price: String,
    pnl: Option<String>,
    fee: Option<String>,
    status: String,
    executed_at: i64,
}

fn decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| corrupt(TABLE, e))
}

fn opt_decimal(value: Option<&str>) -> Result<Option<Decimal>> {
    value.map(decimal).transpose()
}

impl TryFrom<TradeRow> for Trade {
    type Error = super::CacheError;

    fn try_from(row: TradeRow) -> Result<Self> {
        Ok(Trade {
            side: TradeSide::parse(&row.side),
            quantity: decimal(&row.quantity)?,
            price: decimal(&row.price)?,
            pnl: opt_decimal(row.pnl.as_deref())?,
            fee: opt_decimal(row.fee.as_deref())?,
            executed_at: DateTime::from_timestamp_millis(row.executed_at)
                .ok_or_else(|| corrupt(TABLE, format!("bad timestamp {}", row.executed_at)))?,
            id: row.id,
            strategy_id: row.strategy_id,
            symbol: row.symbol,
            status: row.status,
        })
    }
}

/// Trade history table access
#[derive(Clone)]
pub struct TradeDao {
    db: CacheDb,
}

impl TradeDao {
    pub(super) fn new(db: CacheDb) -> Self {
        Self { db }
    }

    pub async fn upsert_all(&self, trades: &[Trade]) -> Result<()> {
        if trades.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;
        for trade in trades {
            sqlx::query(
                r#"INSERT OR REPLACE INTO trades (
                    id, strategy_id, symbol, side, quantity, price, pnl, fee, status, executed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&trade.id)
            .bind(&trade.strategy_id)
            .bind(&trade.symbol)
            .bind(trade.side.as_str())
            .bind(trade.quantity.to_string())
            .bind(trade.price.to_string())
            .bind(trade.pnl.map(|d| d.to_string()))
            .bind(trade.fee.map(|d| d.to_string()))
            .bind(&trade.status)
            .bind(trade.executed_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.db.notify(Table::Trades);
        Ok(())
    }

    /// Newest-first slice of the history, optionally for one strategy
    pub async fn page(
        &self,
        offset: i64,
        limit: i64,
        strategy_id: Option<&str>,
    ) -> Result<Vec<Trade>> {
        let rows = match strategy_id {
            Some(id) => {
                sqlx::query_as::<_, TradeRow>(
                    "SELECT * FROM trades WHERE strategy_id = ? ORDER BY executed_at DESC, id LIMIT ? OFFSET ?",
                )
                .bind(id)
                .bind(limit)
                .bind(offset)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, TradeRow>(
                    "SELECT * FROM trades ORDER BY executed_at DESC, id LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(self.db.pool())
                .await?
            }
        };
        rows.into_iter().map(Trade::try_from).collect()
    }

    pub async fn for_strategy(&self, strategy_id: &str) -> Result<Vec<Trade>> {
        self.page(0, -1, Some(strategy_id)).await
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM trades")
            .execute(self.db.pool())
            .await?;
        self.db.notify(Table::Trades);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// The `limit` most recent trades across all strategies
    pub fn observe_recent(&self, limit: i64) -> BoxStream<'static, Vec<Trade>> {
        self.db.observe(Table::Trades, move |db| async move {
            db.trades().page(0, limit, None).await
        })
    }
}
