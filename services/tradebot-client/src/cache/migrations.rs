//! Forward-only schema migrations
//!
//! The schema version lives in `PRAGMA user_version`. Every statement is
//! written with `IF NOT EXISTS` so re-running a step against a database
//! that already has it is harmless.

use sqlx::SqlitePool;
use tracing::info;

use super::{CacheError, Result};

pub const CURRENT_VERSION: i64 = 2;

pub struct Migration {
    pub from: i64,
    pub to: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub static MIGRATIONS: &[Migration] = &[
    Migration {
        from: 0,
        to: 1,
        name: "initial_schema",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS strategies (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                strategy_type TEXT NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                status TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '{}',
                total_pnl TEXT,
                win_rate REAL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY NOT NULL,
                strategy_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity TEXT NOT NULL,
                price TEXT NOT NULL,
                pnl TEXT,
                fee TEXT,
                status TEXT NOT NULL,
                executed_at INTEGER NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_trades_strategy_id ON trades(strategy_id)",
            "CREATE INDEX IF NOT EXISTS idx_trades_executed_at ON trades(executed_at)",
        ],
    },
    Migration {
        from: 1,
        to: 2,
        name: "add_notifications",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY NOT NULL,
                type TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL DEFAULT '{}',
                action_url TEXT,
                priority TEXT NOT NULL DEFAULT 'normal'
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_notifications_type ON notifications(type)",
            "CREATE INDEX IF NOT EXISTS idx_notifications_category ON notifications(category)",
            "CREATE INDEX IF NOT EXISTS idx_notifications_timestamp ON notifications(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_notifications_read ON notifications(read)",
        ],
    },
];

pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Bring the schema up to [`CURRENT_VERSION`]
pub async fn migrate(pool: &SqlitePool) -> Result<i64> {
    migrate_to(pool, CURRENT_VERSION).await
}

/// Apply migrations until the schema reaches `target`
pub async fn migrate_to(pool: &SqlitePool, target: i64) -> Result<i64> {
    let mut version = current_version(pool).await?;
    if version > CURRENT_VERSION {
        return Err(CacheError::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }

    while version < target {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.from == version)
            .ok_or(CacheError::MissingMigration { from: version })?;

        info!(
            "Running cache migration {} ({} -> {})",
            migration.name, migration.from, migration.to
        );

        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        // PRAGMA does not take bind parameters
        sqlx::query(&format!("PRAGMA user_version = {}", migration.to))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        version = migration.to;
    }

    Ok(version)
}

/// Names of the indexes defined on `table`
pub async fn index_names(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ? AND name LIKE 'idx_%' ORDER BY name",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[test]
    fn test_migrations_form_a_chain() {
        let mut version = 0;
        for m in MIGRATIONS {
            assert_eq!(m.from, version, "gap before {}", m.name);
            assert_eq!(m.to, m.from + 1);
            version = m.to;
        }
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_current_version() {
        let pool = memory_pool().await;
        assert_eq!(migrate(&pool).await.unwrap(), CURRENT_VERSION);
        assert_eq!(current_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_v1_to_v2_adds_notifications_with_indexes() {
        let pool = memory_pool().await;
        assert_eq!(migrate_to(&pool, 1).await.unwrap(), 1);
        assert!(index_names(&pool, "notifications").await.unwrap().is_empty());

        migrate(&pool).await.unwrap();
        // Reopening runs nothing and does not fail
        assert_eq!(migrate(&pool).await.unwrap(), CURRENT_VERSION);

        let indexes = index_names(&pool, "notifications").await.unwrap();
        assert_eq!(
            indexes,
            vec![
                "idx_notifications_category",
                "idx_notifications_read",
                "idx_notifications_timestamp",
                "idx_notifications_type",
            ]
        );

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_rerunning_statements_is_harmless() {
        let pool = memory_pool().await;
        migrate(&pool).await.unwrap();
        for m in MIGRATIONS {
            for statement in m.statements {
                sqlx::query(statement).execute(&pool).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let pool = memory_pool().await;
        sqlx::query("PRAGMA user_version = 99")
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            migrate(&pool).await,
            Err(CacheError::UnsupportedVersion { found: 99, .. })
        ));
    }
}
