//! Local SQLite cache
//!
//! The cache is the read path for everything the UI renders. Repositories
//! write into it after a remote call succeeds. Readers subscribe with the
//! `observe_*` methods, which re-query whenever the table they read from
//! changes.

pub mod migrations;
pub mod notifications;
pub mod strategies;
pub mod trades;

use futures::stream::{self, BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use notifications::NotificationDao;
pub use strategies::StrategyDao;
pub use trades::TradeDao;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Cache schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    #[error("No migration path from schema version {from}")]
    MissingMigration { from: i64 },

    #[error("Corrupt cached row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Cached tables, each with its own change counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Strategies,
    Trades,
    Notifications,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Strategies, Table::Trades, Table::Notifications];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Strategies => "strategies",
            Table::Trades => "trades",
            Table::Notifications => "notifications",
        }
    }
}

struct ChangeTracker {
    strategies: watch::Sender<u64>,
    trades: watch::Sender<u64>,
    notifications: watch::Sender<u64>,
}

impl ChangeTracker {
    fn new() -> Self {
        Self {
            strategies: watch::channel(0).0,
            trades: watch::channel(0).0,
            notifications: watch::channel(0).0,
        }
    }

    fn sender(&self, table: Table) -> &watch::Sender<u64> {
        match table {
            Table::Strategies => &self.strategies,
            Table::Trades => &self.trades,
            Table::Notifications => &self.notifications,
        }
    }
}

/// Handle to the cache database
#[derive(Clone)]
pub struct CacheDb {
    pool: SqlitePool,
    changes: Arc<ChangeTracker>,
}

impl CacheDb {
    /// Open (creating if needed) the cache file at `path` and migrate it
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create cache directory {}: {}", parent.display(), e);
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!("Opened cache at {}", path.display());
        Self::from_pool(pool).await
    }

    /// Private in-memory database, gone when the handle is dropped
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running pending migrations first
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let version = migrations::migrate(&pool).await?;
        debug!("Cache schema at version {}", version);
        Ok(Self {
            pool,
            changes: Arc::new(ChangeTracker::new()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn strategies(&self) -> StrategyDao {
        StrategyDao::new(self.clone())
    }

    pub fn trades(&self) -> TradeDao {
        TradeDao::new(self.clone())
    }

    pub fn notifications(&self) -> NotificationDao {
        NotificationDao::new(self.clone())
    }

    pub async fn schema_version(&self) -> Result<i64> {
        migrations::current_version(&self.pool).await
    }

    /// Wake every observer of `table`
    pub fn notify(&self, table: Table) {
        self.changes
            .sender(table)
            .send_modify(|counter| *counter = counter.wrapping_add(1));
    }

    pub fn subscribe(&self, table: Table) -> watch::Receiver<u64> {
        self.changes.sender(table).subscribe()
    }

    /// Stream of `query` results: one immediately, then one per write to `table`.
    ///
    /// Several writes landing before the stream is polled again collapse into
    /// a single snapshot. Failed queries are logged and skipped.
    pub fn observe<T, F, Fut>(&self, table: Table, query: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(CacheDb) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let query = Arc::new(query);
        let rx = self.subscribe(table);

        stream::unfold((self.clone(), rx, true), move |(db, mut rx, mut first)| {
            let query = query.clone();
            async move {
                loop {
                    if !first {
                        rx.changed().await.ok()?;
                    }
                    first = false;
                    rx.borrow_and_update();

                    match query(db.clone()).await {
                        Ok(value) => return Some((value, (db, rx, false))),
                        Err(e) => warn!("Cache query on {} failed: {}", table.name(), e),
                    }
                }
            }
        })
        .boxed()
    }

    /// Delete every cached row (logout)
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in Table::ALL {
            sqlx::query(&format!("DELETE FROM {}", table.name()))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        for table in Table::ALL {
            self.notify(table);
        }
        info!("Cleared local cache");
        Ok(())
    }
}

pub(crate) fn corrupt(table: &'static str, reason: impl ToString) -> CacheError {
    CacheError::Corrupt {
        table,
        reason: reason.to_string(),
    }
}
