//! # Database Pool Management
//!
//! Connection pool creation and the single-writer gate.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path).schema(Schema::Primary)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                        │                                        │
//! │   readers (any conn)      begin_write()                                 │
//! │                                │                                        │
//! │                        ┌───────▼────────┐                               │
//! │                        │  writer gate   │  one write transaction        │
//! │                        │ (async Mutex)  │  open at a time               │
//! │                        └────────────────┘                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Readers never block on the writer and the writer never blocks readers.
//! SQLite still allows only one writer per file, so writes queue on the
//! gate instead of spinning on `SQLITE_BUSY`.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationReport, Schema};
use crate::repository::adjustment::StockAdjustmentRepository;
use crate::repository::catalog::CatalogRepository;
use crate::repository::counter::CounterRepository;
use crate::repository::inventory::InventoryRepository;
use crate::repository::party::PartyRepository;
use crate::repository::product::ProductRepository;
use crate::repository::purchase::PurchaseRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::shop::ShopRepository;
use crate::repository::transaction::TransactionRepository;
use crate::repository::user::UserRepository;
use stockbook_core::EntityType;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/database.db")
///     .schema(Schema::Primary)
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Pool acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// How long SQLite waits on a locked file before returning BUSY.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Which migration list this file follows.
    /// Default: primary
    pub schema: Schema,
}

impl DbConfig {
    /// Creates a configuration for the file at `path`. The file and its
    /// directory are created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            schema: Schema::Primary,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the pool acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how long an unused connection stays open. `None` keeps it forever.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets how long a statement waits on a locked database file.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Selects the migration list (primary or secondary store).
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// One connection only: every connection to `:memory:` is a separate
    /// database, and the connection is never recycled.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            schema: Schema::Primary,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }
}

// =============================================================================
// Write transaction
// =============================================================================

/// An open write transaction holding the database's writer gate.
///
/// Dropping it without [`commit`](WriteTx::commit) rolls back and releases
/// the gate.
pub struct WriteTx {
    // Field order matters: the transaction must roll back before the gate
    // is released.
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

impl WriteTx {
    /// Connection to run statements on. Reads inside a write must use it
    /// too, so they see the transaction's own changes.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

// =============================================================================
// Database
// =============================================================================

/// One SQLite file: its pool, its writer gate and repository access.
///
/// Cheap to clone; clones share the pool and the gate.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
    schema: Schema,
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the database described by `config`.
    ///
    /// ## What This Does
    /// 1. Creates the parent directory if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous
    ///    - Foreign keys enforced
    ///    - Busy timeout
    /// 3. Creates the connection pool
    /// 4. Runs the schema's migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            schema = %config.schema,
            "Initializing database connection"
        );

        let base = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            ensure_parent_dir(&config.database_path)?;
            SqliteConnectOptions::new().filename(&config.database_path)
        };

        let connect_options = base
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);
        if config.is_in_memory() {
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            writer: Arc::new(Mutex::new(())),
            schema: config.schema,
            path: config.database_path,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies this schema's pending migrations.
    ///
    /// Idempotent: already-applied versions are skipped.
    pub async fn run_migrations(&self) -> DbResult<MigrationReport> {
        info!(schema = %self.schema, "Running database migrations");
        let report = migrations::run_migrations(&self.pool, self.schema).await?;
        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migrations complete"
        );
        Ok(report)
    }

    /// Opens a write transaction once no other writer holds the gate.
    pub async fn begin_write(&self) -> DbResult<WriteTx> {
        let gate = self.writer.clone().lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(WriteTx { tx, _gate: gate })
    }

    /// Returns a reference to the connection pool.
    ///
    /// For reads not covered by repositories. Writes should go through
    /// [`begin_write`](Database::begin_write).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shop(&self) -> ShopRepository {
        ShopRepository::new(self.clone())
    }

    /// Reference-number sequencer.
    pub fn counters(&self) -> CounterRepository {
        CounterRepository::new(self.clone())
    }

    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.clone())
    }

    /// Returns the product repository.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let product = db.products().get_by_code("IPH-15").await?;
    /// ```
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.clone())
    }

    /// Batches and serials.
    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.clone())
    }

    pub fn purchases(&self) -> PurchaseRepository {
        PurchaseRepository::new(self.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.clone())
    }

    /// Payments, refunds, notes and party ledgers.
    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.clone())
    }

    pub fn adjustments(&self) -> StockAdjustmentRepository {
        StockAdjustmentRepository::new(self.clone())
    }

    pub fn customers(&self) -> PartyRepository {
        PartyRepository::new(self.clone(), EntityType::Customer)
    }

    pub fn suppliers(&self) -> PartyRepository {
        PartyRepository::new(self.clone(), EntityType::Supplier)
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.clone())
    }

    /// Closes the connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!(path = %self.path.display(), "Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

fn ensure_parent_dir(path: &Path) -> DbResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::ConnectionFailed(format!(
                    "cannot create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .idle_timeout(None)
            .busy_timeout(Duration::from_secs(2))
            .schema(Schema::Secondary);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.busy_timeout, Duration::from_secs(2));
        assert_eq!(config.schema, Schema::Secondary);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_creates_missing_directory_and_enables_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("database.db");
        let db = Database::new(DbConfig::new(&path)).await.unwrap();

        assert!(path.exists());
        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(fk, 1);
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await;
    }

    #[tokio::test]
    async fn test_dropped_write_rolls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        {
            let mut tx = db.begin_write().await.unwrap();
            sqlx::query("UPDATE shop SET shop_name = 'Changed' WHERE id = 1")
                .execute(tx.conn())
                .await
                .unwrap();
        }
        let name: String = sqlx::query_scalar("SELECT shop_name FROM shop WHERE id = 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_ne!(name, "Changed");

        // Gate was released by the drop
        let tx = db.begin_write().await.unwrap();
        tx.commit().await.unwrap();
    }
}
