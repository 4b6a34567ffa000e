//! # Store Router
//!
//! The shop keeps two SQLite files side by side: the primary (GST) store
//! and the secondary store for non-GST estimates. [`Store`] opens both;
//! [`StoreHandle`] gives the host an explicit lifecycle around it.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   StoreHandle::new()          state: None                               │
//! │        │                                                                │
//! │        │ initialize(config)   primary:   <dir>/database.db              │
//! │        ▼                      secondary: <dir>/database_old.db          │
//! │   ┌──────────┐                migrations + default admin                │
//! │   │   open   │ ◄───────┐                                                │
//! │   └────┬─────┘         │ reinitialize(config)  (backup restore)         │
//! │        │ close()       │                                                │
//! │        ▼               │                                                │
//! │   state: None ─────────┘                                                │
//! │                                                                         │
//! │   primary() / secondary() / get() while None → DbError::NotInitialized  │
//! │   initialize() while open                    → DbError::AlreadyInitialized│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two stores have separate writer gates and transactions. Nothing is
//! atomic across them.

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

use crate::bootstrap::ensure_default_admin;
use crate::error::{DbError, DbResult};
use crate::migrations::Schema;
use crate::pool::{Database, DbConfig};
use crate::repository::non_gst::NonGstSaleRepository;

/// File name of the secondary store, next to the primary file.
pub const SECONDARY_DB_FILE_NAME: &str = "database_old.db";

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

// =============================================================================
// Configuration
// =============================================================================

/// Where the stores live and how the first admin is seeded.
#[derive(Clone)]
pub struct StoreConfig {
    pub primary_path: PathBuf,
    pub max_connections: u32,
    pub admin_username: String,
    pub admin_password: String,
    /// Both stores in memory (tests).
    pub in_memory: bool,
}

impl StoreConfig {
    pub fn new(primary_path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            primary_path: primary_path.into(),
            max_connections: 5,
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            in_memory: false,
        }
    }

    pub fn in_memory() -> Self {
        StoreConfig {
            in_memory: true,
            ..StoreConfig::new(":memory:")
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin_username = username.into();
        self.admin_password = password.into();
        self
    }

    /// The secondary file: `database_old.db` in the primary's directory.
    pub fn secondary_path(&self) -> PathBuf {
        self.primary_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(SECONDARY_DB_FILE_NAME)
    }

    fn db_config(&self, schema: Schema) -> DbConfig {
        if self.in_memory {
            return DbConfig::in_memory().schema(schema);
        }
        let path = match schema {
            Schema::Primary => self.primary_path.clone(),
            Schema::Secondary => self.secondary_path(),
        };
        DbConfig::new(path)
            .max_connections(self.max_connections)
            .schema(schema)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("primary_path", &self.primary_path)
            .field("max_connections", &self.max_connections)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("in_memory", &self.in_memory)
            .finish()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Both open stores.
#[derive(Debug, Clone)]
pub struct Store {
    primary: Database,
    secondary: Database,
}

impl Store {
    /// Opens the primary store (migrations, default admin) and then the
    /// secondary store.
    pub async fn open(config: &StoreConfig) -> DbResult<Self> {
        let primary = Database::new(config.db_config(Schema::Primary)).await?;
        ensure_default_admin(&primary, &config.admin_username, &config.admin_password).await?;

        let secondary = match Database::new(config.db_config(Schema::Secondary)).await {
            Ok(db) => db,
            Err(e) => {
                primary.close().await;
                return Err(e);
            }
        };

        info!(
            primary = %primary.path().display(),
            secondary = %secondary.path().display(),
            "Stores open"
        );
        Ok(Store { primary, secondary })
    }

    /// The GST store: catalogue, stock, bills, ledger, users.
    pub fn primary(&self) -> &Database {
        &self.primary
    }

    /// The non-GST store.
    pub fn secondary(&self) -> &Database {
        &self.secondary
    }

    pub fn non_gst_sales(&self) -> NonGstSaleRepository {
        NonGstSaleRepository::new(self.primary.clone(), self.secondary.clone())
    }

    pub async fn close(&self) {
        self.secondary.close().await;
        self.primary.close().await;
    }

    pub async fn health_check(&self) -> bool {
        self.primary.health_check().await && self.secondary.health_check().await
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Owned, explicitly initialised access to the stores.
///
/// ## Usage
/// ```rust,ignore
/// let handle = StoreHandle::new();
/// handle.initialize(StoreConfig::new(data_dir.join("database.db"))).await?;
///
/// let db = handle.primary().await?;
/// let sale = db.sales().create(new_sale, today).await?;
/// ```
#[derive(Debug, Default)]
pub struct StoreHandle {
    inner: RwLock<Option<Store>>,
}

impl StoreHandle {
    pub fn new() -> Self {
        StoreHandle::default()
    }

    /// Opens both stores.
    ///
    /// ## Errors
    /// `AlreadyInitialized` if the handle is open. The open stores are
    /// left untouched.
    pub async fn initialize(&self, config: StoreConfig) -> DbResult<()> {
        let mut state = self.inner.write().await;
        if state.is_some() {
            return Err(DbError::AlreadyInitialized);
        }
        *state = Some(Store::open(&config).await?);
        Ok(())
    }

    /// Both stores, or `NotInitialized`.
    pub async fn get(&self) -> DbResult<Store> {
        self.inner
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(DbError::NotInitialized)
    }

    pub async fn primary(&self) -> DbResult<Database> {
        Ok(self.get().await?.primary)
    }

    pub async fn secondary(&self) -> DbResult<Database> {
        Ok(self.get().await?.secondary)
    }

    /// Closes both stores. Calling it on a closed handle does nothing.
    pub async fn close(&self) {
        let store = self.inner.write().await.take();
        if let Some(store) = store {
            store.close().await;
            info!("Stores closed");
        }
    }

    /// Closes the current stores and opens `config`, e.g. after a backup
    /// file was swapped in.
    pub async fn reinitialize(&self, config: StoreConfig) -> DbResult<()> {
        let mut state = self.inner.write().await;
        if let Some(store) = state.take() {
            store.close().await;
        }
        *state = Some(Store::open(&config).await?);
        info!("Stores reinitialized");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_path_is_sibling() {
        let config = StoreConfig::new("/var/lib/shop/database.db");
        assert_eq!(
            config.secondary_path(),
            PathBuf::from("/var/lib/shop/database_old.db")
        );
        assert_eq!(
            StoreConfig::new("database.db").secondary_path(),
            PathBuf::from("database_old.db")
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let config = StoreConfig::new("db.sqlite").admin("owner", "hunter22");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("owner"));
        assert!(!rendered.contains("hunter22"));
    }

    #[tokio::test]
    async fn test_handle_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("shop").join("database.db"));
        let handle = StoreHandle::new();

        assert!(matches!(handle.primary().await, Err(DbError::NotInitialized)));
        assert!(matches!(handle.secondary().await, Err(DbError::NotInitialized)));

        handle.initialize(config.clone()).await.unwrap();
        assert!(handle.is_initialized().await);
        assert!(dir.path().join("shop").join("database_old.db").exists());

        let err = handle.initialize(config.clone()).await.unwrap_err();
        assert!(matches!(err, DbError::AlreadyInitialized));

        let store = handle.get().await.unwrap();
        assert!(store.health_check().await);
        assert_eq!(store.primary().users().count_admins().await.unwrap(), 1);

        handle.close().await;
        assert!(!handle.is_initialized().await);
        assert!(matches!(handle.get().await, Err(DbError::NotInitialized)));

        // Reopening the same files keeps the data and does not add an admin
        handle.reinitialize(config).await.unwrap();
        let primary = handle.primary().await.unwrap();
        assert_eq!(primary.users().count_admins().await.unwrap(), 1);
        handle.close().await;
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = Store::open(&StoreConfig::in_memory()).await.unwrap();
        assert!(store
            .primary()
            .users()
            .verify_credentials(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
            .await
            .unwrap()
            .is_some());
        assert!(store.secondary().health_check().await);
    }
}
