//! # stockbook-db: Database Layer for Stockbook
//!
//! This crate owns the two SQLite stores behind the shop and every rule that
//! spans more than one row: batch and serial quantities, counter sequencing,
//! payment settlement and ledgers.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Data Flow                              │
//! │                                                                         │
//! │  Route / IPC handler (create_sale)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockbook-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  StoreHandle  │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (store.rs)   │    │  sale.rs      │    │  primary     │  │   │
//! │  │   │               │    │  purchase.rs  │    │  secondary   │  │   │
//! │  │   │  primary ─────┼───►│  inventory.rs │    │              │  │   │
//! │  │   │  secondary    │    │  counter.rs   │    │ schema_      │  │   │
//! │  │   │               │    │  ...          │    │  migrations  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌──────────────────────────┐   ┌──────────────────────────────┐       │
//! │  │ database.db (GST)        │   │ database_old.db (non-GST)    │       │
//! │  └──────────────────────────┘   └──────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, writer gate, repository accessors
//! - [`store`] - Primary + secondary store router
//! - [`migrations`] - Versioned schema migrations for both stores
//! - [`config`] - Store settings (env > TOML file > defaults)
//! - [`bootstrap`] - Default admin seeding
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockbook_db::{StoreConfig, StoreHandle};
//!
//! let handle = StoreHandle::new();
//! handle.initialize(StoreConfig::new("data/database.db")).await?;
//!
//! let primary = handle.primary().await?;
//! let product = primary.products().get_by_code("IPH-15").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::StoreSettings;
pub use error::{DbError, DbResult};
pub use migrations::{MigrationReport, Schema};
pub use pool::{Database, DbConfig, WriteTx};
pub use store::{Store, StoreConfig, StoreHandle, SECONDARY_DB_FILE_NAME};

// Repository re-exports for convenience
pub use repository::adjustment::{NewStockAdjustment, StockAdjustmentRepository};
pub use repository::catalog::CatalogRepository;
pub use repository::counter::{CounterRepository, IssuedNumber};
pub use repository::inventory::{DiscrepancyKind, InventoryDiscrepancy, InventoryRepository};
pub use repository::non_gst::{NewNonGstSale, NewNonGstSaleItem, NonGstSaleRepository};
pub use repository::party::{NewParty, PartyRepository};
pub use repository::product::{NewProduct, ProductRepository, ProductUpdate};
pub use repository::purchase::{NewPurchase, NewPurchaseItem, PurchaseRepository};
pub use repository::sale::{NewSale, NewSaleItem, SaleRepository};
pub use repository::shop::{ShopRepository, ShopSettings};
pub use repository::transaction::{BillBalance, NewTransaction, TransactionRepository};
pub use repository::user::{NewUser, UserRepository};
