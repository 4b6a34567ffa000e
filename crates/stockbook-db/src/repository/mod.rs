//! # Repository Module
//!
//! Database repository implementations for Stockbook.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Route handler                                                          │
//! │       │                                                                 │
//! │       │  db.sales().create(new_sale, today)                             │
//! │       ▼                                                                 │
//! │  SaleRepository                                                         │
//! │       │                                                                 │
//! │       │  db.begin_write()   ← writer gate, one write tx at a time       │
//! │       ▼                                                                 │
//! │  ┌──────────────── one SQLite transaction ─────────────────┐            │
//! │  │ counter::issue        → INV-2026-27/0042                │            │
//! │  │ INSERT sales / sale_items                               │            │
//! │  │ inventory::consume    → batch / serial / product qty    │            │
//! │  └─────────────────────────────────────────────────────────┘            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  commit (or drop → rollback)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Helpers shared across repositories (`counter::issue`, the inventory
//! refresh functions) take `&mut SqliteConnection` so they run inside the
//! caller's transaction.
//!
//! ## Available Repositories
//!
//! - [`shop::ShopRepository`] - Shop settings singleton
//! - [`counter::CounterRepository`] - Reference-number sequencer
//! - [`catalog::CatalogRepository`] - Categories and subcategories
//! - [`product::ProductRepository`] - Product CRUD
//! - [`inventory::InventoryRepository`] - Batches, serials, audit
//! - [`purchase::PurchaseRepository`] - Purchase bills and stock receipt
//! - [`sale::SaleRepository`] - Sales, quotes, cancellation
//! - [`transaction::TransactionRepository`] - Payments and ledgers
//! - [`adjustment::StockAdjustmentRepository`] - Manual stock corrections
//! - [`party::PartyRepository`] - Customers and suppliers
//! - [`user::UserRepository`] - Users and credentials
//! - [`non_gst::NonGstSaleRepository`] - Secondary-store sales

pub mod adjustment;
pub mod catalog;
pub mod counter;
pub mod inventory;
pub mod non_gst;
pub mod party;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod shop;
pub mod transaction;
pub mod user;
