//! # stockbook-core: Pure Domain Logic for Stockbook
//!
//! This crate holds the rules of the inventory and ledger model as pure
//! functions and plain records. Nothing here touches a database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Route / IPC layer (outside this workspace)            │   │
//! │  │    billing, purchases, stock adjustment, ledgers               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockbook-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ inventory │  │  fiscal   │  │  ledger   │  │   │
//! │  │   │  records  │  │  serial   │  │ FY labels │  │  running  │  │   │
//! │  │   │  enums    │  │  states   │  │ counters  │  │  balance  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  stockbook-db (Database Layer)                  │   │
//! │  │     primary store (GST) + secondary store (non-GST sales)       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records and status enums (Product, ProductBatch, Sale, ...)
//! - [`money`] - Money type with integer paise arithmetic
//! - [`inventory`] - Serial state machine and stock math
//! - [`fiscal`] - Financial year boundaries and reference numbers
//! - [`ledger`] - Customer/supplier statement construction
//! - [`permissions`] - User permission sets
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockbook_core::money::Money;
//! use stockbook_core::types::GstRate;
//!
//! let price = Money::from_paise(10_000); // ₹100.00
//! let gst = price.calculate_tax(GstRate::from_bps(1800)); // 18%
//! assert_eq!(gst.paise(), 1_800);
//! ```

pub mod error;
pub mod fiscal;
pub mod inventory;
pub mod ledger;
pub mod money;
pub mod permissions;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use fiscal::{CounterKind, FinancialYear, FinancialYearStart};
pub use inventory::LineAmounts;
pub use ledger::{LedgerEvent, LedgerRow, LedgerStatement};
pub use money::Money;
pub use permissions::Permissions;
pub use types::*;

/// Maximum quantity on a single bill line.
///
/// Guards against a mistyped quantity (1000 instead of 10) slipping through
/// a billing screen.
pub const MAX_LINE_QUANTITY: i64 = 100_000;
