//! # Domain Types
//!
//! Records and status enums shared by every layer of Stockbook.
//!
//! ## Three-Tier Stock Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Product (quantity = cached total of sellable units)                   │
//! │     │                                                                   │
//! │     ├── tracking = none   → quantity is the source of truth            │
//! │     │                                                                   │
//! │     ├── tracking = batch  → Σ active ProductBatch.quantity             │
//! │     │      └── ProductBatch (one per purchase line)                    │
//! │     │                                                                   │
//! │     └── tracking = serial → count(ProductSerial where available)       │
//! │            └── ProductBatch (quantity = its available serials)         │
//! │                   └── ProductSerial (one row per physical unit)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All money columns are integer paise and all rates are basis points.
//! Records derive `sqlx::FromRow` behind the `sqlx` feature so the db crate
//! decodes rows directly into them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::permissions::Permissions;

/// Implements `as_str` and `Display` for a fieldless enum using the same
/// spelling the database CHECK constraints use.
macro_rules! impl_as_str {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Database / wire spelling.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// =============================================================================
// GST Rate
// =============================================================================

/// GST rate in basis points (1800 = 18%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GstRate(u32);

impl GstRate {
    /// Slabs notified under Indian GST, in basis points.
    pub const SLABS: [u32; 7] = [0, 25, 300, 500, 1200, 1800, 2800];

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        GstRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Rate as a percentage (display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        GstRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// How a product's stock is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Only the product-level quantity exists.
    #[default]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "none"))]
    #[serde(rename = "none")]
    Untracked,
    /// Quantity lives on lots received per purchase line.
    Batch,
    /// Every physical unit has its own serial row.
    Serial,
}

impl_as_str!(TrackingMode {
    Untracked => "none",
    Batch => "batch",
    Serial => "serial",
});

impl TrackingMode {
    /// Whether stock for this mode lives in `product_batches`.
    #[inline]
    pub const fn uses_batches(&self) -> bool {
        matches!(self, TrackingMode::Batch | TrackingMode::Serial)
    }
}

/// Lifecycle of one serialized unit. Transitions are checked by
/// [`SerialStatus::transition`](crate::inventory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SerialStatus {
    Available,
    Sold,
    Returned,
    Defective,
    InRepair,
}

impl_as_str!(SerialStatus {
    Available => "available",
    Sold => "sold",
    Returned => "returned",
    Defective => "defective",
    InRepair => "in_repair",
});

/// Status of a sale bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Quote: saved but no stock moved and no invoice number issued.
    Draft,
    /// Invoiced; stock has been consumed.
    #[default]
    Completed,
    /// Reversed; stock has been returned.
    Cancelled,
}

impl_as_str!(SaleStatus {
    Draft => "draft",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Status of a purchase bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Purchase order placed; goods not yet in stock.
    Ordered,
    /// Goods received; batches and serials materialised.
    #[default]
    Received,
}

impl_as_str!(PurchaseStatus {
    Ordered => "ordered",
    Received => "received",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    #[default]
    Cash,
    Upi,
    Card,
    BankTransfer,
    Cheque,
    /// Nothing collected now; the bill stays receivable/payable.
    Credit,
}

impl_as_str!(PaymentMode {
    Cash => "cash",
    Upi => "upi",
    Card => "card",
    BankTransfer => "bank_transfer",
    Cheque => "cheque",
    Credit => "credit",
});

/// Kind of money movement recorded in the `transactions` ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money received by the shop.
    PaymentIn,
    /// Money paid out by the shop.
    PaymentOut,
    /// Reversal of an earlier payment (to a customer or from a supplier).
    Refund,
    /// Issued to a customer, reduces what they owe.
    CreditNote,
    /// Issued to a supplier, reduces what the shop owes.
    DebitNote,
}

impl_as_str!(TransactionType {
    PaymentIn => "payment_in",
    PaymentOut => "payment_out",
    Refund => "refund",
    CreditNote => "credit_note",
    DebitNote => "debit_note",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Cancelled,
}

impl_as_str!(TransactionStatus {
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Which bill table a transaction's `bill_id` points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    Sale,
    Purchase,
}

impl_as_str!(BillType {
    Sale => "sale",
    Purchase => "purchase",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customer,
    Supplier,
}

impl_as_str!(EntityType {
    Customer => "customer",
    Supplier => "supplier",
});

impl EntityType {
    /// The bill table whose rows belong to this kind of party.
    pub const fn bill_type(&self) -> BillType {
        match self {
            EntityType::Customer => BillType::Sale,
            EntityType::Supplier => BillType::Purchase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
}

impl_as_str!(Role {
    Admin => "admin",
    Employee => "employee",
});

/// Why stock was corrected by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentCategory {
    Damage,
    Loss,
    Expired,
    CountCorrection,
    Other,
}

impl_as_str!(AdjustmentCategory {
    Damage => "damage",
    Loss => "loss",
    Expired => "expired",
    CountCorrection => "count_correction",
    Other => "other",
});

// =============================================================================
// Shop
// =============================================================================

/// The shop singleton (`id = 1`): settings plus the reference counters.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shop {
    pub id: i64,
    pub shop_name: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub invoice_prefix: String,
    pub purchase_prefix: String,
    pub credit_note_prefix: String,
    pub debit_note_prefix: String,
    pub payment_in_prefix: String,
    pub payment_out_prefix: String,
    pub non_gst_prefix: String,
    /// `MM-DD` the financial year starts on.
    pub financial_year_start: String,
    pub allow_negative_stock: bool,
    pub sale_invoice_counter: i64,
    pub purchase_bill_counter: i64,
    pub credit_note_counter: i64,
    pub debit_note_counter: i64,
    pub payment_in_counter: i64,
    pub payment_out_counter: i64,
    pub non_gst_sale_counter: i64,
    /// FY label of the last counter reset, e.g. `2026-27`.
    pub last_reset_fy: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Catalogue
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Subcategory {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
}

/// A sellable SKU.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    /// Shop-assigned unique code.
    pub product_code: String,
    pub name: String,
    pub hsn_code: Option<String>,
    pub gst_rate_bps: u32,
    pub mrp_paise: i64,
    /// Minimum operating price; billing below it needs a manager.
    pub mop_paise: i64,
    /// Weighted average landed cost per unit.
    pub average_purchase_price_paise: i64,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub storage_location: Option<String>,
    /// Cached total of sellable units (see module docs).
    pub quantity: i64,
    pub tracking_type: TrackingMode,
    pub low_stock_threshold: i64,
    pub is_active: bool,
    /// Added by an optional migration; absent on databases where it failed.
    #[cfg_attr(feature = "sqlx", sqlx(default))]
    pub barcode: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn gst_rate(&self) -> GstRate {
        GstRate::from_bps(self.gst_rate_bps)
    }

    #[inline]
    pub fn mrp(&self) -> Money {
        Money::from_paise(self.mrp_paise)
    }

    #[inline]
    pub fn average_purchase_price(&self) -> Money {
        Money::from_paise(self.average_purchase_price_paise)
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.low_stock_threshold > 0 && self.quantity <= self.low_stock_threshold
    }
}

/// A lot of a batch- or serial-tracked product, received from one purchase
/// line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductBatch {
    pub id: i64,
    pub product_id: i64,
    /// Null once the originating purchase is deleted.
    pub purchase_id: Option<i64>,
    /// Store-wide unique internal id.
    pub batch_uid: String,
    /// Vendor-printed lot number, not unique.
    pub batch_number: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub mfg_date: Option<NaiveDate>,
    pub mrp_paise: i64,
    pub purchase_price_paise: i64,
    pub selling_price_paise: i64,
    pub quantity: i64,
    pub storage_location: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One physical, serialized unit (IMEI, chassis number, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductSerial {
    pub id: i64,
    pub product_id: i64,
    pub batch_id: i64,
    pub serial_number: String,
    pub status: SerialStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Parties
// =============================================================================

/// A customer or supplier. Both tables share this shape.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Party {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    /// Balance carried in from before this system (positive = they owe us
    /// for customers, we owe them for suppliers).
    pub opening_balance_paise: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub reference_no: String,
    pub customer_id: Option<i64>,
    #[ts(as = "String")]
    pub sale_date: NaiveDate,
    pub payment_mode: PaymentMode,
    /// Σ item price.
    pub total_amount_paise: i64,
    /// Settled at billing time. Later payments are `transactions` rows.
    pub paid_amount_paise: i64,
    /// Σ item discount.
    pub discount_paise: i64,
    pub is_reverse_charge: bool,
    pub is_ecommerce: bool,
    pub is_quote: bool,
    pub status: SaleStatus,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_paise(self.total_amount_paise)
    }

    #[inline]
    pub fn paid_amount(&self) -> Money {
        Money::from_paise(self.paid_amount_paise)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub serial_id: Option<i64>,
    pub quantity: i64,
    pub rate_paise: i64,
    pub gst_rate_bps: u32,
    pub discount_paise: i64,
    /// Taxable value after discount.
    pub taxable_paise: i64,
    pub gst_paise: i64,
    /// Line total including GST.
    pub price_paise: i64,
}

// =============================================================================
// Purchases
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Purchase {
    pub id: i64,
    pub supplier_id: Option<i64>,
    /// Number printed on the supplier's bill.
    pub bill_number: Option<String>,
    /// Internal reference from the purchase bill counter.
    pub reference_no: String,
    #[ts(as = "String")]
    pub purchase_date: NaiveDate,
    pub status: PurchaseStatus,
    pub payment_mode: PaymentMode,
    pub total_amount_paise: i64,
    pub paid_amount_paise: i64,
    pub discount_paise: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A purchase line, carrying the provenance from which batches and serials
/// are materialised.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub rate_paise: i64,
    pub gst_rate_bps: u32,
    pub discount_paise: i64,
    pub taxable_paise: i64,
    pub gst_paise: i64,
    pub price_paise: i64,
    pub batch_uid: Option<String>,
    pub batch_number: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub serial_numbers: Vec<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub mfg_date: Option<NaiveDate>,
    pub mrp_paise: i64,
    pub selling_price_paise: i64,
    /// Batch produced by this line once received.
    pub batch_id: Option<i64>,
}

// =============================================================================
// Money movements
// =============================================================================

/// One row of the unified payments ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerTransaction {
    pub id: i64,
    pub reference_no: String,
    pub transaction_type: TransactionType,
    pub bill_id: Option<i64>,
    pub bill_type: Option<BillType>,
    pub entity_id: i64,
    pub entity_type: EntityType,
    #[ts(as = "String")]
    pub transaction_date: NaiveDate,
    pub amount_paise: i64,
    pub payment_mode: PaymentMode,
    pub status: TransactionStatus,
    pub gst_paise: i64,
    pub discount_paise: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_paise(self.amount_paise)
    }
}

// =============================================================================
// Stock adjustments
// =============================================================================

/// Append-only record of a manual stock correction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    pub id: i64,
    pub product_id: i64,
    pub batch_id: Option<i64>,
    pub category: AdjustmentCategory,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub delta: i64,
    pub reason: Option<String>,
    pub adjusted_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 PHC string. Never leaves the backend.
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub password_hash: String,
    pub role: Role,
    #[ts(type = "\"*\" | Array<string>")]
    pub permissions: Permissions,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Admins implicitly hold every permission.
    pub fn can(&self, permission: &str) -> bool {
        self.role == Role::Admin || self.permissions.allows(permission)
    }
}

// =============================================================================
// Non-GST sales (secondary store)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NonGstSale {
    pub id: i64,
    pub reference_no: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    #[ts(as = "String")]
    pub sale_date: NaiveDate,
    pub payment_mode: PaymentMode,
    pub total_amount_paise: i64,
    pub paid_amount_paise: i64,
    pub discount_paise: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NonGstSaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub rate_paise: i64,
    pub discount_paise: i64,
    pub price_paise: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
