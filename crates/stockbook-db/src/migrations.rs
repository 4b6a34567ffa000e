//! # Database Migrations
//!
//! Versioned schema migrations for the primary and non-GST stores.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  Database::new()                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CREATE TABLE IF NOT EXISTS schema_migrations                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Compare the schema's list vs applied versions                         │
//! │       │                                                                 │
//! │       ├── 1 initial_schema          ✓ (already applied)               │
//! │       ├── 2 adjustments_append_only ✓ (already applied)               │
//! │       └── 3 products_barcode        ⬜ (pending)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Each pending migration in its own transaction                         │
//! │       │                                                                 │
//! │       ├── ok                → record version                           │
//! │       ├── Required, failed  → MigrationFailed (startup aborts)         │
//! │       ├── Optional, "duplicate column name"                            │
//! │       │                     → record version (column already there)    │
//! │       └── Optional, failed  → warn!, not recorded, retried next start  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Append to the end of the schema's list with the next version number
//! 2. **NEVER** edit or reorder a migration that has shipped
//! 3. Column additions to existing tables are `Optional`: a failure
//!    degrades a feature, it must not stop the shop from billing

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

// =============================================================================
// Types
// =============================================================================

/// Which migration list a database file follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Users, inventory, GST bills, accounting.
    Primary,
    /// Simplified non-GST sales.
    Secondary,
}

impl Schema {
    pub fn migrations(&self) -> &'static [Migration] {
        match self {
            Schema::Primary => PRIMARY_MIGRATIONS,
            Schema::Secondary => SECONDARY_MIGRATIONS,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Primary => write!(f, "primary"),
            Schema::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// Failure aborts startup.
    Required,
    /// Failure is logged and retried on the next start.
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
    pub kind: MigrationKind,
}

/// Outcome of one `run_migrations` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions recorded by this run.
    pub applied: Vec<i64>,
    /// Optional versions that failed and stay pending.
    pub skipped: Vec<i64>,
}

// =============================================================================
// Primary schema
// =============================================================================

const PRIMARY_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT    NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT    NOT NULL,
    role          TEXT    NOT NULL CHECK (role IN ('admin', 'employee')),
    permissions   TEXT    NOT NULL DEFAULT '[]',
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS shop (
    id                    INTEGER PRIMARY KEY CHECK (id = 1),
    shop_name             TEXT    NOT NULL DEFAULT 'My Shop',
    gstin                 TEXT,
    address               TEXT,
    state                 TEXT,
    phone                 TEXT,
    email                 TEXT,
    invoice_prefix        TEXT    NOT NULL DEFAULT 'INV-',
    purchase_prefix       TEXT    NOT NULL DEFAULT 'PUR-',
    credit_note_prefix    TEXT    NOT NULL DEFAULT 'CN-',
    debit_note_prefix     TEXT    NOT NULL DEFAULT 'DN-',
    payment_in_prefix     TEXT    NOT NULL DEFAULT 'PI-',
    payment_out_prefix    TEXT    NOT NULL DEFAULT 'PO-',
    non_gst_prefix        TEXT    NOT NULL DEFAULT 'EST-',
    financial_year_start  TEXT    NOT NULL DEFAULT '04-01',
    allow_negative_stock  INTEGER NOT NULL DEFAULT 0,
    sale_invoice_counter  INTEGER NOT NULL DEFAULT 0,
    purchase_bill_counter INTEGER NOT NULL DEFAULT 0,
    credit_note_counter   INTEGER NOT NULL DEFAULT 0,
    debit_note_counter    INTEGER NOT NULL DEFAULT 0,
    payment_in_counter    INTEGER NOT NULL DEFAULT 0,
    payment_out_counter   INTEGER NOT NULL DEFAULT 0,
    non_gst_sale_counter  INTEGER NOT NULL DEFAULT 0,
    last_reset_fy         TEXT,
    updated_at            TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

INSERT OR IGNORE INTO shop (id) VALUES (1);

CREATE TABLE IF NOT EXISTS categories (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT    NOT NULL UNIQUE COLLATE NOCASE
);

CREATE TABLE IF NOT EXISTS subcategories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    name        TEXT    NOT NULL COLLATE NOCASE,
    UNIQUE (category_id, name)
);

CREATE TABLE IF NOT EXISTS products (
    id                           INTEGER PRIMARY KEY AUTOINCREMENT,
    product_code                 TEXT    NOT NULL UNIQUE,
    name                         TEXT    NOT NULL,
    hsn_code                     TEXT,
    gst_rate_bps                 INTEGER NOT NULL DEFAULT 0,
    mrp_paise                    INTEGER NOT NULL DEFAULT 0,
    mop_paise                    INTEGER NOT NULL DEFAULT 0,
    average_purchase_price_paise INTEGER NOT NULL DEFAULT 0,
    category_id                  INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    subcategory_id               INTEGER REFERENCES subcategories(id) ON DELETE SET NULL,
    storage_location             TEXT,
    quantity                     INTEGER NOT NULL DEFAULT 0,
    tracking_type                TEXT    NOT NULL DEFAULT 'none'
                                 CHECK (tracking_type IN ('none', 'batch', 'serial')),
    low_stock_threshold          INTEGER NOT NULL DEFAULT 0,
    is_active                    INTEGER NOT NULL DEFAULT 1,
    created_at                   TEXT    NOT NULL,
    updated_at                   TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_active ON products(is_active, name);

CREATE TABLE IF NOT EXISTS customers (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    name                  TEXT    NOT NULL,
    phone                 TEXT,
    email                 TEXT,
    gstin                 TEXT,
    address               TEXT,
    state                 TEXT,
    opening_balance_paise INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS suppliers (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    name                  TEXT    NOT NULL,
    phone                 TEXT,
    email                 TEXT,
    gstin                 TEXT,
    address               TEXT,
    state                 TEXT,
    opening_balance_paise INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS purchases (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    supplier_id        INTEGER REFERENCES suppliers(id),
    bill_number        TEXT,
    reference_no       TEXT    NOT NULL UNIQUE,
    purchase_date      TEXT    NOT NULL,
    status             TEXT    NOT NULL DEFAULT 'received'
                       CHECK (status IN ('ordered', 'received')),
    payment_mode       TEXT    NOT NULL DEFAULT 'cash',
    total_amount_paise INTEGER NOT NULL DEFAULT 0,
    paid_amount_paise  INTEGER NOT NULL DEFAULT 0,
    discount_paise     INTEGER NOT NULL DEFAULT 0,
    notes              TEXT,
    created_at         TEXT    NOT NULL,
    updated_at         TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS product_batches (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id           INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    purchase_id          INTEGER REFERENCES purchases(id) ON DELETE SET NULL,
    batch_uid            TEXT    NOT NULL UNIQUE,
    batch_number         TEXT,
    expiry_date          TEXT,
    mfg_date             TEXT,
    mrp_paise            INTEGER NOT NULL DEFAULT 0,
    purchase_price_paise INTEGER NOT NULL DEFAULT 0,
    selling_price_paise  INTEGER NOT NULL DEFAULT 0,
    quantity             INTEGER NOT NULL DEFAULT 0,
    storage_location     TEXT,
    is_active            INTEGER NOT NULL DEFAULT 1,
    created_at           TEXT    NOT NULL,
    updated_at           TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_batches_product ON product_batches(product_id, is_active);

CREATE TABLE IF NOT EXISTS purchase_items (
    id                  TEXT    PRIMARY KEY,
    purchase_id         INTEGER NOT NULL REFERENCES purchases(id) ON DELETE CASCADE,
    product_id          INTEGER NOT NULL REFERENCES products(id),
    quantity            INTEGER NOT NULL CHECK (quantity > 0),
    rate_paise          INTEGER NOT NULL,
    gst_rate_bps        INTEGER NOT NULL DEFAULT 0,
    discount_paise      INTEGER NOT NULL DEFAULT 0,
    taxable_paise       INTEGER NOT NULL,
    gst_paise           INTEGER NOT NULL,
    price_paise         INTEGER NOT NULL,
    batch_uid           TEXT,
    batch_number        TEXT,
    serial_numbers      TEXT    NOT NULL DEFAULT '[]',
    expiry_date         TEXT,
    mfg_date            TEXT,
    mrp_paise           INTEGER NOT NULL DEFAULT 0,
    selling_price_paise INTEGER NOT NULL DEFAULT 0,
    batch_id            INTEGER REFERENCES product_batches(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_purchase_items_purchase ON purchase_items(purchase_id);

CREATE TABLE IF NOT EXISTS product_serials (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id    INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    batch_id      INTEGER NOT NULL REFERENCES product_batches(id) ON DELETE CASCADE,
    serial_number TEXT    NOT NULL,
    status        TEXT    NOT NULL DEFAULT 'available'
                  CHECK (status IN ('available', 'sold', 'returned', 'defective', 'in_repair')),
    created_at    TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL,
    UNIQUE (product_id, serial_number)
);

CREATE INDEX IF NOT EXISTS idx_serials_batch ON product_serials(batch_id, status);

CREATE TABLE IF NOT EXISTS sales (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_no       TEXT    NOT NULL UNIQUE,
    customer_id        INTEGER REFERENCES customers(id),
    sale_date          TEXT    NOT NULL,
    payment_mode       TEXT    NOT NULL DEFAULT 'cash',
    total_amount_paise INTEGER NOT NULL DEFAULT 0,
    paid_amount_paise  INTEGER NOT NULL DEFAULT 0,
    discount_paise     INTEGER NOT NULL DEFAULT 0,
    is_reverse_charge  INTEGER NOT NULL DEFAULT 0,
    is_ecommerce       INTEGER NOT NULL DEFAULT 0,
    is_quote           INTEGER NOT NULL DEFAULT 0,
    status             TEXT    NOT NULL DEFAULT 'completed'
                       CHECK (status IN ('draft', 'completed', 'cancelled')),
    notes              TEXT,
    created_by         INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at         TEXT    NOT NULL,
    updated_at         TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sales_customer ON sales(customer_id, sale_date);

CREATE TABLE IF NOT EXISTS sale_items (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    sale_id        INTEGER NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
    product_id     INTEGER NOT NULL REFERENCES products(id),
    batch_id       INTEGER REFERENCES product_batches(id) ON DELETE SET NULL,
    serial_id      INTEGER REFERENCES product_serials(id) ON DELETE SET NULL,
    quantity       INTEGER NOT NULL CHECK (quantity > 0),
    rate_paise     INTEGER NOT NULL,
    gst_rate_bps   INTEGER NOT NULL DEFAULT 0,
    discount_paise INTEGER NOT NULL DEFAULT 0,
    taxable_paise  INTEGER NOT NULL,
    gst_paise      INTEGER NOT NULL,
    price_paise    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sale_items_sale ON sale_items(sale_id);

CREATE TABLE IF NOT EXISTS transactions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_no     TEXT    NOT NULL UNIQUE,
    transaction_type TEXT    NOT NULL CHECK (transaction_type IN
                     ('payment_in', 'payment_out', 'refund', 'credit_note', 'debit_note')),
    bill_id          INTEGER,
    bill_type        TEXT    CHECK (bill_type IS NULL OR bill_type IN ('sale', 'purchase')),
    entity_id        INTEGER NOT NULL,
    entity_type      TEXT    NOT NULL CHECK (entity_type IN ('customer', 'supplier')),
    transaction_date TEXT    NOT NULL,
    amount_paise     INTEGER NOT NULL CHECK (amount_paise > 0),
    payment_mode     TEXT    NOT NULL DEFAULT 'cash',
    status           TEXT    NOT NULL DEFAULT 'completed'
                     CHECK (status IN ('completed', 'cancelled')),
    gst_paise        INTEGER NOT NULL DEFAULT 0,
    discount_paise   INTEGER NOT NULL DEFAULT 0,
    notes            TEXT,
    created_at       TEXT    NOT NULL,
    CHECK ((bill_id IS NULL) = (bill_type IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_transactions_bill ON transactions(bill_type, bill_id);
CREATE INDEX IF NOT EXISTS idx_transactions_entity
    ON transactions(entity_type, entity_id, transaction_date);

CREATE TABLE IF NOT EXISTS stock_adjustments (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id   INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    batch_id     INTEGER REFERENCES product_batches(id) ON DELETE SET NULL,
    category     TEXT    NOT NULL CHECK (category IN
                 ('damage', 'loss', 'expired', 'count_correction', 'other')),
    old_quantity INTEGER NOT NULL,
    new_quantity INTEGER NOT NULL,
    delta        INTEGER NOT NULL,
    reason       TEXT,
    adjusted_by  INTEGER REFERENCES users(id) ON DELETE SET NULL,
    created_at   TEXT    NOT NULL,
    CHECK (delta = new_quantity - old_quantity)
);

CREATE INDEX IF NOT EXISTS idx_adjustments_product ON stock_adjustments(product_id, created_at);
"#;

// Foreign-key SET NULL actions may still clear batch_id / adjusted_by.
const PRIMARY_ADJUSTMENTS_APPEND_ONLY: &str = r#"
CREATE TRIGGER IF NOT EXISTS stock_adjustments_append_only
BEFORE UPDATE OF product_id, category, old_quantity, new_quantity, delta, reason, created_at
ON stock_adjustments
BEGIN
    SELECT RAISE(ABORT, 'stock adjustments are append-only');
END;
"#;

const PRIMARY_PRODUCTS_BARCODE: &str = "ALTER TABLE products ADD COLUMN barcode TEXT;";

const PRIMARY_PRODUCTS_BARCODE_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_products_barcode
    ON products(barcode) WHERE barcode IS NOT NULL;
"#;

/// Migrations for the primary (GST) store, in application order.
pub static PRIMARY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: PRIMARY_INITIAL,
        kind: MigrationKind::Required,
    },
    Migration {
        version: 2,
        name: "stock_adjustments_append_only",
        sql: PRIMARY_ADJUSTMENTS_APPEND_ONLY,
        kind: MigrationKind::Required,
    },
    Migration {
        version: 3,
        name: "products_barcode",
        sql: PRIMARY_PRODUCTS_BARCODE,
        kind: MigrationKind::Optional,
    },
    Migration {
        version: 4,
        name: "products_barcode_index",
        sql: PRIMARY_PRODUCTS_BARCODE_INDEX,
        kind: MigrationKind::Optional,
    },
];

// =============================================================================
// Secondary schema
// =============================================================================

const SECONDARY_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS non_gst_sales (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_no       TEXT    NOT NULL UNIQUE,
    customer_name      TEXT,
    customer_phone     TEXT,
    sale_date          TEXT    NOT NULL,
    payment_mode       TEXT    NOT NULL DEFAULT 'cash',
    total_amount_paise INTEGER NOT NULL DEFAULT 0,
    paid_amount_paise  INTEGER NOT NULL DEFAULT 0,
    discount_paise     INTEGER NOT NULL DEFAULT 0,
    notes              TEXT,
    created_at         TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_non_gst_sales_date ON non_gst_sales(sale_date);

CREATE TABLE IF NOT EXISTS non_gst_sale_items (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    sale_id        INTEGER NOT NULL REFERENCES non_gst_sales(id) ON DELETE CASCADE,
    product_name   TEXT    NOT NULL,
    quantity       INTEGER NOT NULL CHECK (quantity > 0),
    rate_paise     INTEGER NOT NULL,
    discount_paise INTEGER NOT NULL DEFAULT 0,
    price_paise    INTEGER NOT NULL
);
"#;

/// Migrations for the secondary (non-GST) store.
pub static SECONDARY_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SECONDARY_INITIAL,
    kind: MigrationKind::Required,
}];

// =============================================================================
// Runner
// =============================================================================

const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    name       TEXT    NOT NULL,
    applied_at TEXT    NOT NULL
)
"#;

/// Applies the schema's pending migrations.
pub async fn run_migrations(pool: &SqlitePool, schema: Schema) -> DbResult<MigrationReport> {
    apply(pool, schema.migrations()).await
}

/// Applies pending entries of `migrations` in order.
pub(crate) async fn apply(pool: &SqlitePool, migrations: &[Migration]) -> DbResult<MigrationReport> {
    sqlx::query(CREATE_METADATA_TABLE)
        .execute(pool)
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

    let applied: HashSet<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?
        .into_iter()
        .collect();

    let mut report = MigrationReport::default();

    for migration in migrations {
        if applied.contains(&migration.version) {
            continue;
        }
        debug!(version = migration.version, name = migration.name, "Applying migration");

        match apply_one(pool, migration).await {
            Ok(()) => {
                info!(version = migration.version, name = migration.name, "Migration applied");
                report.applied.push(migration.version);
            }
            Err(e) if migration.kind == MigrationKind::Required => {
                return Err(DbError::MigrationFailed(format!(
                    "{} ({}): {e}",
                    migration.version, migration.name
                )));
            }
            Err(e) if is_duplicate_column(&e) => {
                // Column was added by hand or by an older build
                record(pool, migration)
                    .await
                    .map_err(|e| DbError::MigrationFailed(e.to_string()))?;
                debug!(
                    version = migration.version,
                    name = migration.name,
                    "Column already present, migration recorded"
                );
                report.applied.push(migration.version);
            }
            Err(e) => {
                warn!(
                    version = migration.version,
                    name = migration.name,
                    error = %e,
                    "Optional migration failed, continuing without it"
                );
                report.skipped.push(migration.version);
            }
        }
    }

    Ok(report)
}

async fn apply_one(pool: &SqlitePool, migration: &Migration) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
    sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

async fn record(pool: &SqlitePool, migration: &Migration) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
    )
    .bind(migration.version)
    .bind(migration.name)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

fn is_duplicate_column(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("duplicate column name"),
        _ => false,
    }
}

/// Returns `(total, applied)` migration counts for diagnostics.
pub async fn migration_status(pool: &SqlitePool, schema: Schema) -> DbResult<(usize, usize)> {
    let total = schema.migrations().len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn bare_db() -> Database {
        Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap()
    }

    async fn product_columns(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM pragma_table_info('products')")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_primary_applies_everything() {
        let db = bare_db().await;
        let report = run_migrations(db.pool(), Schema::Primary).await.unwrap();

        assert_eq!(report.applied, vec![1, 2, 3, 4]);
        assert!(report.skipped.is_empty());
        assert_eq!(
            migration_status(db.pool(), Schema::Primary).await.unwrap(),
            (4, 4)
        );
    }

    #[tokio::test]
    async fn test_running_twice_is_a_no_op() {
        let db = bare_db().await;
        run_migrations(db.pool(), Schema::Primary).await.unwrap();
        let second = run_migrations(db.pool(), Schema::Primary).await.unwrap();

        assert!(second.applied.is_empty());
        let columns = product_columns(db.pool()).await;
        assert_eq!(columns.iter().filter(|c| *c == "barcode").count(), 1);
    }

    #[tokio::test]
    async fn test_legacy_column_is_recorded_as_applied() {
        let db = bare_db().await;
        apply(db.pool(), &PRIMARY_MIGRATIONS[..2]).await.unwrap();
        sqlx::query("ALTER TABLE products ADD COLUMN barcode TEXT")
            .execute(db.pool())
            .await
            .unwrap();

        let report = run_migrations(db.pool(), Schema::Primary).await.unwrap();
        assert_eq!(report.applied, vec![3, 4]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_failed_optional_migration_does_not_abort() {
        let db = bare_db().await;
        let list = [
            Migration {
                version: 1,
                name: "base",
                sql: "CREATE TABLE t (id INTEGER PRIMARY KEY);",
                kind: MigrationKind::Required,
            },
            Migration {
                version: 2,
                name: "broken",
                sql: "ALTER TABLE missing ADD COLUMN x TEXT;",
                kind: MigrationKind::Optional,
            },
            Migration {
                version: 3,
                name: "after",
                sql: "ALTER TABLE t ADD COLUMN y TEXT;",
                kind: MigrationKind::Optional,
            },
        ];

        let report = apply(db.pool(), &list).await.unwrap();
        assert_eq!(report.applied, vec![1, 3]);
        assert_eq!(report.skipped, vec![2]);

        // Still pending, retried on the next run
        let again = apply(db.pool(), &list).await.unwrap();
        assert_eq!(again.skipped, vec![2]);
    }

    #[tokio::test]
    async fn test_failed_required_migration_is_fatal() {
        let db = bare_db().await;
        let list = [Migration {
            version: 1,
            name: "broken",
            sql: "CREATE TABLE (;",
            kind: MigrationKind::Required,
        }];

        let err = apply(db.pool(), &list).await.unwrap_err();
        assert!(matches!(err, DbError::MigrationFailed(_)));
    }

    #[tokio::test]
    async fn test_secondary_schema() {
        let db = Database::new(DbConfig::in_memory().schema(Schema::Secondary))
            .await
            .unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'non_gst%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(tables, vec!["non_gst_sale_items", "non_gst_sales"]);
    }
}
