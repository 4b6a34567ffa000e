//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Create / read / update of catalogue fields
//! - Lookup by code or barcode
//! - Soft delete (bills keep referencing the row)
//! - Low-stock listing
//!
//! Quantities are not written here. They move through purchases, sales,
//! stock adjustments and serial transitions so the cached product quantity
//! always agrees with its batches and serials.
//!
//! ## Barcode Column
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products.barcode is added by an optional migration.                    │
//! │                                                                         │
//! │  column present  → get_by_barcode works, barcode decoded into Product   │
//! │  column missing  → Product.barcode = None (sqlx default),               │
//! │                    get_by_barcode / create with barcode fail            │
//! │                    with QueryFailed; everything else keeps working      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::inventory::fetch_product;
use stockbook_core::validation::{
    validate_gst_rate, validate_hsn_code, validate_name, validate_price_paise,
    validate_product_code,
};
use stockbook_core::{CoreError, Product, TrackingMode};

/// Input for a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_code: String,
    pub name: String,
    pub hsn_code: Option<String>,
    pub gst_rate_bps: u32,
    pub mrp_paise: i64,
    pub mop_paise: i64,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub storage_location: Option<String>,
    pub tracking_type: TrackingMode,
    pub low_stock_threshold: i64,
    pub barcode: Option<String>,
    /// Stock on hand when the product is created. Untracked products only;
    /// batch and serial stock arrives through purchases.
    pub opening_quantity: i64,
}

impl NewProduct {
    /// An untracked product at 0% GST with no prices set.
    pub fn new(product_code: impl Into<String>, name: impl Into<String>) -> Self {
        NewProduct {
            product_code: product_code.into(),
            name: name.into(),
            hsn_code: None,
            gst_rate_bps: 0,
            mrp_paise: 0,
            mop_paise: 0,
            category_id: None,
            subcategory_id: None,
            storage_location: None,
            tracking_type: TrackingMode::Untracked,
            low_stock_threshold: 0,
            barcode: None,
            opening_quantity: 0,
        }
    }
}

/// Partial update of catalogue fields. `None` leaves a field unchanged.
///
/// Tracking mode is fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub hsn_code: Option<String>,
    pub gst_rate_bps: Option<u32>,
    pub mrp_paise: Option<i64>,
    pub mop_paise: Option<i64>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub storage_location: Option<String>,
    pub low_stock_threshold: Option<i64>,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let product = repo.get_by_code("IPH-15").await?;
/// let low = repo.low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    db: Database,
}

impl ProductRepository {
    pub fn new(db: Database) -> Self {
        ProductRepository { db }
    }

    /// Creates a product.
    ///
    /// ## Errors
    /// - `UniqueViolation` for a repeated product code or barcode
    /// - `Domain(TrackingMismatch)` for an opening quantity on a batch or
    ///   serial-tracked product
    pub async fn create(&self, product: NewProduct) -> DbResult<Product> {
        validate_product_code(&product.product_code)?;
        validate_name("name", &product.name)?;
        if let Some(hsn) = product.hsn_code.as_deref() {
            validate_hsn_code(hsn)?;
        }
        validate_gst_rate(product.gst_rate_bps)?;
        validate_price_paise("mrp", product.mrp_paise)?;
        validate_price_paise("mop", product.mop_paise)?;
        validate_price_paise("low_stock_threshold", product.low_stock_threshold)?;
        validate_price_paise("opening_quantity", product.opening_quantity)?;

        let code = product.product_code.trim();
        if product.opening_quantity != 0 && product.tracking_type != TrackingMode::Untracked {
            return Err(CoreError::TrackingMismatch {
                product_code: code.to_string(),
                tracking: product.tracking_type,
                reason: "opening stock must be received through a purchase".to_string(),
            }
            .into());
        }

        debug!(code = %code, tracking = %product.tracking_type, "Creating product");

        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (
                product_code, name, hsn_code, gst_rate_bps, mrp_paise, mop_paise,
                category_id, subcategory_id, storage_location, quantity,
                tracking_type, low_stock_threshold, is_active, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13, ?13)
            RETURNING id
            "#,
        )
        .bind(code)
        .bind(product.name.trim())
        .bind(product.hsn_code.as_deref().map(str::trim))
        .bind(product.gst_rate_bps)
        .bind(product.mrp_paise)
        .bind(product.mop_paise)
        .bind(product.category_id)
        .bind(product.subcategory_id)
        .bind(&product.storage_location)
        .bind(product.opening_quantity)
        .bind(product.tracking_type)
        .bind(product.low_stock_threshold)
        .bind(now)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("product_code", code),
            other => other,
        })?;

        if let Some(barcode) = product.barcode.as_deref().map(str::trim) {
            sqlx::query("UPDATE products SET barcode = ?1 WHERE id = ?2")
                .bind(barcode)
                .bind(id)
                .execute(tx.conn())
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::UniqueViolation { .. } => DbError::duplicate("barcode", barcode),
                    other => other,
                })?;
        }

        let created = fetch_product(tx.conn(), id).await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(product)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let product =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE product_code = ?1")
                .bind(code.trim())
                .fetch_optional(self.db.pool())
                .await?;
        Ok(product)
    }

    /// Finds an active product by barcode. Requires the optional barcode
    /// column.
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE barcode = ?1 AND is_active = 1",
        )
        .bind(barcode.trim())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(product)
    }

    /// Returns active products ordered by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active = 1 ORDER BY name COLLATE NOCASE, id LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        Ok(products)
    }

    /// Updates catalogue fields and returns the updated product.
    pub async fn update_details(&self, id: i64, update: ProductUpdate) -> DbResult<Product> {
        if let Some(name) = update.name.as_deref() {
            validate_name("name", name)?;
        }
        if let Some(hsn) = update.hsn_code.as_deref() {
            validate_hsn_code(hsn)?;
        }
        if let Some(rate) = update.gst_rate_bps {
            validate_gst_rate(rate)?;
        }
        if let Some(mrp) = update.mrp_paise {
            validate_price_paise("mrp", mrp)?;
        }
        if let Some(mop) = update.mop_paise {
            validate_price_paise("mop", mop)?;
        }

        debug!(id, ?update, "Updating product");

        let mut tx = self.db.begin_write().await?;
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name                = COALESCE(?2, name),
                hsn_code            = COALESCE(?3, hsn_code),
                gst_rate_bps        = COALESCE(?4, gst_rate_bps),
                mrp_paise           = COALESCE(?5, mrp_paise),
                mop_paise           = COALESCE(?6, mop_paise),
                category_id         = COALESCE(?7, category_id),
                subcategory_id      = COALESCE(?8, subcategory_id),
                storage_location    = COALESCE(?9, storage_location),
                low_stock_threshold = COALESCE(?10, low_stock_threshold),
                updated_at          = ?11
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.hsn_code.as_deref().map(str::trim))
        .bind(update.gst_rate_bps)
        .bind(update.mrp_paise)
        .bind(update.mop_paise)
        .bind(update.category_id)
        .bind(update.subcategory_id)
        .bind(&update.storage_location)
        .bind(update.low_stock_threshold)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        let product = fetch_product(tx.conn(), id).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Hides a product from listings and new bills. Existing bills, batches
    /// and serials keep their references.
    pub async fn soft_delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Soft deleting product");

        let mut tx = self.db.begin_write().await?;
        let result =
            sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(Utc::now())
                .execute(tx.conn())
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        tx.commit().await
    }

    /// Active products at or below their reorder threshold.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_active = 1
              AND low_stock_threshold > 0
              AND quantity <= low_stock_threshold
            ORDER BY quantity, name COLLATE NOCASE
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(products)
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let db = setup().await;
        let repo = db.products();

        let created = repo
            .create(NewProduct {
                hsn_code: Some("8517".to_string()),
                gst_rate_bps: 1800,
                mrp_paise: 1_599_900,
                barcode: Some("8901234567890".to_string()),
                tracking_type: TrackingMode::Serial,
                ..NewProduct::new("SAM-A15", "Galaxy A15")
            })
            .await
            .unwrap();

        assert_eq!(created.quantity, 0);
        assert_eq!(created.tracking_type, TrackingMode::Serial);
        assert!(created.is_active);

        let by_code = repo.get_by_code("SAM-A15").await.unwrap().unwrap();
        assert_eq!(by_code.id, created.id);

        let by_barcode = repo.get_by_barcode("8901234567890").await.unwrap().unwrap();
        assert_eq!(by_barcode.id, created.id);
        assert_eq!(by_barcode.barcode.as_deref(), Some("8901234567890"));

        assert!(repo.get_by_code("MISSING").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_and_barcode() {
        let db = setup().await;
        let repo = db.products();
        repo.create(NewProduct {
            barcode: Some("111".to_string()),
            ..NewProduct::new("A-1", "First")
        })
        .await
        .unwrap();

        let err = repo.create(NewProduct::new("A-1", "Again")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "product_code"));

        let err = repo
            .create(NewProduct {
                barcode: Some("111".to_string()),
                ..NewProduct::new("A-2", "Second")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "barcode"));

        // The failed create rolled back entirely
        assert!(repo.get_by_code("A-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_opening_quantity_only_for_untracked() {
        let db = setup().await;
        let repo = db.products();

        let loose = repo
            .create(NewProduct {
                opening_quantity: 40,
                ..NewProduct::new("CABLE-1M", "USB-C cable")
            })
            .await
            .unwrap();
        assert_eq!(loose.quantity, 40);

        let err = repo
            .create(NewProduct {
                opening_quantity: 5,
                tracking_type: TrackingMode::Batch,
                ..NewProduct::new("PARA-500", "Paracetamol 500")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::TrackingMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_soft_delete_and_low_stock() {
        let db = setup().await;
        let repo = db.products();
        let product = repo
            .create(NewProduct {
                opening_quantity: 3,
                low_stock_threshold: 5,
                ..NewProduct::new("CASE-01", "Phone case")
            })
            .await
            .unwrap();
        repo.create(NewProduct {
            opening_quantity: 50,
            low_stock_threshold: 5,
            ..NewProduct::new("CASE-02", "Flip case")
        })
        .await
        .unwrap();

        let low = repo.low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, product.id);
        assert!(low[0].is_low_stock());

        let updated = repo
            .update_details(
                product.id,
                ProductUpdate {
                    name: Some("Silicone case".to_string()),
                    mrp_paise: Some(29_900),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Silicone case");
        assert_eq!(updated.mrp_paise, 29_900);
        assert_eq!(updated.quantity, 3);

        repo.soft_delete(product.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.list_active(10).await.unwrap().len(), 1);
        assert!(repo.low_stock().await.unwrap().is_empty());

        let err = repo.soft_delete(999).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
