//! # Inventory Repository
//!
//! Batches, serials and the cached product quantity.
//!
//! ## Quantity Invariants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tracking = none    product.quantity          is the source of truth    │
//! │                                                                         │
//! │  tracking = batch   product.quantity = Σ batch.quantity (active)        │
//! │                                                                         │
//! │  tracking = serial  batch.quantity   = #serials available in batch      │
//! │                     product.quantity = #serials available               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write that touches stock ends by calling the refresh helpers in
//! this module on the same transaction, so the cached figures are never
//! observed out of step with the rows they summarise. [`audit`] checks the
//! invariants from the outside.
//!
//! A batch is deactivated only at zero quantity, and anything that puts
//! stock back into an inactive batch reactivates it. Summing active batches
//! and summing all batches therefore agree.
//!
//! [`audit`]: InventoryRepository::audit

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use stockbook_core::inventory::ensure_can_decrement;
use stockbook_core::{
    CoreError, Product, ProductBatch, ProductSerial, SerialStatus, TrackingMode,
};

// =============================================================================
// Audit types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// Cached product quantity disagrees with its batches or serials.
    ProductQuantity,
    /// Serial-tracked batch quantity disagrees with its available serials.
    BatchQuantity,
    /// Stock below zero while the shop forbids negative stock.
    NegativeStock,
}

/// One broken invariant found by [`InventoryRepository::audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDiscrepancy {
    pub kind: DiscrepancyKind,
    pub product_id: i64,
    pub product_code: String,
    pub batch_id: Option<i64>,
    /// Figure stored in the database.
    pub recorded: i64,
    /// Figure the invariant requires.
    pub expected: i64,
}

#[derive(sqlx::FromRow)]
struct DiscrepancyRow {
    product_id: i64,
    product_code: String,
    batch_id: Option<i64>,
    recorded: i64,
    expected: i64,
}

impl DiscrepancyRow {
    fn into_discrepancy(self, kind: DiscrepancyKind) -> InventoryDiscrepancy {
        InventoryDiscrepancy {
            kind,
            product_id: self.product_id,
            product_code: self.product_code,
            batch_id: self.batch_id,
            recorded: self.recorded,
            expected: self.expected,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct InventoryRepository {
    db: Database,
}

impl InventoryRepository {
    pub fn new(db: Database) -> Self {
        InventoryRepository { db }
    }

    /// Batches of a product, earliest expiry first (undated last).
    pub async fn batches_for_product(&self, product_id: i64) -> DbResult<Vec<ProductBatch>> {
        let batches = sqlx::query_as::<_, ProductBatch>(
            r#"
            SELECT * FROM product_batches
            WHERE product_id = ?1
            ORDER BY expiry_date IS NULL, expiry_date, id
            "#,
        )
        .bind(product_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(batches)
    }

    pub async fn get_batch(&self, batch_id: i64) -> DbResult<Option<ProductBatch>> {
        let batch = sqlx::query_as::<_, ProductBatch>("SELECT * FROM product_batches WHERE id = ?1")
            .bind(batch_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(batch)
    }

    pub async fn get_batch_by_uid(&self, batch_uid: &str) -> DbResult<Option<ProductBatch>> {
        let batch =
            sqlx::query_as::<_, ProductBatch>("SELECT * FROM product_batches WHERE batch_uid = ?1")
                .bind(batch_uid.trim())
                .fetch_optional(self.db.pool())
                .await?;
        Ok(batch)
    }

    pub async fn serials_for_batch(&self, batch_id: i64) -> DbResult<Vec<ProductSerial>> {
        let serials = sqlx::query_as::<_, ProductSerial>(
            "SELECT * FROM product_serials WHERE batch_id = ?1 ORDER BY serial_number",
        )
        .bind(batch_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(serials)
    }

    /// Serial numbers are unique per product, not store-wide.
    pub async fn get_serial_by_number(
        &self,
        product_id: i64,
        serial_number: &str,
    ) -> DbResult<Option<ProductSerial>> {
        let mut conn = self.db.pool().acquire().await?;
        find_serial_by_number(&mut conn, product_id, serial_number).await
    }

    /// Moves a serial along the state machine and refreshes its batch and
    /// product quantities.
    ///
    /// ## Errors
    /// - `Domain(InvalidSerialTransition)` for an edge the state machine
    ///   does not allow (e.g. `sold → available` without `returned`)
    pub async fn transition_serial(&self, serial_id: i64, to: SerialStatus) -> DbResult<ProductSerial> {
        let mut tx = self.db.begin_write().await?;
        let serial = fetch_serial(tx.conn(), serial_id).await?;
        let updated = set_serial_status(tx.conn(), &serial, to).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Deactivates an empty batch so it stops being offered for sale.
    pub async fn deactivate_batch(&self, batch_id: i64) -> DbResult<ProductBatch> {
        let mut tx = self.db.begin_write().await?;
        let batch = fetch_batch(tx.conn(), batch_id).await?;

        if batch.quantity != 0 {
            return Err(CoreError::InvalidState {
                entity: "Batch".to_string(),
                id: batch.batch_uid,
                status: format!("holding {} units", batch.quantity),
                operation: "deactivate".to_string(),
            }
            .into());
        }

        let batch = sqlx::query_as::<_, ProductBatch>(
            "UPDATE product_batches SET is_active = 0, updated_at = ?2 WHERE id = ?1 RETURNING *",
        )
        .bind(batch_id)
        .bind(Utc::now())
        .fetch_one(tx.conn())
        .await?;
        tx.commit().await?;

        debug!(batch_id, "Batch deactivated");
        Ok(batch)
    }

    /// Recomputes the cached quantities of one product from its batches and
    /// serials. Returns the new product quantity.
    pub async fn recompute_product(&self, product_id: i64) -> DbResult<i64> {
        let mut tx = self.db.begin_write().await?;
        let product = fetch_product(tx.conn(), product_id).await?;

        if product.tracking_type == TrackingMode::Serial {
            let batch_ids: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM product_batches WHERE product_id = ?1")
                    .bind(product_id)
                    .fetch_all(tx.conn())
                    .await?;
            for batch_id in batch_ids {
                refresh_batch_from_serials(tx.conn(), batch_id).await?;
            }
        }

        let quantity = refresh_product_quantity(tx.conn(), &product).await?;
        tx.commit().await?;

        info!(product_id, quantity, "Product quantity recomputed");
        Ok(quantity)
    }

    /// Lists every product and batch whose cached quantity breaks an
    /// invariant. An empty list means the inventory is consistent.
    pub async fn audit(&self) -> DbResult<Vec<InventoryDiscrepancy>> {
        // One read transaction so all checks see the same snapshot
        let mut tx = self.db.pool().begin().await?;
        let mut found = Vec::new();

        let batch_products = sqlx::query_as::<_, DiscrepancyRow>(
            r#"
            SELECT * FROM (
                SELECT p.id AS product_id, p.product_code, NULL AS batch_id,
                       p.quantity AS recorded,
                       (SELECT COALESCE(SUM(b.quantity), 0) FROM product_batches b
                         WHERE b.product_id = p.id AND b.is_active = 1) AS expected
                FROM products p
                WHERE p.tracking_type = 'batch'
            )
            WHERE recorded <> expected
            ORDER BY product_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        found.extend(
            batch_products
                .into_iter()
                .map(|r| r.into_discrepancy(DiscrepancyKind::ProductQuantity)),
        );

        let serial_products = sqlx::query_as::<_, DiscrepancyRow>(
            r#"
            SELECT * FROM (
                SELECT p.id AS product_id, p.product_code, NULL AS batch_id,
                       p.quantity AS recorded,
                       (SELECT COUNT(*) FROM product_serials s
                         WHERE s.product_id = p.id AND s.status = 'available') AS expected
                FROM products p
                WHERE p.tracking_type = 'serial'
            )
            WHERE recorded <> expected
            ORDER BY product_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        found.extend(
            serial_products
                .into_iter()
                .map(|r| r.into_discrepancy(DiscrepancyKind::ProductQuantity)),
        );

        let serial_batches = sqlx::query_as::<_, DiscrepancyRow>(
            r#"
            SELECT * FROM (
                SELECT b.product_id, p.product_code, b.id AS batch_id,
                       b.quantity AS recorded,
                       (SELECT COUNT(*) FROM product_serials s
                         WHERE s.batch_id = b.id AND s.status = 'available') AS expected
                FROM product_batches b
                JOIN products p ON p.id = b.product_id
                WHERE p.tracking_type = 'serial'
            )
            WHERE recorded <> expected
            ORDER BY product_id, batch_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        found.extend(
            serial_batches
                .into_iter()
                .map(|r| r.into_discrepancy(DiscrepancyKind::BatchQuantity)),
        );

        let negative = sqlx::query_as::<_, DiscrepancyRow>(
            r#"
            SELECT p.id AS product_id, p.product_code, NULL AS batch_id,
                   p.quantity AS recorded, 0 AS expected
            FROM products p, shop s
            WHERE s.id = 1 AND s.allow_negative_stock = 0 AND p.quantity < 0
            UNION ALL
            SELECT b.product_id, p.product_code, b.id AS batch_id,
                   b.quantity AS recorded, 0 AS expected
            FROM product_batches b
            JOIN products p ON p.id = b.product_id, shop s
            WHERE s.id = 1 AND s.allow_negative_stock = 0 AND b.quantity < 0
            ORDER BY product_id, batch_id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        found.extend(
            negative
                .into_iter()
                .map(|r| r.into_discrepancy(DiscrepancyKind::NegativeStock)),
        );

        tx.rollback().await?;

        if !found.is_empty() {
            info!(count = found.len(), "Inventory audit found discrepancies");
        }
        Ok(found)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

pub(crate) async fn fetch_product(conn: &mut SqliteConnection, id: i64) -> DbResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
}

pub(crate) async fn fetch_batch(conn: &mut SqliteConnection, id: i64) -> DbResult<ProductBatch> {
    sqlx::query_as::<_, ProductBatch>("SELECT * FROM product_batches WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Batch", id))
}

pub(crate) async fn fetch_serial(conn: &mut SqliteConnection, id: i64) -> DbResult<ProductSerial> {
    sqlx::query_as::<_, ProductSerial>("SELECT * FROM product_serials WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Serial", id))
}

pub(crate) async fn find_serial_by_number(
    conn: &mut SqliteConnection,
    product_id: i64,
    serial_number: &str,
) -> DbResult<Option<ProductSerial>> {
    let serial = sqlx::query_as::<_, ProductSerial>(
        "SELECT * FROM product_serials WHERE product_id = ?1 AND serial_number = ?2",
    )
    .bind(product_id)
    .bind(serial_number.trim())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(serial)
}

/// Sets a batch's quantity to its count of available serials. A batch that
/// regains stock is reactivated.
pub(crate) async fn refresh_batch_from_serials(
    conn: &mut SqliteConnection,
    batch_id: i64,
) -> DbResult<i64> {
    let quantity: i64 = sqlx::query_scalar(
        r#"
        UPDATE product_batches SET
            quantity   = (SELECT COUNT(*) FROM product_serials
                           WHERE batch_id = ?1 AND status = 'available'),
            is_active  = CASE WHEN (SELECT COUNT(*) FROM product_serials
                                     WHERE batch_id = ?1 AND status = 'available') > 0
                              THEN 1 ELSE is_active END,
            updated_at = ?2
        WHERE id = ?1
        RETURNING quantity
        "#,
    )
    .bind(batch_id)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Batch", batch_id))?;
    Ok(quantity)
}

/// Recomputes the cached quantity of a batch- or serial-tracked product.
/// Untracked products are returned unchanged.
pub(crate) async fn refresh_product_quantity(
    conn: &mut SqliteConnection,
    product: &Product,
) -> DbResult<i64> {
    let sql = match product.tracking_type {
        TrackingMode::Untracked => {
            let quantity: i64 = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
                .bind(product.id)
                .fetch_one(&mut *conn)
                .await?;
            return Ok(quantity);
        }
        TrackingMode::Batch => {
            r#"
            UPDATE products SET
                quantity = (SELECT COALESCE(SUM(quantity), 0) FROM product_batches
                             WHERE product_id = ?1 AND is_active = 1),
                updated_at = ?2
            WHERE id = ?1
            RETURNING quantity
            "#
        }
        TrackingMode::Serial => {
            r#"
            UPDATE products SET
                quantity = (SELECT COUNT(*) FROM product_serials
                             WHERE product_id = ?1 AND status = 'available'),
                updated_at = ?2
            WHERE id = ?1
            RETURNING quantity
            "#
        }
    };

    let quantity: i64 = sqlx::query_scalar(sql)
        .bind(product.id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
    Ok(quantity)
}

/// Adds `delta` to an untracked product's quantity, rejecting a decrement
/// past zero unless negative stock is allowed.
pub(crate) async fn change_untracked_quantity(
    conn: &mut SqliteConnection,
    product: &Product,
    delta: i64,
    allow_negative: bool,
) -> DbResult<i64> {
    if product.tracking_type != TrackingMode::Untracked {
        return Err(CoreError::TrackingMismatch {
            product_code: product.product_code.clone(),
            tracking: product.tracking_type,
            reason: "stock lives on batches or serials".to_string(),
        }
        .into());
    }

    let current: i64 = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?1")
        .bind(product.id)
        .fetch_one(&mut *conn)
        .await?;
    if delta < 0 {
        ensure_can_decrement(&product.product_code, current, -delta, allow_negative)?;
    }

    let quantity: i64 = sqlx::query_scalar(
        "UPDATE products SET quantity = quantity + ?2, updated_at = ?3 WHERE id = ?1 RETURNING quantity",
    )
    .bind(product.id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;
    Ok(quantity)
}

/// Adds `delta` to a batch of a batch-tracked product and refreshes the
/// product. Returns the new batch quantity.
pub(crate) async fn change_batch_quantity(
    conn: &mut SqliteConnection,
    product: &Product,
    batch: &ProductBatch,
    delta: i64,
    allow_negative: bool,
) -> DbResult<i64> {
    if batch.product_id != product.id {
        return Err(CoreError::BatchUnavailable {
            batch_id: batch.id,
            product_code: product.product_code.clone(),
            reason: "batch belongs to another product".to_string(),
        }
        .into());
    }

    let current: i64 = sqlx::query_scalar("SELECT quantity FROM product_batches WHERE id = ?1")
        .bind(batch.id)
        .fetch_one(&mut *conn)
        .await?;
    if delta < 0 {
        ensure_can_decrement(&product.product_code, current, -delta, allow_negative)?;
    }

    let quantity: i64 = sqlx::query_scalar(
        r#"
        UPDATE product_batches SET
            quantity   = quantity + ?2,
            is_active  = CASE WHEN quantity + ?2 > 0 THEN 1 ELSE is_active END,
            updated_at = ?3
        WHERE id = ?1
        RETURNING quantity
        "#,
    )
    .bind(batch.id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    refresh_product_quantity(conn, product).await?;
    Ok(quantity)
}

/// Moves `serial` to `to` after checking the transition, then refreshes its
/// batch and product.
///
/// The update is conditional on the status read earlier, so a concurrent
/// change surfaces as an error instead of being overwritten.
pub(crate) async fn set_serial_status(
    conn: &mut SqliteConnection,
    serial: &ProductSerial,
    to: SerialStatus,
) -> DbResult<ProductSerial> {
    serial.status.transition(&serial.serial_number, to)?;

    let updated = sqlx::query_as::<_, ProductSerial>(
        r#"
        UPDATE product_serials SET status = ?2, updated_at = ?3
        WHERE id = ?1 AND status = ?4
        RETURNING *
        "#,
    )
    .bind(serial.id)
    .bind(to)
    .bind(Utc::now())
    .bind(serial.status)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        DbError::TransactionFailed(format!(
            "serial {} changed status concurrently",
            serial.serial_number
        ))
    })?;

    refresh_batch_from_serials(conn, serial.batch_id).await?;
    let product = fetch_product(conn, serial.product_id).await?;
    refresh_product_quantity(conn, &product).await?;

    debug!(
        serial = %serial.serial_number,
        from = %serial.status,
        to = %to,
        "Serial status changed"
    );
    Ok(updated)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::product::NewProduct;
    use crate::repository::purchase::{NewPurchase, NewPurchaseItem};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    async fn serial_product_with(db: &Database, serials: &[&str]) -> (Product, ProductBatch) {
        let product = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Serial,
                ..NewProduct::new("IPH-15", "iPhone 15")
            })
            .await
            .unwrap();
        let purchase = db
            .purchases()
            .create(
                NewPurchase::received(
                    today(),
                    vec![NewPurchaseItem {
                        serial_numbers: serials.iter().map(|s| s.to_string()).collect(),
                        ..NewPurchaseItem::new(product.id, serials.len() as i64, 6_000_000)
                    }],
                ),
                today(),
            )
            .await
            .unwrap();
        let items = db.purchases().items(purchase.id).await.unwrap();
        let batch = db
            .inventory()
            .get_batch(items[0].batch_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        (product, batch)
    }

    #[tokio::test]
    async fn test_serial_transitions_update_quantities() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (product, batch) = serial_product_with(&db, &["S1", "S2", "S3"]).await;
        let inventory = db.inventory();
        assert_eq!(batch.quantity, 3);

        let s1 = inventory
            .get_serial_by_number(product.id, "S1")
            .await
            .unwrap()
            .unwrap();
        inventory.transition_serial(s1.id, SerialStatus::Defective).await.unwrap();

        let batch = inventory.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(batch.quantity, 2);
        let product = db.products().get_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(product.quantity, 2);

        // Defective is terminal
        let err = inventory
            .transition_serial(s1.id, SerialStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidSerialTransition { .. })
        ));
        assert!(inventory.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_requires_empty_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (product, batch) = serial_product_with(&db, &["S1"]).await;
        let inventory = db.inventory();

        let err = inventory.deactivate_batch(batch.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));

        let s1 = inventory
            .get_serial_by_number(product.id, "S1")
            .await
            .unwrap()
            .unwrap();
        inventory.transition_serial(s1.id, SerialStatus::InRepair).await.unwrap();
        let batch = inventory.deactivate_batch(batch.id).await.unwrap();
        assert!(!batch.is_active);
    }

    #[tokio::test]
    async fn test_audit_detects_and_recompute_repairs() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (product, batch) = serial_product_with(&db, &["S1", "S2"]).await;

        sqlx::query("UPDATE products SET quantity = 7 WHERE id = ?1")
            .bind(product.id)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE product_batches SET quantity = 5 WHERE id = ?1")
            .bind(batch.id)
            .execute(db.pool())
            .await
            .unwrap();

        let found = db.inventory().audit().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, DiscrepancyKind::ProductQuantity);
        assert_eq!((found[0].recorded, found[0].expected), (7, 2));
        assert_eq!(found[1].kind, DiscrepancyKind::BatchQuantity);
        assert_eq!(found[1].batch_id, Some(batch.id));

        assert_eq!(db.inventory().recompute_product(product.id).await.unwrap(), 2);
        assert!(db.inventory().audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_by_uid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (product, batch) = serial_product_with(&db, &["S1"]).await;

        let found = db
            .inventory()
            .get_batch_by_uid(&batch.batch_uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, batch.id);
        assert_eq!(
            db.inventory().batches_for_product(product.id).await.unwrap().len(),
            1
        );
        assert_eq!(db.inventory().serials_for_batch(batch.id).await.unwrap().len(), 1);
    }
}
