//! # Stock Adjustment Repository
//!
//! Manual corrections to stock (damage, loss, expiry, recount). Each
//! adjustment sets a new quantity and is logged with the old value and the
//! delta. The log is append-only: a trigger rejects updates to it.
//!
//! ## Where the Quantity Lives
//! ```text
//! tracking = none    → products.quantity
//! tracking = batch   → product_batches.quantity (batch_id required),
//!                      product total refreshed
//! tracking = serial  → rejected; change the serial's status instead
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::inventory::{
    change_batch_quantity, change_untracked_quantity, fetch_batch, fetch_product,
};
use crate::repository::shop::fetch_shop;
use stockbook_core::{AdjustmentCategory, CoreError, StockAdjustment, TrackingMode, ValidationError};

/// Input for a stock correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockAdjustment {
    pub product_id: i64,
    /// Required for batch-tracked products.
    pub batch_id: Option<i64>,
    pub category: AdjustmentCategory,
    /// Quantity after the correction.
    pub new_quantity: i64,
    pub reason: Option<String>,
    pub adjusted_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StockAdjustmentRepository {
    db: Database,
}

impl StockAdjustmentRepository {
    pub fn new(db: Database) -> Self {
        StockAdjustmentRepository { db }
    }

    /// Sets stock to `new_quantity` and logs the change.
    pub async fn adjust(&self, adjustment: NewStockAdjustment) -> DbResult<StockAdjustment> {
        debug!(
            product_id = adjustment.product_id,
            batch_id = ?adjustment.batch_id,
            category = %adjustment.category,
            new_quantity = adjustment.new_quantity,
            "Adjusting stock"
        );

        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        let product = fetch_product(conn, adjustment.product_id).await?;
        let allow_negative = fetch_shop(conn).await?.allow_negative_stock;
        let mismatch = |reason: &str| CoreError::TrackingMismatch {
            product_code: product.product_code.clone(),
            tracking: product.tracking_type,
            reason: reason.to_string(),
        };

        let (batch_id, old_quantity) = match (product.tracking_type, adjustment.batch_id) {
            (TrackingMode::Serial, _) => {
                return Err(mismatch("serial units are adjusted by changing their status").into())
            }
            (TrackingMode::Batch, None) => return Err(mismatch("batch_id required").into()),
            (TrackingMode::Untracked, Some(_)) => {
                return Err(mismatch("product has no batches").into())
            }
            (TrackingMode::Batch, Some(batch_id)) => {
                let batch = fetch_batch(conn, batch_id).await?;
                let delta = delta(batch.quantity, adjustment.new_quantity)?;
                change_batch_quantity(conn, &product, &batch, delta, allow_negative).await?;
                (Some(batch.id), batch.quantity)
            }
            (TrackingMode::Untracked, None) => {
                let delta = delta(product.quantity, adjustment.new_quantity)?;
                change_untracked_quantity(conn, &product, delta, allow_negative).await?;
                (None, product.quantity)
            }
        };

        let recorded = sqlx::query_as::<_, StockAdjustment>(
            r#"
            INSERT INTO stock_adjustments (
                product_id, batch_id, category, old_quantity, new_quantity,
                delta, reason, adjusted_by, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING *
            "#,
        )
        .bind(product.id)
        .bind(batch_id)
        .bind(adjustment.category)
        .bind(old_quantity)
        .bind(adjustment.new_quantity)
        .bind(adjustment.new_quantity - old_quantity)
        .bind(&adjustment.reason)
        .bind(adjustment.adjusted_by)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        tx.commit().await?;

        info!(
            product = %product.product_code,
            batch_id = ?batch_id,
            old = recorded.old_quantity,
            new = recorded.new_quantity,
            "Stock adjusted"
        );
        Ok(recorded)
    }

    /// Adjustments for a product, newest first.
    pub async fn history(&self, product_id: i64) -> DbResult<Vec<StockAdjustment>> {
        let rows = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT * FROM stock_adjustments
            WHERE product_id = ?1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(product_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }
}

fn delta(current: i64, target: i64) -> Result<i64, ValidationError> {
    if current == target {
        return Err(ValidationError::InvalidFormat {
            field: "new_quantity".to_string(),
            reason: format!("stock is already {current}"),
        });
    }
    Ok(target - current)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::DbConfig;
    use crate::repository::product::NewProduct;
    use crate::repository::purchase::{NewPurchase, NewPurchaseItem};
    use chrono::NaiveDate;

    fn correction(product_id: i64, new_quantity: i64) -> NewStockAdjustment {
        NewStockAdjustment {
            product_id,
            batch_id: None,
            category: AdjustmentCategory::CountCorrection,
            new_quantity,
            reason: Some("shelf count".to_string()),
            adjusted_by: None,
        }
    }

    #[tokio::test]
    async fn test_untracked_adjustment_is_logged() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let pen = db
            .products()
            .create(NewProduct {
                opening_quantity: 10,
                ..NewProduct::new("PEN", "Pen")
            })
            .await
            .unwrap();

        let adj = db.adjustments().adjust(correction(pen.id, 7)).await.unwrap();
        assert_eq!((adj.old_quantity, adj.new_quantity, adj.delta), (10, 7, -3));
        let pen = db.products().get_by_id(pen.id).await.unwrap().unwrap();
        assert_eq!(pen.quantity, 7);

        let err = db.adjustments().adjust(correction(pen.id, 7)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let err = db.adjustments().adjust(correction(pen.id, -1)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InsufficientStock { .. })));

        db.adjustments().adjust(correction(pen.id, 12)).await.unwrap();
        let history = db.adjustments().history(pen.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_quantity, 12);

        // Append-only
        let err = sqlx::query("UPDATE stock_adjustments SET delta = 0 WHERE id = ?1")
            .bind(adj.id)
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("append-only"));
    }

    #[tokio::test]
    async fn test_batch_adjustment_and_tracking_rules() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let syrup = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Batch,
                ..NewProduct::new("SYRUP", "Cough Syrup")
            })
            .await
            .unwrap();
        db.purchases()
            .create(
                NewPurchase::received(today, vec![NewPurchaseItem::new(syrup.id, 8, 5_000)]),
                today,
            )
            .await
            .unwrap();
        let batch = db.inventory().batches_for_product(syrup.id).await.unwrap()[0].clone();

        let err = db.adjustments().adjust(correction(syrup.id, 5)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::TrackingMismatch { .. })));

        let adj = db
            .adjustments()
            .adjust(NewStockAdjustment {
                batch_id: Some(batch.id),
                category: AdjustmentCategory::Damage,
                ..correction(syrup.id, 5)
            })
            .await
            .unwrap();
        assert_eq!(adj.delta, -3);
        assert_eq!(adj.batch_id, Some(batch.id));

        let syrup = db.products().get_by_id(syrup.id).await.unwrap().unwrap();
        assert_eq!(syrup.quantity, 5);
        assert!(db.inventory().audit().await.unwrap().is_empty());

        let phone = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Serial,
                ..NewProduct::new("PHONE", "Phone")
            })
            .await
            .unwrap();
        let err = db.adjustments().adjust(correction(phone.id, 1)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::TrackingMismatch { .. })));
    }
}
