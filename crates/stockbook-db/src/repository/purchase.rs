//! # Purchase Repository
//!
//! Purchase bills and the stock they bring in.
//!
//! ## Receiving a Purchase
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  create(NewPurchase)  — one write transaction           │
//! │                                                                         │
//! │  1. counter::issue(PurchaseBill)          → PUR-2026-27/0007            │
//! │  2. INSERT purchases                                                    │
//! │  3. for each line:                                                      │
//! │       INSERT purchase_items (uuid key, serial list as JSON)             │
//! │       if status = received:                                             │
//! │         none    → product.quantity += qty                               │
//! │         batch   → INSERT product_batches (quantity = qty)               │
//! │         serial  → INSERT product_batches + one product_serials row      │
//! │                   per serial (available), batch qty = #available        │
//! │         product.average_purchase_price ← weighted average               │
//! │  4. commit                                                              │
//! │                                                                         │
//! │  Any failure (duplicate serial, unknown product) rolls back everything, │
//! │  including the purchase number.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deleting a purchase removes the bill, its lines and its linked payments,
//! but not the stock: batches survive with `purchase_id = NULL`. Stock
//! corrections go through stock adjustments.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::counter::issue;
use crate::repository::inventory::{
    fetch_product, refresh_batch_from_serials, refresh_product_quantity,
};
use crate::repository::party::fetch_party;
use stockbook_core::inventory::{generate_batch_uid, weighted_average_cost};
use stockbook_core::validation::{
    validate_gst_rate, validate_line_count, validate_price_paise, validate_quantity,
    validate_serial_numbers,
};
use stockbook_core::{
    CoreError, CounterKind, EntityType, GstRate, LineAmounts, Money, PaymentMode, Product,
    Purchase, PurchaseItem, PurchaseStatus, TrackingMode, ValidationError,
};

/// Input for a new purchase bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchase {
    pub supplier_id: Option<i64>,
    /// Number printed on the supplier's bill.
    pub bill_number: Option<String>,
    pub purchase_date: NaiveDate,
    pub status: PurchaseStatus,
    pub payment_mode: PaymentMode,
    /// Paid to the supplier at bill time.
    pub paid_amount_paise: i64,
    pub notes: Option<String>,
    pub items: Vec<NewPurchaseItem>,
}

impl NewPurchase {
    /// A received, unpaid purchase with no supplier.
    pub fn received(purchase_date: NaiveDate, items: Vec<NewPurchaseItem>) -> Self {
        NewPurchase {
            supplier_id: None,
            bill_number: None,
            purchase_date,
            status: PurchaseStatus::Received,
            payment_mode: PaymentMode::Credit,
            paid_amount_paise: 0,
            notes: None,
            items,
        }
    }
}

/// One line of a new purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseItem {
    pub product_id: i64,
    pub quantity: i64,
    /// Unit cost before GST.
    pub rate_paise: i64,
    /// Defaults to the product's GST rate.
    pub gst_rate_bps: Option<u32>,
    pub discount_paise: i64,
    /// Internal batch id. Generated when absent.
    pub batch_uid: Option<String>,
    /// Vendor lot number.
    pub batch_number: Option<String>,
    /// One per unit for serial-tracked products, empty otherwise.
    pub serial_numbers: Vec<String>,
    pub expiry_date: Option<NaiveDate>,
    pub mfg_date: Option<NaiveDate>,
    /// Defaults to the product's MRP.
    pub mrp_paise: Option<i64>,
    /// Defaults to the batch MRP.
    pub selling_price_paise: Option<i64>,
}

impl NewPurchaseItem {
    pub fn new(product_id: i64, quantity: i64, rate_paise: i64) -> Self {
        NewPurchaseItem {
            product_id,
            quantity,
            rate_paise,
            gst_rate_bps: None,
            discount_paise: 0,
            batch_uid: None,
            batch_number: None,
            serial_numbers: Vec::new(),
            expiry_date: None,
            mfg_date: None,
            mrp_paise: None,
            selling_price_paise: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    db: Database,
}

impl PurchaseRepository {
    pub fn new(db: Database) -> Self {
        PurchaseRepository { db }
    }

    /// Records a purchase bill. When `status` is `Received` the stock is
    /// materialised in the same transaction.
    ///
    /// `today` is the wall-clock date used for the purchase number's
    /// financial year.
    pub async fn create(&self, purchase: NewPurchase, today: NaiveDate) -> DbResult<Purchase> {
        validate_line_count(purchase.items.len())?;
        validate_price_paise("paid_amount", purchase.paid_amount_paise)?;
        for item in &purchase.items {
            validate_quantity(item.quantity)?;
            validate_price_paise("rate", item.rate_paise)?;
            if let Some(rate) = item.gst_rate_bps {
                validate_gst_rate(rate)?;
            }
        }

        debug!(
            supplier_id = ?purchase.supplier_id,
            lines = purchase.items.len(),
            status = %purchase.status,
            "Creating purchase"
        );

        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        if let Some(supplier_id) = purchase.supplier_id {
            fetch_party(conn, EntityType::Supplier, supplier_id).await?;
        }

        // Resolve products and amounts before anything is written
        let mut lines = Vec::with_capacity(purchase.items.len());
        for item in purchase.items {
            let product = fetch_product(conn, item.product_id).await?;
            let serials = check_tracking(&product, &item)?;
            let gst_rate = GstRate::from_bps(item.gst_rate_bps.unwrap_or(product.gst_rate_bps));
            let amounts = LineAmounts::compute(
                Money::from_paise(item.rate_paise),
                item.quantity,
                Money::from_paise(item.discount_paise),
                gst_rate,
            )?;
            lines.push((item, product, serials, gst_rate, amounts));
        }

        let total: Money = lines.iter().map(|(_, _, _, _, a)| a.total).sum();
        let discount: Money = lines.iter().map(|(_, _, _, _, a)| a.discount).sum();
        if purchase.paid_amount_paise > total.paise() {
            return Err(ValidationError::OutOfRange {
                field: "paid_amount".to_string(),
                min: 0,
                max: total.paise(),
            }
            .into());
        }

        let number = issue(conn, CounterKind::PurchaseBill, today).await?;
        let now = Utc::now();

        let purchase_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO purchases (
                supplier_id, bill_number, reference_no, purchase_date, status,
                payment_mode, total_amount_paise, paid_amount_paise, discount_paise,
                notes, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            RETURNING id
            "#,
        )
        .bind(purchase.supplier_id)
        .bind(&purchase.bill_number)
        .bind(&number.reference)
        .bind(purchase.purchase_date)
        .bind(purchase.status)
        .bind(purchase.payment_mode)
        .bind(total.paise())
        .bind(purchase.paid_amount_paise)
        .bind(discount.paise())
        .bind(&purchase.notes)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        for (item, product, serials, gst_rate, amounts) in lines {
            let mrp = item.mrp_paise.unwrap_or(product.mrp_paise);
            let stored = sqlx::query_as::<_, PurchaseItem>(
                r#"
                INSERT INTO purchase_items (
                    id, purchase_id, product_id, quantity, rate_paise, gst_rate_bps,
                    discount_paise, taxable_paise, gst_paise, price_paise, batch_uid,
                    batch_number, serial_numbers, expiry_date, mfg_date, mrp_paise,
                    selling_price_paise
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(purchase_id)
            .bind(product.id)
            .bind(item.quantity)
            .bind(item.rate_paise)
            .bind(gst_rate.bps())
            .bind(amounts.discount.paise())
            .bind(amounts.taxable.paise())
            .bind(amounts.gst.paise())
            .bind(amounts.total.paise())
            .bind(item.batch_uid.as_deref().map(str::trim))
            .bind(&item.batch_number)
            .bind(Json(&serials))
            .bind(item.expiry_date)
            .bind(item.mfg_date)
            .bind(mrp)
            .bind(item.selling_price_paise.unwrap_or(mrp))
            .fetch_one(&mut *conn)
            .await?;

            if purchase.status == PurchaseStatus::Received {
                receive_item(conn, &stored, &amounts).await?;
            }
        }

        let created = fetch_purchase(conn, purchase_id).await?;
        tx.commit().await?;

        info!(
            purchase_id,
            reference = %created.reference_no,
            total = %total,
            "Purchase recorded"
        );
        Ok(created)
    }

    /// Marks an ordered purchase as received and materialises its stock.
    pub async fn receive(&self, purchase_id: i64) -> DbResult<Purchase> {
        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        let purchase = fetch_purchase(conn, purchase_id).await?;
        if purchase.status != PurchaseStatus::Ordered {
            return Err(CoreError::InvalidState {
                entity: "Purchase".to_string(),
                id: purchase.reference_no,
                status: purchase.status.to_string(),
                operation: "receive".to_string(),
            }
            .into());
        }

        for item in fetch_items(conn, purchase_id).await? {
            let amounts = LineAmounts::compute(
                Money::from_paise(item.rate_paise),
                item.quantity,
                Money::from_paise(item.discount_paise),
                GstRate::from_bps(item.gst_rate_bps),
            )?;
            receive_item(conn, &item, &amounts).await?;
        }

        sqlx::query("UPDATE purchases SET status = 'received', updated_at = ?2 WHERE id = ?1")
            .bind(purchase_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        let received = fetch_purchase(conn, purchase_id).await?;
        tx.commit().await?;

        info!(purchase_id, "Purchase received");
        Ok(received)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<Purchase>> {
        let purchase = sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(purchase)
    }

    pub async fn items(&self, purchase_id: i64) -> DbResult<Vec<PurchaseItem>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_items(&mut conn, purchase_id).await
    }

    /// Deletes a purchase, its lines and the payments linked to it.
    ///
    /// Stock already received stays: its batches lose the purchase link.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();
        let purchase = fetch_purchase(conn, id).await?;

        let payments = sqlx::query(
            "DELETE FROM transactions WHERE bill_type = 'purchase' AND bill_id = ?1",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        tx.commit().await?;

        info!(
            purchase_id = id,
            reference = %purchase.reference_no,
            payments_removed = payments.rows_affected(),
            "Purchase deleted"
        );
        Ok(())
    }
}

/// Checks a line against the product's tracking mode and returns the
/// cleaned serial list.
fn check_tracking(product: &Product, item: &NewPurchaseItem) -> DbResult<Vec<String>> {
    if !product.is_active {
        return Err(CoreError::InvalidState {
            entity: "Product".to_string(),
            id: product.product_code.clone(),
            status: "inactive".to_string(),
            operation: "purchase".to_string(),
        }
        .into());
    }

    match product.tracking_type {
        TrackingMode::Serial => Ok(validate_serial_numbers(&item.serial_numbers, item.quantity)?),
        TrackingMode::Batch | TrackingMode::Untracked if !item.serial_numbers.is_empty() => {
            Err(CoreError::TrackingMismatch {
                product_code: product.product_code.clone(),
                tracking: product.tracking_type,
                reason: "serial numbers given for a product without serial tracking".to_string(),
            }
            .into())
        }
        _ => Ok(Vec::new()),
    }
}

/// Brings one purchase line into stock.
async fn receive_item(
    conn: &mut SqliteConnection,
    item: &PurchaseItem,
    amounts: &LineAmounts,
) -> DbResult<()> {
    // Re-read: an earlier line of the same bill may have moved this product
    let product = fetch_product(conn, item.product_id).await?;
    let unit_cost = amounts.unit_cost(item.quantity);
    let average = weighted_average_cost(
        product.quantity,
        product.average_purchase_price(),
        item.quantity,
        unit_cost,
    );
    let now = Utc::now();

    match product.tracking_type {
        TrackingMode::Untracked => {
            sqlx::query("UPDATE products SET quantity = quantity + ?2 WHERE id = ?1")
                .bind(product.id)
                .bind(item.quantity)
                .execute(&mut *conn)
                .await?;
        }
        TrackingMode::Batch | TrackingMode::Serial => {
            let batch_uid = item.batch_uid.clone().unwrap_or_else(generate_batch_uid);
            let initial_quantity = if product.tracking_type == TrackingMode::Batch {
                item.quantity
            } else {
                0
            };

            let batch_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO product_batches (
                    product_id, purchase_id, batch_uid, batch_number, expiry_date,
                    mfg_date, mrp_paise, purchase_price_paise, selling_price_paise,
                    quantity, storage_location, is_active, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?12)
                RETURNING id
                "#,
            )
            .bind(product.id)
            .bind(item.purchase_id)
            .bind(&batch_uid)
            .bind(&item.batch_number)
            .bind(item.expiry_date)
            .bind(item.mfg_date)
            .bind(item.mrp_paise)
            .bind(unit_cost.paise())
            .bind(item.selling_price_paise)
            .bind(initial_quantity)
            .bind(&product.storage_location)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("batch_uid", batch_uid.as_str()),
                other => other,
            })?;

            for serial in &item.serial_numbers {
                sqlx::query(
                    r#"
                    INSERT INTO product_serials (
                        product_id, batch_id, serial_number, status, created_at, updated_at
                    )
                    VALUES (?1, ?2, ?3, 'available', ?4, ?4)
                    "#,
                )
                .bind(product.id)
                .bind(batch_id)
                .bind(serial)
                .bind(now)
                .execute(&mut *conn)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::UniqueViolation { .. } => {
                        DbError::duplicate("serial_number", serial.as_str())
                    }
                    other => other,
                })?;
            }

            if product.tracking_type == TrackingMode::Serial {
                refresh_batch_from_serials(conn, batch_id).await?;
            }

            sqlx::query("UPDATE purchase_items SET batch_id = ?2 WHERE id = ?1")
                .bind(&item.id)
                .bind(batch_id)
                .execute(&mut *conn)
                .await?;

            refresh_product_quantity(conn, &product).await?;
        }
    }

    sqlx::query(
        "UPDATE products SET average_purchase_price_paise = ?2, updated_at = ?3 WHERE id = ?1",
    )
    .bind(product.id)
    .bind(average.paise())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(
        product_id = product.id,
        quantity = item.quantity,
        unit_cost = %unit_cost,
        "Purchase line received"
    );
    Ok(())
}

pub(crate) async fn fetch_purchase(conn: &mut SqliteConnection, id: i64) -> DbResult<Purchase> {
    sqlx::query_as::<_, Purchase>("SELECT * FROM purchases WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Purchase", id))
}

async fn fetch_items(conn: &mut SqliteConnection, purchase_id: i64) -> DbResult<Vec<PurchaseItem>> {
    let items = sqlx::query_as::<_, PurchaseItem>(
        "SELECT * FROM purchase_items WHERE purchase_id = ?1 ORDER BY rowid",
    )
    .bind(purchase_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================
