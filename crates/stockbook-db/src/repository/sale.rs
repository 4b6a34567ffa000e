//! # Sale Repository
//!
//! GST sales, quotes and cancellations.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create(is_quote = true)          create(is_quote = false)             │
//! │        │  QT-<uuid>, no stock           │  INV-2026-27/0042             │
//! │        ▼                                │  stock consumed               │
//! │   ┌─────────┐   convert_quote()         ▼                               │
//! │   │  draft  │ ─────────────────────► ┌───────────┐                      │
//! │   └────┬────┘   invoice number,      │ completed │                      │
//! │        │        stock consumed       └─────┬─────┘                      │
//! │        │ cancel()                          │ cancel()                   │
//! │        ▼                                   ▼  stock restored            │
//! │   ┌───────────┐                      ┌───────────┐                      │
//! │   │ cancelled │                      │ cancelled │                      │
//! │   └───────────┘                      └───────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consuming Stock per Line
//! - **none**: product quantity decremented
//! - **batch**: the given batch, or the active batch with the earliest
//!   expiry that covers the whole line (FEFO)
//! - **serial**: one serial per line, `available → sold`
//!
//! Every line of a sale succeeds or the whole sale (and its invoice number)
//! rolls back.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::counter::issue;
use crate::repository::inventory::{
    change_batch_quantity, change_untracked_quantity, fetch_batch, fetch_product, fetch_serial,
    find_serial_by_number, set_serial_status,
};
use crate::repository::party::fetch_party;
use crate::repository::shop::fetch_shop;
use stockbook_core::validation::{
    validate_gst_rate, validate_line_count, validate_price_paise, validate_quantity,
};
use stockbook_core::{
    CoreError, CounterKind, EntityType, GstRate, LineAmounts, Money, PaymentMode, Product,
    ProductBatch, Sale, SaleItem, SaleStatus, SerialStatus, TrackingMode, ValidationError,
};

/// Prefix of the reference given to quotes, which take no invoice number.
pub const QUOTE_REFERENCE_PREFIX: &str = "QT-";

/// Input for a new sale or quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    /// `None` for a walk-in sale.
    pub customer_id: Option<i64>,
    pub sale_date: NaiveDate,
    pub payment_mode: PaymentMode,
    /// Collected at billing time.
    pub paid_amount_paise: i64,
    #[serde(default)]
    pub is_reverse_charge: bool,
    #[serde(default)]
    pub is_ecommerce: bool,
    /// Saved without moving stock or taking an invoice number.
    #[serde(default)]
    pub is_quote: bool,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub items: Vec<NewSaleItem>,
}

impl NewSale {
    /// A walk-in cash sale with nothing collected yet.
    pub fn new(sale_date: NaiveDate, items: Vec<NewSaleItem>) -> Self {
        NewSale {
            customer_id: None,
            sale_date,
            payment_mode: PaymentMode::Cash,
            paid_amount_paise: 0,
            is_reverse_charge: false,
            is_ecommerce: false,
            is_quote: false,
            notes: None,
            created_by: None,
            items,
        }
    }
}

/// One line of a new sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: i64,
    pub quantity: i64,
    /// Unit price before GST.
    pub rate_paise: i64,
    /// Defaults to the product's GST rate.
    pub gst_rate_bps: Option<u32>,
    pub discount_paise: i64,
    /// Batch to sell from. Batch-tracked lines without one use FEFO.
    pub batch_id: Option<i64>,
    /// Required for serial-tracked products (quantity 1 per line).
    pub serial_number: Option<String>,
}

impl NewSaleItem {
    pub fn new(product_id: i64, quantity: i64, rate_paise: i64) -> Self {
        NewSaleItem {
            product_id,
            quantity,
            rate_paise,
            gst_rate_bps: None,
            discount_paise: 0,
            batch_id: None,
            serial_number: None,
        }
    }

    pub fn serial(product_id: i64, serial_number: impl Into<String>, rate_paise: i64) -> Self {
        NewSaleItem {
            serial_number: Some(serial_number.into()),
            ..NewSaleItem::new(product_id, 1, rate_paise)
        }
    }
}

/// A line with its product and amounts resolved.
struct PreparedLine {
    product: Product,
    quantity: i64,
    rate: Money,
    gst_rate: GstRate,
    amounts: LineAmounts,
    batch_id: Option<i64>,
    serial_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    db: Database,
}

impl SaleRepository {
    pub fn new(db: Database) -> Self {
        SaleRepository { db }
    }

    /// Records a sale, or a quote when `is_quote` is set.
    ///
    /// `today` is the wall-clock date used for the invoice number's
    /// financial year.
    ///
    /// ## Errors
    /// - `Domain(InsufficientStock)` when a line cannot be covered
    /// - `Domain(SerialNotAvailable)` for a serial already sold or out of
    ///   service
    /// - `Domain(TrackingMismatch)` for a serial on a non-serial product
    ///   or a serial-tracked line without one
    pub async fn create(&self, sale: NewSale, today: NaiveDate) -> DbResult<Sale> {
        validate_line_count(sale.items.len())?;
        validate_price_paise("paid_amount", sale.paid_amount_paise)?;
        for item in &sale.items {
            validate_quantity(item.quantity)?;
            validate_price_paise("rate", item.rate_paise)?;
            if let Some(rate) = item.gst_rate_bps {
                validate_gst_rate(rate)?;
            }
        }

        debug!(
            customer_id = ?sale.customer_id,
            lines = sale.items.len(),
            is_quote = sale.is_quote,
            "Creating sale"
        );

        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        if let Some(customer_id) = sale.customer_id {
            fetch_party(conn, EntityType::Customer, customer_id).await?;
        }
        let allow_negative = fetch_shop(conn).await?.allow_negative_stock;

        let mut lines = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            lines.push(prepare_line(conn, item).await?);
        }

        let total: Money = lines.iter().map(|l| l.amounts.total).sum();
        let discount: Money = lines.iter().map(|l| l.amounts.discount).sum();
        if sale.paid_amount_paise > total.paise() {
            return Err(ValidationError::OutOfRange {
                field: "paid_amount".to_string(),
                min: 0,
                max: total.paise(),
            }
            .into());
        }

        let (reference, status) = if sale.is_quote {
            (
                format!("{QUOTE_REFERENCE_PREFIX}{}", Uuid::new_v4().simple()),
                SaleStatus::Draft,
            )
        } else {
            let number = issue(conn, CounterKind::SaleInvoice, today).await?;
            (number.reference, SaleStatus::Completed)
        };

        let now = Utc::now();
        let sale_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sales (
                reference_no, customer_id, sale_date, payment_mode, total_amount_paise,
                paid_amount_paise, discount_paise, is_reverse_charge, is_ecommerce,
                is_quote, status, notes, created_by, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            RETURNING id
            "#,
        )
        .bind(&reference)
        .bind(sale.customer_id)
        .bind(sale.sale_date)
        .bind(sale.payment_mode)
        .bind(total.paise())
        .bind(sale.paid_amount_paise)
        .bind(discount.paise())
        .bind(sale.is_reverse_charge)
        .bind(sale.is_ecommerce)
        .bind(sale.is_quote)
        .bind(status)
        .bind(&sale.notes)
        .bind(sale.created_by)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        for mut line in lines {
            if !sale.is_quote {
                let (batch_id, serial_id) = consume_line(
                    conn,
                    &line.product,
                    line.quantity,
                    line.batch_id,
                    line.serial_id,
                    allow_negative,
                )
                .await?;
                line.batch_id = batch_id;
                line.serial_id = serial_id;
            }
            insert_item(conn, sale_id, &line).await?;
        }

        let created = fetch_sale(conn, sale_id).await?;
        tx.commit().await?;

        info!(
            sale_id,
            reference = %created.reference_no,
            total = %total,
            is_quote = created.is_quote,
            "Sale recorded"
        );
        Ok(created)
    }

    /// Turns a quote into an invoice: takes an invoice number and consumes
    /// stock for every line.
    pub async fn convert_quote(&self, sale_id: i64, today: NaiveDate) -> DbResult<Sale> {
        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        let sale = fetch_sale(conn, sale_id).await?;
        if !sale.is_quote || sale.status != SaleStatus::Draft {
            return Err(invalid_state(&sale, "convert to invoice"));
        }
        let allow_negative = fetch_shop(conn).await?.allow_negative_stock;

        for item in fetch_items(conn, sale_id).await? {
            let product = fetch_product(conn, item.product_id).await?;
            ensure_active(&product)?;
            let (batch_id, serial_id) = consume_line(
                conn,
                &product,
                item.quantity,
                item.batch_id,
                item.serial_id,
                allow_negative,
            )
            .await?;

            sqlx::query("UPDATE sale_items SET batch_id = ?2, serial_id = ?3 WHERE id = ?1")
                .bind(item.id)
                .bind(batch_id)
                .bind(serial_id)
                .execute(&mut *conn)
                .await?;
        }

        let number = issue(conn, CounterKind::SaleInvoice, today).await?;
        sqlx::query(
            r#"
            UPDATE sales SET reference_no = ?2, status = 'completed', is_quote = 0, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(sale_id)
        .bind(&number.reference)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        let converted = fetch_sale(conn, sale_id).await?;
        tx.commit().await?;

        info!(
            sale_id,
            quote = %sale.reference_no,
            reference = %converted.reference_no,
            "Quote converted"
        );
        Ok(converted)
    }

    /// Cancels a sale. Completed sales put their stock back: quantities are
    /// restored and serials go `sold → returned → available`.
    ///
    /// Payments recorded against the sale are left as they are.
    pub async fn cancel(&self, sale_id: i64) -> DbResult<Sale> {
        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        let sale = fetch_sale(conn, sale_id).await?;
        match sale.status {
            SaleStatus::Cancelled => return Err(invalid_state(&sale, "cancel")),
            SaleStatus::Draft => {}
            SaleStatus::Completed => {
                for item in fetch_items(conn, sale_id).await? {
                    restock_line(conn, &item).await?;
                }
            }
        }

        sqlx::query("UPDATE sales SET status = 'cancelled', updated_at = ?2 WHERE id = ?1")
            .bind(sale_id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        let cancelled = fetch_sale(conn, sale_id).await?;
        tx.commit().await?;

        info!(sale_id, reference = %cancelled.reference_no, "Sale cancelled");
        Ok(cancelled)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(sale)
    }

    pub async fn items(&self, sale_id: i64) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_items(&mut conn, sale_id).await
    }
}

// =============================================================================
// Line handling
// =============================================================================

/// Resolves a line's product, serial and amounts without moving stock.
async fn prepare_line(conn: &mut SqliteConnection, item: &NewSaleItem) -> DbResult<PreparedLine> {
    let product = fetch_product(conn, item.product_id).await?;
    ensure_active(&product)?;

    let mismatch = |reason: &str| -> DbError {
        CoreError::TrackingMismatch {
            product_code: product.product_code.clone(),
            tracking: product.tracking_type,
            reason: reason.to_string(),
        }
        .into()
    };

    let serial_id = match (product.tracking_type, item.serial_number.as_deref()) {
        (TrackingMode::Serial, Some(number)) => {
            if item.quantity != 1 {
                return Err(mismatch("one serial per line, quantity must be 1"));
            }
            let serial = find_serial_by_number(conn, product.id, number)
                .await?
                .ok_or_else(|| DbError::not_found("Serial", number.trim()))?;
            Some(serial.id)
        }
        (TrackingMode::Serial, None) => return Err(mismatch("serial number required")),
        (_, Some(_)) => return Err(mismatch("product has no serial numbers")),
        (_, None) => None,
    };

    if let Some(batch_id) = item.batch_id {
        if product.tracking_type == TrackingMode::Untracked {
            return Err(mismatch("product has no batches"));
        }
        let batch = fetch_batch(conn, batch_id).await?;
        ensure_batch_of(&product, &batch)?;
    }

    let rate = Money::from_paise(item.rate_paise);
    let gst_rate = GstRate::from_bps(item.gst_rate_bps.unwrap_or(product.gst_rate_bps));
    let amounts = LineAmounts::compute(
        rate,
        item.quantity,
        Money::from_paise(item.discount_paise),
        gst_rate,
    )?;

    Ok(PreparedLine {
        product,
        quantity: item.quantity,
        rate,
        gst_rate,
        amounts,
        batch_id: item.batch_id,
        serial_id,
    })
}

/// Takes one line's stock. Returns the batch and serial actually used.
async fn consume_line(
    conn: &mut SqliteConnection,
    product: &Product,
    quantity: i64,
    batch_id: Option<i64>,
    serial_id: Option<i64>,
    allow_negative: bool,
) -> DbResult<(Option<i64>, Option<i64>)> {
    match product.tracking_type {
        TrackingMode::Untracked => {
            change_untracked_quantity(conn, product, -quantity, allow_negative).await?;
            Ok((None, None))
        }
        TrackingMode::Batch => {
            let batch = match batch_id {
                Some(id) => fetch_batch(conn, id).await?,
                None => pick_batch(conn, product, quantity, allow_negative).await?,
            };
            ensure_batch_of(product, &batch)?;
            if !batch.is_active {
                return Err(CoreError::BatchUnavailable {
                    batch_id: batch.id,
                    product_code: product.product_code.clone(),
                    reason: "batch is inactive".to_string(),
                }
                .into());
            }
            change_batch_quantity(conn, product, &batch, -quantity, allow_negative).await?;
            Ok((Some(batch.id), None))
        }
        TrackingMode::Serial => {
            let serial_id = serial_id.ok_or_else(|| CoreError::TrackingMismatch {
                product_code: product.product_code.clone(),
                tracking: product.tracking_type,
                reason: "serial number required".to_string(),
            })?;
            // Fresh read: an earlier line may have sold the same unit
            let serial = fetch_serial(conn, serial_id).await?;
            if !serial.status.is_sellable() {
                return Err(CoreError::SerialNotAvailable {
                    serial_number: serial.serial_number,
                    status: serial.status,
                }
                .into());
            }
            if let Some(batch_id) = batch_id {
                if batch_id != serial.batch_id {
                    return Err(CoreError::BatchUnavailable {
                        batch_id,
                        product_code: product.product_code.clone(),
                        reason: format!("serial {} is in another batch", serial.serial_number),
                    }
                    .into());
                }
            }
            set_serial_status(conn, &serial, SerialStatus::Sold).await?;
            Ok((Some(serial.batch_id), Some(serial.id)))
        }
    }
}

/// First-expiry-first-out: the active batch expiring soonest that covers
/// the whole line. Undated batches come last.
async fn pick_batch(
    conn: &mut SqliteConnection,
    product: &Product,
    quantity: i64,
    allow_negative: bool,
) -> DbResult<ProductBatch> {
    let covering = sqlx::query_as::<_, ProductBatch>(
        r#"
        SELECT * FROM product_batches
        WHERE product_id = ?1 AND is_active = 1 AND quantity >= ?2
        ORDER BY expiry_date IS NULL, expiry_date, id
        LIMIT 1
        "#,
    )
    .bind(product.id)
    .bind(quantity)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(batch) = covering {
        return Ok(batch);
    }

    if allow_negative {
        let any = sqlx::query_as::<_, ProductBatch>(
            r#"
            SELECT * FROM product_batches
            WHERE product_id = ?1 AND is_active = 1
            ORDER BY expiry_date IS NULL, expiry_date, id
            LIMIT 1
            "#,
        )
        .bind(product.id)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(batch) = any {
            return Ok(batch);
        }
    }

    let largest: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(quantity), 0) FROM product_batches WHERE product_id = ?1 AND is_active = 1",
    )
    .bind(product.id)
    .fetch_one(&mut *conn)
    .await?;

    Err(CoreError::InsufficientStock {
        product_code: product.product_code.clone(),
        available: largest,
        requested: quantity,
    }
    .into())
}

/// Puts a cancelled line's stock back.
async fn restock_line(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    let product = fetch_product(conn, item.product_id).await?;
    match product.tracking_type {
        TrackingMode::Untracked => {
            change_untracked_quantity(conn, &product, item.quantity, true).await?;
        }
        TrackingMode::Batch => match item.batch_id {
            Some(batch_id) => {
                let batch = fetch_batch(conn, batch_id).await?;
                change_batch_quantity(conn, &product, &batch, item.quantity, true).await?;
            }
            None => warn!(
                sale_item = item.id,
                product = %product.product_code,
                "Batch no longer exists, stock not restored"
            ),
        },
        TrackingMode::Serial => match item.serial_id {
            Some(serial_id) => {
                let mut serial = fetch_serial(conn, serial_id).await?;
                let owner = latest_completed_sale_item(conn, serial_id).await?;
                let held = matches!(serial.status, SerialStatus::Sold | SerialStatus::Returned);
                if owner != Some(item.id) || !held {
                    warn!(
                        sale_item = item.id,
                        serial = %serial.serial_number,
                        status = %serial.status,
                        "Serial has moved on since this sale, not restocked"
                    );
                    return Ok(());
                }
                if serial.status == SerialStatus::Sold {
                    serial = set_serial_status(conn, &serial, SerialStatus::Returned).await?;
                }
                set_serial_status(conn, &serial, SerialStatus::Available).await?;
            }
            None => warn!(
                sale_item = item.id,
                product = %product.product_code,
                "Serial no longer exists, stock not restored"
            ),
        },
    }
    Ok(())
}

/// The most recent line of a completed sale that sold `serial_id`.
async fn latest_completed_sale_item(
    conn: &mut SqliteConnection,
    serial_id: i64,
) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar(
        r#"
        SELECT si.id FROM sale_items si
        JOIN sales s ON s.id = si.sale_id
        WHERE si.serial_id = ?1 AND s.status = 'completed'
        ORDER BY si.id DESC
        LIMIT 1
        "#,
    )
    .bind(serial_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

async fn insert_item(conn: &mut SqliteConnection, sale_id: i64, line: &PreparedLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            sale_id, product_id, batch_id, serial_id, quantity, rate_paise,
            gst_rate_bps, discount_paise, taxable_paise, gst_paise, price_paise
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(sale_id)
    .bind(line.product.id)
    .bind(line.batch_id)
    .bind(line.serial_id)
    .bind(line.quantity)
    .bind(line.rate.paise())
    .bind(line.gst_rate.bps())
    .bind(line.amounts.discount.paise())
    .bind(line.amounts.taxable.paise())
    .bind(line.amounts.gst.paise())
    .bind(line.amounts.total.paise())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn ensure_active(product: &Product) -> DbResult<()> {
    if product.is_active {
        return Ok(());
    }
    Err(CoreError::InvalidState {
        entity: "Product".to_string(),
        id: product.product_code.clone(),
        status: "inactive".to_string(),
        operation: "sell".to_string(),
    }
    .into())
}

fn ensure_batch_of(product: &Product, batch: &ProductBatch) -> DbResult<()> {
    if batch.product_id == product.id {
        return Ok(());
    }
    Err(CoreError::BatchUnavailable {
        batch_id: batch.id,
        product_code: product.product_code.clone(),
        reason: "batch belongs to another product".to_string(),
    }
    .into())
}

fn invalid_state(sale: &Sale, operation: &str) -> DbError {
    CoreError::InvalidState {
        entity: "Sale".to_string(),
        id: sale.reference_no.clone(),
        status: sale.status.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

pub(crate) async fn fetch_sale(conn: &mut SqliteConnection, id: i64) -> DbResult<Sale> {
    sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", id))
}

async fn fetch_items(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<SaleItem>> {
    let items =
        sqlx::query_as::<_, SaleItem>("SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY id")
            .bind(sale_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(items)
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
    use crate::repository::shop::ShopSettings;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn untracked(db: &Database, code: &str, stock: i64) -> Product {
        db.products()
            .create(NewProduct {
                opening_quantity: stock,
                gst_rate_bps: 1800,
                ..NewProduct::new(code, code)
            })
            .await
            .unwrap()
    }

    async fn receive(db: &Database, item: NewPurchaseItem) {
        db.purchases()
            .create(NewPurchase::received(today(), vec![item]), today())
            .await
            .unwrap();
    }

    async fn quantity(db: &Database, product_id: i64) -> i64 {
        db.products()
            .get_by_id(product_id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn test_untracked_sale_and_insufficient_stock() {
        let db = setup().await;
        let cable = untracked(&db, "CABLE", 5).await;

        let sale = db
            .sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::new(cable.id, 2, 10_000)]),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(sale.reference_no, "INV-2026-27/0001");
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.total_amount_paise, 23_600);
        assert_eq!(quantity(&db, cable.id).await, 3);

        let err = db
            .sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::new(cable.id, 4, 10_000)]),
                today(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            })
        ));
        assert_eq!(quantity(&db, cable.id).await, 3);
        assert_eq!(
            db.counters().current(CounterKind::SaleInvoice).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_negative_stock_override() {
        let db = setup().await;
        let cable = untracked(&db, "CABLE", 1).await;
        db.shop()
            .update_settings(ShopSettings {
                allow_negative_stock: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        db.sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::new(cable.id, 3, 100)]),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(quantity(&db, cable.id).await, -2);
    }

    #[tokio::test]
    async fn test_fefo_picks_earliest_covering_batch() {
        let db = setup().await;
        let para = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Batch,
                ..NewProduct::new("PARA", "Paracetamol")
            })
            .await
            .unwrap();
        let lot = |number: &str, qty: i64, expiry: Option<NaiveDate>| NewPurchaseItem {
            batch_number: Some(number.to_string()),
            expiry_date: expiry,
            ..NewPurchaseItem::new(para.id, qty, 100)
        };
        receive(&db, lot("UNDATED", 50, None)).await;
        receive(&db, lot("LATE", 20, NaiveDate::from_ymd_opt(2027, 12, 31))).await;
        receive(&db, lot("SOON", 2, NaiveDate::from_ymd_opt(2027, 1, 31))).await;

        // SOON cannot cover 5, LATE can
        let sale = db
            .sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::new(para.id, 5, 200)]),
                today(),
            )
            .await
            .unwrap();
        let items = db.sales().items(sale.id).await.unwrap();
        let used = db
            .inventory()
            .get_batch(items[0].batch_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(used.batch_number.as_deref(), Some("LATE"));
        assert_eq!(used.quantity, 15);
        assert_eq!(quantity(&db, para.id).await, 67);

        // No single batch covers 60
        let err = db
            .sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::new(para.id, 60, 200)]),
                today(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 50, .. })
        ));
    }

    #[tokio::test]
    async fn test_serial_sale_and_double_sell() {
        let db = setup().await;
        let phone = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Serial,
                ..NewProduct::new("IPH-15", "iPhone 15")
            })
            .await
            .unwrap();
        receive(
            &db,
            NewPurchaseItem {
                serial_numbers: vec!["S1".to_string(), "S2".to_string()],
                ..NewPurchaseItem::new(phone.id, 2, 6_000_000)
            },
        )
        .await;

        db.sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::serial(phone.id, "S1", 7_000_000)]),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(quantity(&db, phone.id).await, 1);

        let err = db
            .sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::serial(phone.id, "S1", 7_000_000)]),
                today(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::SerialNotAvailable {
                status: SerialStatus::Sold,
                ..
            })
        ));

        // Same unit twice in one bill
        let err = db
            .sales()
            .create(
                NewSale::new(
                    today(),
                    vec![
                        NewSaleItem::serial(phone.id, "S2", 7_000_000),
                        NewSaleItem::serial(phone.id, "S2", 7_000_000),
                    ],
                ),
                today(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SerialNotAvailable { .. })));
        assert_eq!(quantity(&db, phone.id).await, 1);

        let err = db
            .sales()
            .create(
                NewSale::new(today(), vec![NewSaleItem::new(phone.id, 1, 7_000_000)]),
                today(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::TrackingMismatch { .. })));
    }

    #[tokio::test]
    async fn test_quote_then_convert() {
        let db = setup().await;
        let cable = untracked(&db, "CABLE", 10).await;

        let quote = db
            .sales()
            .create(
                NewSale {
                    is_quote: true,
                    ..NewSale::new(today(), vec![NewSaleItem::new(cable.id, 4, 100)])
                },
                today(),
            )
            .await
            .unwrap();
        assert!(quote.reference_no.starts_with(QUOTE_REFERENCE_PREFIX));
        assert_eq!(quote.status, SaleStatus::Draft);
        assert_eq!(quantity(&db, cable.id).await, 10);
        assert_eq!(
            db.counters().current(CounterKind::SaleInvoice).await.unwrap(),
            0
        );

        let invoice = db.sales().convert_quote(quote.id, today()).await.unwrap();
        assert_eq!(invoice.reference_no, "INV-2026-27/0001");
        assert_eq!(invoice.status, SaleStatus::Completed);
        assert!(!invoice.is_quote);
        assert_eq!(quantity(&db, cable.id).await, 6);

        let err = db.sales().convert_quote(quote.id, today()).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_cancel_restocks_batches_and_serials() {
        let db = setup().await;
        let para = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Batch,
                ..NewProduct::new("PARA", "Paracetamol")
            })
            .await
            .unwrap();
        let phone = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Serial,
                ..NewProduct::new("IPH-15", "iPhone 15")
            })
            .await
            .unwrap();
        receive(&db, NewPurchaseItem::new(para.id, 10, 100)).await;
        receive(
            &db,
            NewPurchaseItem {
                serial_numbers: vec!["S1".to_string()],
                ..NewPurchaseItem::new(phone.id, 1, 6_000_000)
            },
        )
        .await;

        let sale = db
            .sales()
            .create(
                NewSale::new(
                    today(),
                    vec![
                        NewSaleItem::new(para.id, 10, 150),
                        NewSaleItem::serial(phone.id, "S1", 7_000_000),
                    ],
                ),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(quantity(&db, para.id).await, 0);
        assert_eq!(quantity(&db, phone.id).await, 0);

        let cancelled = db.sales().cancel(sale.id).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert_eq!(quantity(&db, para.id).await, 10);
        assert_eq!(quantity(&db, phone.id).await, 1);

        let s1 = db
            .inventory()
            .get_serial_by_number(phone.id, "S1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s1.status, SerialStatus::Available);
        assert!(db.inventory().audit().await.unwrap().is_empty());

        let err = db.sales().cancel(sale.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_cancel_leaves_serial_resold_elsewhere() {
        let db = setup().await;
        let phone = db
            .products()
            .create(NewProduct {
                tracking_type: TrackingMode::Serial,
                ..NewProduct::new("IPH-15", "iPhone 15")
            })
            .await
            .unwrap();
        receive(
            &db,
            NewPurchaseItem {
                serial_numbers: vec!["S1".to_string()],
                ..NewPurchaseItem::new(phone.id, 1, 6_000_000)
            },
        )
        .await;
        let sell = || {
            NewSale::new(today(), vec![NewSaleItem::serial(phone.id, "S1", 7_000_000)])
        };

        let first = db.sales().create(sell(), today()).await.unwrap();
        let s1 = db
            .inventory()
            .get_serial_by_number(phone.id, "S1")
            .await
            .unwrap()
            .unwrap();
        db.inventory()
            .transition_serial(s1.id, SerialStatus::Returned)
            .await
            .unwrap();
        db.inventory()
            .transition_serial(s1.id, SerialStatus::Available)
            .await
            .unwrap();
        let second = db.sales().create(sell(), today()).await.unwrap();
        assert_eq!(quantity(&db, phone.id).await, 0);

        // The unit now belongs to the second sale
        let cancelled = db.sales().cancel(first.id).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        let s1 = db
            .inventory()
            .get_serial_by_number(phone.id, "S1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s1.status, SerialStatus::Sold);
        assert_eq!(quantity(&db, phone.id).await, 0);

        let err = db.sales().create(sell(), today()).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SerialNotAvailable { .. })));

        // Cancelling the current owner does bring it back
        db.sales().cancel(second.id).await.unwrap();
        let s1 = db
            .inventory()
            .get_serial_by_number(phone.id, "S1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s1.status, SerialStatus::Available);
        assert_eq!(quantity(&db, phone.id).await, 1);
        assert!(db.inventory().audit().await.unwrap().is_empty());
    }
}
