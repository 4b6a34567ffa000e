//! # Non-GST Sale Repository
//!
//! Simplified estimates kept in the secondary store (`database_old.db`).
//! Lines carry a free-text product name and move no inventory.
//!
//! ## Two Stores, One Number
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  primary writer gate ──► issue(NonGstSale) → "EST-2026-27/0012"         │
//! │        │                                                                │
//! │        │   secondary writer gate ──► INSERT non_gst_sales + items       │
//! │        │                             COMMIT secondary                   │
//! │        ▼                                                                │
//! │  COMMIT primary                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Gates are always taken primary first. A failed secondary insert rolls
//! the counter back; only a failure of the final primary commit can leave
//! a sale whose number is issued again later.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::counter::issue;
use stockbook_core::validation::{validate_line_count, validate_name, validate_price_paise};
use stockbook_core::{
    CounterKind, GstRate, LineAmounts, Money, NonGstSale, NonGstSaleItem, PaymentMode,
    ValidationError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNonGstSale {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub sale_date: NaiveDate,
    pub payment_mode: PaymentMode,
    pub paid_amount_paise: i64,
    pub notes: Option<String>,
    pub items: Vec<NewNonGstSaleItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNonGstSaleItem {
    pub product_name: String,
    pub quantity: i64,
    pub rate_paise: i64,
    #[serde(default)]
    pub discount_paise: i64,
}

#[derive(Debug, Clone)]
pub struct NonGstSaleRepository {
    primary: Database,
    secondary: Database,
}

impl NonGstSaleRepository {
    pub fn new(primary: Database, secondary: Database) -> Self {
        NonGstSaleRepository { primary, secondary }
    }

    pub async fn create(&self, sale: NewNonGstSale, today: NaiveDate) -> DbResult<NonGstSale> {
        validate_line_count(sale.items.len())?;
        validate_price_paise("paid_amount", sale.paid_amount_paise)?;

        let mut lines = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            validate_name("product_name", &item.product_name)?;
            let amounts = LineAmounts::compute(
                Money::from_paise(item.rate_paise),
                item.quantity,
                Money::from_paise(item.discount_paise),
                GstRate::from_bps(0),
            )?;
            lines.push((item, amounts));
        }

        let total: Money = lines.iter().map(|(_, a)| a.total).sum();
        let discount: Money = lines.iter().map(|(_, a)| a.discount).sum();
        if sale.paid_amount_paise > total.paise() {
            return Err(ValidationError::OutOfRange {
                field: "paid_amount".to_string(),
                min: 0,
                max: total.paise(),
            }
            .into());
        }

        debug!(lines = lines.len(), total = %total, "Creating non-GST sale");

        let mut primary_tx = self.primary.begin_write().await?;
        let number = issue(primary_tx.conn(), CounterKind::NonGstSale, today).await?;

        let mut tx = self.secondary.begin_write().await?;
        let conn = tx.conn();
        let created = sqlx::query_as::<_, NonGstSale>(
            r#"
            INSERT INTO non_gst_sales (
                reference_no, customer_name, customer_phone, sale_date, payment_mode,
                total_amount_paise, paid_amount_paise, discount_paise, notes, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING *
            "#,
        )
        .bind(&number.reference)
        .bind(&sale.customer_name)
        .bind(&sale.customer_phone)
        .bind(sale.sale_date)
        .bind(sale.payment_mode)
        .bind(total.paise())
        .bind(sale.paid_amount_paise)
        .bind(discount.paise())
        .bind(&sale.notes)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("reference_no", &number.reference),
            other => other,
        })?;

        for (item, amounts) in &lines {
            sqlx::query(
                r#"
                INSERT INTO non_gst_sale_items (
                    sale_id, product_name, quantity, rate_paise, discount_paise, price_paise
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(created.id)
            .bind(item.product_name.trim())
            .bind(item.quantity)
            .bind(item.rate_paise)
            .bind(amounts.discount.paise())
            .bind(amounts.total.paise())
            .execute(&mut *conn)
            .await?;
        }

        tx.commit().await?;
        primary_tx.commit().await?;

        info!(id = created.id, reference = %created.reference_no, "Non-GST sale recorded");
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<NonGstSale>> {
        let sale = sqlx::query_as::<_, NonGstSale>("SELECT * FROM non_gst_sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.secondary.pool())
            .await?;
        Ok(sale)
    }

    pub async fn items(&self, sale_id: i64) -> DbResult<Vec<NonGstSaleItem>> {
        let items = sqlx::query_as::<_, NonGstSaleItem>(
            "SELECT * FROM non_gst_sale_items WHERE sale_id = ?1 ORDER BY id",
        )
        .bind(sale_id)
        .fetch_all(self.secondary.pool())
        .await?;
        Ok(items)
    }

    /// Sales dated within `[from, to]`, oldest first.
    pub async fn list_between(&self, from: NaiveDate, to: NaiveDate) -> DbResult<Vec<NonGstSale>> {
        let sales = sqlx::query_as::<_, NonGstSale>(
            r#"
            SELECT * FROM non_gst_sales
            WHERE sale_date BETWEEN ?1 AND ?2
            ORDER BY sale_date, id
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.secondary.pool())
        .await?;
        Ok(sales)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::Schema;
    use crate::pool::DbConfig;

    async fn repo() -> (Database, NonGstSaleRepository) {
        let primary = Database::new(DbConfig::in_memory()).await.unwrap();
        let secondary = Database::new(DbConfig::in_memory().schema(Schema::Secondary))
            .await
            .unwrap();
        (primary.clone(), NonGstSaleRepository::new(primary, secondary))
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn estimate(d: u32, items: Vec<NewNonGstSaleItem>) -> NewNonGstSale {
        NewNonGstSale {
            customer_name: Some("Walk-in".to_string()),
            customer_phone: None,
            sale_date: day(d),
            payment_mode: PaymentMode::Cash,
            paid_amount_paise: 0,
            notes: None,
            items,
        }
    }

    fn line(name: &str, quantity: i64, rate_paise: i64, discount_paise: i64) -> NewNonGstSaleItem {
        NewNonGstSaleItem {
            product_name: name.to_string(),
            quantity,
            rate_paise,
            discount_paise,
        }
    }

    #[tokio::test]
    async fn test_create_uses_primary_counter() {
        let (primary, repo) = repo().await;

        let sale = repo
            .create(
                estimate(
                    5,
                    vec![line("Charger", 2, 50_000, 10_000), line("Cover", 1, 20_000, 0)],
                ),
                day(5),
            )
            .await
            .unwrap();
        assert_eq!(sale.reference_no, "EST-2026-27/0001");
        assert_eq!(sale.total_amount_paise, 110_000);
        assert_eq!(sale.discount_paise, 10_000);

        let items = repo.items(sale.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price_paise, 90_000);

        assert_eq!(
            primary.counters().current(CounterKind::NonGstSale).await.unwrap(),
            1
        );
        assert_eq!(
            primary.counters().current(CounterKind::SaleInvoice).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_rejected_sale_takes_no_number() {
        let (primary, repo) = repo().await;

        let err = repo
            .create(
                NewNonGstSale {
                    paid_amount_paise: 99_999,
                    ..estimate(5, vec![line("Cable", 1, 100, 0)])
                },
                day(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));

        let err = repo
            .create(estimate(5, vec![line("Cable", 1, 100, 500)]), day(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));

        assert_eq!(
            primary.counters().current(CounterKind::NonGstSale).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_list_between() {
        let (_, repo) = repo().await;
        for d in [3, 9, 20] {
            repo.create(estimate(d, vec![line("Cable", 1, 100, 0)]), day(d))
                .await
                .unwrap();
        }

        let sales = repo.list_between(day(1), day(10)).await.unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].sale_date, day(3));
        assert!(repo.list_between(day(21), day(31)).await.unwrap().is_empty());
    }
}
