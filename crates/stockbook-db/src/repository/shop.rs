//! # Shop Repository
//!
//! The `shop` table holds exactly one row (`id = 1`): business details,
//! reference prefixes, the financial-year start, the negative-stock
//! override and the reference counters.
//!
//! Counters are only ever changed through [`counter`](super::counter);
//! [`ShopRepository::update_settings`] never touches them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use stockbook_core::{FinancialYearStart, Shop};

/// Partial update of shop settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopSettings {
    pub shop_name: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub invoice_prefix: Option<String>,
    pub purchase_prefix: Option<String>,
    pub credit_note_prefix: Option<String>,
    pub debit_note_prefix: Option<String>,
    pub payment_in_prefix: Option<String>,
    pub payment_out_prefix: Option<String>,
    pub non_gst_prefix: Option<String>,
    /// `MM-DD`, or a full date whose month and day are used.
    pub financial_year_start: Option<String>,
    pub allow_negative_stock: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ShopRepository {
    db: Database,
}

impl ShopRepository {
    pub fn new(db: Database) -> Self {
        ShopRepository { db }
    }

    /// Reads the shop row.
    pub async fn get(&self) -> DbResult<Shop> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_shop(&mut conn).await
    }

    /// Applies `settings` and returns the updated row.
    ///
    /// The financial-year start is normalised to `MM-DD`. Changing it takes
    /// effect on the next counter use.
    pub async fn update_settings(&self, settings: ShopSettings) -> DbResult<Shop> {
        let fy_start = settings
            .financial_year_start
            .as_deref()
            .map(FinancialYearStart::parse)
            .transpose()?
            .map(|start| start.to_string());

        if let Some(name) = settings.shop_name.as_deref() {
            stockbook_core::validation::validate_name("shop_name", name)?;
        }

        debug!(?settings, "Updating shop settings");

        let mut tx = self.db.begin_write().await?;
        sqlx::query(
            r#"
            UPDATE shop SET
                shop_name            = COALESCE(?1, shop_name),
                gstin                = COALESCE(?2, gstin),
                address              = COALESCE(?3, address),
                state                = COALESCE(?4, state),
                phone                = COALESCE(?5, phone),
                email                = COALESCE(?6, email),
                invoice_prefix       = COALESCE(?7, invoice_prefix),
                purchase_prefix      = COALESCE(?8, purchase_prefix),
                credit_note_prefix   = COALESCE(?9, credit_note_prefix),
                debit_note_prefix    = COALESCE(?10, debit_note_prefix),
                payment_in_prefix    = COALESCE(?11, payment_in_prefix),
                payment_out_prefix   = COALESCE(?12, payment_out_prefix),
                non_gst_prefix       = COALESCE(?13, non_gst_prefix),
                financial_year_start = COALESCE(?14, financial_year_start),
                allow_negative_stock = COALESCE(?15, allow_negative_stock),
                updated_at           = ?16
            WHERE id = 1
            "#,
        )
        .bind(settings.shop_name.as_deref().map(str::trim))
        .bind(&settings.gstin)
        .bind(&settings.address)
        .bind(&settings.state)
        .bind(&settings.phone)
        .bind(&settings.email)
        .bind(&settings.invoice_prefix)
        .bind(&settings.purchase_prefix)
        .bind(&settings.credit_note_prefix)
        .bind(&settings.debit_note_prefix)
        .bind(&settings.payment_in_prefix)
        .bind(&settings.payment_out_prefix)
        .bind(&settings.non_gst_prefix)
        .bind(fy_start)
        .bind(settings.allow_negative_stock)
        .bind(Utc::now())
        .execute(tx.conn())
        .await?;

        let shop = fetch_shop(tx.conn()).await?;
        tx.commit().await?;
        Ok(shop)
    }
}

/// Reads the shop row on `conn`, inside whatever transaction it carries.
pub(crate) async fn fetch_shop(conn: &mut SqliteConnection) -> DbResult<Shop> {
    sqlx::query_as::<_, Shop>("SELECT * FROM shop WHERE id = 1")
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Shop", 1))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_defaults() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shop = db.shop().get().await.unwrap();

        assert_eq!(shop.id, 1);
        assert_eq!(shop.invoice_prefix, "INV-");
        assert_eq!(shop.financial_year_start, "04-01");
        assert!(!shop.allow_negative_stock);
        assert_eq!(shop.sale_invoice_counter, 0);
        assert!(shop.last_reset_fy.is_none());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shop = db
            .shop()
            .update_settings(ShopSettings {
                shop_name: Some("  Sharma Mobiles ".to_string()),
                invoice_prefix: Some("SM/".to_string()),
                financial_year_start: Some("2026-01-01".to_string()),
                allow_negative_stock: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(shop.shop_name, "Sharma Mobiles");
        assert_eq!(shop.invoice_prefix, "SM/");
        assert_eq!(shop.purchase_prefix, "PUR-");
        assert_eq!(shop.financial_year_start, "01-01");
        assert!(shop.allow_negative_stock);
    }

    #[tokio::test]
    async fn test_rejects_bad_financial_year_start() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .shop()
            .update_settings(ShopSettings {
                financial_year_start: Some("13-40".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }
}
