//! # Counter Repository
//!
//! Issues gap-free, never-duplicated reference numbers per counter, and
//! restarts every counter when the financial year changes.
//!
//! ## Issuing a Number
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              issue(kind, today)  (inside a write transaction)           │
//! │                                                                         │
//! │  1. FY label for `today` from shop.financial_year_start   → "2027-28"  │
//! │                                                                         │
//! │  2. compare with shop.last_reset_fy                                     │
//! │       later year   → UPDATE shop SET <all counters> = 0,               │
//! │                             last_reset_fy = '2027-28'                   │
//! │       same year    → keep counting                                      │
//! │       earlier year → FinancialYearClosed                                │
//! │                                                                         │
//! │  3. UPDATE shop SET <counter> = <counter> + 1 RETURNING <counter>      │
//! │                                                                         │
//! │  4. reference = prefix + FY + "/" + zero-padded value                   │
//! │                 "INV-" "2027-28" "/" "0001"                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because the writer gate serialises write transactions and the number is
//! taken inside the same transaction as the bill insert, a rolled-back bill
//! rolls its number back too: no gaps and no duplicates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::shop::fetch_shop;
use stockbook_core::fiscal::format_reference;
use stockbook_core::{CoreError, CounterKind, FinancialYear, FinancialYearStart};

/// A number taken from a counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedNumber {
    pub kind: CounterKind,
    /// Raw counter value, 1-based within the financial year.
    pub value: i64,
    /// FY label the value belongs to, e.g. `2026-27`.
    pub financial_year: String,
    /// Stored reference, e.g. `INV-2026-27/0001`.
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct CounterRepository {
    db: Database,
}

impl CounterRepository {
    pub fn new(db: Database) -> Self {
        CounterRepository { db }
    }

    /// Takes the next number from `kind` in its own write transaction.
    ///
    /// Bill-creating repositories call [`issue`] inside their own
    /// transaction instead, so the number and the bill commit together.
    pub async fn next(&self, kind: CounterKind, today: NaiveDate) -> DbResult<IssuedNumber> {
        let mut tx = self.db.begin_write().await?;
        let issued = issue(tx.conn(), kind, today).await?;
        tx.commit().await?;
        Ok(issued)
    }

    /// Current value of a counter, without incrementing it.
    pub async fn current(&self, kind: CounterKind) -> DbResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        let shop = fetch_shop(&mut conn).await?;
        Ok(kind.value(&shop))
    }
}

/// Increments `kind` on `conn`, resetting all counters first when `today`
/// falls in a later financial year than the one they were last reset for.
///
/// ## Errors
/// `Domain(FinancialYearClosed)` when `today` belongs to an earlier
/// financial year than the counters: numbers of a closed year are never
/// issued again.
pub(crate) async fn issue(
    conn: &mut SqliteConnection,
    kind: CounterKind,
    today: NaiveDate,
) -> DbResult<IssuedNumber> {
    let shop = fetch_shop(conn).await?;
    let year = FinancialYearStart::parse(&shop.financial_year_start)?.year_of(today);
    let fy = year.label();

    let last_start = shop
        .last_reset_fy
        .as_deref()
        .and_then(FinancialYear::start_year_of_label);

    match last_start {
        Some(last) if year.start_year() < last => {
            return Err(CoreError::FinancialYearClosed {
                requested: fy,
                current: shop.last_reset_fy.clone().unwrap_or_default(),
            }
            .into());
        }
        Some(last) if year.start_year() == last => {}
        _ => {
            sqlx::query(
                r#"
                UPDATE shop SET
                    sale_invoice_counter  = 0,
                    purchase_bill_counter = 0,
                    credit_note_counter   = 0,
                    debit_note_counter    = 0,
                    payment_in_counter    = 0,
                    payment_out_counter   = 0,
                    non_gst_sale_counter  = 0,
                    last_reset_fy         = ?1
                WHERE id = 1
                "#,
            )
            .bind(&fy)
            .execute(&mut *conn)
            .await?;

            info!(
                financial_year = %fy,
                previous = ?shop.last_reset_fy,
                "Counters reset for new financial year"
            );
        }
    }

    let sql = format!(
        "UPDATE shop SET {col} = {col} + 1 WHERE id = 1 RETURNING {col}",
        col = kind.column()
    );
    let value: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *conn).await?;

    let reference = format_reference(kind.prefix(&shop), &fy, value);
    debug!(?kind, value, reference = %reference, "Counter issued");

    Ok(IssuedNumber {
        kind,
        value,
        financial_year: fy,
        reference,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
