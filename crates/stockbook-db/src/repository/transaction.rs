//! # Transaction Repository
//!
//! Payments, refunds and credit/debit notes, plus the party ledger built
//! from them.
//!
//! ## Bill Balance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sale INV-2026-27/0007: total ₹1,000, paid at billing ₹200              │
//! │                                                                         │
//! │   payment_in  PI-2026-27/0003   ₹300   →  outstanding ₹500              │
//! │   refund      PO-2026-27/0001    ₹50   →  outstanding ₹550              │
//! │   payment_in  ₹600                     →  Overpayment (550 < 600)       │
//! │                                                                         │
//! │  outstanding = total − paid + Σ effect(completed linked transactions)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bill's own `paid_amount` is never rewritten; settlements after
//! billing live only here. Cancelled transactions drop out of every
//! balance but keep their reference number.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::counter::issue;
use crate::repository::party::fetch_party;
use crate::repository::purchase::fetch_purchase;
use crate::repository::sale::fetch_sale;
use stockbook_core::ledger::transaction_effect;
use stockbook_core::validation::validate_payment_amount;
use stockbook_core::{
    BillType, CoreError, CounterKind, EntityType, LedgerEvent, LedgerStatement, LedgerTransaction,
    Money, PaymentMode, SaleStatus, TransactionStatus, TransactionType, ValidationError,
};

/// Input for a new ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    /// Bill the transaction settles; set together with `bill_type`.
    pub bill_id: Option<i64>,
    pub bill_type: Option<BillType>,
    pub entity_id: i64,
    pub entity_type: EntityType,
    pub transaction_date: NaiveDate,
    pub amount_paise: i64,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub gst_paise: i64,
    #[serde(default)]
    pub discount_paise: i64,
    pub notes: Option<String>,
    /// Accept a settlement larger than the bill's outstanding amount.
    #[serde(default)]
    pub allow_overpayment: bool,
}

impl NewTransaction {
    /// An unlinked cash transaction.
    pub fn new(
        transaction_type: TransactionType,
        entity_type: EntityType,
        entity_id: i64,
        amount_paise: i64,
        transaction_date: NaiveDate,
    ) -> Self {
        NewTransaction {
            transaction_type,
            bill_id: None,
            bill_type: None,
            entity_id,
            entity_type,
            transaction_date,
            amount_paise,
            payment_mode: PaymentMode::Cash,
            gst_paise: 0,
            discount_paise: 0,
            notes: None,
            allow_overpayment: false,
        }
    }

    /// Links the transaction to one of the party's bills.
    pub fn against_bill(mut self, bill_id: i64) -> Self {
        self.bill_id = Some(bill_id);
        self.bill_type = Some(self.entity_type.bill_type());
        self
    }
}

/// Where a bill stands after billing-time payment and later transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillBalance {
    pub bill_type: BillType,
    pub bill_id: i64,
    pub total: Money,
    pub paid_at_billing: Money,
    /// Net amount settled by linked transactions (refunds count negative).
    pub settled: Money,
    pub outstanding: Money,
}

/// The parts of a bill that matter for settlement.
struct BillSummary {
    bill_type: BillType,
    bill_id: i64,
    party_id: Option<i64>,
    total: Money,
    paid: Money,
}

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    db: Database,
}

impl TransactionRepository {
    pub fn new(db: Database) -> Self {
        TransactionRepository { db }
    }

    /// Records a transaction and gives it a reference number from the
    /// counter matching its direction.
    ///
    /// ## Errors
    /// - `Domain(Overpayment)` when a settlement exceeds the bill's
    ///   outstanding amount and `allow_overpayment` is not set
    /// - `Domain(InvalidState)` for a draft or cancelled sale
    /// - `Domain(Validation)` for a bill that belongs to another party
    pub async fn record(&self, txn: NewTransaction, today: NaiveDate) -> DbResult<LedgerTransaction> {
        validate_payment_amount(txn.amount_paise)?;
        if txn.bill_id.is_some() != txn.bill_type.is_some() {
            return Err(invalid("bill_id", "bill_id and bill_type must be given together"));
        }

        debug!(
            transaction_type = %txn.transaction_type,
            entity = %txn.entity_type,
            entity_id = txn.entity_id,
            bill_id = ?txn.bill_id,
            amount = txn.amount_paise,
            "Recording transaction"
        );

        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        fetch_party(conn, txn.entity_type, txn.entity_id).await?;

        if let (Some(bill_id), Some(bill_type)) = (txn.bill_id, txn.bill_type) {
            if bill_type != txn.entity_type.bill_type() {
                return Err(invalid(
                    "bill_type",
                    &format!("a {} cannot settle a {} bill", txn.entity_type, bill_type),
                ));
            }

            let bill = load_bill(conn, bill_type, bill_id).await?;
            if bill.party_id != Some(txn.entity_id) {
                return Err(invalid("bill_id", "bill belongs to another party"));
            }

            let amount = Money::from_paise(txn.amount_paise);
            let effect = transaction_effect(txn.entity_type, txn.transaction_type, amount);
            if effect.is_negative() && !txn.allow_overpayment {
                let outstanding = bill_balance(conn, &bill, txn.entity_type).await?.outstanding;
                if amount > outstanding {
                    return Err(CoreError::Overpayment {
                        bill_id,
                        outstanding_paise: outstanding.paise(),
                        amount_paise: txn.amount_paise,
                    }
                    .into());
                }
            }
        }

        let kind = counter_for(txn.entity_type, txn.transaction_type);
        let number = issue(conn, kind, today).await?;

        let recorded = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO transactions (
                reference_no, transaction_type, bill_id, bill_type, entity_id, entity_type,
                transaction_date, amount_paise, payment_mode, status, gst_paise,
                discount_paise, notes, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'completed', ?10, ?11, ?12, ?13)
            RETURNING *
            "#,
        )
        .bind(&number.reference)
        .bind(txn.transaction_type)
        .bind(txn.bill_id)
        .bind(txn.bill_type)
        .bind(txn.entity_id)
        .bind(txn.entity_type)
        .bind(txn.transaction_date)
        .bind(txn.amount_paise)
        .bind(txn.payment_mode)
        .bind(txn.gst_paise)
        .bind(txn.discount_paise)
        .bind(&txn.notes)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        tx.commit().await?;

        info!(
            id = recorded.id,
            reference = %recorded.reference_no,
            amount = %recorded.amount(),
            "Transaction recorded"
        );
        Ok(recorded)
    }

    /// Marks a transaction cancelled. It stays in the table (its reference
    /// number is spent) but no longer counts toward any balance.
    pub async fn cancel(&self, id: i64) -> DbResult<LedgerTransaction> {
        let mut tx = self.db.begin_write().await?;
        let conn = tx.conn();

        let current = fetch_transaction(conn, id).await?;
        if current.status != TransactionStatus::Completed {
            return Err(CoreError::InvalidState {
                entity: "Transaction".to_string(),
                id: current.reference_no,
                status: current.status.to_string(),
                operation: "cancel".to_string(),
            }
            .into());
        }

        let cancelled = sqlx::query_as::<_, LedgerTransaction>(
            "UPDATE transactions SET status = 'cancelled' WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        tx.commit().await?;

        info!(id, reference = %cancelled.reference_no, "Transaction cancelled");
        Ok(cancelled)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<LedgerTransaction>> {
        let txn = sqlx::query_as::<_, LedgerTransaction>("SELECT * FROM transactions WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(txn)
    }

    /// Every transaction linked to a bill, cancelled ones included.
    pub async fn for_bill(&self, bill_type: BillType, bill_id: i64) -> DbResult<Vec<LedgerTransaction>> {
        let txns = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT * FROM transactions
            WHERE bill_type = ?1 AND bill_id = ?2
            ORDER BY transaction_date, created_at, id
            "#,
        )
        .bind(bill_type)
        .bind(bill_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(txns)
    }

    pub async fn bill_balance(&self, bill_type: BillType, bill_id: i64) -> DbResult<BillBalance> {
        let mut conn = self.db.pool().acquire().await?;
        let bill = load_bill(&mut conn, bill_type, bill_id).await?;
        let entity_type = match bill_type {
            BillType::Sale => EntityType::Customer,
            BillType::Purchase => EntityType::Supplier,
        };
        bill_balance(&mut conn, &bill, entity_type).await
    }

    /// Statement for a customer or supplier over `[from, to]`.
    ///
    /// Reads run in one transaction so bills and payments come from the
    /// same snapshot.
    pub async fn ledger(
        &self,
        entity_type: EntityType,
        entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<LedgerStatement> {
        if from > to {
            return Err(invalid("from", "start date is after end date"));
        }

        let mut tx = self.db.pool().begin().await?;
        let party = fetch_party(&mut tx, entity_type, entity_id).await?;

        let bill_sql = match entity_type {
            EntityType::Customer => {
                r#"
                SELECT id, reference_no, sale_date, created_at, total_amount_paise, paid_amount_paise
                FROM sales
                WHERE customer_id = ?1 AND status = 'completed' AND sale_date <= ?2
                "#
            }
            EntityType::Supplier => {
                r#"
                SELECT id, reference_no, purchase_date, created_at, total_amount_paise, paid_amount_paise
                FROM purchases
                WHERE supplier_id = ?1 AND purchase_date <= ?2
                "#
            }
        };
        let bills: Vec<(i64, String, NaiveDate, DateTime<Utc>, i64, i64)> =
            sqlx::query_as(bill_sql)
                .bind(entity_id)
                .bind(to)
                .fetch_all(&mut *tx)
                .await?;

        let txns = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT * FROM transactions
            WHERE entity_type = ?1 AND entity_id = ?2
              AND status = 'completed' AND transaction_date <= ?3
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(to)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut events = Vec::with_capacity(bills.len() + txns.len());
        events.extend(bills.into_iter().map(
            |(id, reference_no, date, created_at, total, paid)| LedgerEvent::Bill {
                id,
                reference_no,
                date,
                created_at,
                total: Money::from_paise(total),
                paid: Money::from_paise(paid),
            },
        ));
        events.extend(txns.into_iter().map(|t| LedgerEvent::Transaction {
            id: t.id,
            amount: t.amount(),
            reference_no: t.reference_no,
            date: t.transaction_date,
            created_at: t.created_at,
            transaction_type: t.transaction_type,
        }));

        Ok(LedgerStatement::build(
            entity_type,
            entity_id,
            Money::from_paise(party.opening_balance_paise),
            events,
            from,
            to,
        ))
    }
}

/// Counter that numbers a transaction. Refunds run against the direction
/// of the party's normal payments.
fn counter_for(entity_type: EntityType, transaction_type: TransactionType) -> CounterKind {
    match (transaction_type, entity_type) {
        (TransactionType::PaymentIn, _) => CounterKind::PaymentIn,
        (TransactionType::PaymentOut, _) => CounterKind::PaymentOut,
        (TransactionType::CreditNote, _) => CounterKind::CreditNote,
        (TransactionType::DebitNote, _) => CounterKind::DebitNote,
        (TransactionType::Refund, EntityType::Customer) => CounterKind::PaymentOut,
        (TransactionType::Refund, EntityType::Supplier) => CounterKind::PaymentIn,
    }
}

async fn load_bill(conn: &mut SqliteConnection, bill_type: BillType, bill_id: i64) -> DbResult<BillSummary> {
    match bill_type {
        BillType::Sale => {
            let sale = fetch_sale(conn, bill_id).await?;
            if sale.status != SaleStatus::Completed {
                return Err(CoreError::InvalidState {
                    entity: "Sale".to_string(),
                    id: sale.reference_no,
                    status: sale.status.to_string(),
                    operation: "settle".to_string(),
                }
                .into());
            }
            Ok(BillSummary {
                bill_type,
                bill_id,
                party_id: sale.customer_id,
                total: sale.total_amount(),
                paid: sale.paid_amount(),
            })
        }
        BillType::Purchase => {
            let purchase = fetch_purchase(conn, bill_id).await?;
            Ok(BillSummary {
                bill_type,
                bill_id,
                party_id: purchase.supplier_id,
                total: Money::from_paise(purchase.total_amount_paise),
                paid: Money::from_paise(purchase.paid_amount_paise),
            })
        }
    }
}

async fn bill_balance(
    conn: &mut SqliteConnection,
    bill: &BillSummary,
    entity_type: EntityType,
) -> DbResult<BillBalance> {
    let linked: Vec<(TransactionType, i64)> = sqlx::query_as(
        r#"
        SELECT transaction_type, amount_paise FROM transactions
        WHERE bill_type = ?1 AND bill_id = ?2 AND status = 'completed'
        "#,
    )
    .bind(bill.bill_type)
    .bind(bill.bill_id)
    .fetch_all(&mut *conn)
    .await?;

    let effect: Money = linked
        .into_iter()
        .map(|(kind, paise)| transaction_effect(entity_type, kind, Money::from_paise(paise)))
        .sum();

    Ok(BillBalance {
        bill_type: bill.bill_type,
        bill_id: bill.bill_id,
        total: bill.total,
        paid_at_billing: bill.paid,
        settled: -effect,
        outstanding: bill.total - bill.paid + effect,
    })
}

async fn fetch_transaction(conn: &mut SqliteConnection, id: i64) -> DbResult<LedgerTransaction> {
    sqlx::query_as::<_, LedgerTransaction>("SELECT * FROM transactions WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Transaction", id))
}

fn invalid(field: &str, reason: &str) -> DbError {
    ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::party::NewParty;
    use crate::repository::product::NewProduct;
    use crate::repository::sale::{NewSale, NewSaleItem};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    /// A customer with one ₹1,000 credit sale (no GST), ₹200 paid at billing.
    async fn credit_sale(db: &Database) -> (i64, i64) {
        let customer = db.customers().create(NewParty::named("Ravi")).await.unwrap();
        let bag = db
            .products()
            .create(NewProduct {
                opening_quantity: 10,
                ..NewProduct::new("BAG", "Bag")
            })
            .await
            .unwrap();
        let sale = db
            .sales()
            .create(
                NewSale {
                    customer_id: Some(customer.id),
                    payment_mode: PaymentMode::Credit,
                    paid_amount_paise: 20_000,
                    ..NewSale::new(day(1), vec![NewSaleItem::new(bag.id, 10, 10_000)])
                },
                day(1),
            )
            .await
            .unwrap();
        (customer.id, sale.id)
    }

    fn payment(customer_id: i64, sale_id: i64, paise: i64, d: u32) -> NewTransaction {
        NewTransaction::new(
            TransactionType::PaymentIn,
            EntityType::Customer,
            customer_id,
            paise,
            day(d),
        )
        .against_bill(sale_id)
    }

    #[test]
    fn test_refund_counter_runs_against_payments() {
        assert_eq!(
            counter_for(EntityType::Customer, TransactionType::Refund),
            CounterKind::PaymentOut
        );
        assert_eq!(
            counter_for(EntityType::Supplier, TransactionType::Refund),
            CounterKind::PaymentIn
        );
        assert_eq!(
            counter_for(EntityType::Supplier, TransactionType::DebitNote),
            CounterKind::DebitNote
        );
    }

    #[tokio::test]
    async fn test_payments_settle_bill() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (customer_id, sale_id) = credit_sale(&db).await;
        let txns = db.transactions();

        let first = txns.record(payment(customer_id, sale_id, 30_000, 2), day(2)).await.unwrap();
        assert_eq!(first.reference_no, "PI-2026-27/0001");
        assert_eq!(first.bill_type, Some(BillType::Sale));

        let refund = NewTransaction::new(
            TransactionType::Refund,
            EntityType::Customer,
            customer_id,
            5_000,
            day(3),
        )
        .against_bill(sale_id);
        let refund = txns.record(refund, day(3)).await.unwrap();
        assert_eq!(refund.reference_no, "PO-2026-27/0001");

        let balance = txns.bill_balance(BillType::Sale, sale_id).await.unwrap();
        assert_eq!(balance.total, Money::from_paise(100_000));
        assert_eq!(balance.paid_at_billing, Money::from_paise(20_000));
        assert_eq!(balance.settled, Money::from_paise(25_000));
        assert_eq!(balance.outstanding, Money::from_paise(55_000));

        let err = txns
            .record(payment(customer_id, sale_id, 60_000, 4), day(4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Overpayment {
                outstanding_paise: 55_000,
                amount_paise: 60_000,
                ..
            })
        ));

        // Paying exactly the outstanding amount is fine
        txns.record(payment(customer_id, sale_id, 55_000, 4), day(4)).await.unwrap();
        let balance = txns.bill_balance(BillType::Sale, sale_id).await.unwrap();
        assert!(balance.outstanding.is_zero());

        // The bill row itself is untouched
        let sale = db.sales().get(sale_id).await.unwrap().unwrap();
        assert_eq!(sale.paid_amount_paise, 20_000);
    }

    #[tokio::test]
    async fn test_overpayment_override_and_cancel() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (customer_id, sale_id) = credit_sale(&db).await;
        let txns = db.transactions();

        let over = NewTransaction {
            allow_overpayment: true,
            ..payment(customer_id, sale_id, 90_000, 2)
        };
        let over = txns.record(over, day(2)).await.unwrap();
        let balance = txns.bill_balance(BillType::Sale, sale_id).await.unwrap();
        assert_eq!(balance.outstanding, Money::from_paise(-10_000));

        let cancelled = txns.cancel(over.id).await.unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        let balance = txns.bill_balance(BillType::Sale, sale_id).await.unwrap();
        assert_eq!(balance.outstanding, Money::from_paise(80_000));
        assert_eq!(txns.for_bill(BillType::Sale, sale_id).await.unwrap().len(), 1);

        let err = txns.cancel(over.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_bill_must_match_party() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (_, sale_id) = credit_sale(&db).await;
        let other = db.customers().create(NewParty::named("Meera")).await.unwrap();
        let supplier = db.suppliers().create(NewParty::named("Wholesale")).await.unwrap();
        let txns = db.transactions();

        let err = txns
            .record(payment(other.id, sale_id, 1_000, 2), day(2))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let wrong_side = NewTransaction {
            bill_id: Some(sale_id),
            bill_type: Some(BillType::Sale),
            ..NewTransaction::new(
                TransactionType::PaymentOut,
                EntityType::Supplier,
                supplier.id,
                1_000,
                day(2),
            )
        };
        let err = txns.record(wrong_side, day(2)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let half_linked = NewTransaction {
            bill_id: Some(sale_id),
            ..NewTransaction::new(
                TransactionType::PaymentIn,
                EntityType::Customer,
                other.id,
                1_000,
                day(2),
            )
        };
        let err = txns.record(half_linked, day(2)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        // Nothing above consumed a reference number
        assert_eq!(db.counters().current(CounterKind::PaymentIn).await.unwrap(), 0);
        assert_eq!(db.counters().current(CounterKind::PaymentOut).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_customer_ledger() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let customer = db
            .customers()
            .create(NewParty {
                opening_balance_paise: 5_000,
                ..NewParty::named("Ravi")
            })
            .await
            .unwrap();
        let bag = db
            .products()
            .create(NewProduct {
                opening_quantity: 10,
                ..NewProduct::new("BAG", "Bag")
            })
            .await
            .unwrap();
        let sale = db
            .sales()
            .create(
                NewSale {
                    customer_id: Some(customer.id),
                    paid_amount_paise: 20_000,
                    ..NewSale::new(day(1), vec![NewSaleItem::new(bag.id, 10, 10_000)])
                },
                day(1),
            )
            .await
            .unwrap();
        let txns = db.transactions();
        txns.record(payment(customer.id, sale.id, 30_000, 5), day(5)).await.unwrap();
        txns.record(payment(customer.id, sale.id, 10_000, 12), day(12)).await.unwrap();

        let statement = txns
            .ledger(EntityType::Customer, customer.id, day(3), day(10))
            .await
            .unwrap();
        // 50 carried in + 800 from the bill before the range
        assert_eq!(statement.opening_balance, Money::from_paise(85_000));
        assert_eq!(statement.rows.len(), 1);
        assert_eq!(statement.rows[0].balance, Money::from_paise(55_000));
        assert_eq!(statement.closing_balance, Money::from_paise(55_000));

        let again = txns
            .ledger(EntityType::Customer, customer.id, day(3), day(10))
            .await
            .unwrap();
        assert_eq!(statement, again);

        let err = txns
            .ledger(EntityType::Customer, customer.id, day(10), day(3))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }
}
