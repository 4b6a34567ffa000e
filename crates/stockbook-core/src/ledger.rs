//! # Party Ledger
//!
//! Builds a customer or supplier statement from bills and transactions.
//!
//! ## Sign Convention
//! ```text
//! balance > 0  →  customer owes the shop / shop owes the supplier
//!
//!                      customer        supplier
//!   bill             + total − paid   + total − paid
//!   payment_in            −                +
//!   payment_out           +                −
//!   refund                +                +
//!   credit_note           −                +
//!   debit_note            +                −
//! ```
//!
//! ## Ordering
//! Rows are sorted by `(date, created_at, bill before transaction, id)`, so
//! the running balance is the same no matter what order the store returned
//! the events in.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::money::Money;
use crate::types::{EntityType, TransactionType};

// =============================================================================
// Events
// =============================================================================

/// Something that moves a party's balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A sale (customer) or purchase (supplier) bill.
    Bill {
        id: i64,
        reference_no: String,
        date: NaiveDate,
        created_at: DateTime<Utc>,
        total: Money,
        /// Settled at bill time.
        paid: Money,
    },
    /// A completed row of the `transactions` table.
    Transaction {
        id: i64,
        reference_no: String,
        date: NaiveDate,
        created_at: DateTime<Utc>,
        transaction_type: TransactionType,
        amount: Money,
    },
}

impl LedgerEvent {
    pub fn date(&self) -> NaiveDate {
        match self {
            LedgerEvent::Bill { date, .. } | LedgerEvent::Transaction { date, .. } => *date,
        }
    }

    /// Signed change to the party's balance.
    pub fn effect(&self, entity_type: EntityType) -> Money {
        match self {
            LedgerEvent::Bill { total, paid, .. } => *total - *paid,
            LedgerEvent::Transaction {
                transaction_type,
                amount,
                ..
            } => transaction_effect(entity_type, *transaction_type, *amount),
        }
    }

    fn sort_key(&self) -> (NaiveDate, DateTime<Utc>, u8, i64) {
        match self {
            LedgerEvent::Bill {
                id, date, created_at, ..
            } => (*date, *created_at, 0, *id),
            LedgerEvent::Transaction {
                id, date, created_at, ..
            } => (*date, *created_at, 1, *id),
        }
    }
}

/// Signed effect of one transaction on a party's balance.
pub fn transaction_effect(
    entity_type: EntityType,
    transaction_type: TransactionType,
    amount: Money,
) -> Money {
    use TransactionType::*;
    let reduces_balance = match entity_type {
        EntityType::Customer => matches!(transaction_type, PaymentIn | CreditNote),
        EntityType::Supplier => matches!(transaction_type, PaymentOut | DebitNote),
    };
    if reduces_balance {
        -amount
    } else {
        amount
    }
}

// =============================================================================
// Statement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerRowKind {
    Bill,
    Transaction,
}

/// One line of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerRow {
    pub kind: LedgerRowKind,
    pub id: i64,
    pub reference_no: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    /// Transaction type for transaction rows.
    pub transaction_type: Option<TransactionType>,
    pub effect: Money,
    /// Balance after this row.
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerStatement {
    pub entity_type: EntityType,
    pub entity_id: i64,
    #[ts(as = "String")]
    pub from: NaiveDate,
    #[ts(as = "String")]
    pub to: NaiveDate,
    pub opening_balance: Money,
    pub rows: Vec<LedgerRow>,
    pub closing_balance: Money,
}

impl LedgerStatement {
    /// Builds a statement for `[from, to]`.
    ///
    /// `carried_in` is the party's opening balance from before the system
    /// was used. Events dated before `from` fold into the opening balance;
    /// events after `to` are ignored.
    pub fn build(
        entity_type: EntityType,
        entity_id: i64,
        carried_in: Money,
        mut events: Vec<LedgerEvent>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Self {
        events.sort_by(compare_events);

        let mut opening_balance = carried_in;
        let mut balance = carried_in;
        let mut rows = Vec::new();

        for event in events {
            let date = event.date();
            if date > to {
                break;
            }
            let effect = event.effect(entity_type);
            balance += effect;
            if date < from {
                opening_balance = balance;
                continue;
            }

            let row = match event {
                LedgerEvent::Bill {
                    id,
                    reference_no,
                    date,
                    ..
                } => LedgerRow {
                    kind: LedgerRowKind::Bill,
                    id,
                    reference_no,
                    date,
                    transaction_type: None,
                    effect,
                    balance,
                },
                LedgerEvent::Transaction {
                    id,
                    reference_no,
                    date,
                    transaction_type,
                    ..
                } => LedgerRow {
                    kind: LedgerRowKind::Transaction,
                    id,
                    reference_no,
                    date,
                    transaction_type: Some(transaction_type),
                    effect,
                    balance,
                },
            };
            rows.push(row);
        }

        LedgerStatement {
            entity_type,
            entity_id,
            from,
            to,
            opening_balance,
            rows,
            closing_balance: balance,
        }
    }
}

fn compare_events(a: &LedgerEvent, b: &LedgerEvent) -> Ordering {
    a.sort_key().cmp(&b.sort_key())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, d, 10, 0, 0).unwrap()
    }

    fn bill(id: i64, d: u32, total: i64, paid: i64) -> LedgerEvent {
        LedgerEvent::Bill {
            id,
            reference_no: format!("INV-{id}"),
            date: day(d),
            created_at: at(d),
            total: Money::from_rupees(total),
            paid: Money::from_rupees(paid),
        }
    }

    fn txn(id: i64, d: u32, kind: TransactionType, amount: i64) -> LedgerEvent {
        LedgerEvent::Transaction {
            id,
            reference_no: format!("PI-{id}"),
            date: day(d),
            created_at: at(d),
            transaction_type: kind,
            amount: Money::from_rupees(amount),
        }
    }

    #[test]
    fn test_transaction_effect_signs() {
        let hundred = Money::from_rupees(100);
        use EntityType::*;
        use TransactionType::*;
        assert_eq!(transaction_effect(Customer, PaymentIn, hundred), -hundred);
        assert_eq!(transaction_effect(Customer, Refund, hundred), hundred);
        assert_eq!(transaction_effect(Customer, CreditNote, hundred), -hundred);
        assert_eq!(transaction_effect(Supplier, PaymentOut, hundred), -hundred);
        assert_eq!(transaction_effect(Supplier, DebitNote, hundred), -hundred);
        assert_eq!(transaction_effect(Supplier, Refund, hundred), hundred);
    }

    #[test]
    fn test_opening_balance_and_running_rows() {
        let events = vec![
            bill(1, 1, 1000, 200),                   // +800, before range
            txn(10, 2, TransactionType::PaymentIn, 300), // −300, before range
            bill(2, 5, 500, 0),                      // +500
            txn(11, 6, TransactionType::PaymentIn, 100), // −100
            bill(3, 20, 999, 0),                     // after range
        ];

        let statement = LedgerStatement::build(
            EntityType::Customer,
            7,
            Money::from_rupees(50),
            events,
            day(3),
            day(10),
        );

        assert_eq!(statement.opening_balance, Money::from_rupees(550));
        assert_eq!(statement.rows.len(), 2);
        assert_eq!(statement.rows[0].balance, Money::from_rupees(1050));
        assert_eq!(statement.rows[1].balance, Money::from_rupees(950));
        assert_eq!(statement.closing_balance, Money::from_rupees(950));
    }

    #[test]
    fn test_order_independent() {
        let events = vec![
            txn(5, 4, TransactionType::PaymentIn, 100),
            bill(2, 4, 300, 0),
            txn(4, 4, TransactionType::Refund, 20),
            bill(1, 4, 200, 50),
        ];
        let mut reversed = events.clone();
        reversed.reverse();

        let a = LedgerStatement::build(EntityType::Customer, 1, Money::zero(), events, day(1), day(30));
        let b = LedgerStatement::build(EntityType::Customer, 1, Money::zero(), reversed, day(1), day(30));
        assert_eq!(a, b);

        // Same timestamp: bills first, then by id
        let ids: Vec<_> = a.rows.iter().map(|r| (r.kind, r.id)).collect();
        assert_eq!(
            ids,
            vec![
                (LedgerRowKind::Bill, 1),
                (LedgerRowKind::Bill, 2),
                (LedgerRowKind::Transaction, 4),
                (LedgerRowKind::Transaction, 5),
            ]
        );
        assert_eq!(a.closing_balance, Money::from_rupees(370));
    }

    #[test]
    fn test_empty_range_keeps_carried_balance() {
        let statement = LedgerStatement::build(
            EntityType::Supplier,
            3,
            Money::from_rupees(-25),
            Vec::new(),
            day(1),
            day(31),
        );
        assert_eq!(statement.opening_balance, Money::from_rupees(-25));
        assert_eq!(statement.closing_balance, Money::from_rupees(-25));
        assert!(statement.rows.is_empty());
    }
}
