//! # Financial Years and Reference Numbers
//!
//! Counters on the shop row restart every financial year. This module
//! decides which year a date falls in and how a counter value becomes a
//! printed reference.
//!
//! ## Rollover
//! ```text
//! financial_year_start = "04-01"
//!
//!   2026-03-31 ──► FY 2025-26
//!   2026-04-01 ──► FY 2026-27   ← first counter use here resets counters
//!
//! Evaluated lazily: the store compares the requested FY with the
//! shop's last_reset_fy on every counter request. Only a later year resets;
//! an earlier one is refused.
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::Shop;

// =============================================================================
// Financial year start
// =============================================================================

/// Month and day the financial year begins on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinancialYearStart {
    month: u32,
    day: u32,
}

impl Default for FinancialYearStart {
    /// Indian financial year: 1 April.
    fn default() -> Self {
        FinancialYearStart { month: 4, day: 1 }
    }
}

impl FinancialYearStart {
    pub fn new(month: u32, day: u32) -> Result<Self, ValidationError> {
        // 2000 is a leap year, so 02-29 is accepted
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(ValidationError::InvalidFormat {
                field: "financial_year_start".to_string(),
                reason: format!("{month:02}-{day:02} is not a calendar day"),
            });
        }
        Ok(FinancialYearStart { month, day })
    }

    /// Parses `MM-DD`, or a full `YYYY-MM-DD` whose year is ignored.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFormat {
            field: "financial_year_start".to_string(),
            reason: format!("expected MM-DD, got '{raw}'"),
        };

        let parts: Vec<&str> = raw.trim().split('-').collect();
        let (month, day) = match parts.as_slice() {
            [m, d] => (*m, *d),
            [_, m, d] => (*m, *d),
            _ => return Err(invalid()),
        };
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        let day = day.parse::<u32>().map_err(|_| invalid())?;
        Self::new(month, day)
    }

    /// Financial year containing `date`.
    pub fn year_of(&self, date: NaiveDate) -> FinancialYear {
        let on_or_after_start = (date.month(), date.day()) >= (self.month, self.day);
        let start_year = if on_or_after_start {
            date.year()
        } else {
            date.year() - 1
        };
        FinancialYear {
            start_year,
            calendar: self.month == 1 && self.day == 1,
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }
}

impl fmt::Display for FinancialYearStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

// =============================================================================
// Financial year
// =============================================================================

/// One financial year, identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FinancialYear {
    start_year: i32,
    calendar: bool,
}

impl FinancialYear {
    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// Start year encoded in a stored label (`2026-27` or `2026`).
    pub fn start_year_of_label(label: &str) -> Option<i32> {
        let year = label.trim().split('-').next()?;
        if year.len() != 4 {
            return None;
        }
        year.parse().ok()
    }

    /// Label stored in `shop.last_reset_fy` and embedded in references:
    /// `2026-27`, or `2026` when the year starts on 1 January.
    pub fn label(&self) -> String {
        if self.calendar {
            self.start_year.to_string()
        } else {
            format!("{}-{:02}", self.start_year, (self.start_year + 1).rem_euclid(100))
        }
    }
}

impl fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// =============================================================================
// Counters
// =============================================================================

/// One of the shop's reference counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    SaleInvoice,
    PurchaseBill,
    CreditNote,
    DebitNote,
    PaymentIn,
    PaymentOut,
    NonGstSale,
}

impl CounterKind {
    pub const ALL: [CounterKind; 7] = [
        CounterKind::SaleInvoice,
        CounterKind::PurchaseBill,
        CounterKind::CreditNote,
        CounterKind::DebitNote,
        CounterKind::PaymentIn,
        CounterKind::PaymentOut,
        CounterKind::NonGstSale,
    ];

    /// Column on the `shop` row holding this counter.
    pub const fn column(&self) -> &'static str {
        match self {
            CounterKind::SaleInvoice => "sale_invoice_counter",
            CounterKind::PurchaseBill => "purchase_bill_counter",
            CounterKind::CreditNote => "credit_note_counter",
            CounterKind::DebitNote => "debit_note_counter",
            CounterKind::PaymentIn => "payment_in_counter",
            CounterKind::PaymentOut => "payment_out_counter",
            CounterKind::NonGstSale => "non_gst_sale_counter",
        }
    }

    /// The shop's configured prefix for this counter.
    pub fn prefix<'a>(&self, shop: &'a Shop) -> &'a str {
        match self {
            CounterKind::SaleInvoice => &shop.invoice_prefix,
            CounterKind::PurchaseBill => &shop.purchase_prefix,
            CounterKind::CreditNote => &shop.credit_note_prefix,
            CounterKind::DebitNote => &shop.debit_note_prefix,
            CounterKind::PaymentIn => &shop.payment_in_prefix,
            CounterKind::PaymentOut => &shop.payment_out_prefix,
            CounterKind::NonGstSale => &shop.non_gst_prefix,
        }
    }

    /// Current value of this counter on a loaded shop row.
    pub fn value(&self, shop: &Shop) -> i64 {
        match self {
            CounterKind::SaleInvoice => shop.sale_invoice_counter,
            CounterKind::PurchaseBill => shop.purchase_bill_counter,
            CounterKind::CreditNote => shop.credit_note_counter,
            CounterKind::DebitNote => shop.debit_note_counter,
            CounterKind::PaymentIn => shop.payment_in_counter,
            CounterKind::PaymentOut => shop.payment_out_counter,
            CounterKind::NonGstSale => shop.non_gst_sale_counter,
        }
    }
}

/// Digits the counter is padded to in a stored reference.
pub const REFERENCE_PAD_WIDTH: usize = 4;

/// Stored reference: `{prefix}{fy}/{value}` with the value zero-padded.
///
/// The FY label keeps references unique after counters restart.
///
/// ```rust
/// use stockbook_core::fiscal::format_reference;
///
/// assert_eq!(format_reference("INV-", "2026-27", 7), "INV-2026-27/0007");
/// assert_eq!(format_reference("INV-", "2026-27", 12345), "INV-2026-27/12345");
/// ```
pub fn format_reference(prefix: &str, fy_label: &str, value: i64) -> String {
    format!(
        "{prefix}{fy_label}/{value:0width$}",
        width = REFERENCE_PAD_WIDTH
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_start() {
        assert_eq!(FinancialYearStart::parse("04-01").unwrap(), FinancialYearStart::default());
        assert_eq!(
            FinancialYearStart::parse("2024-07-01").unwrap(),
            FinancialYearStart::new(7, 1).unwrap()
        );
        assert!(FinancialYearStart::parse("13-01").is_err());
        assert!(FinancialYearStart::parse("04-31").is_err());
        assert!(FinancialYearStart::parse("April").is_err());
        assert_eq!(FinancialYearStart::new(4, 1).unwrap().to_string(), "04-01");
    }

    #[test]
    fn test_indian_financial_year_boundary() {
        let start = FinancialYearStart::default();
        assert_eq!(start.year_of(date(2026, 3, 31)).label(), "2025-26");
        assert_eq!(start.year_of(date(2026, 4, 1)).label(), "2026-27");
        assert_eq!(start.year_of(date(2026, 12, 31)).label(), "2026-27");
        assert_eq!(start.year_of(date(2099, 5, 1)).label(), "2099-00");
    }

    #[test]
    fn test_calendar_financial_year() {
        let start = FinancialYearStart::new(1, 1).unwrap();
        assert_eq!(start.year_of(date(2026, 1, 1)).label(), "2026");
        assert_eq!(start.year_of(date(2025, 12, 31)).label(), "2025");
    }

    #[test]
    fn test_start_year_of_label() {
        assert_eq!(FinancialYear::start_year_of_label("2026-27"), Some(2026));
        assert_eq!(FinancialYear::start_year_of_label("2026"), Some(2026));
        assert_eq!(FinancialYear::start_year_of_label("26-27"), None);
        assert_eq!(FinancialYear::start_year_of_label(""), None);

        let fy = FinancialYearStart::default().year_of(date(2099, 5, 1));
        assert_eq!(FinancialYear::start_year_of_label(&fy.label()), Some(fy.start_year()));
    }

    #[test]
    fn test_mid_month_start() {
        let start = FinancialYearStart::new(10, 15).unwrap();
        assert_eq!(start.year_of(date(2026, 10, 14)).start_year(), 2025);
        assert_eq!(start.year_of(date(2026, 10, 15)).start_year(), 2026);
    }

    #[test]
    fn test_counter_columns_are_distinct() {
        let mut columns: Vec<_> = CounterKind::ALL.iter().map(|k| k.column()).collect();
        columns.sort();
        columns.dedup();
        assert_eq!(columns.len(), CounterKind::ALL.len());
    }
}
