//! # Inventory Rules
//!
//! Pure stock rules the store applies inside its write transactions.
//!
//! ## Serial State Machine
//! ```text
//!                 ┌──────────► defective ◄──────────┐
//!                 │                                  │
//!   available ────┼──────────► in_repair             │
//!       ▲         │                                  │
//!       │         └──────────► sold ──────► returned ┘
//!       │                                    │
//!       └──────────── restock ───────────────┘
//! ```
//!
//! Only `available` units are sellable. Anything not drawn above is
//! rejected.

use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{GstRate, SerialStatus};

// =============================================================================
// Serial transitions
// =============================================================================

impl SerialStatus {
    /// Whether `self → next` is one of the allowed edges.
    pub const fn can_transition_to(self, next: SerialStatus) -> bool {
        use SerialStatus::*;
        matches!(
            (self, next),
            (Available, Sold)
                | (Available, Defective)
                | (Available, InRepair)
                | (Sold, Returned)
                | (Returned, Available)
                | (Returned, Defective)
        )
    }

    /// Only available units may appear on a new sale line.
    #[inline]
    pub const fn is_sellable(self) -> bool {
        matches!(self, SerialStatus::Available)
    }

    /// Checks `self → next` and returns `next` when allowed.
    ///
    /// ```rust
    /// use stockbook_core::types::SerialStatus;
    ///
    /// assert!(SerialStatus::Available.transition("A1", SerialStatus::Sold).is_ok());
    /// assert!(SerialStatus::Sold.transition("A1", SerialStatus::Available).is_err());
    /// ```
    pub fn transition(self, serial_number: &str, next: SerialStatus) -> CoreResult<SerialStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidSerialTransition {
                serial_number: serial_number.to_string(),
                from: self,
                to: next,
            })
        }
    }
}

// =============================================================================
// Stock checks
// =============================================================================

/// Rejects a decrement that would take `available` below zero, unless the
/// shop allows negative stock.
pub fn ensure_can_decrement(
    product_code: &str,
    available: i64,
    requested: i64,
    allow_negative: bool,
) -> CoreResult<()> {
    if allow_negative || available >= requested {
        return Ok(());
    }
    Err(CoreError::InsufficientStock {
        product_code: product_code.to_string(),
        available,
        requested,
    })
}

/// New weighted average unit cost after receiving `in_qty` units at
/// `in_unit_cost`.
///
/// Negative on-hand stock (possible with the override) counts as zero so a
/// receipt cannot produce a nonsensical average.
///
/// ```rust
/// use stockbook_core::inventory::weighted_average_cost;
/// use stockbook_core::Money;
///
/// // 10 @ ₹100 on hand, receive 10 @ ₹120 → ₹110
/// let avg = weighted_average_cost(10, Money::from_rupees(100), 10, Money::from_rupees(120));
/// assert_eq!(avg, Money::from_rupees(110));
/// ```
pub fn weighted_average_cost(
    on_hand: i64,
    current_avg: Money,
    in_qty: i64,
    in_unit_cost: Money,
) -> Money {
    let on_hand = on_hand.max(0);
    if in_qty <= 0 {
        return current_avg;
    }
    let total_qty = on_hand + in_qty;
    let total_value = current_avg.multiply_quantity(on_hand) + in_unit_cost.multiply_quantity(in_qty);
    total_value.per_unit(total_qty)
}

/// Internal batch id for a receipt line that did not bring its own.
pub fn generate_batch_uid() -> String {
    format!("B-{}", Uuid::new_v4().simple())
}

// =============================================================================
// Line amounts
// =============================================================================

/// Amounts for one bill line. GST is charged on the discounted value.
///
/// ```text
/// gross    = rate × quantity
/// taxable  = gross − discount
/// gst      = taxable × gst_rate
/// total    = taxable + gst        (stored as the line's price)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub gross: Money,
    pub discount: Money,
    pub taxable: Money,
    pub gst: Money,
    pub total: Money,
}

impl LineAmounts {
    pub fn compute(
        rate: Money,
        quantity: i64,
        discount: Money,
        gst_rate: GstRate,
    ) -> Result<Self, ValidationError> {
        if quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
        if rate.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "rate".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }

        let gross = rate.multiply_quantity(quantity);
        if discount.is_negative() || discount > gross {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: gross.paise(),
            });
        }

        let taxable = gross - discount;
        let gst = taxable.calculate_tax(gst_rate);
        Ok(LineAmounts {
            gross,
            discount,
            taxable,
            gst,
            total: taxable + gst,
        })
    }

    /// Landed cost per unit (taxable value spread over the quantity).
    pub fn unit_cost(&self, quantity: i64) -> Money {
        self.taxable.per_unit(quantity)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
