//! # Money Module
//!
//! Provides the `Money` type for handling rupee amounts safely.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  0.1 + 0.2 = 0.30000000000000004                                        │
//! │                                                                         │
//! │  GST returns are filed to the paisa. A ledger that drifts by fractions │
//! │  of a paisa per line never reconciles against the invoices.            │
//! │                                                                         │
//! │  OUR SOLUTION: Integer paise                                            │
//! │    ₹10.00 = 1000 paise, every column in the store is INTEGER paise     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::money::Money;
//!
//! let price = Money::from_paise(1099); // ₹10.99
//! let doubled = price * 2;            // ₹21.98
//! let total = price + Money::from_paise(500); // ₹15.99
//! assert_eq!(total.paise(), 1599);
//! assert_eq!(doubled.paise(), 2198);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::GstRate;

// =============================================================================
// Money Type
// =============================================================================

/// A rupee amount in paise (1/100 rupee).
///
/// Signed so that refunds, credit notes and ledger balances can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ```rust
    /// use stockbook_core::money::Money;
    ///
    /// let price = Money::from_paise(1099);
    /// assert_eq!(price.paise(), 1099);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion (truncated toward zero).
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates GST on this amount, rounding half away from zero.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`, done in i128 so a
    /// large bill cannot overflow.
    ///
    /// ```rust
    /// use stockbook_core::money::Money;
    /// use stockbook_core::types::GstRate;
    ///
    /// let taxable = Money::from_paise(1000); // ₹10.00
    /// let gst = taxable.calculate_tax(GstRate::from_bps(1800));
    /// assert_eq!(gst.paise(), 180);
    /// ```
    pub fn calculate_tax(&self, rate: GstRate) -> Money {
        let raw = self.0 as i128 * rate.bps() as i128;
        let rounded = if raw >= 0 {
            (raw + 5000) / 10000
        } else {
            (raw - 5000) / 10000
        };
        Money::from_paise(rounded as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Divides by a quantity, rounding half up. Returns zero for `qty <= 0`.
    ///
    /// Used for per-unit cost after a line discount.
    pub fn per_unit(&self, qty: i64) -> Money {
        if qty <= 0 {
            return Money::zero();
        }
        let q = qty as i128;
        Money(((self.0 as i128 * 2 + q) / (q * 2)) as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// For logs and debugging; the UI formats with its own locale rules.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paise() {
        let money = Money::from_paise(1099);
        assert_eq!(money.paise(), 1099);
        assert_eq!(money.rupees(), 10);
        assert_eq!(money.paise_part(), 99);
        assert_eq!(Money::from_rupees(25).paise(), 2500);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_paise(1099)), "₹10.99");
        assert_eq!(format!("{}", Money::from_paise(500)), "₹5.00");
        assert_eq!(format!("{}", Money::from_paise(-550)), "-₹5.50");
        assert_eq!(format!("{}", Money::zero()), "₹0.00");
    }

    #[test]
    fn test_gst_rounding() {
        // ₹9.99 at 5% = 49.95 paise → 50
        assert_eq!(
            Money::from_paise(999).calculate_tax(GstRate::from_bps(500)).paise(),
            50
        );
        // ₹10.01 at 12% = 120.12 paise → 120
        assert_eq!(
            Money::from_paise(1001).calculate_tax(GstRate::from_bps(1200)).paise(),
            120
        );
        // Credit note amounts round symmetrically
        assert_eq!(
            Money::from_paise(-999).calculate_tax(GstRate::from_bps(500)).paise(),
            -50
        );
    }

    #[test]
    fn test_per_unit() {
        assert_eq!(Money::from_paise(1000).per_unit(3).paise(), 333);
        assert_eq!(Money::from_paise(1001).per_unit(2).paise(), 501);
        assert_eq!(Money::from_paise(1000).per_unit(0).paise(), 0);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, -50].into_iter().map(Money::from_paise).sum();
        assert_eq!(total.paise(), 300);
    }
}
