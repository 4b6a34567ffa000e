//! # Error Types
//!
//! Domain-specific error types for stockbook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockbook-core errors (this file)                                     │
//! │  ├── CoreError        - Stock / ledger rule violations                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockbook-db errors (separate crate)                                  │
//! │  └── DbError          - Storage failures, wraps CoreError as Domain    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError::Domain → caller          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant here means "rejected before commit". Nothing is clamped.

use thiserror::Error;

use crate::types::{SerialStatus, TrackingMode};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough stock to complete a sale or negative adjustment.
    ///
    /// ## When This Occurs
    /// - Selling more than a batch (or untracked product) holds
    /// - Adjusting a quantity below zero
    /// - Shop has `allow_negative_stock = 0`
    #[error("Insufficient stock for {product_code}: available {available}, requested {requested}")]
    InsufficientStock {
        product_code: String,
        available: i64,
        requested: i64,
    },

    /// Serial status change outside the allowed transitions.
    #[error("Serial {serial_number} cannot move from {from} to {to}")]
    InvalidSerialTransition {
        serial_number: String,
        from: SerialStatus,
        to: SerialStatus,
    },

    /// Serial exists but is not in `available` state.
    ///
    /// ## When This Occurs
    /// - Selling a serial twice
    /// - Selling a defective or in-repair unit
    #[error("Serial {serial_number} is {status} and cannot be sold")]
    SerialNotAvailable {
        serial_number: String,
        status: SerialStatus,
    },

    /// Operation does not fit the product's tracking mode.
    #[error("Product {product_code} is {tracking}-tracked: {reason}")]
    TrackingMismatch {
        product_code: String,
        tracking: TrackingMode,
        reason: String,
    },

    /// Batch belongs to a different product or has been deactivated.
    #[error("Batch {batch_id} is not usable for product {product_code}: {reason}")]
    BatchUnavailable {
        batch_id: i64,
        product_code: String,
        reason: String,
    },

    /// Payments would exceed what the bill is worth.
    #[error("Payment of {amount_paise} paise exceeds outstanding {outstanding_paise} paise on bill {bill_id}")]
    Overpayment {
        bill_id: i64,
        outstanding_paise: i64,
        amount_paise: i64,
    },

    /// Record is in a state that forbids the requested operation.
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidState {
        entity: String,
        id: String,
        status: String,
        operation: String,
    },

    /// A number was requested for a financial year the counters have
    /// already moved past.
    #[error("Financial year {requested} is closed; counters are in {current}")]
    FinancialYearClosed { requested: String, current: String },

    /// Removing this user would leave the shop without an active admin.
    #[error("At least one active admin must remain")]
    LastAdmin,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g. bad date, bad permission list).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value inside one request (e.g. repeated serial).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_code: "IPH-15".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for IPH-15: available 3, requested 5"
        );

        let err = CoreError::SerialNotAvailable {
            serial_number: "356938035643809".to_string(),
            status: SerialStatus::Sold,
        };
        assert_eq!(
            err.to_string(),
            "Serial 356938035643809 is sold and cannot be sold"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "product_code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
