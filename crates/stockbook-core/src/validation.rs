//! # Validation Module
//!
//! Input checks run by the store before any write is attempted.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Caller (route / IPC layer)                                   │
//! │  └── Deserialization into typed requests                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repository (Rust)                                            │
//! │  └── THIS MODULE: field rules, serial lists, GST slabs                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── CHECK constraints (status spellings, shop id = 1)                 │
//! │  ├── UNIQUE constraints (codes, references, batch uids, serials)       │
//! │  └── Foreign keys                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::validation::{validate_product_code, validate_quantity};
//!
//! validate_product_code("IPH-15-128").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::GstRate;
use crate::MAX_LINE_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens, underscores, slashes and dots only
///
/// ```rust
/// use stockbook_core::validation::validate_product_code;
///
/// assert!(validate_product_code("SAM-A15/BLK").is_ok());
/// assert!(validate_product_code("").is_err());
/// assert!(validate_product_code("has space").is_err());
/// ```
pub fn validate_product_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "product_code".to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "product_code".to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "product_code".to_string(),
            reason: "must contain only letters, numbers, '-', '_', '/' and '.'".to_string(),
        });
    }

    Ok(())
}

/// Validates a required display name (product, party, category).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// HSN codes are 2, 4, 6 or 8 digits.
pub fn validate_hsn_code(hsn: &str) -> ValidationResult<()> {
    let hsn = hsn.trim();
    if !hsn.chars().all(|c| c.is_ascii_digit()) || ![2, 4, 6, 8].contains(&hsn.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "hsn_code".to_string(),
            reason: "must be 2, 4, 6 or 8 digits".to_string(),
        });
    }
    Ok(())
}

/// Validates a login name: 3-32 characters of letters, digits, `.`, `_`, `-`.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ValidationError::OutOfRange {
            field: "username".to_string(),
            min: 3,
            max: 32,
        });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only letters, numbers, '.', '_' and '-'".to_string(),
        });
    }
    Ok(())
}

pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < 6 {
        return Err(ValidationError::InvalidFormat {
            field: "password".to_string(),
            reason: "must be at least 6 characters".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a bill line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in paise. Zero is allowed (free items).
pub fn validate_price_paise(field: &str, paise: i64) -> ValidationResult<()> {
    if paise < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount in paise. Must be positive.
pub fn validate_payment_amount(paise: i64) -> ValidationResult<()> {
    if paise <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// GST rate must be one of the notified slabs.
///
/// ```rust
/// use stockbook_core::validation::validate_gst_rate;
///
/// assert!(validate_gst_rate(1800).is_ok());
/// assert!(validate_gst_rate(1000).is_err());
/// ```
pub fn validate_gst_rate(bps: u32) -> ValidationResult<()> {
    if !GstRate::SLABS.contains(&bps) {
        return Err(ValidationError::NotAllowed {
            field: "gst_rate".to_string(),
            allowed: GstRate::SLABS.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the serial list of a purchase line.
///
/// ## Rules
/// - One serial per unit (`serials.len() == quantity`)
/// - No blank serials
/// - No serial repeated within the list
///
/// Returns the trimmed serials.
pub fn validate_serial_numbers(serials: &[String], quantity: i64) -> ValidationResult<Vec<String>> {
    if serials.len() as i64 != quantity {
        return Err(ValidationError::InvalidFormat {
            field: "serial_numbers".to_string(),
            reason: format!("expected {quantity} serials, got {}", serials.len()),
        });
    }

    let mut seen = HashSet::with_capacity(serials.len());
    let mut cleaned = Vec::with_capacity(serials.len());
    for serial in serials {
        let serial = serial.trim();
        if serial.is_empty() {
            return Err(ValidationError::Required {
                field: "serial_number".to_string(),
            });
        }
        if !seen.insert(serial) {
            return Err(ValidationError::Duplicate {
                field: "serial_number".to_string(),
                value: serial.to_string(),
            });
        }
        cleaned.push(serial.to_string());
    }

    Ok(cleaned)
}

/// A bill needs at least one line.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_product_code() {
        assert!(validate_product_code("IPH-15").is_ok());
        assert!(validate_product_code("para_500.10").is_ok());

        assert!(validate_product_code("").is_err());
        assert!(validate_product_code("   ").is_err());
        assert!(validate_product_code("has space").is_err());
        assert!(validate_product_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Paracetamol 500mg").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"ए".repeat(200)).is_ok());
        assert!(validate_name("name", &"A".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_hsn_code() {
        assert!(validate_hsn_code("8517").is_ok());
        assert!(validate_hsn_code("30049099").is_ok());
        assert!(validate_hsn_code("851").is_err());
        assert!(validate_hsn_code("85AB").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_price_paise("mrp", 0).is_ok());
        assert!(validate_price_paise("mrp", -1).is_err());
        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(0).is_err());
    }

    #[test]
    fn test_validate_serial_numbers() {
        let serials = vec![" A1 ".to_string(), "A2".to_string()];
        assert_eq!(validate_serial_numbers(&serials, 2).unwrap(), vec!["A1", "A2"]);

        assert!(validate_serial_numbers(&serials, 3).is_err());

        let dup = vec!["A1".to_string(), "A1 ".to_string()];
        assert!(matches!(
            validate_serial_numbers(&dup, 2),
            Err(ValidationError::Duplicate { .. })
        ));

        let blank = vec!["A1".to_string(), " ".to_string()];
        assert!(validate_serial_numbers(&blank, 2).is_err());
    }

    #[test]
    fn test_validate_username_and_password() {
        assert!(validate_username("admin").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_password("admin123").is_ok());
        assert!(validate_password("123").is_err());
    }
}
