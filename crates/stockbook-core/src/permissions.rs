//! # Permissions
//!
//! A user's permission set, stored in one TEXT column.
//!
//! ## Storage Format
//! ```text
//! "*"                          → Permissions::All
//! ["sales.create","stock.adjust"] → Permissions::Only({..})
//! ```
//!
//! The column is decoded into this type once, when the row is read. Code
//! above the store never sees the raw string.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ValidationError;

/// Sentinel stored for "every permission".
pub const ALL_PERMISSIONS: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permissions {
    /// Every permission, including ones added in later versions.
    All,
    /// Exactly these permission keys.
    Only(BTreeSet<String>),
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::Only(BTreeSet::new())
    }
}

impl Permissions {
    /// Builds an explicit set from keys. A `"*"` key collapses to `All`.
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        if set.contains(ALL_PERMISSIONS) {
            Permissions::All
        } else {
            Permissions::Only(set)
        }
    }

    pub fn allows(&self, permission: &str) -> bool {
        match self {
            Permissions::All => true,
            Permissions::Only(set) => set.contains(permission),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Permissions::All)
    }

    /// Parses the stored column value.
    ///
    /// Accepts `*`, a JSON array (which may itself contain `*`), or an empty
    /// string for "no permissions".
    pub fn decode(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Permissions::default());
        }
        if raw == ALL_PERMISSIONS {
            return Ok(Permissions::All);
        }

        let keys: Vec<String> =
            serde_json::from_str(raw).map_err(|e| ValidationError::InvalidFormat {
                field: "permissions".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Permissions::only(keys))
    }

    /// Column value for this set.
    pub fn encode(&self) -> String {
        match self {
            Permissions::All => ALL_PERMISSIONS.to_string(),
            Permissions::Only(set) => {
                // A BTreeSet<String> always serializes
                serde_json::to_string(set).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Permissions::All => serializer.serialize_str(ALL_PERMISSIONS),
            Permissions::Only(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Sentinel(String),
            Keys(Vec<String>),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Sentinel(s) if s == ALL_PERMISSIONS => Ok(Permissions::All),
            Wire::Sentinel(s) => Err(de::Error::custom(format!(
                "expected \"*\" or a list of permissions, got \"{s}\""
            ))),
            Wire::Keys(keys) => Ok(Permissions::only(keys)),
        }
    }
}

// =============================================================================
// sqlx integration
// =============================================================================

#[cfg(feature = "sqlx")]
mod sqlx_impls {
    use super::Permissions;
    use sqlx::encode::IsNull;
    use sqlx::error::BoxDynError;
    use sqlx::sqlite::{Sqlite, SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
    use sqlx::{Decode, Encode, Type};

    impl Type<Sqlite> for Permissions {
        fn type_info() -> SqliteTypeInfo {
            <String as Type<Sqlite>>::type_info()
        }

        fn compatible(ty: &SqliteTypeInfo) -> bool {
            <String as Type<Sqlite>>::compatible(ty)
        }
    }

    impl<'r> Decode<'r, Sqlite> for Permissions {
        fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
            let raw = <&str as Decode<Sqlite>>::decode(value)?;
            Ok(Permissions::decode(raw)?)
        }
    }

    impl<'q> Encode<'q, Sqlite> for Permissions {
        fn encode_by_ref(
            &self,
            buf: &mut Vec<SqliteArgumentValue<'q>>,
        ) -> Result<IsNull, BoxDynError> {
            <String as Encode<Sqlite>>::encode(self.encode(), buf)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sentinel_and_list() {
        assert_eq!(Permissions::decode("*").unwrap(), Permissions::All);
        assert_eq!(Permissions::decode("[\"*\"]").unwrap(), Permissions::All);
        assert_eq!(Permissions::decode("").unwrap(), Permissions::default());

        let perms = Permissions::decode("[\"sales.create\",\"stock.adjust\"]").unwrap();
        assert!(perms.allows("sales.create"));
        assert!(!perms.allows("users.manage"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Permissions::decode("sales.create").is_err());
        assert!(Permissions::decode("{\"a\":1}").is_err());
    }

    #[test]
    fn test_encode_is_stable() {
        let perms = Permissions::only(["stock.adjust", "sales.create"]);
        assert_eq!(perms.encode(), "[\"sales.create\",\"stock.adjust\"]");
        assert_eq!(Permissions::All.encode(), "*");
        assert_eq!(Permissions::decode(&perms.encode()).unwrap(), perms);
    }

    #[test]
    fn test_serde_wire_format() {
        assert_eq!(serde_json::to_string(&Permissions::All).unwrap(), "\"*\"");
        let parsed: Permissions = serde_json::from_str("[\"reports.view\"]").unwrap();
        assert!(parsed.allows("reports.view"));
        assert!(serde_json::from_str::<Permissions>("\"admin\"").is_err());
    }
}
