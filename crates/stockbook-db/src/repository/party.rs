//! # Party Repository
//!
//! Customers and suppliers. Both tables have the same shape, so one
//! repository serves either, selected by [`EntityType`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use stockbook_core::validation::validate_name;
use stockbook_core::{EntityType, Party};

/// Input for a new customer or supplier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewParty {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    /// Balance carried in from before the shop used this system.
    pub opening_balance_paise: i64,
}

impl NewParty {
    pub fn named(name: impl Into<String>) -> Self {
        NewParty {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartyRepository {
    db: Database,
    entity_type: EntityType,
}

impl PartyRepository {
    pub fn new(db: Database, entity_type: EntityType) -> Self {
        PartyRepository { db, entity_type }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub async fn create(&self, party: NewParty) -> DbResult<Party> {
        validate_name("name", &party.name)?;
        debug!(entity = %self.entity_type, name = %party.name, "Creating party");

        let sql = format!(
            r#"
            INSERT INTO {} (name, phone, email, gstin, address, state,
                            opening_balance_paise, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
            table(self.entity_type)
        );

        let mut tx = self.db.begin_write().await?;
        let created = sqlx::query_as::<_, Party>(&sql)
            .bind(party.name.trim())
            .bind(&party.phone)
            .bind(&party.email)
            .bind(&party.gstin)
            .bind(&party.address)
            .bind(&party.state)
            .bind(party.opening_balance_paise)
            .bind(Utc::now())
            .fetch_one(tx.conn())
            .await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<Party>> {
        let mut conn = self.db.pool().acquire().await?;
        find_party(&mut conn, self.entity_type, id).await
    }

    pub async fn list(&self) -> DbResult<Vec<Party>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY name COLLATE NOCASE, id",
            table(self.entity_type)
        );
        let parties = sqlx::query_as::<_, Party>(&sql)
            .fetch_all(self.db.pool())
            .await?;
        Ok(parties)
    }
}

const fn table(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Customer => "customers",
        EntityType::Supplier => "suppliers",
    }
}

pub(crate) async fn find_party(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: i64,
) -> DbResult<Option<Party>> {
    let sql = format!("SELECT * FROM {} WHERE id = ?1", table(entity_type));
    let party = sqlx::query_as::<_, Party>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(party)
}

pub(crate) async fn fetch_party(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: i64,
) -> DbResult<Party> {
    find_party(conn, entity_type, id)
        .await?
        .ok_or_else(|| DbError::not_found(entity_type.as_str(), id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_customers_and_suppliers_are_separate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let customer = db
            .customers()
            .create(NewParty {
                opening_balance_paise: 50_000,
                ..NewParty::named("Ravi Kumar")
            })
            .await
            .unwrap();
        db.suppliers()
            .create(NewParty::named("Metro Distributors"))
            .await
            .unwrap();

        assert_eq!(customer.opening_balance_paise, 50_000);
        assert_eq!(db.customers().list().await.unwrap().len(), 1);
        assert_eq!(db.suppliers().list().await.unwrap().len(), 1);
        assert_eq!(
            db.customers().get(customer.id).await.unwrap().unwrap().name,
            "Ravi Kumar"
        );
        assert!(db.customers().get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_is_required() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.customers().create(NewParty::named("  ")).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }
}
