//! # Catalog Repository
//!
//! Product categories and subcategories. Deleting a category cascades to
//! its subcategories; products referencing either keep existing with the
//! reference cleared.

use sqlx::sqlite::SqliteQueryResult;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use stockbook_core::validation::validate_name;
use stockbook_core::{Category, Subcategory};

#[derive(Debug, Clone)]
pub struct CatalogRepository {
    db: Database,
}

impl CatalogRepository {
    pub fn new(db: Database) -> Self {
        CatalogRepository { db }
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, name: &str) -> DbResult<Category> {
        validate_name("category", name)?;
        let name = name.trim();
        debug!(name = %name, "Creating category");

        let mut tx = self.db.begin_write().await?;
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name) VALUES (?1) RETURNING *",
        )
        .bind(name)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("category", name),
            other => other,
        })?;
        tx.commit().await?;
        Ok(category)
    }

    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name COLLATE NOCASE")
                .fetch_all(self.db.pool())
                .await?;
        Ok(categories)
    }

    /// Deletes a category and its subcategories. Products lose the
    /// reference but are kept.
    pub async fn delete_category(&self, id: i64) -> DbResult<()> {
        debug!(id, "Deleting category");
        let mut tx = self.db.begin_write().await?;
        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(tx.conn())
            .await?;
        ensure_deleted(result, "Category", id)?;
        tx.commit().await
    }

    // =========================================================================
    // Subcategories
    // =========================================================================

    pub async fn create_subcategory(&self, category_id: i64, name: &str) -> DbResult<Subcategory> {
        validate_name("subcategory", name)?;
        let name = name.trim();
        debug!(category_id, name = %name, "Creating subcategory");

        let mut tx = self.db.begin_write().await?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?1")
            .bind(category_id)
            .fetch_optional(tx.conn())
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Category", category_id));
        }

        let subcategory = sqlx::query_as::<_, Subcategory>(
            "INSERT INTO subcategories (category_id, name) VALUES (?1, ?2) RETURNING *",
        )
        .bind(category_id)
        .bind(name)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("subcategory", name),
            other => other,
        })?;
        tx.commit().await?;
        Ok(subcategory)
    }

    pub async fn subcategories(&self, category_id: i64) -> DbResult<Vec<Subcategory>> {
        let subcategories = sqlx::query_as::<_, Subcategory>(
            "SELECT * FROM subcategories WHERE category_id = ?1 ORDER BY name COLLATE NOCASE",
        )
        .bind(category_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(subcategories)
    }

    pub async fn delete_subcategory(&self, id: i64) -> DbResult<()> {
        debug!(id, "Deleting subcategory");
        let mut tx = self.db.begin_write().await?;
        let result = sqlx::query("DELETE FROM subcategories WHERE id = ?1")
            .bind(id)
            .execute(tx.conn())
            .await?;
        ensure_deleted(result, "Subcategory", id)?;
        tx.commit().await
    }
}

fn ensure_deleted(result: SqliteQueryResult, entity: &str, id: i64) -> DbResult<()> {
    if result.rows_affected() == 0 {
        return Err(DbError::not_found(entity, id));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::product::NewProduct;

    #[tokio::test]
    async fn test_category_names_are_unique_ignoring_case() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();

        catalog.create_category("Mobiles").await.unwrap();
        let err = catalog.create_category("mobiles").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(catalog.list_categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_category_clears_product_references() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let catalog = db.catalog();
        let category = catalog.create_category("Mobiles").await.unwrap();
        let sub = catalog
            .create_subcategory(category.id, "Smartphones")
            .await
            .unwrap();

        let product = db
            .products()
            .create(NewProduct {
                category_id: Some(category.id),
                subcategory_id: Some(sub.id),
                ..NewProduct::new("SAM-A15", "Galaxy A15")
            })
            .await
            .unwrap();

        catalog.delete_category(category.id).await.unwrap();

        assert!(catalog.subcategories(category.id).await.unwrap().is_empty());
        let product = db.products().get_by_id(product.id).await.unwrap().unwrap();
        assert_eq!(product.category_id, None);
        assert_eq!(product.subcategory_id, None);
    }

    #[tokio::test]
    async fn test_subcategory_requires_category() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.catalog().create_subcategory(99, "Orphan").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = db.catalog().delete_subcategory(99).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
