//! # Bootstrap
//!
//! First-run seeding of the primary store.
//!
//! A fresh database gets one admin account so someone can log in and set
//! the shop up. Once any admin row exists (active or not) this is a no-op,
//! so a renamed or replaced default account is never brought back.

use tracing::{debug, warn};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::user::{insert_user, NewUser};
use stockbook_core::{Permissions, Role, User};

/// Creates the default admin when the store has no admin at all.
///
/// Returns the created user, or `None` when an admin already existed.
/// Counting and inserting happen in one write transaction, so two
/// concurrent calls cannot both create an admin.
pub async fn ensure_default_admin(
    db: &Database,
    username: &str,
    password: &str,
) -> DbResult<Option<User>> {
    let mut tx = db.begin_write().await?;
    let conn = tx.conn();

    let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(&mut *conn)
        .await?;
    if admins > 0 {
        debug!(admins, "Admin present, skipping bootstrap");
        return Ok(None);
    }

    let admin = insert_user(
        conn,
        &NewUser {
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Admin,
            permissions: Permissions::All,
        },
    )
    .await?;
    tx.commit().await?;

    warn!(
        username = %admin.username,
        "Created default admin account; change its password"
    );
    Ok(Some(admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_creates_admin_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let admin = ensure_default_admin(&db, "admin", "admin123")
            .await
            .unwrap()
            .expect("admin created on a fresh store");
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.permissions.is_all());
        assert!(db
            .users()
            .verify_credentials("admin", "admin123")
            .await
            .unwrap()
            .is_some());

        assert!(ensure_default_admin(&db, "admin", "admin123")
            .await
            .unwrap()
            .is_none());
        assert_eq!(db.users().count_admins().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_admin_is_respected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users()
            .create(NewUser {
                username: "owner".to_string(),
                password: "owner-pass".to_string(),
                role: Role::Admin,
                permissions: Permissions::All,
            })
            .await
            .unwrap();

        assert!(ensure_default_admin(&db, "admin", "admin123")
            .await
            .unwrap()
            .is_none());
        assert!(db.users().get_by_username("admin").await.unwrap().is_none());
    }
}
