//! # User Repository
//!
//! Shop users, their roles and permission sets.
//!
//! Passwords are stored as argon2 PHC strings. The plain password never
//! reaches the database and the hash never leaves this module except inside
//! a [`User`] (whose serializer skips it).
//!
//! ## Admin Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  active admins ≥ 1   (once bootstrap has run)                           │
//! │                                                                         │
//! │  deactivate(employee)          → ok                                     │
//! │  deactivate(admin), 2 active   → ok                                     │
//! │  deactivate(admin), 1 active   → CoreError::LastAdmin                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use stockbook_core::validation::{validate_password, validate_username};
use stockbook_core::{CoreError, Permissions, Role, User};

/// Input for a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    pub fn new(db: Database) -> Self {
        UserRepository { db }
    }

    /// Creates a user with a freshly hashed password.
    pub async fn create(&self, user: NewUser) -> DbResult<User> {
        let mut tx = self.db.begin_write().await?;
        let created = insert_user(tx.conn(), &user).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Looks a user up by name, ignoring case.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?1")
            .bind(username.trim())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(user)
    }

    /// Returns the user when the name exists, the account is active and the
    /// password matches. Every failure is `Ok(None)`.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> DbResult<Option<User>> {
        let Some(user) = self.get_by_username(username).await? else {
            debug!(username = %username, "Login for unknown user");
            return Ok(None);
        };

        if !user.is_active {
            debug!(username = %username, "Login for inactive user");
            return Ok(None);
        }

        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            debug!(username = %username, "Password mismatch");
            Ok(None)
        }
    }

    /// Replaces a user's permission set.
    pub async fn set_permissions(&self, user_id: i64, permissions: Permissions) -> DbResult<User> {
        debug!(user_id, ?permissions, "Setting permissions");

        let mut tx = self.db.begin_write().await?;
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET permissions = ?2 WHERE id = ?1 RETURNING *",
        )
        .bind(user_id)
        .bind(&permissions)
        .fetch_optional(tx.conn())
        .await?
        .ok_or_else(|| DbError::not_found("User", user_id))?;
        tx.commit().await?;
        Ok(user)
    }

    /// Deactivates a user. Refuses to deactivate the last active admin.
    pub async fn deactivate(&self, user_id: i64) -> DbResult<User> {
        let mut tx = self.db.begin_write().await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(tx.conn())
            .await?
            .ok_or_else(|| DbError::not_found("User", user_id))?;

        if user.role == Role::Admin && user.is_active && count_active_admins(tx.conn()).await? <= 1 {
            return Err(CoreError::LastAdmin.into());
        }

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = 0 WHERE id = ?1 RETURNING *",
        )
        .bind(user_id)
        .fetch_one(tx.conn())
        .await?;
        tx.commit().await?;

        info!(user_id, username = %user.username, "User deactivated");
        Ok(user)
    }

    /// Number of active admins.
    pub async fn count_admins(&self) -> DbResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        count_active_admins(&mut conn).await
    }
}

pub(crate) async fn insert_user(conn: &mut SqliteConnection, user: &NewUser) -> DbResult<User> {
    let username = user.username.trim();
    validate_username(username)?;
    validate_password(&user.password)?;

    debug!(username = %username, role = %user.role, "Creating user");

    let hash = hash_password(&user.password)?;
    let created = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, role, permissions, is_active, created_at)
        VALUES (?1, ?2, ?3, ?4, 1, ?5)
        RETURNING *
        "#,
    )
    .bind(username)
    .bind(hash)
    .bind(user.role)
    .bind(&user.permissions)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { .. } => DbError::duplicate("username", username),
        other => other,
    })?;
    Ok(created)
}

pub(crate) async fn count_active_admins(conn: &mut SqliteConnection) -> DbResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1")
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

/// Hash a password for storage.
fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against its stored hash. A malformed hash never
/// matches.
fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    fn new_user(name: &str, role: Role) -> NewUser {
        NewUser {
            username: name.to_string(),
            password: "secret123".to_string(),
            role,
            permissions: Permissions::default(),
        }
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();

        let created = users
            .create(NewUser {
                permissions: Permissions::only(["sales.create"]),
                ..new_user("priya", Role::Employee)
            })
            .await
            .unwrap();
        assert!(created.password_hash.starts_with("$argon2"));
        assert!(created.can("sales.create"));
        assert!(!created.can("stock.adjust"));

        assert!(users.verify_credentials("Priya", "secret123").await.unwrap().is_some());
        assert!(users.verify_credentials("priya", "wrong-pass").await.unwrap().is_none());
        assert!(users.verify_credentials("nobody", "secret123").await.unwrap().is_none());

        let err = users.create(new_user("PRIYA", Role::Employee)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_set_permissions_round_trips_all() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();
        let user = users.create(new_user("manager", Role::Employee)).await.unwrap();

        let updated = users.set_permissions(user.id, Permissions::All).await.unwrap();
        assert!(updated.permissions.is_all());

        let stored: String = sqlx::query_scalar("SELECT permissions FROM users WHERE id = ?1")
            .bind(user.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(stored, "*");
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_deactivated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();
        let first = users.create(new_user("owner", Role::Admin)).await.unwrap();

        let err = users.deactivate(first.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::LastAdmin)));

        let second = users.create(new_user("partner", Role::Admin)).await.unwrap();
        users.deactivate(first.id).await.unwrap();
        assert_eq!(users.count_admins().await.unwrap(), 1);

        assert!(users.verify_credentials("owner", "secret123").await.unwrap().is_none());
        let err = users.deactivate(second.id).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::LastAdmin)));
    }
}
