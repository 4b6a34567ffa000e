//! # Store Settings
//!
//! Where the stores live and how the first admin is seeded, loaded at
//! process start.
//!
//! ## Sources (Priority Order)
//! 1. Environment variables (`STOCKBOOK_*`)
//! 2. Settings file (`config.toml` in the platform config directory)
//! 3. Defaults (this file)
//!
//! Shop-level settings (prefixes, financial year, negative stock) are not
//! here; they live in the `shop` row and change through
//! [`ShopRepository`](crate::repository::shop::ShopRepository).
//!
//! ## Example `config.toml`
//! ```toml
//! [database]
//! path = "/srv/shop/database.db"
//! max_connections = 8
//!
//! [admin]
//! username = "owner"
//! password = "change-me-now"
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::error::{DbError, DbResult};
use crate::store::{StoreConfig, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};

pub const ENV_DB_PATH: &str = "STOCKBOOK_DB_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "STOCKBOOK_MAX_CONNECTIONS";
pub const ENV_ADMIN_USERNAME: &str = "STOCKBOOK_ADMIN_USERNAME";
pub const ENV_ADMIN_PASSWORD: &str = "STOCKBOOK_ADMIN_PASSWORD";

const DATABASE_FILE_NAME: &str = "database.db";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub database: DatabaseSettings,
    pub admin: AdminSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Primary store file. Default: platform data dir.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: 5,
        }
    }
}

/// Account created on a fresh store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub username: String,
    pub password: String,
}

impl Default for AdminSettings {
    fn default() -> Self {
        AdminSettings {
            username: DEFAULT_ADMIN_USERNAME.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl std::fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl StoreSettings {
    /// Reads `path` (when it exists) and applies environment overrides.
    ///
    /// A missing file is not an error; a file that does not parse is.
    pub fn load(path: Option<&Path>) -> DbResult<Self> {
        let mut settings = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => StoreSettings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// [`load`](Self::load) from the platform config file, falling back to
    /// defaults (plus environment) if that fails.
    pub fn load_or_default() -> Self {
        let path = default_config_path();
        match Self::load(path.as_deref()) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Could not load store settings, using defaults");
                let mut settings = StoreSettings::default();
                if let Err(e) = settings.apply_env(|key| std::env::var(key).ok()) {
                    warn!(error = %e, "Ignoring invalid environment overrides");
                }
                settings
            }
        }
    }

    pub fn from_file(path: &Path) -> DbResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DbError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let settings = toml::from_str(&raw)
            .map_err(|e| DbError::InvalidConfig(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded store settings");
        Ok(settings)
    }

    /// Applies `STOCKBOOK_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> DbResult<()> {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(max) = lookup(ENV_MAX_CONNECTIONS) {
            self.database.max_connections = max.trim().parse().map_err(|_| {
                DbError::InvalidConfig(format!("{ENV_MAX_CONNECTIONS} must be a number, got '{max}'"))
            })?;
        }
        if let Some(username) = lookup(ENV_ADMIN_USERNAME) {
            self.admin.username = username;
        }
        if let Some(password) = lookup(ENV_ADMIN_PASSWORD) {
            self.admin.password = password;
        }
        Ok(())
    }

    /// Store configuration for these settings. Without an explicit path the
    /// primary store goes to the platform data directory.
    pub fn store_config(&self) -> DbResult<StoreConfig> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => default_database_path().ok_or_else(|| {
                DbError::InvalidConfig("no database path and no platform data directory".to_string())
            })?,
        };
        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }

        Ok(StoreConfig::new(path)
            .max_connections(self.database.max_connections)
            .admin(&self.admin.username, &self.admin.password))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "stockbook", "pos")
}

/// Platform settings file.
///
/// - **Linux**: `~/.config/pos/config.toml`
/// - **macOS**: `~/Library/Application Support/com.stockbook.pos/config.toml`
/// - **Windows**: `%APPDATA%\stockbook\pos\config\config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Platform location of the primary store.
pub fn default_database_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
}

/// Initializes the tracing subscriber for the binaries.
///
/// ## Log Levels
/// - Default: `info,stockbook=debug,sqlx=warn`
/// - Override with `RUST_LOG`, e.g. `RUST_LOG=stockbook_db=trace`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockbook=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = StoreSettings::default();
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.admin.username, "admin");
        assert!(settings.database.path.is_none());
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "[database]\npath = \"/srv/shop/database.db\"\nmax_connections = 8\n\n[admin]\nusername = \"owner\"\n",
        )
        .unwrap();

        let mut settings = StoreSettings::from_file(&file).unwrap();
        assert_eq!(settings.database.max_connections, 8);
        assert_eq!(settings.admin.username, "owner");
        // Unset keys keep their defaults
        assert_eq!(settings.admin.password, DEFAULT_ADMIN_PASSWORD);

        settings
            .apply_env(env(&[
                (ENV_DB_PATH, "/tmp/override.db"),
                (ENV_ADMIN_PASSWORD, "s3cret-pass"),
            ]))
            .unwrap();
        assert_eq!(settings.database.path, Some(PathBuf::from("/tmp/override.db")));
        assert_eq!(settings.database.max_connections, 8);
        assert_eq!(settings.admin.password, "s3cret-pass");

        let config = settings.store_config().unwrap();
        assert_eq!(config.primary_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.secondary_path(), PathBuf::from("/tmp/database_old.db"));
        assert_eq!(config.admin_username, "owner");
    }

    #[test]
    fn test_invalid_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[database\nmax_connections = ").unwrap();
        assert!(matches!(
            StoreSettings::from_file(&file),
            Err(DbError::InvalidConfig(_))
        ));

        let mut settings = StoreSettings::default();
        let err = settings
            .apply_env(env(&[(ENV_MAX_CONNECTIONS, "lots")]))
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidConfig(_)));

        settings.database.path = Some(PathBuf::from("db.sqlite"));
        settings.database.max_connections = 0;
        assert!(matches!(
            settings.store_config(),
            Err(DbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_absent_file_and_empty_env() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StoreSettings::from_file(&dir.path().join("absent.toml"));
        assert!(settings.is_err());

        let mut fresh = StoreSettings::default();
        fresh.apply_env(env(&[])).unwrap();
        assert_eq!(fresh, StoreSettings::default());
    }
}
