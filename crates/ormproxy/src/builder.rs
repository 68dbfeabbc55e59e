//! Fluent construction of a [`DbProxy`].

use crate::config::ProxyConfig;
use crate::lease::{ConnectionSource, TableRegistration};
use crate::proxy::DbProxy;
use ormproxy_core::{ConfigError, DescriptorCache, Entity, Error, Result, TableSchema};
use ormproxy_sqlite::{OpenHelper, SqliteConfig, SqliteConnection, UpgradeHook};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builder for [`DbProxy`].
///
/// Settings for a helper-managed database (`name` and `version`) take
/// precedence over an external connection or `database_file`. Registered
/// tables and the upgrade hook only apply to helper-managed databases.
#[derive(Default)]
pub struct ProxyBuilder {
    config: ProxyConfig,
    tables: Vec<TableRegistration>,
    hook: Option<Box<dyn UpgradeHook>>,
    connection: Option<Arc<SqliteConnection>>,
}

impl ProxyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from file-backed settings.
    pub fn from_config(config: ProxyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Database file name for a helper-managed database.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Directory for the helper-managed database file. Created on build if
    /// missing.
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.directory = Some(directory.into());
        self
    }

    /// Schema version; must be at least 1 for a helper-managed database.
    pub fn version(mut self, version: i64) -> Self {
        self.config.version = version;
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u32) -> Self {
        self.config.busy_timeout_ms = ms;
        self
    }

    /// Create `T`'s table with the database, and add it or its missing
    /// columns on upgrade.
    pub fn create_table<T: Entity>(mut self) -> Self {
        self.tables.push(table_registration::<T>);
        self
    }

    pub fn upgrade_hook(mut self, hook: impl UpgradeHook + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Use an existing database file without schema management.
    pub fn database_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_file = Some(path.into());
        self
    }

    /// Use a caller-owned connection. The proxy never closes it.
    pub fn external_connection(mut self, conn: Arc<SqliteConnection>) -> Self {
        self.connection = Some(conn);
        self
    }

    /// Build the proxy.
    ///
    /// A helper-managed database is opened lazily by the first operation; an
    /// external `database_file` is opened here.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<DbProxy> {
        if let Some(path) = self.config.managed_path() {
            if let Some(dir) = &self.config.directory {
                std::fs::create_dir_all(dir)?;
            }
            let sqlite = SqliteConfig::file(path_str(&path)?)
                .busy_timeout(self.config.busy_timeout_ms);
            let mut helper = OpenHelper::new(sqlite, self.config.version);
            if let Some(hook) = self.hook {
                helper.set_upgrade_hook(hook);
            }
            tracing::debug!(
                path = %path.display(),
                version = self.config.version,
                tables = self.tables.len(),
                "Building managed proxy"
            );
            return Ok(DbProxy::from_parts(
                ConnectionSource::Helper(Box::new(helper)),
                self.tables,
            ));
        }

        if !self.tables.is_empty() {
            tracing::debug!(
                tables = self.tables.len(),
                "Table registrations ignored without a managed database"
            );
        }

        if let Some(conn) = self.connection {
            return Ok(DbProxy::with_connection(conn));
        }

        if let Some(path) = &self.config.database_file {
            let sqlite = SqliteConfig::file(path_str(path)?)
                .busy_timeout(self.config.busy_timeout_ms);
            let conn = SqliteConnection::open(&sqlite)?;
            tracing::debug!(path = %path.display(), "Opened external database file");
            return Ok(DbProxy::with_connection(Arc::new(conn)));
        }

        Ok(DbProxy::unconfigured())
    }
}

impl std::fmt::Debug for ProxyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyBuilder")
            .field("config", &self.config)
            .field("tables", &self.tables.len())
            .field("hook", &self.hook.is_some())
            .field("connection", &self.connection.is_some())
            .finish()
    }
}

#[allow(clippy::result_large_err)]
fn table_registration<T: Entity>(cache: &mut DescriptorCache) -> Result<TableSchema> {
    Ok(cache.get::<T>()?.table_schema())
}

#[allow(clippy::result_large_err)]
fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        Error::Config(ConfigError {
            message: format!("Database path is not valid UTF-8: {}", path.display()),
            source: None,
        })
    })
}
