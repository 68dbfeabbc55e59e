//! ormproxy - typed entity persistence over an embedded SQLite database.
//!
//! Plain structs become tables: `#[derive(Entity)]` records the fields, and a
//! [`DbProxy`] creates the tables, keeps them at a schema version and runs
//! typed inserts, updates, deletes and queries against them.
//!
//! - One hidden integer key column, `_key_id`, per table
//! - Table names derived from the type path (`app::model::User` becomes
//!   `app_model_user`)
//! - Versioned schema with automatic or hook-driven upgrades
//! - Batch writes in one transaction, rolled back on any error
//! - Raw SQL with entity or generic column-map results
//!
//! # Quick Start
//!
//! ```
//! use ormproxy::prelude::*;
//!
//! #[derive(Entity, Debug, Default, Clone, PartialEq)]
//! struct Hero {
//!     id: i64,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! # fn main() -> ormproxy::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let proxy = DbProxy::builder()
//!     .name("heroes.db")
//!     .directory(dir.path())
//!     .version(1)
//!     .create_table::<Hero>()
//!     .build()?;
//!
//! let mut hero = Hero { id: 0, name: "Spider-Man".into(), age: Some(25) };
//! proxy.insert(&mut hero)?;
//!
//! hero.age = Some(26);
//! proxy.update(&hero)?;
//!
//! let adults: Vec<Hero> =
//!     proxy.query_list(Some("age >= ?"), &[Value::from(18)], &QueryOptions::new())?;
//! assert_eq!(adults, vec![hero.clone()]);
//!
//! proxy.delete_by_key::<Hero>(hero.id)?;
//! assert_eq!(proxy.query_count::<Hero>(None, &[])?, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Connections
//!
//! A helper-managed database is opened on demand and closed again once no
//! operation is using it. A caller-supplied connection, or one opened from
//! `database_file`, stays open for the life of the proxy.

mod builder;
mod config;
mod lease;
mod proxy;
mod sql;

pub use builder::ProxyBuilder;
pub use config::{DEFAULT_BUSY_TIMEOUT_MS, ProxyConfig};
pub use proxy::{DbProxy, NO_ROW, NOT_APPLICABLE};
pub use sql::QueryOptions;

pub use ormproxy_core::{
    ColumnSchema, ConfigError, ConnectionError, ConnectionErrorKind, Entity, EntityDescriptor,
    Error, FieldInfo, FromValue, PRIMARY_KEY, QueryError, QueryErrorKind, Result, Row,
    SchemaError, SchemaErrorKind, SemanticType, TableSchema, TransactionError,
    TransactionErrorKind, TypeError, Value, table_name_for,
};
pub use ormproxy_macros::Entity;
pub use ormproxy_sqlite::{
    MEMORY_PATH, OpenFlags, OpenHelper, SqliteConfig, SqliteConnection, SqliteTransaction,
    UpgradeHook,
};

/// Prelude module for convenient imports.
///
/// ```
/// use ormproxy::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        DbProxy, Entity, Error, ProxyBuilder, ProxyConfig, QueryOptions, Result, Row,
        SqliteConnection, UpgradeHook, Value,
    };
}
