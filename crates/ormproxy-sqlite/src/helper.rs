//! Versioned database opening.
//!
//! [`OpenHelper`] opens a [`SqliteConnection`] and brings its schema to the
//! requested version. The stored version lives in `PRAGMA user_version`:
//!
//! | stored | action |
//! |---|---|
//! | 0 | create every registered table |
//! | < requested | run the [`UpgradeHook`] phases in one transaction |
//! | = requested | nothing |
//! | > requested | fail, downgrades are refused |

#![allow(clippy::result_large_err)]

use crate::connection::{SqliteConfig, SqliteConnection};
use ormproxy_core::{
    Error, Result, SchemaError, SchemaErrorKind, TableSchema, Value, quote_ident,
};

/// Callbacks run while upgrading an existing database.
///
/// Every phase runs inside the upgrade transaction and returns `true` when it
/// handled the work itself. If [`on_upgrade`](Self::on_upgrade) returns
/// `false` the helper creates missing tables and adds missing columns.
/// Returning an error aborts the upgrade and rolls it back.
pub trait UpgradeHook: Send {
    fn begin_upgrade(&mut self, _conn: &SqliteConnection, _old: i64, _new: i64) -> Result<bool> {
        Ok(false)
    }

    fn on_upgrade(&mut self, _conn: &SqliteConnection, _old: i64, _new: i64) -> Result<bool> {
        Ok(false)
    }

    fn end_upgrade(&mut self, _conn: &SqliteConnection, _old: i64, _new: i64) -> Result<bool> {
        Ok(false)
    }
}

/// Opens a database file and keeps its tables at a given schema version.
pub struct OpenHelper {
    config: SqliteConfig,
    version: i64,
    tables: Vec<TableSchema>,
    hook: Option<Box<dyn UpgradeHook>>,
}

impl OpenHelper {
    pub fn new(config: SqliteConfig, version: i64) -> Self {
        Self {
            config,
            version,
            tables: Vec::new(),
            hook: None,
        }
    }

    /// Register a table; a later table with the same name replaces it.
    pub fn add_table(&mut self, table: TableSchema) {
        if let Some(existing) = self.tables.iter_mut().find(|t| t.name() == table.name()) {
            *existing = table;
        } else {
            self.tables.push(table);
        }
    }

    #[must_use]
    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.add_table(table);
        self
    }

    #[must_use]
    pub fn with_upgrade_hook(mut self, hook: Box<dyn UpgradeHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn set_upgrade_hook(&mut self, hook: Box<dyn UpgradeHook>) {
        self.hook = Some(hook);
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Open the database and create or upgrade its schema.
    pub fn open(&mut self) -> Result<SqliteConnection> {
        if self.version < 1 || self.version > i64::from(i32::MAX) {
            return Err(schema_error(
                SchemaErrorKind::Invalid,
                format!("Schema version must be in 1..={}, got {}", i32::MAX, self.version),
            ));
        }

        let conn = SqliteConnection::open(&self.config)?;
        let stored = user_version(&conn)?;

        if stored == self.version {
            return Ok(conn);
        }
        if stored > self.version {
            return Err(schema_error(
                SchemaErrorKind::Migration,
                format!(
                    "Database '{}' is at version {}, newer than requested {}",
                    self.config.path, stored, self.version
                ),
            ));
        }

        let tx = conn.begin()?;
        if stored == 0 {
            self.create(&conn)?;
        } else {
            self.upgrade(&conn, stored)?;
        }
        set_user_version(&conn, self.version)?;
        tx.commit()?;

        Ok(conn)
    }

    fn create(&self, conn: &SqliteConnection) -> Result<()> {
        for table in &self.tables {
            conn.execute_raw(&table.create_sql())?;
        }
        tracing::info!(
            path = %self.config.path,
            version = self.version,
            tables = self.tables.len(),
            "Created database schema"
        );
        Ok(())
    }

    fn upgrade(&mut self, conn: &SqliteConnection, old: i64) -> Result<()> {
        let new = self.version;
        tracing::info!(path = %self.config.path, old, new, "Upgrading database schema");

        let mut manual = false;
        if let Some(hook) = self.hook.as_mut() {
            let began = hook.begin_upgrade(conn, old, new)?;
            tracing::debug!(handled = began, "begin_upgrade");
            manual = hook.on_upgrade(conn, old, new)?;
        }

        if manual {
            tracing::debug!("on_upgrade handled the upgrade");
        } else {
            auto_upgrade(conn, &self.tables)?;
        }

        if let Some(hook) = self.hook.as_mut() {
            let ended = hook.end_upgrade(conn, old, new)?;
            tracing::debug!(handled = ended, "end_upgrade");
        }
        Ok(())
    }
}

impl std::fmt::Debug for OpenHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenHelper")
            .field("config", &self.config)
            .field("version", &self.version)
            .field("tables", &self.tables)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Create missing tables and add missing columns. Nothing is dropped.
pub fn auto_upgrade(conn: &SqliteConnection, tables: &[TableSchema]) -> Result<()> {
    for table in tables {
        let existing = table_columns(conn, table.name())?;
        if existing.is_empty() {
            conn.execute_raw(&table.create_sql())?;
            tracing::info!(table = %table.name(), "Created table");
            continue;
        }

        for column in table.missing_columns(&existing) {
            conn.execute_raw(&table.add_column_sql(column))?;
            tracing::info!(table = %table.name(), column = %column.name(), "Added column");
        }
    }
    Ok(())
}

/// Read `PRAGMA user_version`.
pub fn user_version(conn: &SqliteConnection) -> Result<i64> {
    let rows = conn.query("PRAGMA user_version", &[])?;
    Ok(rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(Value::as_i64)
        .unwrap_or(0))
}

/// Write `PRAGMA user_version`. Pragmas take no bound parameters.
pub fn set_user_version(conn: &SqliteConnection, version: i64) -> Result<()> {
    conn.execute_raw(&format!("PRAGMA user_version = {version}"))
}

/// Column names of `table`, empty when the table does not exist.
pub fn table_columns(conn: &SqliteConnection, table: &str) -> Result<Vec<String>> {
    let rows = conn.query(&format!("PRAGMA table_info({})", quote_ident(table)), &[])?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get_by_name("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

fn schema_error(kind: SchemaErrorKind, message: String) -> Error {
    Error::Schema(SchemaError {
        kind,
        message,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormproxy_core::{ColumnSchema, SemanticType};
    use std::sync::{Arc, Mutex};

    fn note_v1() -> TableSchema {
        TableSchema::new("note", vec![ColumnSchema::new("body", SemanticType::Text)])
    }

    fn note_v2() -> TableSchema {
        TableSchema::new(
            "note",
            vec![
                ColumnSchema::new("body", SemanticType::Text),
                ColumnSchema::new("pinned", SemanticType::Boolean),
            ],
        )
    }

    fn tag() -> TableSchema {
        TableSchema::new("tag", vec![ColumnSchema::new("label", SemanticType::Text)])
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
        manual: bool,
        fail_on_end: bool,
    }

    impl UpgradeHook for Recorder {
        fn begin_upgrade(&mut self, _conn: &SqliteConnection, old: i64, new: i64) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("begin {old}->{new}"));
            Ok(false)
        }

        fn on_upgrade(&mut self, conn: &SqliteConnection, old: i64, new: i64) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("on {old}->{new}"));
            if self.manual {
                conn.execute_raw("CREATE TABLE manual_marker (x INTEGER)")?;
            }
            Ok(self.manual)
        }

        fn end_upgrade(&mut self, _conn: &SqliteConnection, old: i64, new: i64) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("end {old}->{new}"));
            if self.fail_on_end {
                return Err(Error::Custom("end failed".to_string()));
            }
            Ok(false)
        }
    }

    fn db_config(dir: &tempfile::TempDir) -> SqliteConfig {
        SqliteConfig::file(dir.path().join("helper.db").to_string_lossy().into_owned())
    }

    #[test]
    fn test_fresh_database_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut helper = OpenHelper::new(db_config(&dir), 1)
            .with_table(note_v1())
            .with_table(tag());

        let conn = helper.open().unwrap();
        assert_eq!(user_version(&conn).unwrap(), 1);
        assert_eq!(table_columns(&conn, "note").unwrap(), vec!["_key_id", "body"]);
        assert_eq!(table_columns(&conn, "tag").unwrap(), vec!["_key_id", "label"]);
        assert!(table_columns(&conn, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_same_version_reopens_without_hook() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        drop(OpenHelper::new(db_config(&dir), 1).with_table(note_v1()).open().unwrap());

        let mut helper = OpenHelper::new(db_config(&dir), 1)
            .with_table(note_v1())
            .with_upgrade_hook(Box::new(recorder.clone()));
        helper.open().unwrap();
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_automatic_upgrade_adds_tables_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        drop(OpenHelper::new(db_config(&dir), 1).with_table(note_v1()).open().unwrap());

        let recorder = Recorder::default();
        let mut helper = OpenHelper::new(db_config(&dir), 3)
            .with_table(note_v2())
            .with_table(tag())
            .with_upgrade_hook(Box::new(recorder.clone()));
        let conn = helper.open().unwrap();

        assert_eq!(user_version(&conn).unwrap(), 3);
        assert_eq!(
            table_columns(&conn, "note").unwrap(),
            vec!["_key_id", "body", "pinned"]
        );
        assert_eq!(table_columns(&conn, "tag").unwrap().len(), 2);
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["begin 1->3", "on 1->3", "end 1->3"]
        );
    }

    #[test]
    fn test_manual_upgrade_skips_automatic_work() {
        let dir = tempfile::tempdir().unwrap();
        drop(OpenHelper::new(db_config(&dir), 1).with_table(note_v1()).open().unwrap());

        let recorder = Recorder {
            manual: true,
            ..Recorder::default()
        };
        let mut helper = OpenHelper::new(db_config(&dir), 2)
            .with_table(note_v2())
            .with_upgrade_hook(Box::new(recorder));
        let conn = helper.open().unwrap();

        assert_eq!(table_columns(&conn, "note").unwrap(), vec!["_key_id", "body"]);
        assert_eq!(table_columns(&conn, "manual_marker").unwrap(), vec!["x"]);
    }

    #[test]
    fn test_failed_upgrade_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        drop(OpenHelper::new(db_config(&dir), 1).with_table(note_v1()).open().unwrap());

        let recorder = Recorder {
            fail_on_end: true,
            ..Recorder::default()
        };
        let mut helper = OpenHelper::new(db_config(&dir), 2)
            .with_table(note_v2())
            .with_upgrade_hook(Box::new(recorder));
        assert!(helper.open().is_err());

        let conn = SqliteConnection::open(&db_config(&dir)).unwrap();
        assert_eq!(user_version(&conn).unwrap(), 1);
        assert_eq!(table_columns(&conn, "note").unwrap(), vec!["_key_id", "body"]);
    }

    #[test]
    fn test_downgrade_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        drop(OpenHelper::new(db_config(&dir), 4).with_table(note_v1()).open().unwrap());

        match OpenHelper::new(db_config(&dir), 2).open() {
            Err(Error::Schema(e)) => assert_eq!(e.kind, SchemaErrorKind::Migration),
            other => panic!("expected migration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_invalid_version() {
        let mut helper = OpenHelper::new(SqliteConfig::memory(), 0);
        assert!(matches!(helper.open(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_add_table_replaces_same_name() {
        let mut helper = OpenHelper::new(SqliteConfig::memory(), 1);
        helper.add_table(note_v1());
        helper.add_table(note_v2());
        assert_eq!(helper.tables().len(), 1);
        assert_eq!(helper.tables()[0].columns().len(), 2);
    }
}
