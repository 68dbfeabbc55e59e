//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API: opening and
//! closing a database, running statements with bound parameters, and a
//! transaction guard that rolls back unless committed.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in ormproxy-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types::{self, ReadMode};
use ormproxy_core::{
    ColumnInfo, Error, Result, Row, Value,
    error::{
        ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
        TransactionErrorKind,
    },
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open in read-only mode.
    pub read_only: bool,
    /// Open in read-write mode.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Interpret the filename as a URI.
    pub uri: bool,
    /// Open in multi-thread mode (no mutex).
    pub no_mutex: bool,
    /// Open in serialized mode (full mutex).
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access, creating if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is only touched while holding the Mutex, so it is never
// used from two threads at once.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// All calls are synchronous and serialized through an internal mutex. The
/// handle can be closed explicitly with [`SqliteConnection::close`]; it is
/// otherwise closed on drop.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database '{}': {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite database");

        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the underlying handle is still open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().is_ok_and(|inner| !inner.db.is_null())
    }

    /// Whether a transaction is currently open on this handle.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().is_ok_and(|inner| inner.in_transaction)
    }

    /// Close the handle. Closing an already closed handle is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock_raw()?;
        if inner.db.is_null() {
            return Ok(());
        }

        // SAFETY: db is valid; close_v2 defers the close until outstanding
        // statements are finalized, and we never keep any.
        let rc = unsafe { ffi::sqlite3_close_v2(inner.db) };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Close,
                message: format!("Failed to close database: {}", ffi::error_string(rc)),
                source: None,
            }));
        }

        inner.db = ptr::null_mut();
        inner.in_transaction = false;
        tracing::debug!(path = %self.path, "Closed SQLite database");
        Ok(())
    }

    /// Execute SQL directly without preparing (for DDL, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock()?;
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        tracing::trace!(sql = %sql, "execute_raw");

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid C string allocated by SQLite
                let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
                // SAFETY: errmsg was allocated by sqlite3_malloc
                unsafe { ffi::sqlite3_free(errmsg.cast()) };
                msg
            };

            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message: msg,
                source: None,
            }));
        }

        Ok(())
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let inner = self.lock()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(inner.db) })
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> Result<u64> {
        let inner = self.lock()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_changes(inner.db) } as u64)
    }

    /// Prepare and execute a query, returning all rows.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.query_with_mode(sql, params, ReadMode::Native)
    }

    /// Like [`query`](Self::query), decoding columns with [`ReadMode::Generic`].
    pub fn query_generic(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.query_with_mode(sql, params, ReadMode::Generic)
    }

    fn query_with_mode(&self, sql: &str, params: &[Value], mode: ReadMode) -> Result<Vec<Row>> {
        let inner = self.lock()?;
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.raw) };
        let mut col_names = Vec::with_capacity(col_count as usize);
        for i in 0..col_count {
            // SAFETY: stmt is valid, i is in range
            let name = unsafe { types::column_name(stmt.raw, i) }
                .unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
            match rc {
                ffi::SQLITE_ROW => {
                    let mut values = Vec::with_capacity(col_count as usize);
                    for i in 0..col_count {
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        values.push(unsafe { types::read_column(stmt.raw, i, mode) });
                    }
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }

        tracing::trace!(sql = %sql, rows = rows.len(), "query");
        Ok(rows)
    }

    /// Prepare and execute a statement, returning rows affected.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let inner = self.lock()?;
        let stmt = Statement::prepare(inner.db, sql)?;
        stmt.bind_all(params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.raw) };
        drop(stmt);

        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changes = unsafe { ffi::sqlite3_changes(inner.db) } as u64;
                tracing::trace!(sql = %sql, changes, "execute");
                Ok(changes)
            }
            _ => Err(step_error(inner.db, sql)),
        }
    }

    /// Execute an INSERT and return the last inserted rowid.
    pub fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.execute(sql, params)?;
        self.last_insert_rowid()
    }

    /// Begin a transaction, returning a guard that rolls back on drop.
    ///
    /// SQLite has no nested transactions; beginning while one is open fails.
    pub fn begin(&self) -> Result<SqliteTransaction<'_>> {
        {
            let inner = self.lock()?;
            if inner.in_transaction {
                return Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::NestedNotSupported,
                    message: "Already in a transaction".to_string(),
                }));
            }
        }

        self.execute_raw("BEGIN IMMEDIATE")?;
        self.lock()?.in_transaction = true;
        tracing::debug!(path = %self.path, "BEGIN");

        Ok(SqliteTransaction {
            conn: self,
            finished: false,
        })
    }

    fn commit_sync(&self) -> Result<()> {
        self.end_transaction("COMMIT", TransactionErrorKind::AlreadyCommitted)
    }

    fn rollback_sync(&self) -> Result<()> {
        self.end_transaction("ROLLBACK", TransactionErrorKind::AlreadyRolledBack)
    }

    fn end_transaction(&self, sql: &'static str, kind: TransactionErrorKind) -> Result<()> {
        if !self.lock()?.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind,
                message: "Not in a transaction".to_string(),
            }));
        }

        let result = self.execute_raw(sql);
        // A failed COMMIT leaves the transaction open; ROLLBACK always ends it.
        if result.is_ok() || sql == "ROLLBACK" {
            self.lock()?.in_transaction = false;
        }
        tracing::debug!(path = %self.path, ok = result.is_ok(), "{}", sql);
        result
    }

    fn lock_raw(&self) -> Result<MutexGuard<'_, SqliteInner>> {
        self.inner.lock().map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Poisoned,
                message: "SQLite connection mutex poisoned".to_string(),
                source: None,
            })
        })
    }

    /// Lock the handle, failing if it has been closed.
    fn lock(&self) -> Result<MutexGuard<'_, SqliteInner>> {
        let inner = self.lock_raw()?;
        if inner.db.is_null() {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: format!("Database '{}' is closed", self.path),
                source: None,
            }));
        }
        Ok(inner)
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(
                path = %self.path,
                error = %e,
                "Failed to close SQLite database on drop"
            );
        }
    }
}

/// A SQLite transaction.
///
/// Dropping the guard without calling [`commit`](Self::commit) rolls the
/// transaction back.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl<'conn> SqliteTransaction<'conn> {
    /// The connection this transaction runs on.
    pub fn connection(&self) -> &'conn SqliteConnection {
        self.conn
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.conn.execute(sql, params)
    }

    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_raw(sql)
    }

    pub fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.conn.insert(sql, params)
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.conn.query(sql, params)
    }

    /// Mark the transaction successful and end it.
    ///
    /// SQLite keeps the transaction open when COMMIT fails (deferred
    /// constraints, busy). It is rolled back then, and the COMMIT error is
    /// returned.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let result = self.conn.commit_sync();
        if result.is_err() {
            if let Err(e) = self.conn.rollback_sync() {
                tracing::warn!(error = %e, "Rollback after failed COMMIT failed");
            }
        }
        result
    }

    /// Roll the transaction back explicitly.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.rollback_sync()
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Auto-rollback on drop if not committed
            if let Err(e) = self.conn.rollback_sync() {
                tracing::warn!(error = %e, "Rollback on drop failed");
            }
        }
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql_text: String,
}

impl Statement {
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(step_error(db, sql));
        }
        if stmt.is_null() {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                message: "SQL contains no statement".to_string(),
                source: None,
            }));
        }

        Ok(Self {
            raw: stmt,
            db,
            sql_text: sql.to_string(),
        })
    }

    fn bind_all(&self, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is valid
                let msg = unsafe { errmsg(self.db) };
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: Some(self.sql_text.clone()),
                    message: format!("Failed to bind parameter {}: {}", i + 1, msg),
                    source: None,
                }));
            }
        }
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: raw is a valid statement that has not been finalized
        unsafe { ffi::sqlite3_finalize(self.raw) };
    }
}

// Helper functions

/// # Safety
/// `db` must be a valid connection handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: guaranteed by the caller; SQLite owns the message
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (errmsg(db), ffi::sqlite3_errcode(db)) };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: msg,
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended result codes carry the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Deadlock,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
