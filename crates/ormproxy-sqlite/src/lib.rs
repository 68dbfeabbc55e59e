//! SQLite driver for ormproxy.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate wraps libsqlite3 behind a small synchronous API: a
//! [`SqliteConnection`] that runs parameterized statements, a
//! [`SqliteTransaction`] guard that rolls back unless committed, and an
//! [`OpenHelper`] that creates or upgrades a versioned schema when a database
//! file is opened.
//!
//! # Example
//!
//! ```rust
//! use ormproxy_core::Value;
//! use ormproxy_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//!
//! let id = conn
//!     .insert("INSERT INTO users (name) VALUES (?)", &[Value::Text("Alice".into())])
//!     .unwrap();
//! assert_eq!(id, 1);
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i8`, `i16`, `i32`, `i64` | INTEGER |
//! | `u8`, `u16`, `u32` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String`, `char` | TEXT |
//! | `Vec<u8>` | BLOB |
//! | `Option<T>` | NULL or T |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is both `Send` and `Sync`, using internal mutex
//! synchronization to protect the underlying SQLite handle.

pub mod connection;
pub mod ffi;
pub mod helper;
pub mod types;

pub use connection::{MEMORY_PATH, OpenFlags, SqliteConfig, SqliteConnection, SqliteTransaction};
pub use helper::{OpenHelper, UpgradeHook};
pub use types::ReadMode;

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
