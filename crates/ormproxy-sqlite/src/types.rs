//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has a simple type system with 5 storage classes:
//! - INTEGER: Signed integer (1, 2, 3, 4, 6, or 8 bytes)
//! - REAL: 8-byte IEEE floating point
//! - TEXT: UTF-8 or UTF-16 string
//! - BLOB: Binary data
//! - NULL: The NULL value
//!
//! We map these to/from ormproxy-core's Value type.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::ffi;
use ormproxy_core::Value;
use std::ffi::{CStr, c_int};

/// How result columns are decoded into [`Value`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Smallest fitting representation (`Int` for values within `i32`).
    #[default]
    Native,
    /// Fixed widths for generic column maps: INTEGER → `BigInt`, FLOAT →
    /// `Double`, TEXT → `Text`, BLOB → `Bytes`; NULL and anything else are
    /// read as text, which yields `Null` for a NULL cell.
    Generic,
}

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: the caller guarantees `stmt` and `index` are valid; text and blob
    // data is copied by SQLite because of SQLITE_TRANSIENT.
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),

            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, if *b { 1 } else { 0 }),

            Value::TinyInt(v) => ffi::sqlite3_bind_int(stmt, index, i32::from(*v)),

            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, i32::from(*v)),

            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),

            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),

            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),

            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),

            Value::Text(s) => {
                let bytes = s.as_bytes();
                ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    bytes.as_ptr().cast(),
                    bytes.len() as c_int,
                    ffi::sqlite_transient(),
                )
            }

            Value::Bytes(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::sqlite_transient(),
            ),
        }
    }
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int, mode: ReadMode) -> Value {
    // SAFETY: guaranteed by the caller
    let col_type = unsafe { ffi::sqlite3_column_type(stmt, index) };

    match (col_type, mode) {
        (ffi::SQLITE_INTEGER, ReadMode::Native) => {
            // SAFETY: guaranteed by the caller
            let v = unsafe { ffi::sqlite3_column_int64(stmt, index) };
            // Choose the smallest representation
            match i32::try_from(v) {
                Ok(small) => Value::Int(small),
                Err(_) => Value::BigInt(v),
            }
        }

        (ffi::SQLITE_INTEGER, ReadMode::Generic) => {
            // SAFETY: guaranteed by the caller
            Value::BigInt(unsafe { ffi::sqlite3_column_int64(stmt, index) })
        }

        (ffi::SQLITE_FLOAT, _) => {
            // SAFETY: guaranteed by the caller
            Value::Double(unsafe { ffi::sqlite3_column_double(stmt, index) })
        }

        (ffi::SQLITE_BLOB, _) => {
            // SAFETY: guaranteed by the caller; the blob pointer is valid until
            // the next step/finalize and we copy it out immediately.
            unsafe {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Bytes(slice.to_vec())
                }
            }
        }

        (ffi::SQLITE_NULL, ReadMode::Native) => Value::Null,

        // TEXT in both modes; NULL and unknown types in generic mode
        // SAFETY: guaranteed by the caller
        _ => unsafe { read_text(stmt, index) },
    }
}

/// Read a column as text. A NULL cell yields `Value::Null`.
///
/// # Safety
/// Same contract as [`read_column`].
unsafe fn read_text(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: guaranteed by the caller; the text pointer is valid until the
    // next step/finalize and we copy it out immediately.
    unsafe {
        let ptr = ffi::sqlite3_column_text(stmt, index);
        let len = ffi::sqlite3_column_bytes(stmt, index);
        if ptr.is_null() {
            Value::Null
        } else {
            let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
            Value::Text(String::from_utf8_lossy(slice).into_owned())
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: guaranteed by the caller; SQLite owns the returned string
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }
}
