//! Core types and traits for ormproxy.
//!
//! This crate provides the schema mapping engine:
//!
//! - `Entity` trait and static `FieldInfo` tables for struct-to-table mapping
//! - `EntityDescriptor` and the per-proxy `DescriptorCache`
//! - Row marshalling between entities and `Row`s (`marshal`)
//! - `Value`, `Row` and `FromValue` for engine values
//! - The shared `Error` type

pub mod descriptor;
pub mod entity;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod marshal;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use descriptor::{ColumnDescriptor, DescriptorCache, EntityDescriptor};
pub use entity::{Entity, PRIMARY_KEY, table_name_for, to_snake_case};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
    SchemaError, SchemaErrorKind, TransactionError, TransactionErrorKind, TypeError,
};
pub use field::{Accessor, FieldInfo, Mutator};
pub use identifiers::quote_ident;
pub use marshal::ColumnValues;
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{ColumnSchema, TableSchema};
pub use types::SemanticType;
pub use value::Value;
