//! Conversion between entity instances and table rows.

use crate::Result;
use crate::descriptor::EntityDescriptor;
use crate::entity::Entity;
use crate::error::Error;
use crate::row::Row;
use crate::value::Value;

/// Ordered column→value pairs produced from an entity for a write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnValues {
    entries: Vec<(String, Value)>,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, replacing an earlier value for the same name.
    pub fn put(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == column) {
            entry.1 = value;
        } else {
            self.entries.push((column, value));
        }
    }

    /// Remove a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(index).1)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read every column of `entity`, primary key included.
///
/// Returns `None` only when there is no entity to read.
pub fn to_row<T: Entity>(
    descriptor: &EntityDescriptor<T>,
    entity: Option<&T>,
) -> Option<ColumnValues> {
    let entity = entity?;
    let mut values = ColumnValues::new();
    for column in descriptor.columns() {
        values.put(column.name(), (column.accessor())(entity));
    }
    Some(values)
}

/// Row for an INSERT: a primary key below 1 is written as NULL so the
/// engine assigns the identity.
pub fn to_insert_row<T: Entity>(
    descriptor: &EntityDescriptor<T>,
    entity: Option<&T>,
) -> Option<ColumnValues> {
    let mut values = to_row(descriptor, entity)?;
    let key_column = descriptor.primary_key_column();
    if entity.is_some_and(|e| !e.is_persisted()) {
        values.put(key_column, Value::Null);
    }
    Some(values)
}

/// Row for an UPDATE: the primary-key column is never part of the write set.
pub fn to_update_row<T: Entity>(
    descriptor: &EntityDescriptor<T>,
    entity: Option<&T>,
) -> Option<ColumnValues> {
    let mut values = to_row(descriptor, entity)?;
    values.remove(descriptor.primary_key_column());
    Some(values)
}

/// Build an entity from a result row.
///
/// Starts from `T::default()` and sets every field whose column appears in
/// `row`. Absent columns keep their default, as do NULLs in non-`Option`
/// fields. Result columns that match no field are ignored.
#[allow(clippy::result_large_err)]
pub fn from_row<T: Entity>(descriptor: &EntityDescriptor<T>, row: &Row) -> Result<T> {
    let mut entity = T::default();

    for column in descriptor.columns() {
        let Some(value) = row.get_by_name(column.name()) else {
            continue;
        };
        if value.is_null() && !column.is_nullable() {
            continue;
        }

        column
            .semantic_type()
            .coerce(value.clone())
            .and_then(|v| (column.mutator())(&mut entity, v))
            .map_err(|e| match e {
                Error::Type(mut te) => {
                    te.column = Some(column.name().to_string());
                    te.rust_type = Some(std::any::type_name::<T>());
                    Error::Type(te)
                }
                e => e,
            })?;
    }

    Ok(entity)
}
