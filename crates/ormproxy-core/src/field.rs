//! Field declarations for entity types.

use crate::Result;
use crate::value::Value;
use std::fmt;

/// Reads a field from an entity as a [`Value`].
pub type Accessor<T> = fn(&T) -> Value;

/// Writes a [`Value`] into a field of an entity.
pub type Mutator<T> = fn(&mut T, Value) -> Result<()>;

/// Static metadata about one field of an entity type.
///
/// `#[derive(Entity)]` emits one of these per struct field into a static
/// table; hand-written `Entity` impls build the same table with the const
/// builder methods below.
pub struct FieldInfo<T> {
    /// Rust field name
    pub name: &'static str,
    /// The field's type as written in source, e.g. `"Option<i32>"`
    pub declared_type: &'static str,
    /// Whether this field holds the entity's row identity
    pub primary_key: bool,
    /// Whether this field is excluded from persistence
    pub transient: bool,
    /// Reads the field
    pub accessor: Accessor<T>,
    /// Writes the field
    pub mutator: Mutator<T>,
}

impl<T> FieldInfo<T> {
    /// Create a new field info with the required data.
    pub const fn new(
        name: &'static str,
        declared_type: &'static str,
        accessor: Accessor<T>,
        mutator: Mutator<T>,
    ) -> Self {
        Self {
            name,
            declared_type,
            primary_key: false,
            transient: false,
            accessor,
            mutator,
        }
    }

    /// Set whether this is the primary key field.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set whether this field is skipped by persistence.
    pub const fn transient(mut self, value: bool) -> Self {
        self.transient = value;
        self
    }
}

impl<T> fmt::Debug for FieldInfo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("primary_key", &self.primary_key)
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}
