//! Entity descriptors and the per-proxy descriptor cache.
//!
//! An [`EntityDescriptor`] is the resolved schema of one entity type: its
//! table name, its ordered columns with semantic types, and the bound field
//! accessors. Descriptors are built from [`Entity::fields`] once and then
//! shared through a [`DescriptorCache`].

use crate::Result;
use crate::entity::{Entity, PRIMARY_KEY, table_name_for, to_snake_case};
use crate::error::{Error, SchemaError, SchemaErrorKind};
use crate::field::{Accessor, Mutator};
use crate::schema::{ColumnSchema, TableSchema};
use crate::types::SemanticType;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One persisted column of an entity.
pub struct ColumnDescriptor<T> {
    name: String,
    field: &'static str,
    semantic_type: SemanticType,
    nullable: bool,
    primary_key: bool,
    accessor: Accessor<T>,
    mutator: Mutator<T>,
}

impl<T> ColumnDescriptor<T> {
    /// Column name in the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust field this column is bound to.
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.semantic_type
    }

    /// Whether the field is an `Option<T>`.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn accessor(&self) -> Accessor<T> {
        self.accessor
    }

    pub fn mutator(&self) -> Mutator<T> {
        self.mutator
    }
}

impl<T> fmt::Debug for ColumnDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("semantic_type", &self.semantic_type)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

/// Resolved table mapping for one entity type.
pub struct EntityDescriptor<T> {
    table_name: String,
    columns: Vec<ColumnDescriptor<T>>,
    primary_key_index: usize,
}

impl<T: Entity> EntityDescriptor<T> {
    /// Build the descriptor from the entity's static field table.
    ///
    /// Transient fields are skipped. The primary-key field maps to
    /// [`PRIMARY_KEY`]; every other field maps to its snake_case name.
    #[allow(clippy::result_large_err)]
    pub fn build() -> Result<Self> {
        let entity = T::type_name();
        let mut columns: Vec<ColumnDescriptor<T>> = Vec::with_capacity(T::fields().len());
        let mut primary_key_index = None;

        for field in T::fields().iter().filter(|f| !f.transient) {
            let semantic_type = SemanticType::from_declared(field.declared_type).ok_or(
                Error::UnsupportedFieldType {
                    entity,
                    field: field.name,
                    declared: field.declared_type,
                },
            )?;

            let name = if field.primary_key {
                if primary_key_index.is_some() {
                    return Err(schema_error(
                        SchemaErrorKind::PrimaryKey,
                        format!("{} declares more than one primary key field", entity),
                    ));
                }
                if semantic_type != SemanticType::Int64 {
                    return Err(Error::UnsupportedFieldType {
                        entity,
                        field: field.name,
                        declared: field.declared_type,
                    });
                }
                primary_key_index = Some(columns.len());
                PRIMARY_KEY.to_string()
            } else {
                to_snake_case(field.name)
            };

            if columns.iter().any(|c| c.name == name) {
                return Err(schema_error(
                    SchemaErrorKind::DuplicateColumn,
                    format!("{}.{} maps to duplicate column '{}'", entity, field.name, name),
                ));
            }

            columns.push(ColumnDescriptor {
                name,
                field: field.name,
                semantic_type,
                nullable: SemanticType::is_optional(field.declared_type),
                primary_key: field.primary_key,
                accessor: field.accessor,
                mutator: field.mutator,
            });
        }

        let primary_key_index = primary_key_index.ok_or_else(|| {
            schema_error(
                SchemaErrorKind::PrimaryKey,
                format!("{} has no primary key field", entity),
            )
        })?;

        let descriptor = Self {
            table_name: table_name_for(T::TYPE_PATH),
            columns,
            primary_key_index,
        };

        tracing::debug!(
            entity = T::TYPE_PATH,
            table = %descriptor.table_name,
            columns = descriptor.columns.len(),
            "Built entity descriptor"
        );

        Ok(descriptor)
    }
}

impl<T> EntityDescriptor<T> {
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Columns in field declaration order, primary key included.
    pub fn columns(&self) -> &[ColumnDescriptor<T>] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor<T>> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The reserved primary-key column name.
    pub fn primary_key_column(&self) -> &'static str {
        PRIMARY_KEY
    }

    /// The column bound to the entity's primary-key field.
    pub fn primary_key(&self) -> &ColumnDescriptor<T> {
        &self.columns[self.primary_key_index]
    }

    /// The table layout used for DDL.
    pub fn table_schema(&self) -> TableSchema {
        TableSchema::new(
            self.table_name.clone(),
            self.columns
                .iter()
                .filter(|c| !c.primary_key)
                .map(|c| ColumnSchema::new(c.name.clone(), c.semantic_type))
                .collect(),
        )
    }
}

impl<T> fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("table_name", &self.table_name)
            .field("columns", &self.columns)
            .finish()
    }
}

fn schema_error(kind: SchemaErrorKind, message: String) -> Error {
    Error::Schema(SchemaError {
        kind,
        message,
        source: None,
    })
}

/// Lazily-populated descriptor cache, keyed by entity type.
///
/// The cache is owned by one proxy and is only touched while that proxy's
/// lock is held, so each type gets exactly one descriptor instance.
#[derive(Default)]
pub struct DescriptorCache {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the descriptor for `T`, building it on first request.
    ///
    /// A failed build is not cached; the error resurfaces on every use.
    #[allow(clippy::result_large_err)]
    pub fn get<T: Entity>(&mut self) -> Result<Arc<EntityDescriptor<T>>> {
        let key = TypeId::of::<T>();
        if let Some(entry) = self.entries.get(&key) {
            if let Ok(descriptor) = Arc::clone(entry).downcast::<EntityDescriptor<T>>() {
                return Ok(descriptor);
            }
        }

        let descriptor = Arc::new(EntityDescriptor::<T>::build()?);
        self.entries.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    /// Check whether a descriptor for `T` has been built.
    pub fn contains<T: Entity>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
