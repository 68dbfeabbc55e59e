//! Table layouts and SQLite DDL generation.

use crate::entity::PRIMARY_KEY;
use crate::identifiers::quote_ident;
use crate::types::SemanticType;

/// A non-key column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    name: String,
    semantic_type: SemanticType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.semantic_type
    }

    fn definition(&self) -> String {
        format!("{} {}", quote_ident(&self.name), self.semantic_type.sql_name())
    }
}

/// The persisted layout of one entity type.
///
/// Every table carries the reserved [`PRIMARY_KEY`] column; `columns` holds
/// the remaining ones in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    ///
    /// # Examples
    ///
    /// ```
    /// use ormproxy_core::{ColumnSchema, SemanticType, TableSchema};
    ///
    /// let table = TableSchema::new("note", vec![ColumnSchema::new("body", SemanticType::Text)]);
    /// assert_eq!(
    ///     table.create_sql(),
    ///     "CREATE TABLE IF NOT EXISTS \"note\" (\"_key_id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"body\" TEXT)"
    /// );
    /// ```
    pub fn create_sql(&self) -> String {
        let mut parts = Vec::with_capacity(self.columns.len() + 1);
        parts.push(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(PRIMARY_KEY)
        ));
        parts.extend(self.columns.iter().map(ColumnSchema::definition));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            parts.join(", ")
        )
    }

    /// `ALTER TABLE ... ADD COLUMN` statement for one of this table's columns.
    pub fn add_column_sql(&self, column: &ColumnSchema) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(&self.name),
            column.definition()
        )
    }

    /// Columns not present in `existing`, in declaration order.
    pub fn missing_columns<'a>(&'a self, existing: &[String]) -> Vec<&'a ColumnSchema> {
        self.columns
            .iter()
            .filter(|c| !existing.iter().any(|e| e.eq_ignore_ascii_case(&c.name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_table() -> TableSchema {
        TableSchema::new(
            "app_user",
            vec![
                ColumnSchema::new("name", SemanticType::Text),
                ColumnSchema::new("age", SemanticType::Int64),
                ColumnSchema::new("avatar", SemanticType::Bytes),
            ],
        )
    }

    #[test]
    fn test_create_sql() {
        assert_eq!(
            user_table().create_sql(),
            "CREATE TABLE IF NOT EXISTS \"app_user\" (\"_key_id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"name\" TEXT, \"age\" INTEGER, \"avatar\" BLOB)"
        );
    }

    #[test]
    fn test_add_column_sql() {
        let table = user_table();
        assert_eq!(
            table.add_column_sql(&table.columns()[1]),
            "ALTER TABLE \"app_user\" ADD COLUMN \"age\" INTEGER"
        );
    }

    #[test]
    fn test_missing_columns() {
        let table = user_table();
        let existing = vec!["_key_id".to_string(), "NAME".to_string()];
        let missing: Vec<_> = table
            .missing_columns(&existing)
            .into_iter()
            .map(ColumnSchema::name)
            .collect();
        assert_eq!(missing, vec!["age", "avatar"]);
    }
}
