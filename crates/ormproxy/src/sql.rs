//! SQL text for the proxy's statements.
//!
//! Identifiers derived from entities are always quoted. Caller predicates are
//! inserted verbatim and bind their own `?` parameters, which follow any
//! values the statement itself binds.

use ormproxy_core::{ColumnValues, PRIMARY_KEY, Value, quote_ident};

/// Clauses appended to a `SELECT` over an entity table.
///
/// Empty or whitespace-only clauses are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    /// Raw LIMIT clause, e.g. `"10"` or `"20, 10"`.
    pub limit: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by = Some(clause.into());
        self
    }

    pub fn having(mut self, clause: impl Into<String>) -> Self {
        self.having = Some(clause.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, clause: impl Into<String>) -> Self {
        self.limit = Some(clause.into());
        self
    }

    /// Limit to one page of results. Pages are numbered from 1; page 0 is
    /// treated as page 1.
    ///
    /// ```
    /// use ormproxy::QueryOptions;
    ///
    /// assert_eq!(QueryOptions::page(3, 20).limit.as_deref(), Some("40, 20"));
    /// assert_eq!(QueryOptions::page(0, 5).limit.as_deref(), Some("0, 5"));
    /// ```
    pub fn page(page_number: u32, page_size: u32) -> Self {
        let offset = u64::from(page_number.max(1) - 1) * u64::from(page_size);
        Self::new().limit(format!("{}, {}", offset, page_size))
    }
}

/// A predicate that is absent, empty or only whitespace counts as missing.
pub fn predicate(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|p| !p.is_empty())
}

/// `"_key_id" = ?`, bound to `key`.
pub fn key_predicate(key: i64) -> (String, Vec<Value>) {
    (format!("{} = ?", quote_ident(PRIMARY_KEY)), vec![Value::BigInt(key)])
}

pub fn insert(table: &str, row: &ColumnValues) -> (String, Vec<Value>) {
    let columns: Vec<_> = row.columns().map(quote_ident).collect();
    let placeholders = vec!["?"; columns.len()];
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, row.values().cloned().collect())
}

pub fn update(
    table: &str,
    row: &ColumnValues,
    predicate: &str,
    args: &[Value],
) -> (String, Vec<Value>) {
    let set_clauses: Vec<_> = row
        .columns()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        set_clauses.join(", "),
        predicate
    );

    let mut params: Vec<Value> = row.values().cloned().collect();
    params.extend_from_slice(args);
    (sql, params)
}

pub fn delete(table: &str, predicate: Option<&str>) -> String {
    let mut sql = format!("DELETE FROM {}", quote_ident(table));
    push_clause(&mut sql, "WHERE", predicate);
    sql
}

pub fn count(table: &str, predicate: Option<&str>) -> String {
    let mut sql = format!(
        "SELECT COUNT({}) AS count FROM {}",
        quote_ident(PRIMARY_KEY),
        quote_ident(table)
    );
    push_clause(&mut sql, "WHERE", predicate);
    sql
}

pub fn primary_key(table: &str, predicate: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} LIMIT 1",
        quote_ident(PRIMARY_KEY),
        quote_ident(table),
        predicate
    )
}

pub fn select(table: &str, predicate: Option<&str>, options: &QueryOptions) -> String {
    let mut sql = format!("SELECT * FROM {}", quote_ident(table));
    push_clause(&mut sql, "WHERE", predicate);
    push_clause(&mut sql, "GROUP BY", options.group_by.as_deref());
    push_clause(&mut sql, "HAVING", options.having.as_deref());
    push_clause(&mut sql, "ORDER BY", options.order_by.as_deref());
    push_clause(&mut sql, "LIMIT", options.limit.as_deref());
    sql
}

fn push_clause(sql: &mut String, keyword: &str, clause: Option<&str>) {
    if let Some(clause) = predicate(clause) {
        sql.push(' ');
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(clause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ColumnValues {
        let mut row = ColumnValues::new();
        row.put("_key_id", Value::Null);
        row.put("name", Value::Text("ada".to_string()));
        row.put("age", Value::Int(36));
        row
    }

    #[test]
    fn test_insert_sql() {
        let (sql, params) = insert("app_user", &row());
        assert_eq!(
            sql,
            "INSERT INTO \"app_user\" (\"_key_id\", \"name\", \"age\") VALUES (?, ?, ?)"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], Value::Null);
    }

    #[test]
    fn test_update_sql_appends_predicate_args() {
        let mut values = row();
        values.remove("_key_id");
        let (sql, params) = update("app_user", &values, "age > ?", &[Value::Int(30)]);
        assert_eq!(
            sql,
            "UPDATE \"app_user\" SET \"name\" = ?, \"age\" = ? WHERE age > ?"
        );
        assert_eq!(params.last(), Some(&Value::Int(30)));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_key_predicate() {
        let (sql, args) = key_predicate(9);
        assert_eq!(sql, "\"_key_id\" = ?");
        assert_eq!(args, vec![Value::BigInt(9)]);
    }

    #[test]
    fn test_delete_and_count_sql() {
        assert_eq!(delete("note", None), "DELETE FROM \"note\"");
        assert_eq!(
            delete("note", Some("body = ?")),
            "DELETE FROM \"note\" WHERE body = ?"
        );
        assert_eq!(
            count("note", Some("  ")),
            "SELECT COUNT(\"_key_id\") AS count FROM \"note\""
        );
    }

    #[test]
    fn test_select_with_options() {
        let options = QueryOptions::new()
            .group_by("age")
            .having("COUNT(*) > 1")
            .order_by("age DESC")
            .limit("5");
        assert_eq!(
            select("app_user", Some("age > ?"), &options),
            "SELECT * FROM \"app_user\" WHERE age > ? GROUP BY age HAVING COUNT(*) > 1 ORDER BY age DESC LIMIT 5"
        );
        assert_eq!(
            select("app_user", None, &QueryOptions::default()),
            "SELECT * FROM \"app_user\""
        );
    }

    #[test]
    fn test_primary_key_sql() {
        assert_eq!(
            primary_key("note", "body = ?"),
            "SELECT \"_key_id\" FROM \"note\" WHERE body = ? LIMIT 1"
        );
    }

    #[test]
    fn test_predicate_normalization() {
        assert_eq!(predicate(None), None);
        assert_eq!(predicate(Some(" \t")), None);
        assert_eq!(predicate(Some(" a = 1 ")), Some("a = 1"));
    }

    #[test]
    fn test_page_limits() {
        assert_eq!(QueryOptions::page(1, 10).limit.as_deref(), Some("0, 10"));
        assert_eq!(QueryOptions::page(2, 10).limit.as_deref(), Some("10, 10"));
    }
}
