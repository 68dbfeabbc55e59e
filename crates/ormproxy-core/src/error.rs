//! Error types for ormproxy operations.

use std::fmt;

/// The primary error type for all ormproxy operations.
#[derive(Debug)]
pub enum Error {
    /// Neither a connection helper nor an external connection was configured
    Unconfigured,
    /// A predicate-bounded operation was issued without a WHERE predicate
    MissingPredicate(&'static str),
    /// An entity field's declared type has no column mapping
    UnsupportedFieldType {
        entity: &'static str,
        field: &'static str,
        declared: &'static str,
    },
    /// Connection-related errors (open, close, lock poisoning)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Schema, descriptor and upgrade errors
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// Failed to close the database
    Close,
    /// Handle used after it was closed
    Disconnected,
    /// The proxy lock was poisoned by a panicking holder
    Poisoned,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database busy or locked
    Deadlock,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Already committed
    AlreadyCommitted,
    /// Already rolled back
    AlreadyRolledBack,
    /// Nested transaction not supported
    NestedNotSupported,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Entity declares no primary key, or more than one
    PrimaryKey,
    /// Two fields map to the same column
    DuplicateColumn,
    /// Invalid schema definition
    Invalid,
    /// Upgrade error, including refused downgrades
    Migration,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Is this a retryable error (busy or locked database)?
    ///
    /// No retries are performed internally; callers may use this to decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(q.kind, QueryErrorKind::Deadlock),
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reopening?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect | ConnectionErrorKind::Disconnected
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Is this a failure of entity configuration rather than of the database?
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Unconfigured
                | Error::UnsupportedFieldType { .. }
                | Error::Schema(_)
                | Error::Config(_)
        )
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a constraint violation (unique, not null, check, foreign key)?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == QueryErrorKind::Constraint
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unconfigured => write!(
                f,
                "Unconfigured: no database name/version or external database was set"
            ),
            Error::MissingPredicate(op) => write!(f, "{}: missing WHERE predicate", op),
            Error::UnsupportedFieldType {
                entity,
                field,
                declared,
            } => write!(
                f,
                "Unsupported field type: {}.{} is declared as '{}'",
                entity, field, declared
            ),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Schema(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for ormproxy operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_and_connection_flags() {
        let busy = Error::Query(QueryError {
            kind: QueryErrorKind::Deadlock,
            sql: Some("INSERT INTO t VALUES (1)".to_string()),
            message: "database is locked".to_string(),
            source: None,
        });
        assert!(busy.is_retryable());
        assert!(!busy.is_connection_error());
        assert_eq!(busy.sql(), Some("INSERT INTO t VALUES (1)"));

        let closed = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "connection is closed".to_string(),
            source: None,
        });
        assert!(closed.is_connection_error());
        assert!(!closed.is_retryable());

        let poisoned = Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Poisoned,
            message: "proxy lock poisoned".to_string(),
            source: None,
        });
        assert!(!poisoned.is_connection_error());
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(Error::Unconfigured.is_configuration_error());
        assert!(
            Error::UnsupportedFieldType {
                entity: "Note",
                field: "tags",
                declared: "Vec<String>",
            }
            .is_configuration_error()
        );
        assert!(!Error::MissingPredicate("update").is_configuration_error());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::MissingPredicate("update").to_string(),
            "update: missing WHERE predicate"
        );
        let err = Error::UnsupportedFieldType {
            entity: "Note",
            field: "tags",
            declared: "Vec<String>",
        };
        assert_eq!(
            err.to_string(),
            "Unsupported field type: Note.tags is declared as 'Vec<String>'"
        );
        let type_err = Error::Type(TypeError {
            expected: "i64",
            actual: "TEXT".to_string(),
            column: Some("age".to_string()),
            rust_type: None,
        });
        assert_eq!(
            type_err.to_string(),
            "Type error in column 'age': expected i64, found TEXT"
        );
    }

    #[test]
    fn constraint_helper() {
        let q = QueryError {
            kind: QueryErrorKind::Constraint,
            sql: None,
            message: "UNIQUE constraint failed".to_string(),
            source: None,
        };
        assert!(q.is_constraint_violation());
    }
}
