//! Semantic column types and the Rust type mapping.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;

/// The storage class a column is declared with.
///
/// Every persistable field resolves to exactly one of these. The set is
/// deliberately closed; anything else is an unsupported field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Int64,
    Float64,
    Text,
    Boolean,
    Bytes,
}

impl SemanticType {
    /// Resolve the semantic type of a declared Rust type.
    ///
    /// The declared type is the field's type as written (`"Option<i32>"`,
    /// `"Vec<u8>"`); whitespace is ignored and `Option<T>` resolves to `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ormproxy_core::SemanticType;
    ///
    /// assert_eq!(SemanticType::from_declared("u16"), Some(SemanticType::Int64));
    /// assert_eq!(SemanticType::from_declared("Option < String >"), Some(SemanticType::Text));
    /// assert_eq!(SemanticType::from_declared("HashMap<String, i32>"), None);
    /// ```
    pub fn from_declared(declared: &str) -> Option<Self> {
        let compact: String = declared.chars().filter(|c| !c.is_whitespace()).collect();
        let inner = unwrap_option(&compact);

        match inner {
            "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" => Some(SemanticType::Int64),
            "f32" | "f64" => Some(SemanticType::Float64),
            "String" | "std::string::String" | "char" => Some(SemanticType::Text),
            "bool" => Some(SemanticType::Boolean),
            "Vec<u8>" | "std::vec::Vec<u8>" => Some(SemanticType::Bytes),
            _ => None,
        }
    }

    /// Check whether a declared Rust type is nullable (`Option<T>`).
    pub fn is_optional(declared: &str) -> bool {
        let compact: String = declared.chars().filter(|c| !c.is_whitespace()).collect();
        unwrap_option(&compact).len() != compact.len()
    }

    /// Get the SQLite column type for this semantic type.
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SemanticType::Int64 | SemanticType::Boolean => "INTEGER",
            SemanticType::Float64 => "REAL",
            SemanticType::Text => "TEXT",
            SemanticType::Bytes => "BLOB",
        }
    }

    /// Coerce an engine value to this semantic type.
    ///
    /// NULL passes through unchanged. Values SQLite may legitimately hand back
    /// under a different storage class (integers in REAL columns, 0/1 for
    /// booleans) are converted; anything else is a type error.
    #[allow(clippy::result_large_err)]
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }

        let coerced = match (self, &value) {
            (SemanticType::Int64, _) => value.as_i64().map(Value::BigInt),
            (SemanticType::Float64, _) => value.as_f64().map(Value::Double),
            (SemanticType::Boolean, _) => value.as_bool().map(Value::Bool),
            (SemanticType::Text, Value::Text(_)) => Some(value.clone()),
            (SemanticType::Text, Value::Bytes(b)) => {
                Some(Value::Text(String::from_utf8_lossy(b).into_owned()))
            }
            (SemanticType::Bytes, Value::Bytes(_)) => Some(value.clone()),
            (SemanticType::Bytes, Value::Text(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),
            _ => None,
        };

        coerced.ok_or_else(|| {
            Error::Type(TypeError {
                expected: self.sql_name(),
                actual: value.type_name().to_string(),
                column: None,
                rust_type: None,
            })
        })
    }
}

fn unwrap_option(ty: &str) -> &str {
    ["Option<", "std::option::Option<", "core::option::Option<"]
        .iter()
        .find_map(|prefix| ty.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type_mapping() {
        for ty in ["i8", "i16", "i32", "i64", "u8", "u16", "u32"] {
            assert_eq!(SemanticType::from_declared(ty), Some(SemanticType::Int64));
        }
        assert_eq!(SemanticType::from_declared("f32"), Some(SemanticType::Float64));
        assert_eq!(SemanticType::from_declared("char"), Some(SemanticType::Text));
        assert_eq!(SemanticType::from_declared("bool"), Some(SemanticType::Boolean));
        assert_eq!(SemanticType::from_declared("Vec<u8>"), Some(SemanticType::Bytes));
        assert_eq!(
            SemanticType::from_declared("Option<Vec<u8>>"),
            Some(SemanticType::Bytes)
        );
        assert_eq!(SemanticType::from_declared("u64"), None);
        assert_eq!(SemanticType::from_declared("Vec<String>"), None);
        assert_eq!(SemanticType::from_declared("Value"), None);
    }

    #[test]
    fn test_optional_detection() {
        assert!(SemanticType::is_optional("Option<i64>"));
        assert!(SemanticType::is_optional("Option< String >"));
        assert!(!SemanticType::is_optional("i64"));
        assert!(!SemanticType::is_optional("Vec<u8>"));
    }

    #[test]
    fn test_sql_names() {
        assert_eq!(SemanticType::Int64.sql_name(), "INTEGER");
        assert_eq!(SemanticType::Boolean.sql_name(), "INTEGER");
        assert_eq!(SemanticType::Float64.sql_name(), "REAL");
        assert_eq!(SemanticType::Text.sql_name(), "TEXT");
        assert_eq!(SemanticType::Bytes.sql_name(), "BLOB");
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            SemanticType::Int64.coerce(Value::Int(5)).unwrap(),
            Value::BigInt(5)
        );
        assert_eq!(
            SemanticType::Float64.coerce(Value::BigInt(2)).unwrap(),
            Value::Double(2.0)
        );
        assert_eq!(
            SemanticType::Boolean.coerce(Value::BigInt(1)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            SemanticType::Bytes.coerce(Value::Text("ab".to_string())).unwrap(),
            Value::Bytes(b"ab".to_vec())
        );
        assert_eq!(SemanticType::Text.coerce(Value::Null).unwrap(), Value::Null);
        assert!(SemanticType::Int64.coerce(Value::Text("x".to_string())).is_err());
        assert!(SemanticType::Text.coerce(Value::BigInt(1)).is_err());
    }
}
