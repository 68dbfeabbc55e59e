//! Entity trait for struct-to-table mapping.
//!
//! The `Entity` trait is the contract for structs that are persisted as one
//! table row per instance. It is typically derived using `#[derive(Entity)]`
//! from `ormproxy-macros`, which emits a static field table so no runtime
//! reflection is needed.

use crate::field::FieldInfo;

/// Reserved primary-key column name shared by every entity table.
pub const PRIMARY_KEY: &str = "_key_id";

/// Trait for types that can be mapped to database tables.
///
/// # Example
///
/// ```ignore
/// use ormproxy::Entity;
///
/// #[derive(Entity, Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
///     age: i32,
///     #[entity(skip)]
///     display_cache: String,
/// }
/// ```
pub trait Entity: Default + 'static {
    /// Fully qualified Rust path of the type, e.g. `"app::model::User"`.
    ///
    /// The table name is derived from this path.
    const TYPE_PATH: &'static str;

    /// Static metadata for every field, in declaration order.
    fn fields() -> &'static [FieldInfo<Self>];

    /// Current row identity; values below 1 mean "never persisted".
    fn primary_key(&self) -> i64;

    /// Store the row identity assigned by the database.
    fn set_primary_key(&mut self, id: i64);

    /// Unqualified type name, used in diagnostics.
    fn type_name() -> &'static str {
        Self::TYPE_PATH
            .rsplit("::")
            .next()
            .unwrap_or(Self::TYPE_PATH)
    }

    /// Whether this instance has been assigned a row identity.
    fn is_persisted(&self) -> bool {
        self.primary_key() >= 1
    }
}

/// Derive a table name from a fully qualified type path.
///
/// Each `::`-separated segment is converted to snake_case and the segments
/// are joined with `_`, so `app::model::UserInfo` becomes
/// `app_model_user_info`.
///
/// # Examples
///
/// ```
/// use ormproxy_core::table_name_for;
///
/// assert_eq!(table_name_for("app::model::UserInfo"), "app_model_user_info");
/// assert_eq!(table_name_for("Note"), "note");
/// ```
pub fn table_name_for(type_path: &str) -> String {
    type_path
        .split("::")
        .filter(|segment| !segment.is_empty())
        .map(to_snake_case)
        .collect::<Vec<_>>()
        .join("_")
}

/// Convert a field or type name to snake_case.
///
/// Acronyms are kept together: `HTTPStatus` becomes `http_status`.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                let prev_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
                let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
                // "FooBar" -> "foo_bar": insert _ when prev is lowercase
                // "HTTPStatus" -> "http_status": insert _ at the acronym boundary
                if prev_lower || (next_lower && chars[i - 1].is_uppercase()) {
                    result.push('_');
                }
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
