//! Rust type inspection for entity fields.
//!
//! The derive only needs to know whether a field can be read into a `Value`
//! and written back from one; the storage class itself is resolved at
//! runtime from the declared type string.

use syn::{GenericArgument, PathArguments, Type};

/// Types with `From<T> for Value` and `FromValue` impls in ormproxy-core.
const SUPPORTED: &[&str] = &[
    "i8",
    "i16",
    "i32",
    "i64",
    "u8",
    "u16",
    "u32",
    "f32",
    "f64",
    "String",
    "std::string::String",
    "char",
    "bool",
    "Vec<u8>",
    "std::vec::Vec<u8>",
];

/// Whether the field type maps to a column, looking through `Option<T>`.
pub fn is_supported_type(ty: &Type) -> bool {
    let inner = unwrap_option_type(ty);
    SUPPORTED.contains(&type_to_string(inner).as_str())
}

/// Whether the field type is exactly `i64`, as a primary key must be.
pub fn is_i64(ty: &Type) -> bool {
    type_to_string(ty) == "i64"
}

/// Unwrap Option<T> to get the inner type, or return the original type.
fn unwrap_option_type(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

/// Convert a Type to a simplified string representation for matching.
pub fn type_to_string(ty: &Type) -> String {
    use quote::ToTokens;
    ty.to_token_stream().to_string().replace(' ', "")
}
