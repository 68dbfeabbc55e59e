//! Procedural macros for ormproxy.
//!
//! `ormproxy-macros` is the **compile-time codegen layer**. `#[derive(Entity)]`
//! turns a struct into a persistable entity by emitting a static field table
//! with accessor and mutator function pointers, so the runtime never has to
//! reflect over the type.
//!
//! These macros are used by application crates via the `ormproxy` facade.

use proc_macro::TokenStream;

mod infer;
mod parse;

use parse::{EntityDef, FieldDef, parse_entity};

/// Derive macro for the `Entity` trait.
///
/// This macro generates:
/// - `TYPE_PATH`, the module path plus type name, from which the table name
///   is derived
/// - a static `FieldInfo` table, one entry per field in declaration order
/// - primary key access
///
/// # Attributes
///
/// - `#[entity(primary_key)]` - Mark the `i64` field holding the row identity
///   (defaults to a field named `id`)
/// - `#[entity(skip)]` - Skip this field in database operations
///
/// Fields whose type has no column mapping still compile; building the
/// entity descriptor reports them as unsupported at runtime.
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
///     greeting: String,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let entity = match parse_entity(&input) {
        Ok(e) => e,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_entity_impl(&entity).into()
}

/// Generate the Entity trait implementation from the parsed definition.
fn generate_entity_impl(entity: &EntityDef) -> proc_macro2::TokenStream {
    let name = &entity.name;
    let name_str = name.to_string();
    let pk_ident = &entity.primary_key_field().ident;
    let field_infos: Vec<_> = entity
        .fields
        .iter()
        .map(|f| generate_field_info(name, f))
        .collect();

    quote::quote! {
        impl ::ormproxy_core::Entity for #name {
            const TYPE_PATH: &'static str = ::core::concat!(::core::module_path!(), "::", #name_str);

            fn fields() -> &'static [::ormproxy_core::FieldInfo<Self>] {
                static FIELDS: &[::ormproxy_core::FieldInfo<#name>] = &[
                    #(#field_infos),*
                ];
                FIELDS
            }

            fn primary_key(&self) -> i64 {
                self.#pk_ident
            }

            fn set_primary_key(&mut self, id: i64) {
                self.#pk_ident = id;
            }
        }
    }
}

/// Generate one `FieldInfo` entry.
///
/// Skipped fields and fields without a column mapping get inert accessors;
/// the descriptor never calls them.
fn generate_field_info(entity: &syn::Ident, field: &FieldDef) -> proc_macro2::TokenStream {
    let ident = &field.ident;
    let field_name = &field.name;
    let declared = field.declared_type();
    let primary_key = field.primary_key;
    let skip = field.skip;

    let (accessor, mutator) = if skip || !infer::is_supported_type(&field.ty) {
        (
            quote::quote! { |_: &#entity| ::ormproxy_core::Value::Null },
            quote::quote! {
                |_: &mut #entity, _: ::ormproxy_core::Value| ::core::result::Result::Ok(())
            },
        )
    } else {
        (
            quote::quote! {
                |e: &#entity| ::ormproxy_core::Value::from(::core::clone::Clone::clone(&e.#ident))
            },
            quote::quote! {
                |e: &mut #entity, v: ::ormproxy_core::Value| {
                    e.#ident = ::ormproxy_core::FromValue::from_value(&v)?;
                    ::core::result::Result::Ok(())
                }
            },
        )
    };

    quote::quote! {
        ::ormproxy_core::FieldInfo::new(#field_name, #declared, #accessor, #mutator)
            .primary_key(#primary_key)
            .transient(#skip)
    }
}
