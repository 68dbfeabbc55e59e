//! Parsing logic for the Entity derive macro.
//!
//! This module extracts field-level attributes from the derive input to build
//! the `EntityDef` and `FieldDef` structures used for code generation.

use crate::infer;
use proc_macro2::Span;
use syn::ext::IdentExt;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, Result, Type};

/// Parsed entity definition from a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name (e.g., `User`).
    pub name: Ident,
    /// Parsed field definitions, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Index into `fields` of the primary-key field.
    pub primary_key: usize,
}

impl EntityDef {
    pub fn primary_key_field(&self) -> &FieldDef {
        &self.fields[self.primary_key]
    }
}

/// Parsed field definition from a struct field.
#[derive(Debug)]
pub struct FieldDef {
    /// The Rust field identifier as written (may be raw, e.g. `r#type`).
    pub ident: Ident,
    /// The field name without the raw prefix.
    pub name: String,
    /// The Rust type of the field.
    pub ty: Type,
    /// Whether this field holds the row identity.
    pub primary_key: bool,
    /// Skip this field entirely in database operations.
    pub skip: bool,
}

impl FieldDef {
    /// The type as written, whitespace removed, e.g. `"Option<i32>"`.
    pub fn declared_type(&self) -> String {
        infer::type_to_string(&self.ty)
    }
}

/// Parse a derive input into an entity definition.
///
/// Returns an error if:
/// - The input is not a struct with named fields
/// - The struct is generic
/// - Unknown attributes are present
/// - There is no primary key, more than one, or it is not `i64`
pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    let primary_key = resolve_primary_key(&name, &fields)?;

    Ok(EntityDef {
        name,
        fields,
        primary_key,
    })
}

/// Explicit `#[entity(primary_key)]` wins; otherwise a field named `id`.
fn resolve_primary_key(name: &Ident, fields: &[FieldDef]) -> Result<usize> {
    let marked: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.primary_key)
        .map(|(i, _)| i)
        .collect();

    let index = match marked.as_slice() {
        [index] => *index,
        [] => fields
            .iter()
            .position(|f| f.name == "id" && !f.skip)
            .ok_or_else(|| {
                Error::new_spanned(
                    name,
                    "Entity needs a primary key: add `#[entity(primary_key)]` or an `id: i64` field",
                )
            })?,
        [_, second, ..] => {
            return Err(Error::new_spanned(
                &fields[*second].ident,
                "only one field may be marked #[entity(primary_key)]",
            ));
        }
    };

    let field = &fields[index];
    if !infer::is_i64(&field.ty) {
        return Err(Error::new_spanned(
            &field.ty,
            "the primary key field must have type `i64`",
        ));
    }
    Ok(index)
}

/// Parse all fields from a struct.
fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Entity requires a struct with fields, not a unit struct",
        )),
    }
}

/// Parse a single field and its attributes.
fn parse_field(field: &Field) -> Result<FieldDef> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let attrs = parse_field_attrs(&field.attrs)?;
    if attrs.primary_key && attrs.skip {
        return Err(Error::new_spanned(
            &ident,
            "a primary key field cannot be skipped",
        ));
    }

    Ok(FieldDef {
        name: ident.unraw().to_string(),
        ident,
        ty: field.ty.clone(),
        primary_key: attrs.primary_key,
        skip: attrs.skip,
    })
}

/// Intermediate struct for collecting field attributes.
#[derive(Default)]
struct FieldAttrs {
    primary_key: bool,
    skip: bool,
}

/// Parse all `#[entity(...)]` attributes on a field.
fn parse_field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                result.primary_key = true;
            } else if meta.path.is_ident("skip") {
                result.skip = true;
            } else {
                return Err(meta.error(
                    "unknown entity attribute, expected `primary_key` or `skip`",
                ));
            }
            Ok(())
        })?;
    }

    Ok(result)
}
