// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Parsing of a `#[derive(Resource)]` input into a [`ResourceDef`].
//!
//! ```text
//! parse.rs (coordinator)
//! ├── attrs.rs    - #[resource(...)] via darling
//! ├── field.rs    - #[field(...)], #[belongs_to(...)]
//! └── relation.rs - #[has_many(...)], #[many_to_many(...)]
//! ```

mod attrs;
mod field;
mod relation;

use darling::FromDeriveInput;
pub use field::{DefaultDef, FieldDef};
pub use relation::{RelationDef, RelationKind};
use syn::{DeriveInput, Generics, Ident};

use crate::utils::docs::extract_doc_comments;

/// Everything the generator needs about one entity.
#[derive(Debug)]
pub struct ResourceDef {
    pub ident:         Ident,
    pub generics:      Generics,
    /// Registry name.
    pub name:          String,
    pub description:   Option<String>,
    pub fields:        Vec<FieldDef>,
    pub relations:     Vec<RelationDef>,
    pub max_recursion: Option<usize>,
    pub include:       Vec<String>,
    pub exclude:       Vec<String>,
    pub list_exclude:  Vec<String>,
    pub form_exclude:  Vec<String>,
    pub computed:      Option<syn::Path>,
    pub recoverable:   bool
}

impl ResourceDef {
    /// Parse and check a derive input.
    ///
    /// # Errors
    ///
    /// Anything but a struct with named fields, malformed attributes, and
    /// a primary key count other than one. Field errors are accumulated.
    pub fn from_derive_input(input: &DeriveInput) -> darling::Result<Self> {
        let named = match &input.data {
            syn::Data::Struct(data) => match &data.fields {
                syn::Fields::Named(named) => named,
                _ => {
                    return Err(darling::Error::custom("Resource requires named fields")
                        .with_span(&input.ident));
                }
            },
            _ => {
                return Err(
                    darling::Error::custom("Resource can only be derived for structs")
                        .with_span(&input.ident)
                );
            }
        };

        let attrs = attrs::ResourceAttrs::from_derive_input(input)?;
        let mut errors = darling::Error::accumulator();

        let fields: Vec<FieldDef> = named
            .named
            .iter()
            .filter_map(|field| errors.handle(FieldDef::from_field(field)))
            .filter(|field| !field.skip)
            .collect();
        let relations = errors
            .handle(relation::parse_relation_attrs(&attrs.ident, &attrs.attrs))
            .unwrap_or_default();

        let ids = fields.iter().filter(|f| f.is_id).count();
        if ids != 1 {
            errors.push(
                darling::Error::custom("Resource requires exactly one #[field(id)] field")
                    .with_span(&attrs.ident)
            );
        }

        errors.finish()?;

        Ok(Self {
            name: attrs.name.unwrap_or_else(|| attrs.ident.to_string()),
            description: extract_doc_comments(&attrs.attrs),
            fields,
            relations,
            max_recursion: attrs.max_recursion,
            include: attrs::names(&attrs.include),
            exclude: attrs::names(&attrs.exclude),
            list_exclude: attrs::names(&attrs.list_exclude),
            form_exclude: attrs::names(&attrs.form_exclude),
            computed: attrs.computed,
            recoverable: attrs.recoverable,
            ident: attrs.ident,
            generics: attrs.generics
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> darling::Result<ResourceDef> {
        let input: DeriveInput = syn::parse_str(input).unwrap();
        ResourceDef::from_derive_input(&input)
    }

    #[test]
    fn skipped_fields_are_dropped() {
        let def = parse(
            r#"
            /// A post.
            struct Post {
                #[field(id)]
                id: i64,
                title: String,
                #[field(skip)]
                cache: String
            }
        "#
        )
        .unwrap();
        assert_eq!(def.name, "Post");
        assert_eq!(def.description.as_deref(), Some("A post."));
        let names: Vec<String> = def.fields.iter().map(FieldDef::name_str).collect();
        assert_eq!(names, ["id", "title"]);
    }

    #[test]
    fn exactly_one_id() {
        assert!(parse("struct Post { title: String }").is_err());
        assert!(parse("struct Post { #[field(id)] a: i64, #[field(id)] b: i64 }").is_err());
    }

    #[test]
    fn tuple_structs_are_rejected() {
        assert!(parse("struct Post(i64);").is_err());
    }

    #[test]
    fn enums_are_rejected() {
        assert!(parse("enum Post { A }").is_err());
    }
}
