// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Field-level attribute parsing.
//!
//! ```rust,ignore
//! #[field(id)]
//! pub id: i64,
//!
//! #[field(unique, max_length = 16, description = "Login name")]
//! pub name: String,
//!
//! #[field(default = "low")]
//! pub level: String,
//!
//! #[field(auto_now)]
//! pub updated_at: DateTime<Utc>,
//!
//! #[belongs_to(User)]              // relation `author`, stored as `author_id`
//! pub author_id: Option<i64>,
//!
//! #[field(skip)]                   // not part of the schema
//! pub cache: Option<String>,
//! ```

use darling::FromField;
use syn::{Attribute, Ident, Lit, Type};

use crate::utils::docs::extract_doc_comments;

/// Raw `#[field(...)]` options, parsed by darling.
#[derive(Debug, FromField)]
#[darling(attributes(field), forward_attrs(doc, belongs_to))]
struct FieldAttrs {
    ident: Option<Ident>,
    ty:    Type,
    attrs: Vec<Attribute>,

    #[darling(default)]
    id:           bool,
    #[darling(default)]
    unique:       bool,
    #[darling(default)]
    max_length:   Option<usize>,
    #[darling(default)]
    description:  Option<String>,
    #[darling(default)]
    default:      Option<Lit>,
    #[darling(default)]
    default_fn:   Option<syn::Path>,
    #[darling(default)]
    auto_now:     bool,
    #[darling(default)]
    auto_now_add: bool,
    #[darling(default)]
    email:        bool,
    #[darling(default)]
    url:          bool,
    #[darling(default)]
    skip:         bool
}

/// Where a field's value comes from when it is not supplied.
#[derive(Debug, Clone)]
pub enum DefaultDef {
    None,
    Literal(Lit),
    Function(syn::Path)
}

/// One schema field.
#[derive(Debug)]
pub struct FieldDef {
    pub ident:        Ident,
    pub ty:           Type,
    pub is_id:        bool,
    pub unique:       bool,
    pub max_length:   Option<usize>,
    pub description:  Option<String>,
    pub default:      DefaultDef,
    pub auto_now:     bool,
    pub auto_now_add: bool,
    pub email:        bool,
    pub url:          bool,
    pub skip:         bool,
    /// Target entity of `#[belongs_to(Entity)]`.
    pub belongs_to:   Option<Ident>
}

impl FieldDef {
    /// Parse a named struct field.
    ///
    /// # Errors
    ///
    /// Unnamed fields, malformed options, both `default` and `default_fn`,
    /// and `#[belongs_to]` on a field not ending in `_id`.
    pub fn from_field(field: &syn::Field) -> darling::Result<Self> {
        let attrs = FieldAttrs::from_field(field)?;
        let ident = attrs.ident.ok_or_else(|| {
            darling::Error::custom("Resource fields must be named").with_span(field)
        })?;

        let default = match (attrs.default, attrs.default_fn) {
            (Some(_), Some(path)) => {
                return Err(darling::Error::custom(
                    "use either `default` or `default_fn`, not both"
                )
                .with_span(&path));
            }
            (Some(lit), None) => DefaultDef::Literal(lit),
            (None, Some(path)) => DefaultDef::Function(path),
            (None, None) => DefaultDef::None
        };

        let mut belongs_to = None;
        for attr in attrs.attrs.iter().filter(|a| a.path().is_ident("belongs_to")) {
            let target = attr.parse_args::<Ident>().map_err(darling::Error::from)?;
            if !ident.to_string().ends_with("_id") {
                return Err(darling::Error::custom(
                    "#[belongs_to] requires a field named `<relation>_id`"
                )
                .with_span(&ident));
            }
            belongs_to = Some(target);
        }

        let description = attrs
            .description
            .or_else(|| extract_doc_comments(&attrs.attrs));

        Ok(Self {
            ident,
            ty: attrs.ty,
            is_id: attrs.id,
            unique: attrs.unique,
            max_length: attrs.max_length,
            description,
            default,
            auto_now: attrs.auto_now,
            auto_now_add: attrs.auto_now_add,
            email: attrs.email,
            url: attrs.url,
            skip: attrs.skip,
            belongs_to
        })
    }

    #[must_use]
    pub fn name_str(&self) -> String {
        self.ident.to_string()
    }

    /// Relation name of a `belongs_to` field: `author_id` gives `author`.
    #[must_use]
    pub fn relation_name(&self) -> Option<String> {
        self.belongs_to.as_ref()?;
        self.name_str().strip_suffix("_id").map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> darling::Result<FieldDef> {
        let item: syn::ItemStruct = syn::parse_str(input).unwrap();
        let field = item.fields.iter().next().unwrap();
        FieldDef::from_field(field)
    }

    #[test]
    fn plain_field() {
        let field = parse("struct Foo { name: String }").unwrap();
        assert_eq!(field.name_str(), "name");
        assert!(!field.is_id);
        assert!(matches!(field.default, DefaultDef::None));
        assert_eq!(field.relation_name(), None);
    }

    #[test]
    fn options() {
        let field = parse(
            r#"
            struct Foo {
                #[field(unique, max_length = 16, default = "low", email)]
                name: String
            }
        "#
        )
        .unwrap();
        assert!(field.unique);
        assert!(field.email);
        assert_eq!(field.max_length, Some(16));
        assert!(matches!(field.default, DefaultDef::Literal(_)));
    }

    #[test]
    fn doc_comment_is_description() {
        let field = parse(
            r#"
            struct Foo {
                /// Display name.
                name: String
            }
        "#
        )
        .unwrap();
        assert_eq!(field.description.as_deref(), Some("Display name."));
    }

    #[test]
    fn belongs_to() {
        let field = parse("struct Foo { #[belongs_to(User)] author_id: Option<i64> }").unwrap();
        assert_eq!(field.belongs_to.as_ref().map(ToString::to_string).as_deref(), Some("User"));
        assert_eq!(field.relation_name().as_deref(), Some("author"));
    }

    #[test]
    fn belongs_to_needs_id_suffix() {
        assert!(parse("struct Foo { #[belongs_to(User)] author: i64 }").is_err());
    }

    #[test]
    fn default_and_default_fn_conflict() {
        assert!(parse("struct Foo { #[field(default = 1, default_fn = one)] n: i64 }").is_err());
    }
}
