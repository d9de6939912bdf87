// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Struct-level `#[resource(...)]` parsing with darling.
//!
//! | Attribute | Default | Description |
//! |-----------|---------|-------------|
//! | `name` | struct name | Registry name |
//! | `max_recursion` | `1` | Nesting depth of expanded relations |
//! | `include(a, b)` | all fields | Only these fields are projected |
//! | `exclude(a, b)` | none | Removed from every view |
//! | `list_exclude(a, b)` | none | Removed from list views |
//! | `form_exclude(a, b)` | none | Removed from forms |
//! | `computed = path` | none | `fn() -> Vec<ComputedField>` |
//! | `recoverable` | `false` | Soft delete |

use darling::{FromDeriveInput, util::PathList};
use syn::{Attribute, Generics, Ident};

/// Parsed `#[resource(...)]`.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(resource), forward_attrs(doc, has_many, many_to_many))]
pub struct ResourceAttrs {
    pub ident:    Ident,
    pub generics: Generics,
    pub attrs:    Vec<Attribute>,

    #[darling(default)]
    pub name: Option<String>,

    #[darling(default)]
    pub max_recursion: Option<usize>,

    #[darling(default)]
    pub include: PathList,

    #[darling(default)]
    pub exclude: PathList,

    #[darling(default)]
    pub list_exclude: PathList,

    #[darling(default)]
    pub form_exclude: PathList,

    /// Function returning the entity's computed fields.
    #[darling(default)]
    pub computed: Option<syn::Path>,

    #[darling(default)]
    pub recoverable: bool
}

/// Field names of a path list such as `list_exclude(body, secret)`.
pub fn names(list: &PathList) -> Vec<String> {
    list.iter()
        .filter_map(|path| path.get_ident().map(ToString::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ResourceAttrs {
        let input: syn::DeriveInput = syn::parse_str(input).unwrap();
        ResourceAttrs::from_derive_input(&input).unwrap()
    }

    #[test]
    fn defaults() {
        let attrs = parse("struct Post { id: i64 }");
        assert_eq!(attrs.name, None);
        assert_eq!(attrs.max_recursion, None);
        assert!(names(&attrs.include).is_empty());
        assert!(!attrs.recoverable);
    }

    #[test]
    fn full() {
        let attrs = parse(
            r#"
            #[resource(
                name = "Article",
                max_recursion = 2,
                list_exclude(body, secret),
                computed = post_computed,
                recoverable
            )]
            struct Post { id: i64 }
        "#
        );
        assert_eq!(attrs.name.as_deref(), Some("Article"));
        assert_eq!(attrs.max_recursion, Some(2));
        assert_eq!(names(&attrs.list_exclude), ["body", "secret"]);
        assert!(attrs.computed.is_some());
        assert!(attrs.recoverable);
    }
}
