// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Struct-level relation attributes.
//!
//! Relations that are not stored on this entity's row are declared on the
//! struct:
//!
//! ```rust,ignore
//! #[has_many(Post, field = "posts", via = "author")]   // Post.author_id -> User
//! #[many_to_many(Tag, field = "tags")]                 // link table
//! pub struct User { ... }
//! ```
//!
//! `field` defaults to the snake-cased target plus `s`; `via` defaults to
//! the snake-cased owning struct.

use convert_case::{Case, Casing};
use darling::{FromMeta, ast::NestedMeta};
use syn::{Attribute, Ident};

#[derive(Debug, Default, FromMeta)]
struct RelationOptions {
    #[darling(default)]
    field: Option<String>,
    #[darling(default)]
    via:   Option<String>
}

/// Relation kind declared on the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    ManyToMany
}

/// Parsed `#[has_many]` or `#[many_to_many]`.
#[derive(Debug)]
pub struct RelationDef {
    pub kind:   RelationKind,
    pub target: Ident,
    pub field:  String,
    /// Back-reference on the target; only for `has_many`.
    pub via:    Option<String>
}

/// Collect every relation attribute on the struct.
///
/// # Errors
///
/// A missing target entity, unknown options, or `via` on a many-to-many.
pub fn parse_relation_attrs(owner: &Ident, attrs: &[Attribute]) -> darling::Result<Vec<RelationDef>> {
    let mut errors = darling::Error::accumulator();
    let mut relations = Vec::new();

    for attr in attrs {
        let kind = if attr.path().is_ident("has_many") {
            RelationKind::HasMany
        } else if attr.path().is_ident("many_to_many") {
            RelationKind::ManyToMany
        } else {
            continue;
        };
        if let Some(relation) = errors.handle(parse_one(owner, kind, attr)) {
            relations.push(relation);
        }
    }

    errors.finish_with(relations)
}

fn parse_one(owner: &Ident, kind: RelationKind, attr: &Attribute) -> darling::Result<RelationDef> {
    let list = attr.meta.require_list().map_err(darling::Error::from)?;
    let items = NestedMeta::parse_meta_list(list.tokens.clone())?;
    let Some(NestedMeta::Meta(syn::Meta::Path(path))) = items.first() else {
        return Err(darling::Error::custom("expected the related entity first").with_span(attr));
    };
    let target = path
        .get_ident()
        .cloned()
        .ok_or_else(|| darling::Error::custom("expected an entity name").with_span(path))?;
    let options = RelationOptions::from_list(&items[1..])?;

    if kind == RelationKind::ManyToMany && options.via.is_some() {
        return Err(darling::Error::custom("`via` only applies to #[has_many]").with_span(attr));
    }

    let field = options
        .field
        .unwrap_or_else(|| format!("{}s", target.to_string().to_case(Case::Snake)));
    let via = match kind {
        RelationKind::HasMany => Some(
            options
                .via
                .unwrap_or_else(|| owner.to_string().to_case(Case::Snake))
        ),
        RelationKind::ManyToMany => None
    };

    Ok(RelationDef {
        kind,
        target,
        field,
        via
    })
}

#[cfg(test)]
mod tests {
    use proc_macro2::Span;

    use super::*;

    fn parse(input: &str) -> darling::Result<Vec<RelationDef>> {
        let item: syn::ItemStruct = syn::parse_str(input).unwrap();
        parse_relation_attrs(&Ident::new("User", Span::call_site()), &item.attrs)
    }

    #[test]
    fn defaults_from_names() {
        let relations = parse("#[has_many(BlogPost)] #[many_to_many(Tag)] struct User;").unwrap();
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].kind, RelationKind::HasMany);
        assert_eq!(relations[0].field, "blog_posts");
        assert_eq!(relations[0].via.as_deref(), Some("user"));
        assert_eq!(relations[1].field, "tags");
        assert_eq!(relations[1].via, None);
    }

    #[test]
    fn explicit_options() {
        let relations =
            parse(r#"#[has_many(Post, field = "articles", via = "author")] struct User;"#).unwrap();
        assert_eq!(relations[0].target, "Post");
        assert_eq!(relations[0].field, "articles");
        assert_eq!(relations[0].via.as_deref(), Some("author"));
    }

    #[test]
    fn via_on_many_to_many_is_rejected() {
        assert!(parse(r#"#[many_to_many(Tag, via = "x")] struct User;"#).is_err());
    }

    #[test]
    fn target_is_required() {
        assert!(parse(r#"#[has_many(field = "posts")] struct User;"#).is_err());
    }
}
