// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Doc comment extraction.
//!
//! `///` comments arrive as `#[doc = "..."]` attributes. Their text becomes
//! the entity or field description when no explicit `description` is given,
//! and from there ends up in the OpenAPI schema.

use syn::Attribute;

/// Joined doc comment lines, or `None` when there are none.
pub fn extract_doc_comments(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| {
            if let syn::Meta::NameValue(meta) = &attr.meta
                && let syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(text),
                    ..
                }) = &meta.value
            {
                return Some(text.value().trim().to_string());
            }
            None
        })
        .collect();

    let joined = lines.join("\n").trim().to_string();
    if joined.is_empty() { None } else { Some(joined) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(input: &str) -> Vec<Attribute> {
        let item: syn::ItemStruct = syn::parse_str(input).unwrap();
        item.attrs
    }

    #[test]
    fn joins_lines() {
        let attrs = attrs(
            r#"
            /// Blog post.
            ///
            /// Written by a user.
            struct Post;
        "#
        );
        assert_eq!(
            extract_doc_comments(&attrs).as_deref(),
            Some("Blog post.\n\nWritten by a user.")
        );
    }

    #[test]
    fn none_without_docs() {
        let attrs = attrs("#[derive(Debug)] struct Post;");
        assert_eq!(extract_doc_comments(&attrs), None);
    }
}
