// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![deny(unsafe_code)]

//! Proc-macro implementation for restforge. Use the `restforge` crate.
//!
//! # Attribute Quick Reference
//!
//! ## Struct-Level
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize, Resource)]
//! #[resource(
//!     name = "Post",              // Optional: registry name (default: struct name)
//!     max_recursion = 2,          // Optional: nesting depth of expanded relations
//!     include(id, title),         // Optional: only these fields are projected
//!     exclude(secret),            // Optional: removed from every view
//!     list_exclude(body),         // Optional: removed from list views
//!     form_exclude(views),        // Optional: removed from forms
//!     computed = post_computed,   // Optional: fn() -> Vec<ComputedField>
//!     recoverable                 // Optional: soft delete
//! )]
//! #[has_many(Comment, field = "comments", via = "post")]
//! #[many_to_many(Tag, field = "tags")]
//! pub struct Post { /* ... */ }
//! ```
//!
//! ## Field-Level
//!
//! ```rust,ignore
//! pub struct Post {
//!     #[field(id)]                        // Primary key, generated when absent
//!     pub id: i64,
//!
//!     #[field(max_length = 120, description = "Headline")]
//!     pub title: String,
//!
//!     #[field(default = 0)]               // Constant default
//!     pub views: i64,
//!
//!     #[field(auto_now_add)]              // Stamped on insert
//!     pub created_at: DateTime<Utc>,
//!
//!     #[field(auto_now)]                  // Stamped on every write
//!     pub updated_at: DateTime<Utc>,
//!
//!     #[field(url)]                       // Also: email
//!     pub link: Option<String>,
//!
//!     #[belongs_to(User)]                 // Relation `author`
//!     pub author_id: Option<i64>,
//!
//!     #[field(skip)]                      // Not part of the schema
//!     pub cache: Option<String>
//! }
//! ```
//!
//! `///` comments on the struct and its fields become descriptions unless
//! `description` is given.

mod resource;
mod utils;

use proc_macro::TokenStream;

/// Derive [`Entity`] and its schema from an annotated struct.
///
/// The struct must also implement `Serialize` and `Deserialize`, and have
/// exactly one `#[field(id)]`.
///
/// [`Entity`]: https://docs.rs/restforge/latest/restforge/trait.Entity.html
#[proc_macro_derive(Resource, attributes(resource, field, belongs_to, has_many, many_to_many))]
pub fn derive_resource(input: TokenStream) -> TokenStream {
    resource::derive(input)
}
