// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! `impl Entity` generation.
//!
//! For
//!
//! ```rust,ignore
//! #[derive(Resource)]
//! #[resource(list_exclude(body))]
//! #[many_to_many(Tag)]
//! pub struct Post {
//!     #[field(id)]
//!     pub id: i64,
//!     pub body: String,
//!     #[belongs_to(User)]
//!     pub author_id: Option<i64>
//! }
//! ```
//!
//! the generator emits
//!
//! ```rust,ignore
//! impl ::restforge::Entity for Post {
//!     const NAME: &'static str = "Post";
//!
//!     fn schema() -> ::restforge::EntitySchema {
//!         ::restforge::EntitySchema::new("Post")
//!             .field(::restforge::FieldDescriptor::column::<i64>("id").primary_key())
//!             .field(::restforge::FieldDescriptor::column::<String>("body"))
//!             .field(::restforge::FieldDescriptor::to_one::<Option<i64>>("author", <User as ::restforge::Entity>::NAME))
//!             .field(::restforge::FieldDescriptor::to_many("tags", <Tag as ::restforge::Entity>::NAME))
//!             .list_exclude(["body"])
//!     }
//! }
//! ```

use proc_macro2::TokenStream;
use quote::quote;

use super::parse::{DefaultDef, FieldDef, RelationDef, RelationKind, ResourceDef};

pub fn generate(def: &ResourceDef) -> TokenStream {
    let ident = &def.ident;
    let name = &def.name;
    let (impl_generics, ty_generics, where_clause) = def.generics.split_for_impl();

    let fields = def.fields.iter().map(field_descriptor);
    let relations = def.relations.iter().map(relation_descriptor);
    let meta = meta_calls(def);

    quote! {
        impl #impl_generics ::restforge::Entity for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;

            fn schema() -> ::restforge::EntitySchema {
                ::restforge::EntitySchema::new(#name)
                    #(.field(#fields))*
                    #(.field(#relations))*
                    #(#meta)*
            }
        }
    }
}

fn field_descriptor(field: &FieldDef) -> TokenStream {
    let ty = &field.ty;

    let base = match (&field.belongs_to, field.relation_name()) {
        (Some(target), Some(relation)) => quote! {
            ::restforge::FieldDescriptor::to_one::<#ty>(#relation, <#target as ::restforge::Entity>::NAME)
        },
        _ => {
            let name = field.name_str();
            quote! { ::restforge::FieldDescriptor::column::<#ty>(#name) }
        }
    };

    let mut calls = Vec::new();
    if field.is_id {
        calls.push(quote! { .primary_key() });
    }
    if field.unique {
        calls.push(quote! { .unique() });
    }
    if let Some(max) = field.max_length {
        calls.push(quote! { .max_length(#max) });
    }
    if let Some(text) = &field.description {
        calls.push(quote! { .description(#text) });
    }
    match &field.default {
        DefaultDef::Literal(lit) => calls.push(quote! { .default_value(#lit) }),
        DefaultDef::Function(path) => calls.push(quote! { .default_fn(#path) }),
        DefaultDef::None => {}
    }
    if field.auto_now {
        calls.push(quote! { .auto_now() });
    }
    if field.auto_now_add {
        calls.push(quote! { .auto_now_add() });
    }
    if field.email {
        calls.push(quote! { .validator(::restforge::Validator::Email) });
    }
    if field.url {
        calls.push(quote! { .validator(::restforge::Validator::Url) });
    }

    quote! { #base #(#calls)* }
}

fn relation_descriptor(relation: &RelationDef) -> TokenStream {
    let target = &relation.target;
    let field = &relation.field;
    match (relation.kind, &relation.via) {
        (RelationKind::HasMany, Some(via)) => quote! {
            ::restforge::FieldDescriptor::reverse(#field, <#target as ::restforge::Entity>::NAME, #via)
        },
        _ => quote! {
            ::restforge::FieldDescriptor::to_many(#field, <#target as ::restforge::Entity>::NAME)
        }
    }
}

fn meta_calls(def: &ResourceDef) -> Vec<TokenStream> {
    let mut calls = Vec::new();
    for (method, list) in [
        (quote!(include), &def.include),
        (quote!(exclude), &def.exclude),
        (quote!(list_exclude), &def.list_exclude),
        (quote!(form_exclude), &def.form_exclude)
    ] {
        if !list.is_empty() {
            calls.push(quote! { .#method([#(#list),*]) });
        }
    }
    if let Some(depth) = def.max_recursion {
        calls.push(quote! { .max_recursion(#depth) });
    }
    if let Some(path) = &def.computed {
        calls.push(quote! { .computed_fields(#path()) });
    }
    if let Some(text) = &def.description {
        calls.push(quote! { .description(#text) });
    }
    if def.recoverable {
        calls.push(quote! { .recoverable() });
    }
    calls
}
