// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Resource derive macro implementation.
//!
//! ```text
//! resource.rs (orchestrator)
//! │
//! ├── parse/     → ResourceDef, FieldDef, RelationDef
//! └── schema.rs  → impl Entity { NAME, schema() }
//! ```
//!
//! Everything else (views, validation, persistence, routing) is built at
//! runtime from the emitted schema, so the generated code stays one impl.

pub mod parse;
mod schema;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

use self::parse::ResourceDef;

/// Main entry point for the Resource derive macro.
pub fn derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ResourceDef::from_derive_input(&input) {
        Ok(def) => schema::generate(&def).into(),
        Err(err) => err.write_errors().into()
    }
}
