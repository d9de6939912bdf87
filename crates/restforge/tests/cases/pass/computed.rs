// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

use restforge::{ComputedField, Entity, FieldType, Resource, serde_json::json};
use serde::{Deserialize, Serialize};

fn note_computed() -> Vec<ComputedField> {
    vec![ComputedField::new("shout").of_type(FieldType::Str).getter(|record| {
        Ok(json!(record.get_str("text").unwrap_or_default().to_uppercase()))
    })]
}

fn today() -> restforge::serde_json::Value {
    json!("2026-01-01")
}

#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
#[resource(name = "Memo", computed = note_computed, form_exclude(stamp))]
pub struct Note {
    #[field(id)]
    pub id: uuid::Uuid,
    pub text: String,
    #[field(default_fn = today)]
    pub stamp: String,
    #[field(url)]
    pub link: Option<String>,
}

fn main() {
    assert_eq!(Note::NAME, "Memo");
    let schema = Note::schema();
    assert!(schema.computed_field("shout").is_some());
    assert_eq!(schema.meta().form_exclude, vec!["stamp".to_string()]);
}
