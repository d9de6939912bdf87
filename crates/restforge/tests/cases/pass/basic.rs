// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

use restforge::{Entity, Resource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
pub struct Tag {
    #[field(id)]
    pub id: i64,
    #[field(unique, max_length = 32)]
    pub label: String,
}

fn main() {
    assert_eq!(Tag::NAME, "Tag");
    let schema = Tag::schema();
    assert_eq!(schema.pk_name(), "id");
    assert!(schema.has_column("label"));
}
