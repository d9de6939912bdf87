// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use restforge::{Registry, Resource};
use serde::{Deserialize, Serialize};

/// Account.
#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
#[has_many(Post, field = "posts", via = "author")]
pub struct User {
    #[field(id)]
    pub id: i64,
    /// Login name.
    #[field(unique, max_length = 16)]
    pub name: String,
    #[field(email)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
#[resource(list_exclude(body), max_recursion = 2, recoverable)]
#[many_to_many(Tag)]
pub struct Post {
    #[field(id)]
    pub id: i64,
    pub title: String,
    pub body: String,
    #[field(default = 0)]
    pub views: i64,
    #[field(auto_now_add)]
    pub created_at: DateTime<Utc>,
    #[field(auto_now)]
    pub updated_at: DateTime<Utc>,
    #[belongs_to(User)]
    pub author_id: Option<i64>,
    #[serde(skip)]
    #[field(skip)]
    pub cache: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
pub struct Tag {
    #[field(id)]
    pub id: i64,
    pub label: String,
}

fn main() {
    let registry = Registry::builder()
        .register::<User>()
        .register::<Post>()
        .register::<Tag>()
        .build()
        .unwrap();
    let post = registry.entity("Post").unwrap();
    assert!(post.is_recoverable());
    assert!(post.relation("author").is_some());
    assert!(post.relation("tags").is_some());
    assert!(post.field_named("cache").is_none());
    assert!(registry.entity("User").unwrap().relation("posts").is_some());
}
