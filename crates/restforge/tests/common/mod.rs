// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode}
};
use chrono::{DateTime, Utc};
use restforge::{MemoryStore, PublicHooks, Registry, Resource, ResourceConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;

/// Account.
#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
#[has_many(Post, field = "posts", via = "author")]
pub struct User {
    #[field(id)]
    pub id:   i64,
    #[field(unique, max_length = 16)]
    pub name: String
}

/// Blog post.
#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
#[resource(list_exclude(body))]
#[many_to_many(Tag)]
pub struct Post {
    #[field(id)]
    pub id:         i64,
    pub title:      String,
    #[field(default = "")]
    pub body:       String,
    #[field(default = 0)]
    pub views:      i64,
    #[field(auto_now_add)]
    pub created_at: DateTime<Utc>,
    #[field(auto_now)]
    pub updated_at: DateTime<Utc>,
    #[belongs_to(User)]
    pub author_id:  Option<i64>
}

#[derive(Debug, Clone, Serialize, Deserialize, Resource)]
pub struct Tag {
    #[field(id)]
    pub id:    i64,
    #[field(unique)]
    pub label: String
}

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn registry() -> Arc<Registry> {
    Registry::builder()
        .register::<User>()
        .register::<Post>()
        .register::<Tag>()
        .build()
        .unwrap()
}

/// One router serving `/users`, `/posts` and `/tags` over a fresh store.
pub fn app() -> Router {
    init_tracing();
    let store = Arc::new(MemoryStore::new(registry()));
    let mount = |entity: &str| {
        let resource = Resource::new(store.clone(), entity, PublicHooks)
            .unwrap()
            .with_config(ResourceConfig::default().enable_summary(true));
        restforge::http::router(Arc::new(resource))
    };
    Router::new()
        .nest("/users", mount("User"))
        .nest("/posts", mount("Post"))
        .nest("/tags", mount("Tag"))
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

/// `path?condition=<json>` with the condition URL-encoded.
pub fn with_condition(path: &str, condition: &Value) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("condition", &condition.to_string())
        .finish();
    format!("{path}?{query}")
}
