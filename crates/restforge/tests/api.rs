// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! End-to-end behaviour through the HTTP router and the in-memory store.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{app, registry, send, with_condition};
use restforge::view::FieldShape;
use serde_json::{Value, json};

async fn seed_posts(app: &axum::Router) {
    let (status, _) = send(app, "POST", "/users", Some(json!([{"name": "ann"}, {"name": "bob"}]))).await;
    assert_eq!(status, StatusCode::CREATED);
    let posts = json!([
        {"title": "x", "views": 2, "author_id": 1, "tags": [{"label": "rust"}, {"label": "rest"}]},
        {"title": "x", "views": 9, "author_id": 2, "body": "text"},
        {"title": "y", "views": 2, "tags": [{"id": 1}]}
    ]);
    let (status, created) = send(app, "POST", "/posts", Some(posts)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.as_array().map(Vec::len), Some(3));
}

fn titles_and_views(page: &Value) -> Vec<(String, i64)> {
    page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| (row["title"].as_str().unwrap().to_string(), row["views"].as_i64().unwrap()))
        .collect()
}

#[test]
fn projection_is_memoized_per_key() {
    let registry = registry();
    let first = registry.detail_view("Post").unwrap();
    let second = registry.detail_view("Post").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let cached = registry.cached_views();
    registry.detail_view("Post").unwrap();
    assert_eq!(registry.cached_views(), cached);
}

#[test]
fn cyclic_relations_stop_at_the_recursion_bound() {
    let registry = registry();
    let user = registry.detail_view("User").unwrap();
    let Some(FieldShape::List(posts)) = user.field("posts").map(|f| f.shape.clone()) else {
        panic!("posts should be a nested list");
    };
    assert!(posts.contains("title"));
    assert!(!posts.contains("author"));
    assert!(!posts.contains("tags"));
}

#[tokio::test]
async fn negation_wraps_the_combined_group() {
    let app = app();
    seed_posts(&app).await;
    let uri = with_condition("/posts", &json!({"not": {"title": "x", "views": 2}}));
    let (status, page) = send(&app, "GET", &format!("{uri}&order_by=id"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(titles_and_views(&page), [("x".to_string(), 9), ("y".to_string(), 2)]);
}

#[tokio::test]
async fn or_groups_and_operators() {
    let app = app();
    seed_posts(&app).await;
    let condition = json!({"or": [{"views.gt": 5}, {"title": "y"}]});
    let (_, page) = send(&app, "GET", &format!("{}&order_by=-views", with_condition("/posts", &condition)), None).await;
    assert_eq!(titles_and_views(&page), [("x".to_string(), 9), ("y".to_string(), 2)]);
}

#[tokio::test]
async fn empty_sentinel_matches_empty_strings_only() {
    let app = app();
    seed_posts(&app).await;
    let (_, page) = send(&app, "GET", &with_condition("/posts", &json!({"body": "$empty"})), None).await;
    assert_eq!(page["total"], 2);
    let (_, page) = send(&app, "GET", &with_condition("/posts", &json!({"body": ""})), None).await;
    assert_eq!(page["total"], 3);
}

#[tokio::test]
async fn total_counts_each_row_once_across_joins() {
    let app = app();
    seed_posts(&app).await;
    let condition = json!({"tags.label.in": ["rust", "rest"]});
    let (_, page) = send(&app, "GET", &with_condition("/posts", &condition), None).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn summary_and_grouping() {
    let app = app();
    seed_posts(&app).await;
    let (_, page) = send(&app, "GET", "/posts?include_summary=true&include=views", None).await;
    assert_eq!(page["summary"]["views"], 9);

    let (_, page) = send(&app, "GET", "/posts?group_by=title&include=title&include=views&order_by=title", None).await;
    assert_eq!(page["total"], 2);
    assert_eq!(titles_and_views(&page), [("x".to_string(), 9), ("y".to_string(), 2)]);
}

#[tokio::test]
async fn stale_watermark_is_rejected() {
    let app = app();
    let (_, post) = send(&app, "POST", "/posts", Some(json!({"title": "draft"}))).await;
    let stamp = post["updated_at"].clone();

    let stale = json!({"title": "late", "updated_at": "2000-01-01T00:00:00Z"});
    let (status, body) = send(&app, "PUT", "/posts/1", Some(stale)).await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(body, json!({"detail": {"errors": ["request data is stale"]}}));

    let fresh = json!({"title": "final", "updated_at": stamp});
    let (status, body) = send(&app, "PUT", "/posts/1", Some(fresh)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "final");
}

#[tokio::test]
async fn failing_batch_writes_nothing() {
    let app = app();
    let (status, body) = send(&app, "POST", "/users", Some(json!([{"name": "ann"}, {"name": "ann"}]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"detail": {"errors": ["object with value ann already exists"]}}));
    let (_, page) = send(&app, "GET", "/users", None).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn partially_missing_ids_fail_the_whole_request() {
    let app = app();
    send(&app, "POST", "/users", Some(json!({"name": "ann"}))).await;
    let (status, _) = send(&app, "PUT", "/users/1,99", Some(json!({"name": "zed"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, user) = send(&app, "GET", "/users/1", None).await;
    assert_eq!(user["name"], "ann");

    let (status, _) = send(&app, "DELETE", "/users/1,99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/users/1", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn batch_update_and_delete() {
    let app = app();
    seed_posts(&app).await;
    let (status, updated) = send(&app, "PUT", "/posts/1,2", Some(json!({"views": 0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated.as_array().map(Vec::len), Some(2));
    assert!(updated.as_array().unwrap().iter().all(|p| p["views"] == 0));

    let (status, echo) = send(&app, "DELETE", "/posts/1,2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(echo, json!([{"id": 1}, {"id": 2}]));
    let (_, page) = send(&app, "GET", "/posts", None).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn validation_errors_use_the_envelope() {
    let app = app();
    let (status, body) = send(&app, "POST", "/users", Some(json!({"name": "a-name-far-too-long"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"]["errors"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(&app, "POST", "/posts", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": {"errors": ["is required: title"]}}));
}

#[tokio::test]
async fn prefetch_expands_relations() {
    let app = app();
    seed_posts(&app).await;
    let (status, post) = send(&app, "GET", "/posts/1?prefetch=author&prefetch=tags", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["author"]["name"], "ann");
    let labels: Vec<&str> = post["tags"].as_array().unwrap().iter().map(|t| t["label"].as_str().unwrap()).collect();
    assert_eq!(labels, ["rust", "rest"]);

    let (status, _) = send(&app, "GET", "/posts/1?prefetch=nope", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
