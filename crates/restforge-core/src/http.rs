// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! axum binding of a [`Resource`].
//!
//! # Routes
//!
//! | Method | Path | Operation | Success |
//! |--------|------|-----------|---------|
//! | `GET` | `/` | list | 200 `{total, summary, data}` |
//! | `POST` | `/` | create | 201 object or array |
//! | `GET` | `/{id}` | get | 200 object |
//! | `PUT` | `/{ids}` | update | 200 object or array |
//! | `DELETE` | `/{ids}` | delete | 200 `{id}` or array of them |
//!
//! Operations disabled in [`ResourceConfig`](crate::ResourceConfig) are not
//! mounted. Errors use the [`ApiError`] envelope.
//!
//! The router carries its own state, so it nests anywhere:
//!
//! ```rust,ignore
//! let posts = Arc::new(Resource::new(store, "Post", PublicHooks)?);
//! let app = Router::new().nest("/posts", restforge_core::http::router(posts));
//! ```
//!
//! Repeated parameters (`condition`, `order_by`, `include`, `prefetch`,
//! `group_by`) are read from the raw query string, so
//! `?order_by=-id&order_by=title` keeps both values in order.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{MethodRouter, get, post}
};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::{
    error::{ApiError, ApiResult},
    resource::{DeleteEcho, Hooks, ListParams, ListResponse, RequestContext, Resource, Returned}
};

type Shared<H> = Arc<Resource<H>>;

/// Router serving `resource`.
pub fn router<H: Hooks>(resource: Arc<Resource<H>>) -> Router {
    let config = resource.config().clone();

    let mut collection: Option<MethodRouter<Shared<H>>> = None;
    if config.enable_get {
        collection = Some(get(list::<H>));
    }
    if config.enable_create {
        collection = Some(match collection {
            Some(routes) => routes.post(create::<H>),
            None => post(create::<H>)
        });
    }

    let mut item: Option<MethodRouter<Shared<H>>> = None;
    if config.enable_get {
        item = Some(get(get_one::<H>));
    }
    if config.enable_update {
        item = Some(match item {
            Some(routes) => routes.put(update::<H>),
            None => axum::routing::put(update::<H>)
        });
    }
    if config.enable_delete {
        item = Some(match item {
            Some(routes) => routes.delete(delete::<H>),
            None => axum::routing::delete(delete::<H>)
        });
    }

    let mut routes = Router::new();
    if let Some(collection) = collection {
        routes = routes.route("/", collection);
    }
    if let Some(item) = item {
        routes = routes.route("/{ids}", item);
    }
    tracing::debug!(entity = resource.entity(), ?config, "resource router built");
    routes.layer(TraceLayer::new_for_http()).with_state(resource)
}

fn context(method: Method, headers: HeaderMap, query: Option<String>) -> RequestContext {
    RequestContext::from_parts(method, headers, query.as_deref())
}

fn prefetch_paths(ctx: &RequestContext) -> Vec<String> {
    ctx.query_values("prefetch")
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Parse a JSON body; an empty body is an empty object.
fn parse_body(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body).map_err(ApiError::from)
}

async fn list<H: Hooks>(
    State(resource): State<Shared<H>>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery
) -> ApiResult<Json<ListResponse>> {
    let ctx = context(method, headers, query);
    let params = ListParams::from_context(&ctx)?;
    Ok(Json(resource.list(&ctx, params).await?))
}

async fn get_one<H: Hooks>(
    State(resource): State<Shared<H>>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery
) -> ApiResult<Json<Value>> {
    let ctx = context(method, headers, query);
    let prefetch = prefetch_paths(&ctx);
    Ok(Json(resource.get(&ctx, &id, &prefetch).await?))
}

async fn create<H: Hooks>(
    State(resource): State<Shared<H>>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes
) -> ApiResult<(StatusCode, Json<Returned<Value>>)> {
    let ctx = context(method, headers, query);
    let body = parse_body(&body)?;
    let prefetch = prefetch_paths(&ctx);
    let created = resource.create(&ctx, body, &prefetch).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<H: Hooks>(
    State(resource): State<Shared<H>>,
    Path(ids): Path<String>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes
) -> ApiResult<Json<Returned<Value>>> {
    let ctx = context(method, headers, query);
    let body = parse_body(&body)?;
    let prefetch = prefetch_paths(&ctx);
    Ok(Json(resource.update(&ctx, &ids, body, &prefetch).await?))
}

async fn delete<H: Hooks>(
    State(resource): State<Shared<H>>,
    Path(ids): Path<String>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery
) -> ApiResult<Json<Returned<DeleteEcho>>> {
    let ctx = context(method, headers, query);
    Ok(Json(resource.delete(&ctx, &ids).await?))
}
