// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! CRUD orchestration.
//!
//! A [`Resource`] binds one registered entity to a [`Store`] and a set of
//! [`Hooks`], and runs the five operations the HTTP layer exposes:
//!
//! | Operation | Input | Output |
//! |-----------|-------|--------|
//! | [`list`](Resource::list) | [`ListParams`] | [`ListResponse`] |
//! | [`get`](Resource::get) | one id | detail object |
//! | [`create`](Resource::create) | object or array | [`Returned`] detail objects |
//! | [`update`](Resource::update) | comma-separated ids, partial object | [`Returned`] detail objects |
//! | [`delete`](Resource::delete) | comma-separated ids | [`Returned`] [`DeleteEcho`]s |
//!
//! Every write runs in a single transaction; any failure rolls the whole
//! batch back. Id lists resolve all-or-nothing: one missing row fails the
//! request with [`ApiError::NotFound`].
//!
//! # Request flow
//!
//! ```text
//! ids ──translate_id──> coerced keys ──┐
//!                                      ├─> scope ──> fetch ──> hooks ──> write ──> render
//! RequestContext ──current_user──> user┘
//! ```

mod hooks;
mod list;
mod write;

use std::{collections::HashSet, sync::Arc};

use axum::http::{HeaderMap, Method};
use futures::future::try_join_all;
pub use hooks::{Hooks, PublicHooks};
use serde::Serialize;
use serde_json::{Map, Value};
pub(crate) use write::apply_update;

use crate::{
    config::ResourceConfig,
    entity::Record,
    error::{ApiError, ApiResult},
    normalize::to_view,
    query::{Q, Query},
    registry::{EntitySchema, FieldType, Registry, SchemaError},
    store::{Executor, Store},
    value,
    view::{RequiredMode, ValidationErrors, ViewType, coerce}
};

/// Operation a hook is called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete
}

/// What the transport knows about the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    method:  Method,
    headers: HeaderMap,
    query:   Vec<(String, String)>
}

impl RequestContext {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Context from raw request parts. `raw_query` is the undecoded query
    /// string without the leading `?`.
    #[must_use]
    pub fn from_parts(method: Method, headers: HeaderMap, raw_query: Option<&str>) -> Self {
        let query = raw_query
            .map(|raw| url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            method,
            headers,
            query
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append one query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value, if present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query pairs in request order.
    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query parameter.
    #[must_use]
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Parameters of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub offset:          Option<usize>,
    pub limit:           Option<usize>,
    pub include_summary: bool,
    /// Raw JSON condition objects, ANDed together.
    pub condition:       Vec<String>,
    pub order_by:        Vec<String>,
    pub include:         Vec<String>,
    pub prefetch:        Vec<String>,
    pub group_by:        Vec<String>
}

impl ListParams {
    /// Read list parameters from the request query.
    ///
    /// # Errors
    ///
    /// Validation errors for non-numeric `offset`/`limit` and
    /// non-boolean `include_summary`.
    pub fn from_context(ctx: &RequestContext) -> ApiResult<Self> {
        let mut errors = ValidationErrors::new();
        let offset = parse_param(ctx, "offset", &FieldType::Int, &mut errors)
            .and_then(|v| v.as_u64())
            .and_then(|v| usize::try_from(v).ok());
        let limit = parse_param(ctx, "limit", &FieldType::Int, &mut errors)
            .and_then(|v| v.as_u64())
            .and_then(|v| usize::try_from(v).ok());
        let include_summary = parse_param(ctx, "include_summary", &FieldType::Bool, &mut errors)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        errors.into_result()?;

        let many = |key: &str| -> Vec<String> {
            ctx.query_values(key).into_iter().map(str::to_string).collect()
        };
        Ok(Self {
            offset,
            limit,
            include_summary,
            condition: many("condition"),
            order_by: many("order_by"),
            include: many("include"),
            prefetch: many("prefetch"),
            group_by: many("group_by")
        })
    }
}

fn parse_param(
    ctx: &RequestContext,
    key: &str,
    ty: &FieldType,
    errors: &mut ValidationErrors
) -> Option<Value> {
    let raw = Value::String(ctx.query_value(key)?.to_string());
    let parsed = coerce(ty, &raw, key, errors)?;
    if parsed.as_i64().is_some_and(|n| n < 0) {
        errors.invalid(key, &raw, "must not be negative");
        return None;
    }
    Some(parsed)
}

/// Body of a list response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse {
    /// Matching rows, or groups when grouped.
    pub total:   usize,
    /// Aggregate row over every match, when requested and enabled.
    pub summary: Option<Map<String, Value>>,
    pub data:    Vec<Map<String, Value>>
}

/// Single-or-batch result, serialized as the bare object or an array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Returned<T> {
    One(T),
    Many(Vec<T>)
}

impl<T> Returned<T> {
    /// `One` when a single item came from a non-batch request.
    #[must_use]
    pub fn collect(mut items: Vec<T>, batch: bool) -> Self {
        if !batch
            && items.len() == 1
            && let Some(item) = items.pop()
        {
            return Self::One(item);
        }
        Self::Many(items)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items
        }
    }
}

/// Acknowledgement of one deleted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteEcho {
    pub id: Value
}

/// What a create or update returns to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Rendered through the detail view.
    Record(Record),
    /// Returned as is.
    Rendered(Value)
}

/// One entity served over CRUD operations.
pub struct Resource<H: Hooks> {
    registry:    Arc<Registry>,
    store:       Arc<dyn Store>,
    entity:      &'static str,
    hooks:       H,
    config:      ResourceConfig,
    list_view:   Arc<ViewType>,
    detail_view: Arc<ViewType>,
    create_form: Arc<ViewType>,
    update_form: Arc<ViewType>
}

impl<H: Hooks> std::fmt::Debug for Resource<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("entity", &self.entity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<H: Hooks> Resource<H> {
    /// Resource over `entity` with default settings.
    ///
    /// The create form requires what the schema requires; the update form
    /// makes every field optional.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownEntity`] when `entity` is not registered.
    pub fn new(store: Arc<dyn Store>, entity: &str, hooks: H) -> Result<Self, SchemaError> {
        let registry = Arc::clone(store.registry());
        let name = registry.entity(entity)?.name();
        Ok(Self {
            list_view: registry.list_view(name)?,
            detail_view: registry.detail_view(name)?,
            create_form: registry.form_view(name, RequiredMode::Natural)?,
            update_form: registry.form_view(name, RequiredMode::Optional)?,
            registry,
            store,
            entity: name,
            hooks,
            config: ResourceConfig::default()
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the view create payloads are validated against.
    #[must_use]
    pub fn with_create_form(mut self, form: Arc<ViewType>) -> Self {
        self.create_form = form;
        self
    }

    /// Replace the view update payloads are validated against.
    #[must_use]
    pub fn with_update_form(mut self, form: Arc<ViewType>) -> Self {
        self.update_form = form;
        self
    }

    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    #[must_use]
    pub const fn config(&self) -> &ResourceConfig {
        &self.config
    }

    #[must_use]
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn create_form(&self) -> &Arc<ViewType> {
        &self.create_form
    }

    #[must_use]
    pub fn update_form(&self) -> &Arc<ViewType> {
        &self.update_form
    }

    fn schema(&self) -> ApiResult<&EntitySchema> {
        Ok(self.registry.entity(self.entity)?)
    }

    fn executor(&self) -> &dyn Executor {
        &*self.store
    }

    /// Base query after the scope hook.
    async fn scoped(&self, user: &H::User, ctx: &RequestContext, operation: Operation) -> ApiResult<Query> {
        let query = self
            .hooks
            .scope(user, ctx, Query::new(self.entity), operation)
            .await?;
        hooks::ensure_visible(&query)?;
        Ok(query)
    }

    /// Translate and coerce a comma-separated id list, concurrently.
    ///
    /// Duplicates collapse to one id.
    async fn resolve_ids(&self, user: &H::User, ctx: &RequestContext, raw: &str) -> ApiResult<Vec<Value>> {
        let pieces: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if pieces.is_empty() {
            return Err(ApiError::NotFound);
        }
        let translated = try_join_all(
            pieces
                .iter()
                .map(|piece| self.hooks.translate_id(user, piece, ctx))
        )
        .await?;

        let schema = self.schema()?;
        let pk_type = schema
            .primary_key()
            .map_or(FieldType::Json, |f| f.field_type.clone());
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(translated.len());
        for id in translated {
            let mut errors = ValidationErrors::new();
            let Some(id) = coerce(&pk_type, &id, "id", &mut errors) else {
                tracing::debug!(entity = self.entity, id = %value::display(&id), "id does not coerce");
                return Err(ApiError::NotFound);
            };
            if seen.insert(value::id_key(&id)) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Rows for `ids`, in id order. Fails unless every id matches.
    async fn fetch_targets(&self, exec: &dyn Executor, query: Query, ids: &[Value]) -> ApiResult<Vec<Record>> {
        let schema = self.schema()?;
        let pk = schema.pk_name();
        let query = query
            .filter(Q::lookup(&format!("{pk}__in"), Value::Array(ids.to_vec())))
            .distinct();
        let mut rows = exec.fetch(&query).await?;
        if rows.len() != ids.len() {
            tracing::debug!(
                entity = self.entity,
                requested = ids.len(),
                found = rows.len(),
                "id list not fully resolved"
            );
            return Err(ApiError::NotFound);
        }
        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            let key = value::id_key(id);
            let position = rows
                .iter()
                .position(|r| r.get(pk).map(value::id_key).as_deref() == Some(key.as_str()))
                .ok_or(ApiError::NotFound)?;
            ordered.push(rows.swap_remove(position));
        }
        Ok(ordered)
    }

    fn render(&self, view: &ViewType, output: Output) -> ApiResult<Value> {
        match output {
            Output::Record(record) => Ok(Value::Object(to_view(&self.registry, view, &record)?)),
            Output::Rendered(rendered) => Ok(rendered)
        }
    }
}
