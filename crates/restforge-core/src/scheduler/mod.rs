// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Deferred updates.
//!
//! An update request carrying `?schedule_update_at=<datetime>` is not
//! applied; it is queued on a [`Worker`] and runs later through the same
//! write path as an immediate update. Wire it in from a resource's
//! [`Hooks::before_update`]:
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Hooks for PostHooks {
//!     type User = String;
//!
//!     async fn current_user(&self, _: &RequestContext) -> ApiResult<String> {
//!         Ok("editor".into())
//!     }
//!
//!     async fn before_update(
//!         &self,
//!         _: &String,
//!         record: &Record,
//!         input: &Map<String, Value>,
//!         ctx: &RequestContext
//!     ) -> ApiResult<Option<Record>> {
//!         self.scheduler.before_update(record, input, ctx).await
//!     }
//! }
//! ```
//!
//! Queued jobs are listed and canceled through [`Scheduler::router`].

mod worker;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method},
    routing::{delete, get}
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
pub use worker::{Job, JobPage, JobStatus, MemoryWorker, UpdateJob, Worker};

use crate::{
    config::SchedulerConfig,
    entity::Record,
    error::{ApiError, ApiResult},
    filter::parse_condition,
    registry::Registry,
    resource::{DeleteEcho, Hooks, ListParams, RequestContext},
    value,
    view::ValidationErrors
};

/// Queues updates on a [`Worker`] instead of applying them.
pub struct Scheduler<W: Worker> {
    worker:   Arc<W>,
    registry: Arc<Registry>,
    config:   SchedulerConfig
}

impl<W: Worker> std::fmt::Debug for Scheduler<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<W: Worker> Scheduler<W> {
    #[must_use]
    pub fn new(worker: Arc<W>, registry: Arc<Registry>) -> Self {
        Self {
            worker,
            registry,
            config: SchedulerConfig::default()
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn worker(&self) -> &Arc<W> {
        &self.worker
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue the update when the request asks for it.
    ///
    /// Returns `None` after queueing, which makes the resource skip the
    /// immediate write, and the record otherwise.
    ///
    /// # Errors
    ///
    /// A schedule time that is not a datetime, an empty payload, or a
    /// worker failure.
    pub async fn before_update(
        &self,
        record: &Record,
        input: &Map<String, Value>,
        ctx: &RequestContext
    ) -> ApiResult<Option<Record>> {
        let key = self.config.schedule_update_at_key.as_str();
        let Some(raw) = ctx.query_value(key).filter(|raw| !raw.is_empty()) else {
            return Ok(Some(record.clone()));
        };
        let at = value::parse_datetime(raw).ok_or_else(|| {
            ValidationErrors::single(key, &Value::String(raw.to_string()), "is not a valid datetime")
        })?;
        if input.is_empty() {
            return Err(ApiError::bad_request("nothing to schedule"));
        }

        let schema = self.registry.entity(record.entity())?;
        let pk = schema.pk_name();
        let id = record
            .get(pk)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| ApiError::internal(format!("{} record without {pk}", record.entity())))?;

        let mut lookup = Map::new();
        lookup.insert(pk.to_string(), id.clone());
        let mut context = IndexMap::new();
        context.insert(pk.to_string(), value::display(&id));
        for key in &self.config.context_keys {
            if let Some(v) = record.get(key).filter(|v| !v.is_null()) {
                context.insert(key.clone(), value::display(v));
            }
        }
        for key in &self.config.context_query_keys {
            if let Some(v) = ctx.query_value(key) {
                context.insert(key.clone(), v.to_string());
            }
        }

        let job = UpdateJob {
            entity: schema.name().to_string(),
            lookup,
            form: input.clone(),
            context
        };
        let job_id = self.worker.enqueue_at(at, job).await?;
        tracing::info!(entity = schema.name(), id = %value::display(&id), job = %job_id, %at, "update scheduled");
        Ok(None)
    }

    /// Router listing and canceling queued jobs, guarded by
    /// `hooks.current_user`.
    ///
    /// | Method | Path | Success |
    /// |--------|------|---------|
    /// | `GET` | `/` | `{total, data}` |
    /// | `DELETE` | `/{id}` | `{id}` |
    pub fn router<H: Hooks>(self: Arc<Self>, hooks: Arc<H>) -> Router {
        Router::new()
            .route("/", get(list_jobs::<W, H>))
            .route("/{id}", delete(cancel_job::<W, H>))
            .layer(TraceLayer::new_for_http())
            .with_state((self, hooks))
    }
}

type Shared<W, H> = (Arc<Scheduler<W>>, Arc<H>);

/// Context filter from a `condition` object; values match as substrings.
fn context_filter(ctx: &RequestContext) -> ApiResult<IndexMap<String, String>> {
    let mut filter = IndexMap::new();
    for raw in ctx.query_values("condition") {
        for (k, v) in parse_condition(raw)? {
            if !v.is_null() {
                filter.insert(k, value::display(&v));
            }
        }
    }
    Ok(filter)
}

async fn list_jobs<W: Worker, H: Hooks>(
    State((scheduler, hooks)): State<Shared<W, H>>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery
) -> ApiResult<Json<JobPage>> {
    let ctx = RequestContext::from_parts(method, headers, query.as_deref());
    hooks.current_user(&ctx).await?;
    let params = ListParams::from_context(&ctx)?;
    let filter = context_filter(&ctx)?;
    let page = scheduler
        .worker
        .list(params.offset.unwrap_or(0), params.limit.unwrap_or(20), &filter)
        .await?;
    Ok(Json(page))
}

async fn cancel_job<W: Worker, H: Hooks>(
    State((scheduler, hooks)): State<Shared<W, H>>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap
) -> ApiResult<Json<DeleteEcho>> {
    let ctx = RequestContext::from_parts(method, headers, None);
    hooks.current_user(&ctx).await?;
    scheduler.worker.cancel(&id).await?;
    Ok(Json(DeleteEcho {
        id: Value::String(id)
    }))
}
