// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Extension points of a resource.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Operation, Output, RequestContext};
use crate::{
    entity::Record,
    error::{ApiError, ApiResult},
    filter::{ConditionHook, Translated},
    query::{Aggregate, Query, normalize_field},
    registry::FieldDescriptor
};

/// Per-resource behavior plugged into every operation.
///
/// Only [`current_user`](Hooks::current_user) must be written; every
/// other hook passes its input through.
///
/// # Example
///
/// ```rust,ignore
/// struct OwnPosts;
///
/// #[async_trait]
/// impl Hooks for OwnPosts {
///     type User = i64;
///
///     async fn current_user(&self, ctx: &RequestContext) -> ApiResult<i64> {
///         ctx.header("x-user-id")
///             .and_then(|v| v.parse().ok())
///             .ok_or(ApiError::Unauthorized)
///     }
///
///     async fn scope(&self, user: &i64, _: &RequestContext, query: Query, _: Operation) -> ApiResult<Query> {
///         Ok(query.filter(Q::lookup("author_id", (*user).into())))
///     }
/// }
/// ```
#[async_trait]
pub trait Hooks: Send + Sync + 'static {
    /// Authenticated caller.
    type User: Send + Sync;

    /// Identify the caller.
    ///
    /// # Errors
    ///
    /// Usually [`ApiError::Unauthorized`].
    async fn current_user(&self, ctx: &RequestContext) -> ApiResult<Self::User>;

    /// Map one raw path id to a primary key value.
    ///
    /// The result is coerced to the primary key type afterwards; values
    /// that do not coerce are treated as missing rows.
    async fn translate_id(&self, user: &Self::User, raw: &str, ctx: &RequestContext) -> ApiResult<Value> {
        let _ = (user, ctx);
        Ok(Value::String(raw.to_string()))
    }

    /// Expand one `order_by` item into ordering keys.
    fn translate_order_by(&self, user: &Self::User, item: &str, ctx: &RequestContext) -> Vec<String> {
        let _ = (user, ctx);
        vec![normalize_field(item)]
    }

    /// Rewrite one condition entry before it becomes a lookup.
    async fn translate_condition(
        &self,
        user: &Self::User,
        query: &Query,
        key: &str,
        value: Value,
        ctx: &RequestContext
    ) -> ApiResult<Translated> {
        let _ = (user, query, key, ctx);
        Ok(Translated::Value(value))
    }

    /// Aggregate used for a non-grouped field in grouped lists and
    /// summaries. `None` leaves the field out.
    fn group_by_aggregate(&self, field: &str, descriptor: &FieldDescriptor) -> Option<Aggregate> {
        let _ = (field, descriptor);
        Some(Aggregate::Max)
    }

    /// Narrow the query to what `user` may see or touch.
    ///
    /// Restricting `only` to no columns at all denies the request.
    async fn scope(
        &self,
        user: &Self::User,
        ctx: &RequestContext,
        query: Query,
        operation: Operation
    ) -> ApiResult<Query> {
        let _ = (user, ctx, operation);
        Ok(query)
    }

    /// Adjust a constructed, unsaved record.
    async fn before_create(
        &self,
        user: &Self::User,
        record: Record,
        input: &Map<String, Value>,
        ctx: &RequestContext
    ) -> ApiResult<Record> {
        let _ = (user, input, ctx);
        Ok(record)
    }

    /// Choose what a create returns.
    async fn after_create(
        &self,
        user: &Self::User,
        record: Record,
        input: &Map<String, Value>,
        ctx: &RequestContext
    ) -> ApiResult<Output> {
        let _ = (user, input, ctx);
        Ok(Output::Record(record))
    }

    /// Pick the record to update. `None` skips the write and returns the
    /// record unchanged.
    async fn before_update(
        &self,
        user: &Self::User,
        record: &Record,
        input: &Map<String, Value>,
        ctx: &RequestContext
    ) -> ApiResult<Option<Record>> {
        let _ = (user, input, ctx);
        Ok(Some(record.clone()))
    }

    /// Choose what an update returns. `old` is the record before the write.
    async fn after_update(
        &self,
        user: &Self::User,
        old: &Record,
        input: &Map<String, Value>,
        record: Record,
        ctx: &RequestContext
    ) -> ApiResult<Output> {
        let _ = (user, old, input, ctx);
        Ok(Output::Record(record))
    }

    /// Pick the record to delete.
    async fn before_delete(&self, user: &Self::User, record: Record, ctx: &RequestContext) -> ApiResult<Record> {
        let _ = (user, ctx);
        Ok(record)
    }
}

/// Hooks for resources open to everyone. The caller is `"anonymous"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicHooks;

#[async_trait]
impl Hooks for PublicHooks {
    type User = String;

    async fn current_user(&self, _ctx: &RequestContext) -> ApiResult<String> {
        Ok("anonymous".to_string())
    }
}

/// Routes condition translation through a resource's hooks.
pub(crate) struct ConditionAdapter<'a, H: Hooks> {
    pub(crate) hooks: &'a H,
    pub(crate) user:  &'a H::User,
    pub(crate) ctx:   &'a RequestContext
}

#[async_trait]
impl<H: Hooks> ConditionHook for ConditionAdapter<'_, H> {
    async fn translate(&self, query: &Query, key: &str, value: Value) -> ApiResult<Translated> {
        self.hooks
            .translate_condition(self.user, query, key, value, self.ctx)
            .await
    }
}

/// Reject requests whose scope left no readable columns.
pub(crate) fn ensure_visible(query: &Query) -> ApiResult<()> {
    match query.only_columns() {
        Some([]) => Err(ApiError::Forbidden),
        _ => Ok(())
    }
}
