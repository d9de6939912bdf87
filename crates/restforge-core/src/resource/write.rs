// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Write operations.
//!
//! Each request opens one transaction and commits only after every item
//! succeeded. Returning early with `?` drops the transaction, which rolls
//! back everything the batch wrote so far.

use serde_json::{Map, Value, json};

use super::{DeleteEcho, Hooks, Operation, Output, RequestContext, Resource, Returned};
use crate::{
    entity::Record,
    error::{ApiError, ApiResult},
    normalize::{apply_computed, from_form, prefetch, save_many_to_many},
    registry::{DELETED_AT, DELETED_FLAG},
    store::Executor,
    value
};

impl<H: Hooks> Resource<H> {
    /// Create one object, or every object of an array, atomically.
    ///
    /// # Errors
    ///
    /// Validation failures, constraint violations and hook errors; nothing
    /// is persisted when any item fails.
    #[tracing::instrument(skip_all, fields(entity = self.entity))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        body: Value,
        prefetch_paths: &[String]
    ) -> ApiResult<Returned<Value>> {
        let user = self.hooks.current_user(ctx).await?;
        let (items, batch) = match body {
            Value::Array(items) => (items, true),
            single => (vec![single], false)
        };

        let tx = self.store.begin().await?;
        let mut created = Vec::with_capacity(items.len());
        for item in &items {
            created.push(self.create_one(&*tx, &user, ctx, item, prefetch_paths).await?);
        }
        tx.commit().await?;

        tracing::info!(count = created.len(), "created");
        Ok(Returned::collect(created, batch))
    }

    async fn create_one(
        &self,
        exec: &dyn Executor,
        user: &H::User,
        ctx: &RequestContext,
        item: &Value,
        prefetch_paths: &[String]
    ) -> ApiResult<Value> {
        let schema = self.schema()?;
        let input = self.create_form.validate(item)?;
        let parts = from_form(schema, input.clone())?;
        let record = Record::construct(schema, parts.columns);
        let mut record = self.hooks.before_create(user, record, &input, ctx).await?;

        exec.insert(&mut record).await?;
        let (mut record, changed) = apply_computed(schema, record, parts.computed).await?;
        if !changed.is_empty() {
            exec.update(&mut record, &changed).await?;
        }
        save_many_to_many(exec, &record, parts.many_to_many).await?;
        prefetch(exec, &mut record, prefetch_paths).await?;

        let output = self.hooks.after_create(user, record, &input, ctx).await?;
        self.render(&self.detail_view, output)
    }

    /// Apply one partial payload to every listed id, atomically.
    ///
    /// When the payload carries the watermark column and the stored value,
    /// truncated to milliseconds, is newer, the row changed since the
    /// client read it and the request fails with
    /// [`ApiError::PreconditionFailed`].
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] unless every id resolves, validation and
    /// constraint failures otherwise.
    #[tracing::instrument(skip(self, ctx, body, prefetch_paths), fields(entity = self.entity))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        ids: &str,
        body: Value,
        prefetch_paths: &[String]
    ) -> ApiResult<Returned<Value>> {
        let user = self.hooks.current_user(ctx).await?;
        let ids = self.resolve_ids(&user, ctx, ids).await?;
        let input = self.update_form.validate(&body)?;
        let query = self.scoped(&user, ctx, Operation::Update).await?;

        let tx = self.store.begin().await?;
        let targets = self.fetch_targets(&*tx, query, &ids).await?;
        let mut updated = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(mut record) = self.hooks.before_update(&user, &target, &input, ctx).await? else {
                tracing::debug!(id = %self.id_of(&target), "update skipped by hook");
                updated.push(self.render(&self.detail_view, Output::Record(target))?);
                continue;
            };

            let mut form = input.clone();
            if let Some(supplied) = form.shift_remove(&self.config.watermark_field) {
                check_watermark(record.get(&self.config.watermark_field), &supplied)?;
            }

            let old = record.clone();
            if !form.is_empty() {
                record = apply_update(&*tx, record, form).await?;
            }
            prefetch(&*tx, &mut record, prefetch_paths).await?;

            let output = self
                .hooks
                .after_update(&user, &old, &input, record, ctx)
                .await?;
            updated.push(self.render(&self.detail_view, output)?);
        }
        tx.commit().await?;

        tracing::info!(count = updated.len(), "updated");
        Ok(Returned::collect(updated, ids.len() > 1))
    }

    /// Delete every listed id, atomically.
    ///
    /// Recoverable entities are flagged as deleted instead of removed.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] unless every id resolves.
    #[tracing::instrument(skip(self, ctx), fields(entity = self.entity))]
    pub async fn delete(&self, ctx: &RequestContext, ids: &str) -> ApiResult<Returned<DeleteEcho>> {
        let user = self.hooks.current_user(ctx).await?;
        let ids = self.resolve_ids(&user, ctx, ids).await?;
        let query = self.scoped(&user, ctx, Operation::Delete).await?;

        let tx = self.store.begin().await?;
        let targets = self.fetch_targets(&*tx, query, &ids).await?;
        let mut echoes = Vec::with_capacity(targets.len());
        for target in targets {
            let record = self.hooks.before_delete(&user, target, ctx).await?;
            let schema = self.registry.entity(record.entity())?;
            let id = record.get(schema.pk_name()).cloned().unwrap_or(Value::Null);
            if schema.is_recoverable() {
                let mut flags = Map::new();
                flags.insert(DELETED_FLAG.to_string(), json!(true));
                flags.insert(DELETED_AT.to_string(), value::now());
                apply_update(&*tx, record, flags).await?;
            } else {
                tx.delete(&record).await?;
            }
            echoes.push(DeleteEcho {
                id
            });
        }
        tx.commit().await?;

        tracing::info!(count = echoes.len(), "deleted");
        Ok(Returned::collect(echoes, ids.len() > 1))
    }

    fn id_of(&self, record: &Record) -> String {
        let pk = self
            .registry
            .get(record.entity())
            .map_or("id", |schema| schema.pk_name());
        record.get(pk).map(value::display).unwrap_or_default()
    }
}

/// Reject writes based on a read older than the stored row.
fn check_watermark(stored: Option<&Value>, supplied: &Value) -> ApiResult<()> {
    let stored = stored.and_then(value::as_datetime);
    let (Some(stored), Some(supplied)) = (stored, value::as_datetime(supplied)) else {
        return Ok(());
    };
    if value::truncate_millis(stored) > supplied {
        tracing::debug!(%stored, %supplied, "stale watermark");
        return Err(ApiError::PreconditionFailed);
    }
    Ok(())
}

/// Write a validated partial form to a stored record.
///
/// Setters for computed fields run first, then columns are assigned, so
/// explicit columns win. Only changed columns are written. On recoverable
/// entities a change of the deleted flag stamps the recovery time.
///
/// # Errors
///
/// Setter, constraint and link failures.
pub(crate) async fn apply_update(
    exec: &dyn Executor,
    record: Record,
    mut form: Map<String, Value>
) -> ApiResult<Record> {
    let schema = exec.registry().entity(record.entity())?;
    if schema.is_recoverable()
        && let Some(flag) = form.get(DELETED_FLAG).filter(|v| !v.is_null())
        && record.get(DELETED_FLAG) != Some(flag)
        && !form.contains_key(DELETED_AT)
    {
        form.insert(DELETED_AT.to_string(), value::now());
    }

    let parts = from_form(schema, form)?;
    let (mut record, changed) = apply_computed(schema, record, parts.computed).await?;
    let mut fields = changed;
    for (column, v) in parts.columns {
        if !fields.contains(&column) {
            fields.push(column.clone());
        }
        record.set(column, v);
    }
    if !fields.is_empty() {
        exec.update(&mut record, &fields).await?;
    }
    for name in parts.many_to_many.keys() {
        record.clear_relation(name);
    }
    save_many_to_many(exec, &record, parts.many_to_many).await?;
    Ok(record)
}
