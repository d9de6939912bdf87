// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Moving values between records and views.
//!
//! Outbound, [`to_view`] renders a [`Record`] through a [`ViewType`]. Only
//! what is loaded is rendered: relations that were never fetched and async
//! computed fields that were never resolved are left out, so callers decide
//! how much to load with [`prefetch`].
//!
//! Inbound, [`from_form`] splits a validated payload into the three parts
//! a write needs:
//!
//! ```text
//! {"title": "t", "secret": "s", "tags": [{"id": 1}, {"label": "new"}]}
//!      │              │                 │
//!   columns        computed        many_to_many
//!      │              │                 │
//!  Record::construct  apply_computed   save_many_to_many
//! ```

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{
    entity::{Record, Relation},
    error::{ApiError, ApiResult},
    query::normalize_field,
    registry::{EntitySchema, Registry, RelationKind},
    store::{Executor, fetch_one},
    view::{FieldShape, FieldSource, ValidationErrors, ViewType}
};

/// One element of a many-to-many payload.
#[derive(Debug, Clone, PartialEq)]
pub enum M2mItem {
    /// Reference to an existing row by primary key.
    Existing(Value),
    /// Row to create, then link.
    New(Map<String, Value>)
}

/// A form payload split by destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormParts {
    /// Stored column assignments.
    pub columns:      Map<String, Value>,
    /// Values for computed setters, in payload order.
    pub computed:     IndexMap<String, Value>,
    /// Full replacement link sets per many-to-many relation.
    pub many_to_many: IndexMap<String, Vec<M2mItem>>
}

/// Render `record` through `view`.
///
/// # Errors
///
/// Failing sync accessors and unregistered entities.
pub fn to_view(registry: &Registry, view: &ViewType, record: &Record) -> ApiResult<Map<String, Value>> {
    let schema = registry.entity(view.entity())?;
    let mut out = Map::new();
    for field in view.fields().values() {
        let name = field.name.as_str();
        match &field.source {
            FieldSource::Column
            | FieldSource::ShadowKey {
                ..
            } => {
                if let Some(v) = record.get(name) {
                    out.insert(name.to_string(), v.clone());
                }
            }
            FieldSource::Relation(_) => {
                let Some(relation) = record.relation(name) else {
                    continue;
                };
                let rendered = match (relation, &field.shape) {
                    (Relation::One(None), _) => Value::Null,
                    (Relation::One(Some(related)), FieldShape::Object(nested)) => {
                        Value::Object(to_view(registry, nested, related)?)
                    }
                    (Relation::Many(related), FieldShape::List(nested)) => Value::Array(
                        related
                            .iter()
                            .map(|r| to_view(registry, nested, r).map(Value::Object))
                            .collect::<ApiResult<_>>()?
                    ),
                    _ => {
                        tracing::debug!(entity = view.entity(), field = name, "relation shape mismatch");
                        continue;
                    }
                };
                out.insert(name.to_string(), rendered);
            }
            FieldSource::Computed {
                ..
            } => {
                if let Some(v) = record.computed(name) {
                    out.insert(name.to_string(), v.clone());
                } else if let Some(resolved) = schema
                    .computed_field(name)
                    .and_then(|c| c.resolve_now(record))
                {
                    out.insert(name.to_string(), resolved?);
                }
            }
        }
    }
    Ok(out)
}

/// Split a validated payload into columns, computed values and link sets.
///
/// Relation keys other than many-to-many are ignored; to-one relations are
/// written through their key column.
///
/// # Errors
///
/// A many-to-many value that is not a list of objects.
pub fn from_form(schema: &EntitySchema, payload: Map<String, Value>) -> Result<FormParts, ValidationErrors> {
    let mut parts = FormParts::default();
    let mut errors = ValidationErrors::new();
    for (key, value) in payload {
        if schema.has_column(&key) {
            parts.columns.insert(key, value);
            continue;
        }
        if schema.computed_field(&key).is_some_and(|c| c.is_writable()) {
            parts.computed.insert(key, value);
            continue;
        }
        match schema.relation(&key) {
            Some((_, relation)) if relation.kind == RelationKind::ToMany => {
                if value.is_null() {
                    continue;
                }
                let items = match value {
                    Value::Array(items) => items,
                    other => {
                        errors.invalid(&key, &other, "is not a valid list");
                        continue;
                    }
                };
                let mut linked = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Object(mut map) => match map.remove("id") {
                            Some(id) if !id.is_null() => linked.push(M2mItem::Existing(id)),
                            _ => linked.push(M2mItem::New(map))
                        },
                        other => errors.invalid(format!("{key}.{i}"), &other, "is not a valid mapping")
                    }
                }
                parts.many_to_many.insert(key, linked);
            }
            _ => tracing::debug!(entity = schema.name(), field = %key, "form key ignored")
        }
    }
    errors.into_result().map(|()| parts)
}

/// Run computed setters in order.
///
/// Returns the record and the columns the setters changed.
///
/// # Errors
///
/// The first failing setter.
pub async fn apply_computed(
    schema: &EntitySchema,
    mut record: Record,
    computed: IndexMap<String, Value>
) -> ApiResult<(Record, Vec<String>)> {
    let before = record.values().clone();
    for (name, value) in computed {
        if let Some(field) = schema.computed_field(&name) {
            record = field.assign(record, value).await?;
        }
    }
    let changed = record
        .values()
        .iter()
        .filter(|(k, v)| before.get(k.as_str()) != Some(*v))
        .map(|(k, _)| k.clone())
        .filter(|k| schema.has_column(k))
        .collect();
    Ok((record, changed))
}

/// Create a row from nested form values, including its own link sets.
fn create_nested<'a>(
    exec: &'a dyn Executor,
    entity: &'static str,
    payload: Map<String, Value>
) -> BoxFuture<'a, ApiResult<Record>> {
    Box::pin(async move {
        let schema = exec.registry().entity(entity)?;
        let parts = from_form(schema, payload)?;
        let mut record = Record::construct(schema, parts.columns);
        exec.insert(&mut record).await?;
        let (mut record, changed) = apply_computed(schema, record, parts.computed).await?;
        if !changed.is_empty() {
            exec.update(&mut record, &changed).await?;
        }
        save_many_to_many(exec, &record, parts.many_to_many).await?;
        Ok(record)
    })
}

/// Replace the link sets of `record`.
///
/// Existing references must resolve; new items are created first.
///
/// # Errors
///
/// [`ApiError::NotFound`] for dangling references, store errors otherwise.
pub fn save_many_to_many<'a>(
    exec: &'a dyn Executor,
    record: &'a Record,
    many_to_many: IndexMap<String, Vec<M2mItem>>
) -> BoxFuture<'a, ApiResult<()>> {
    Box::pin(async move {
        let schema = exec.registry().entity(record.entity())?;
        for (name, items) in many_to_many {
            let Some((_, relation)) = schema.relation(&name) else {
                continue;
            };
            let related = exec.registry().entity(relation.related)?;
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let row = match item {
                    M2mItem::Existing(id) => fetch_one(exec, related.name(), &id).await?,
                    M2mItem::New(payload) => create_nested(exec, related.name(), payload).await?
                };
                ids.push(row.get(related.pk_name()).cloned().unwrap_or(Value::Null));
            }
            exec.set_many_to_many(record, &name, ids).await?;
        }
        Ok(())
    })
}

/// Load relation paths and resolve computed fields.
///
/// Paths use `.` or `__` between hops; every hop but the last must be a
/// relation. A final computed field is resolved, awaiting async accessors.
/// Relations already loaded are not fetched again.
///
/// # Errors
///
/// [`ApiError::BadRequest`] for paths that name neither a relation nor a
/// computed field.
pub async fn prefetch(exec: &dyn Executor, record: &mut Record, paths: &[String]) -> ApiResult<()> {
    for path in paths {
        let segments: Vec<String> = normalize_field(path).split("__").map(str::to_string).collect();
        prefetch_path(exec, record, &segments, path).await?;
    }
    Ok(())
}

fn prefetch_path<'a>(
    exec: &'a dyn Executor,
    record: &'a mut Record,
    segments: &'a [String],
    path: &'a str
) -> BoxFuture<'a, ApiResult<()>> {
    Box::pin(async move {
        let Some((head, rest)) = segments.split_first() else {
            return Ok(());
        };
        let registry = exec.registry();
        let schema = registry.entity(record.entity())?;

        if schema.relation(head).is_some() {
            if record.relation(head).is_none() {
                let loaded = exec.fetch_relation(record, head).await?;
                record.set_relation(head.clone(), loaded);
            }
            if let Some(relation) = record.relation_mut(head) {
                for related in relation.records_mut() {
                    prefetch_path(exec, related, rest, path).await?;
                }
            }
            return Ok(());
        }

        match schema.computed_field(head) {
            Some(field) if rest.is_empty() => {
                if let Some(v) = field.resolve(record).await? {
                    record.set_computed(head.clone(), v);
                }
                Ok(())
            }
            _ => Err(ApiError::bad_request(format!(
                "cannot prefetch `{path}` on {}",
                record.entity()
            )))
        }
    })
}
