// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! In-process store.
//!
//! Rows live in per-entity tables keyed by primary key; many-to-many links
//! live in a separate link map. Constraints are enforced the way a database
//! would: unique columns, non-null columns and foreign keys are checked on
//! every write, and violations come back as [`StoreError`]s carrying the
//! messages a SQL backend would produce.
//!
//! A transaction takes the store's lock for its whole lifetime and works on
//! a copy of the state. Committing swaps the copy in; dropping the
//! transaction discards it.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc
};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    CountTarget, Executor, Store, StoreError, Transaction,
    eval::{Joined, Row, Tables, order_key, segments}
};
use crate::{
    entity::{Record, Relation},
    query::{Aggregate, Query},
    registry::{EntitySchema, FieldType, Registry, RelationKind},
    value
};

#[derive(Debug, Clone, Default)]
pub(super) struct Table {
    pub(super) rows: IndexMap<String, Row>,
    last_id:         i64
}

/// Every table plus the many-to-many link map.
#[derive(Debug, Clone, Default)]
pub(super) struct MemoryState {
    pub(super) tables: HashMap<String, Table>,
    /// `(owner entity, relation)` to owner key to linked ids.
    pub(super) links:  HashMap<(String, String), IndexMap<String, Vec<Value>>>
}

fn sort_keys(a: &[Value], b: &[Value], order: &[(bool, Vec<String>)]) -> Ordering {
    for ((left, right), (descending, _)) in a.iter().zip(b).zip(order) {
        let ord = value::sort_order(left, right);
        let ord = if *descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn window<T>(items: Vec<T>, query: &Query) -> Vec<T> {
    items
        .into_iter()
        .skip(query.offset_value().unwrap_or(0))
        .take(query.limit_value().unwrap_or(usize::MAX))
        .collect()
}

fn matching<'s>(
    tables: &Tables<'s>,
    entity: &'static str,
    query: &Query,
    extra: &[Vec<String>]
) -> Result<Vec<Joined<'s>>, StoreError> {
    let predicate = query.predicate();
    let mut prefixes: Vec<String> = Vec::new();
    let lookups = predicate.lookups();
    for path in lookups.iter().map(|l| &l.path).chain(extra) {
        for prefix in tables.joins(entity, path)? {
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
    }
    prefixes.sort_by_key(|p| p.matches("__").count());

    let mut out = Vec::new();
    for base in tables.rows(entity) {
        for joined in tables.expand(entity, base, &prefixes)? {
            if tables.test(entity, &joined, &predicate)? {
                out.push(joined);
            }
        }
    }
    Ok(out)
}

fn tuple_key(values: &[Value]) -> String {
    values.iter().map(value::id_key).collect::<Vec<_>>().join("\u{1f}")
}

fn aggregate(function: Aggregate, values: &[Value]) -> Value {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match function {
        Aggregate::Count => Value::from(present.len()),
        Aggregate::Max | Aggregate::Min => {
            let wanted = if function == Aggregate::Max { Ordering::Greater } else { Ordering::Less };
            present
                .into_iter()
                .fold(None::<&Value>, |best, v| match best {
                    Some(b) if value::sort_order(v, b) != wanted => Some(b),
                    _ => Some(v)
                })
                .cloned()
                .unwrap_or(Value::Null)
        }
        Aggregate::Sum | Aggregate::Avg => {
            let numbers: Vec<&Number> = present.iter().filter_map(|v| v.as_number()).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            if function == Aggregate::Sum && numbers.iter().all(|n| n.is_i64()) {
                return Value::from(numbers.iter().filter_map(|n| n.as_i64()).sum::<i64>());
            }
            let sum: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
            let result = if function == Aggregate::Avg { sum / numbers.len() as f64 } else { sum };
            Number::from_f64(result).map_or(Value::Null, Value::Number)
        }
    }
}

impl MemoryState {
    fn tables<'s>(&'s self, registry: &'s Registry) -> Tables<'s> {
        Tables {
            registry,
            state: self
        }
    }

    fn table_mut(&mut self, entity: &str) -> &mut Table {
        self.tables.entry(entity.to_string()).or_default()
    }

    fn contains(&self, entity: &str, id: &Value) -> bool {
        self.tables
            .get(entity)
            .is_some_and(|t| t.rows.contains_key(&value::id_key(id)))
    }

    fn fetch(&self, registry: &Registry, query: &Query) -> Result<Vec<Record>, StoreError> {
        let schema = registry.entity(query.entity())?;
        let entity = schema.name();
        let pk = schema.pk_name();
        let order: Vec<(bool, Vec<String>)> =
            query.ordering().iter().map(|k| order_key(k)).collect();
        let extra: Vec<Vec<String>> = order.iter().map(|(_, path)| path.clone()).collect();

        let tables = self.tables(registry);
        let mut rows = matching(&tables, entity, query, &extra)?;
        if query.is_distinct() {
            let mut seen = HashSet::new();
            rows.retain(|j| seen.insert(j.base.get(pk).map(value::id_key)));
        }

        let mut keyed = Vec::with_capacity(rows.len());
        for joined in rows {
            let keys = order
                .iter()
                .map(|(_, path)| tables.value(entity, &joined, path))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((keys, joined));
        }
        keyed.sort_by(|(a, _), (b, _)| sort_keys(a, b, &order));

        let only = query.only_columns();
        Ok(window(keyed, query)
            .into_iter()
            .map(|(_, joined)| {
                let values = match only {
                    None => joined.base.clone(),
                    Some(columns) => joined
                        .base
                        .iter()
                        .filter(|(k, _)| k.as_str() == pk || columns.iter().any(|c| c == *k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                };
                Record::with_values(entity, values)
            })
            .collect())
    }

    fn count(&self, registry: &Registry, query: &Query, target: &CountTarget) -> Result<usize, StoreError> {
        let schema = registry.entity(query.entity())?;
        let entity = schema.name();
        let tables = self.tables(registry);
        Ok(match target {
            CountTarget::Rows => matching(&tables, entity, query, &[])?.len(),
            CountTarget::DistinctIds => matching(&tables, entity, query, &[])?
                .iter()
                .map(|j| j.base.get(schema.pk_name()).map(value::id_key))
                .collect::<HashSet<_>>()
                .len(),
            CountTarget::DistinctTuple(fields) => {
                let paths: Vec<Vec<String>> = fields.iter().map(|f| segments(f)).collect();
                let mut seen = HashSet::new();
                for joined in matching(&tables, entity, query, &paths)? {
                    let tuple = paths
                        .iter()
                        .map(|p| tables.value(entity, &joined, p))
                        .collect::<Result<Vec<_>, _>>()?;
                    seen.insert(tuple_key(&tuple));
                }
                seen.len()
            }
        })
    }

    fn aggregate(&self, registry: &Registry, query: &Query) -> Result<Vec<Map<String, Value>>, StoreError> {
        let schema = registry.entity(query.entity())?;
        let entity = schema.name();
        let grouping: Vec<(String, Vec<String>)> = query
            .grouping()
            .iter()
            .map(|f| (crate::query::normalize_field(f), segments(f)))
            .collect();
        let annotations: Vec<(&String, Aggregate, Vec<String>)> = query
            .annotations()
            .iter()
            .map(|(alias, a)| (alias, a.aggregate, segments(&a.field)))
            .collect();
        let extra: Vec<Vec<String>> = grouping
            .iter()
            .map(|(_, p)| p.clone())
            .chain(annotations.iter().map(|(_, _, p)| p.clone()))
            .collect();

        let tables = self.tables(registry);
        let mut groups: IndexMap<String, (Vec<Value>, Vec<Joined<'_>>)> = IndexMap::new();
        if grouping.is_empty() {
            groups.insert(String::new(), (Vec::new(), Vec::new()));
        }
        for joined in matching(&tables, entity, query, &extra)? {
            let key_values = grouping
                .iter()
                .map(|(_, p)| tables.value(entity, &joined, p))
                .collect::<Result<Vec<_>, _>>()?;
            groups
                .entry(tuple_key(&key_values))
                .or_insert_with(|| (key_values, Vec::new()))
                .1
                .push(joined);
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (_, (key_values, members)) in groups {
            let mut row = Map::new();
            for ((name, _), v) in grouping.iter().zip(key_values) {
                row.insert(name.clone(), v);
            }
            for (alias, function, path) in &annotations {
                let values = members
                    .iter()
                    .map(|j| tables.value(entity, j, path))
                    .collect::<Result<Vec<_>, _>>()?;
                row.insert((*alias).clone(), aggregate(*function, &values));
            }
            rows.push(row);
        }

        let order: Vec<(bool, Vec<String>)> =
            query.ordering().iter().map(|k| order_key(k)).collect();
        for (_, path) in &order {
            let key = path.join("__");
            if !grouping.iter().any(|(name, _)| *name == key) && !query.annotations().contains_key(&key) {
                return Err(StoreError::UnknownField {
                    entity: entity.to_string(),
                    field:  key
                });
            }
        }
        let mut keyed: Vec<(Vec<Value>, Map<String, Value>)> = rows
            .into_iter()
            .map(|row| {
                let keys = order
                    .iter()
                    .map(|(_, p)| row.get(&p.join("__")).cloned().unwrap_or(Value::Null))
                    .collect();
                (keys, row)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| sort_keys(a, b, &order));
        Ok(window(keyed, query).into_iter().map(|(_, row)| row).collect())
    }

    fn next_id(&mut self, schema: &EntitySchema, ty: &FieldType) -> Result<Value, StoreError> {
        match ty {
            FieldType::Int => {
                let table = self.table_mut(schema.name());
                table.last_id += 1;
                Ok(Value::from(table.last_id))
            }
            FieldType::Uuid | FieldType::Str => Ok(Value::String(Uuid::new_v4().to_string())),
            other => Err(StoreError::Validation(format!(
                "cannot generate a {} primary key for {}",
                other.type_name(),
                schema.name()
            )))
        }
    }

    fn check_row(&self, schema: &EntitySchema, row: &Row, own_key: Option<&str>) -> Result<(), StoreError> {
        let entity = schema.name();
        for field in schema.fields() {
            let Some(column) = field.storage_name() else {
                continue;
            };
            let current = row.get(column).unwrap_or(&Value::Null);
            if current.is_null() {
                if !field.nullable {
                    return Err(StoreError::Integrity(format!(
                        "NOT NULL constraint failed: {entity}.{column}"
                    )));
                }
                continue;
            }
            if field.unique && !field.primary_key {
                let clash = self.tables.get(entity).is_some_and(|t| {
                    t.rows.iter().any(|(key, other)| {
                        Some(key.as_str()) != own_key
                            && other.get(column).is_some_and(|v| value::equals(v, current))
                    })
                });
                if clash {
                    return Err(StoreError::Unique {
                        entity: entity.to_string(),
                        field:  column.to_string(),
                        value:  value::display(current)
                    });
                }
            }
            if let Some(relation) = &field.relation
                && relation.kind == RelationKind::ToOne
                && !self.contains(relation.related, current)
            {
                return Err(StoreError::Integrity(format!(
                    "FOREIGN KEY constraint failed: {entity}.{column}"
                )));
            }
        }
        Ok(())
    }

    fn insert(&mut self, registry: &Registry, record: &mut Record) -> Result<(), StoreError> {
        let schema = registry.entity(record.entity())?;
        let entity = schema.name();
        if let Some(stray) = record.values().keys().find(|k| !schema.has_column(k)) {
            return Err(StoreError::UnknownField {
                entity: entity.to_string(),
                field:  stray.clone()
            });
        }

        let mut row = record.values().clone();
        for field in schema.fields() {
            let Some(column) = field.storage_name() else {
                continue;
            };
            let present = row.get(column).is_some_and(|v| !v.is_null());
            if field.primary_key && !present {
                let id = self.next_id(schema, &field.field_type)?;
                row.insert(column.to_string(), id);
            } else if field.is_auto_timestamp() && !present {
                row.insert(column.to_string(), value::now());
            } else if !row.contains_key(column) {
                if let Some(default) = field.default.produce() {
                    row.insert(column.to_string(), default);
                } else if field.nullable {
                    row.insert(column.to_string(), Value::Null);
                }
            }
        }

        let pk = schema.pk_name();
        let id = row.get(pk).cloned().unwrap_or(Value::Null);
        let key = value::id_key(&id);
        if self.contains(entity, &id) {
            return Err(StoreError::Unique {
                entity: entity.to_string(),
                field:  pk.to_string(),
                value:  value::display(&id)
            });
        }
        self.check_row(schema, &row, None)?;

        let table = self.table_mut(entity);
        if let Some(n) = id.as_i64() {
            table.last_id = table.last_id.max(n);
        }
        table.rows.insert(key, row.clone());
        tracing::trace!(entity, id = %value::display(&id), "row inserted");
        *record.values_mut() = row;
        Ok(())
    }

    fn update(&mut self, registry: &Registry, record: &mut Record, fields: &[String]) -> Result<(), StoreError> {
        let schema = registry.entity(record.entity())?;
        let entity = schema.name();
        let pk = schema.pk_name();
        let id = record.get(pk).cloned().unwrap_or(Value::Null);
        let key = value::id_key(&id);
        let mut row = self
            .tables
            .get(entity)
            .and_then(|t| t.rows.get(&key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: entity.to_string(),
                id:     value::display(&id)
            })?;

        for name in fields {
            if name == pk {
                continue;
            }
            if !schema.has_column(name) {
                return Err(StoreError::UnknownField {
                    entity: entity.to_string(),
                    field:  name.clone()
                });
            }
            row.insert(name.clone(), record.get(name).cloned().unwrap_or(Value::Null));
        }
        for field in schema.fields().iter().filter(|f| f.auto_now) {
            row.insert(field.name.clone(), value::now());
        }
        self.check_row(schema, &row, Some(&key))?;

        self.table_mut(entity).rows.insert(key, row.clone());
        tracing::trace!(entity, id = %value::display(&id), ?fields, "row updated");
        *record.values_mut() = row;
        Ok(())
    }

    fn delete(&mut self, registry: &Registry, entity: &str, id: &Value) -> Result<(), StoreError> {
        let key = value::id_key(id);
        let removed = self.tables.get_mut(entity).and_then(|t| t.rows.shift_remove(&key));
        if removed.is_none() {
            return Err(StoreError::NotFound {
                entity: entity.to_string(),
                id:     value::display(id)
            });
        }

        for ((owner, _), links) in &mut self.links {
            if owner == entity {
                links.shift_remove(&key);
            }
        }
        let mut cascade = Vec::new();
        for schema in registry.entities() {
            let pk = schema.pk_name();
            for field in schema.fields() {
                let Some(relation) = &field.relation else {
                    continue;
                };
                if relation.related != entity {
                    continue;
                }
                match relation.kind {
                    RelationKind::ToMany => {
                        if let Some(links) = self.links.get_mut(&(schema.name().to_string(), field.name.clone())) {
                            for ids in links.values_mut() {
                                ids.retain(|linked| !value::equals(linked, id));
                            }
                        }
                    }
                    RelationKind::ToOne => {
                        let Some(column) = relation.source_field.as_deref() else {
                            continue;
                        };
                        let Some(table) = self.tables.get_mut(schema.name()) else {
                            continue;
                        };
                        for row in table.rows.values_mut() {
                            if !row.get(column).is_some_and(|v| value::equals(v, id)) {
                                continue;
                            }
                            if field.nullable {
                                row.insert(column.to_string(), Value::Null);
                            } else if let Some(child) = row.get(pk) {
                                cascade.push((schema.name(), child.clone()));
                            }
                        }
                    }
                    RelationKind::ReverseToMany => {}
                }
            }
        }
        tracing::trace!(entity, id = %value::display(id), cascade = cascade.len(), "row deleted");
        for (child_entity, child_id) in cascade {
            match self.delete(registry, child_entity, &child_id) {
                Ok(()) | Err(StoreError::NotFound {
                    ..
                }) => {}
                Err(err) => return Err(err)
            }
        }
        Ok(())
    }

    fn fetch_relation(&self, registry: &Registry, record: &Record, name: &str) -> Result<Relation, StoreError> {
        let schema = registry.entity(record.entity())?;
        let entity = schema.name();
        let (_, relation) = schema.relation(name).ok_or_else(|| StoreError::UnknownField {
            entity: entity.to_string(),
            field:  name.to_string()
        })?;
        let tables = self.tables(registry);
        let stored = record.get(schema.pk_name()).and_then(|id| tables.row(entity, id));

        let to_record = |row: &Row| Record::with_values(relation.related, row.clone());
        if relation.kind == RelationKind::ToOne {
            let source = relation.source_field.as_deref().unwrap_or_default();
            let fk = record
                .get(source)
                .or_else(|| stored.and_then(|r| r.get(source)))
                .filter(|v| !v.is_null());
            let target = fk.and_then(|fk| tables.row(relation.related, fk));
            return Ok(Relation::One(target.map(|r| Box::new(to_record(r)))));
        }
        let Some(stored) = stored else {
            return Ok(Relation::Many(Vec::new()));
        };
        Ok(Relation::Many(
            tables.related(entity, stored, name)?.into_iter().map(to_record).collect()
        ))
    }

    fn set_many_to_many(
        &mut self,
        registry: &Registry,
        record: &Record,
        name: &str,
        ids: Vec<Value>
    ) -> Result<(), StoreError> {
        let schema = registry.entity(record.entity())?;
        let entity = schema.name();
        let related = match schema.relation(name) {
            Some((_, relation)) if relation.kind == RelationKind::ToMany => relation.related,
            _ => {
                return Err(StoreError::UnknownField {
                    entity: entity.to_string(),
                    field:  name.to_string()
                });
            }
        };
        let owner = record.get(schema.pk_name()).cloned().unwrap_or(Value::Null);
        if !self.contains(entity, &owner) {
            return Err(StoreError::NotFound {
                entity: entity.to_string(),
                id:     value::display(&owner)
            });
        }
        let mut seen = HashSet::new();
        let mut linked = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.contains(related, &id) {
                return Err(StoreError::NotFound {
                    entity: related.to_string(),
                    id:     value::display(&id)
                });
            }
            if seen.insert(value::id_key(&id)) {
                linked.push(id);
            }
        }
        self.links
            .entry((entity.to_string(), name.to_string()))
            .or_default()
            .insert(value::id_key(&owner), linked);
        Ok(())
    }
}

/// Shared in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    registry: Arc<Registry>,
    state:    Arc<Mutex<MemoryState>>
}

impl MemoryStore {
    /// Empty store for the entities of `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            state: Arc::new(Mutex::new(MemoryState::default()))
        }
    }

    /// Number of stored rows of `entity`.
    pub async fn row_count(&self, entity: &str) -> usize {
        self.state.lock().await.tables.get(entity).map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl Executor for MemoryStore {
    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.state.lock().await.fetch(&self.registry, query)
    }

    async fn count(&self, query: &Query, target: CountTarget) -> Result<usize, StoreError> {
        self.state.lock().await.count(&self.registry, query, &target)
    }

    async fn aggregate(&self, query: &Query) -> Result<Vec<Map<String, Value>>, StoreError> {
        self.state.lock().await.aggregate(&self.registry, query)
    }

    async fn insert(&self, record: &mut Record) -> Result<(), StoreError> {
        self.state.lock().await.insert(&self.registry, record)
    }

    async fn update(&self, record: &mut Record, fields: &[String]) -> Result<(), StoreError> {
        self.state.lock().await.update(&self.registry, record, fields)
    }

    async fn delete(&self, record: &Record) -> Result<(), StoreError> {
        let pk = self.registry.entity(record.entity())?.pk_name();
        let id = record.get(pk).cloned().unwrap_or(Value::Null);
        self.state.lock().await.delete(&self.registry, record.entity(), &id)
    }

    async fn fetch_relation(&self, record: &Record, relation: &str) -> Result<Relation, StoreError> {
        self.state.lock().await.fetch_relation(&self.registry, record, relation)
    }

    async fn set_many_to_many(
        &self,
        record: &Record,
        relation: &str,
        ids: Vec<Value>
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .set_many_to_many(&self.registry, record, relation, ids)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = parking_lot::Mutex::new((*guard).clone());
        tracing::debug!("transaction started");
        Ok(Box::new(MemoryTransaction {
            registry: Arc::clone(&self.registry),
            guard,
            work
        }))
    }
}

/// Open transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    registry: Arc<Registry>,
    guard:    OwnedMutexGuard<MemoryState>,
    work:     parking_lot::Mutex<MemoryState>
}

#[async_trait]
impl Executor for MemoryTransaction {
    fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.work.lock().fetch(&self.registry, query)
    }

    async fn count(&self, query: &Query, target: CountTarget) -> Result<usize, StoreError> {
        self.work.lock().count(&self.registry, query, &target)
    }

    async fn aggregate(&self, query: &Query) -> Result<Vec<Map<String, Value>>, StoreError> {
        self.work.lock().aggregate(&self.registry, query)
    }

    async fn insert(&self, record: &mut Record) -> Result<(), StoreError> {
        self.work.lock().insert(&self.registry, record)
    }

    async fn update(&self, record: &mut Record, fields: &[String]) -> Result<(), StoreError> {
        self.work.lock().update(&self.registry, record, fields)
    }

    async fn delete(&self, record: &Record) -> Result<(), StoreError> {
        let pk = self.registry.entity(record.entity())?.pk_name();
        let id = record.get(pk).cloned().unwrap_or(Value::Null);
        self.work.lock().delete(&self.registry, record.entity(), &id)
    }

    async fn fetch_relation(&self, record: &Record, relation: &str) -> Result<Relation, StoreError> {
        self.work.lock().fetch_relation(&self.registry, record, relation)
    }

    async fn set_many_to_many(
        &self,
        record: &Record,
        relation: &str,
        ids: Vec<Value>
    ) -> Result<(), StoreError> {
        self.work.lock().set_many_to_many(&self.registry, record, relation, ids)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            mut guard,
            work,
            ..
        } = *self;
        *guard = work.into_inner();
        tracing::debug!("transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        fixtures::blog,
        query::{Annotation, Q},
        store::fetch_one
    };

    fn record(entity: &'static str, values: Value) -> Record {
        match values {
            Value::Object(map) => Record::with_values(entity, map),
            _ => panic!("fixture must be an object")
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new(blog());
        for user in [json!({"name": "ann"}), json!({"name": "bob"})] {
            store.insert(&mut record("User", user)).await.unwrap();
        }
        for post in [
            json!({"title": "one", "body": "a b", "author_id": 1}),
            json!({"title": "two", "body": "c", "author_id": 2}),
            json!({"title": "three", "body": "", "author_id": null})
        ] {
            store.insert(&mut record("Post", post)).await.unwrap();
        }
        for text in ["x", "y", "z"] {
            store
                .insert(&mut record("Comment", json!({"text": text, "post_id": 1})))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn insert_fills_generated_values() {
        let store = seeded().await;
        let mut post = record("Post", json!({"title": "four", "body": "b"}));
        store.insert(&mut post).await.unwrap();
        assert_eq!(post.get("id"), Some(&json!(4)));
        assert_eq!(post.get("views"), Some(&json!(0)));
        assert_eq!(post.get("author_id"), Some(&Value::Null));
        assert!(post.get_str("created_at").is_some());
        assert!(post.get_str("updated_at").is_some());
    }

    #[tokio::test]
    async fn constraints_are_enforced() {
        let store = seeded().await;
        let err = store.insert(&mut record("User", json!({"name": "ann"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Unique { ref value, .. } if value == "ann"));
        let err = store.insert(&mut record("Post", json!({"body": "b"}))).await.unwrap_err();
        assert_eq!(err, StoreError::Integrity("NOT NULL constraint failed: Post.title".into()));
        let err = store
            .insert(&mut record("Post", json!({"title": "t", "body": "b", "author_id": 99})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(ref m) if m.starts_with("FOREIGN KEY")));
        let err = store.insert(&mut record("Tag", json!({"label": "x", "color": 1}))).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn join_fan_out_and_distinct_counts() {
        let store = seeded().await;
        let query = Query::new("Post").filter(Q::lookup("comments__text__in", json!(["x", "y", "z"])));
        assert_eq!(store.count(&query, CountTarget::Rows).await.unwrap(), 3);
        assert_eq!(store.count(&query, CountTarget::DistinctIds).await.unwrap(), 1);
        assert_eq!(store.fetch(&query).await.unwrap().len(), 3);
        assert_eq!(store.fetch(&query.clone().distinct()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn negated_groups_wrap_the_whole_condition() {
        let store = seeded().await;
        let q = Q::and(vec![Q::lookup("title", json!("one")), Q::lookup("author_id", json!(1))]).negate();
        let rows = store.fetch(&Query::new("Post").filter(q)).await.unwrap();
        let titles: Vec<_> = rows.iter().filter_map(|r| r.get_str("title")).collect();
        assert_eq!(titles, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn ordering_window_and_only() {
        let store = seeded().await;
        let query = Query::new("Post")
            .order_by(["-title".to_string()])
            .offset(1)
            .limit(1)
            .only(vec!["title".to_string()]);
        let rows = store.fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("title"), Some("three"));
        assert!(rows[0].get("body").is_none());
        assert_eq!(rows[0].get("id"), Some(&json!(3)));
        let by_author = store
            .fetch(&Query::new("Post").order_by(["author.name".to_string()]))
            .await
            .unwrap();
        assert_eq!(by_author[0].get_str("title"), Some("three"));
    }

    #[tokio::test]
    async fn grouped_aggregates() {
        let store = seeded().await;
        let query = Query::new("Comment")
            .group_by(vec!["post_id".to_string()])
            .annotate("_text_", Annotation {
                aggregate: Aggregate::Max,
                field:     "text".to_string()
            })
            .annotate("_id_", Annotation {
                aggregate: Aggregate::Count,
                field:     "id".to_string()
            });
        let rows = store.aggregate(&query).await.unwrap();
        assert_eq!(rows, vec![json!({"post_id": 1, "_text_": "z", "_id_": 3})
            .as_object()
            .cloned()
            .unwrap()]);
        let total = store
            .count(&Query::new("Comment"), CountTarget::DistinctTuple(vec!["post_id".into()]))
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn summary_over_empty_set_yields_one_row() {
        let store = MemoryStore::new(blog());
        let query = Query::new("Post").annotate("_views_", Annotation {
            aggregate: Aggregate::Sum,
            field:     "views".to_string()
        });
        let rows = store.aggregate(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("_views_"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn update_stamps_auto_now() {
        let store = seeded().await;
        let mut post = fetch_one(&store, "Post", &json!(1)).await.unwrap();
        let before = post.get("updated_at").cloned();
        post.set("title", json!("uno"));
        store.update(&mut post, &["title".to_string()]).await.unwrap();
        assert_eq!(post.get_str("title"), Some("uno"));
        assert!(post.get("updated_at").is_some());
        assert!(before.is_some());
        let err = store.update(&mut post, &["nope".to_string()]).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn delete_cascades_and_nulls() {
        let store = seeded().await;
        let post = fetch_one(&store, "Post", &json!(1)).await.unwrap();
        store.delete(&post).await.unwrap();
        assert_eq!(store.row_count("Comment").await, 0);
        let user = fetch_one(&store, "User", &json!(2)).await.unwrap();
        store.delete(&user).await.unwrap();
        let two = fetch_one(&store, "Post", &json!(2)).await.unwrap();
        assert_eq!(two.get("author_id"), Some(&Value::Null));
        assert!(matches!(store.delete(&user).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn relations_load_in_every_direction() {
        let store = seeded().await;
        store.insert(&mut record("Tag", json!({"label": "rust"}))).await.unwrap();
        let post = fetch_one(&store, "Post", &json!(1)).await.unwrap();
        store.set_many_to_many(&post, "tags", vec![json!(1), json!(1)]).await.unwrap();

        let Relation::One(Some(author)) = store.fetch_relation(&post, "author").await.unwrap() else {
            panic!("author should load");
        };
        assert_eq!(author.get_str("name"), Some("ann"));
        let comments = store.fetch_relation(&post, "comments").await.unwrap();
        assert_eq!(comments.records().len(), 3);
        let tags = store.fetch_relation(&post, "tags").await.unwrap();
        assert_eq!(tags.records().len(), 1);

        let tagged = Query::new("Post").filter(Q::lookup("tags__label", json!("rust")));
        assert_eq!(store.count(&tagged, CountTarget::DistinctIds).await.unwrap(), 1);
        let err = store.set_many_to_many(&post, "tags", vec![json!(9)]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = seeded().await;
        {
            let tx = store.begin().await.unwrap();
            tx.insert(&mut record("Tag", json!({"label": "a"}))).await.unwrap();
            assert_eq!(tx.fetch(&Query::new("Tag")).await.unwrap().len(), 1);
        }
        assert_eq!(store.row_count("Tag").await, 0);

        let tx = store.begin().await.unwrap();
        tx.insert(&mut record("Tag", json!({"label": "b"}))).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.row_count("Tag").await, 1);
    }

    #[tokio::test]
    async fn unknown_filter_fields_fail() {
        let store = seeded().await;
        let query = Query::new("Post").filter(Q::lookup("nope", json!(1)));
        assert!(matches!(store.fetch(&query).await, Err(StoreError::UnknownField { .. })));
    }
}
