// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Entities and their dynamic representation.
//!
//! Application code declares entities as plain structs and derives
//! [`Entity`]; the framework itself works on [`Record`]s, a dynamic row
//! made of stored column values, loaded relations and resolved computed
//! values.
//!
//! A relation that has not been loaded is simply absent from
//! [`Record::relation`]. The projector relies on that to omit it from
//! output instead of triggering a lazy load.

use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    error::ApiError,
    registry::{EntitySchema, FieldDescriptor},
    value
};

/// A type the registry knows how to project and persist.
///
/// Usually derived:
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Serialize, Deserialize, Resource)]
/// #[resource(list_exclude(body))]
/// pub struct Post {
///     #[field(id)]
///     pub id: i64,
///     #[field(max_length = 120)]
///     pub title: String,
///     pub body: String,
///     #[belongs_to(User)]
///     pub author_id: Option<i64>
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registry name.
    const NAME: &'static str;

    /// Field table and projection metadata.
    fn schema() -> EntitySchema;

    /// Convert into a dynamic record.
    ///
    /// # Errors
    ///
    /// Fails when the value does not serialize to a JSON object.
    fn to_record(&self) -> Result<Record, ApiError> {
        match serde_json::to_value(self)? {
            Value::Object(values) => Ok(Record::with_values(Self::NAME, values)),
            other => Err(ApiError::internal(format!(
                "{} serialized to {other} instead of an object",
                Self::NAME
            )))
        }
    }

    /// Convert back from a dynamic record.
    ///
    /// # Errors
    ///
    /// Fails when the stored values do not deserialize into `Self`.
    fn from_record(record: &Record) -> Result<Self, ApiError> {
        Ok(serde_json::from_value(Value::Object(record.values().clone()))?)
    }
}

/// Load state of a relation on a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// To-one relation; `None` when the key is null.
    One(Option<Box<Record>>),
    /// To-many relation.
    Many(Vec<Record>)
}

impl Relation {
    /// Records held by the relation.
    #[must_use]
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Self::One(one) => one.iter().map(Box::as_ref).collect(),
            Self::Many(many) => many.iter().collect()
        }
    }

    /// Mutable access to the held records.
    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            Self::One(one) => one.iter_mut().map(Box::as_mut).collect(),
            Self::Many(many) => many.iter_mut().collect()
        }
    }
}

/// Dynamic row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity:    &'static str,
    values:    Map<String, Value>,
    relations: IndexMap<String, Relation>,
    computed:  IndexMap<String, Value>
}

impl Record {
    /// Empty record of `entity`.
    #[must_use]
    pub fn new(entity: &'static str) -> Self {
        Self::with_values(entity, Map::new())
    }

    /// Record with the given column values.
    #[must_use]
    pub fn with_values(entity: &'static str, values: Map<String, Value>) -> Self {
        Self {
            entity,
            values,
            relations: IndexMap::new(),
            computed: IndexMap::new()
        }
    }

    /// Construct a new, unsaved row from form columns, filling defaults.
    ///
    /// Absent columns receive their declared default, then `null` when
    /// nullable. Auto timestamps are stamped with the current time. Columns
    /// that remain absent are left for the store to reject.
    #[must_use]
    pub fn construct(schema: &EntitySchema, mut columns: Map<String, Value>) -> Self {
        for field in schema.fields() {
            let Some(column) = field.storage_name() else {
                continue;
            };
            if columns.contains_key(column) {
                continue;
            }
            if let Some(value) = default_for(field) {
                columns.insert(column.to_string(), value);
            }
        }
        Self::with_values(schema.name(), columns)
    }

    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    /// Stored column values.
    #[must_use]
    pub const fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.values
    }

    /// Consume into the column map.
    #[must_use]
    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// String column, if present and a string.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Value::as_str)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.shift_remove(column)
    }

    /// Loaded relation, `None` when not fetched.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Relation> {
        self.relations.get_mut(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, relation: Relation) {
        self.relations.insert(name.into(), relation);
    }

    /// Forget a loaded relation.
    pub fn clear_relation(&mut self, name: &str) {
        self.relations.shift_remove(name);
    }

    /// Resolved computed value.
    #[must_use]
    pub fn computed(&self, name: &str) -> Option<&Value> {
        self.computed.get(name)
    }

    pub fn set_computed(&mut self, name: impl Into<String>, value: Value) {
        self.computed.insert(name.into(), value);
    }

    /// Deserialize into a typed entity.
    ///
    /// # Errors
    ///
    /// See [`Entity::from_record`].
    pub fn to_entity<E: Entity>(&self) -> Result<E, ApiError> {
        E::from_record(self)
    }
}

/// Construction-time default for a stored column.
fn default_for(field: &FieldDescriptor) -> Option<Value> {
    if field.is_auto_timestamp() && field.default.is_none() {
        return Some(value::now());
    }
    field
        .default
        .produce()
        .or_else(|| field.nullable.then_some(Value::Null))
}
