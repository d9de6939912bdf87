// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Entity registry.
//!
//! The registry is the single source of truth about entities: their
//! columns, relations and computed fields. It is built once at startup,
//! validated, and then shared as `Arc<Registry>` by the projector, the
//! store and every resource.
//!
//! ```text
//! Registry::builder()
//!     .register::<User>()     ─┐
//!     .register::<Post>()      ├─ EntitySchema per entity
//!     .register::<Comment>()  ─┘
//!     .build()?               ── validated, view cache attached
//! ```
//!
//! Validation rejects schemas that would make projection ambiguous: a
//! missing or duplicated primary key, relations to unregistered entities,
//! reverse relations whose back-reference does not exist, and computed
//! fields shadowing columns.

mod computed;
mod field;
mod schema;

use std::{collections::HashMap, sync::Arc};

pub use computed::{Accessor, AsyncAccessor, AsyncSetter, ComputedField, Setter, SyncAccessor, SyncSetter};
pub use field::{
    EnumMember, EnumType, FieldDefault, FieldDescriptor, FieldType, FieldTyped, RelationDescriptor,
    RelationKind, ValidateFn, Validator
};
use indexmap::IndexMap;
use parking_lot::RwLock;
pub use schema::{DELETED_AT, DELETED_FLAG, EntitySchema, ProjectionMeta};

use crate::{
    entity::Entity,
    view::{ViewKey, ViewType}
};

/// Schema construction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Lookup of an entity that was never registered.
    #[error("entity `{0}` is not registered")]
    UnknownEntity(String),

    /// The same entity name registered twice.
    #[error("entity `{0}` is registered twice")]
    DuplicateEntity(String),

    /// No field flagged as primary key.
    #[error("entity `{0}` has no primary key")]
    MissingPrimaryKey(String),

    /// More than one primary key.
    #[error("entity `{0}` declares more than one primary key")]
    DuplicatePrimaryKey(String),

    /// Two fields share a name.
    #[error("entity `{entity}` declares `{field}` twice")]
    DuplicateField {
        /// Entity name.
        entity: String,
        /// Field name.
        field:  String
    },

    /// Relation points at an unregistered entity.
    #[error("relation `{entity}.{field}` targets unregistered entity `{target}`")]
    UnknownRelationTarget {
        /// Entity name.
        entity: String,
        /// Relation name.
        field:  String,
        /// Missing target.
        target: String
    },

    /// Reverse relation whose `via` is not a to-one relation on the target.
    #[error("relation `{entity}.{field}` expects `{target}.{via}` to be a to-one relation")]
    InvalidBackReference {
        /// Entity name.
        entity: String,
        /// Relation name.
        field:  String,
        /// Target entity.
        target: String,
        /// Expected back-reference.
        via:    String
    },

    /// Computed field named like a column or relation.
    #[error("computed field `{entity}.{field}` collides with a stored field")]
    ComputedCollision {
        /// Entity name.
        entity: String,
        /// Field name.
        field:  String
    }
}

/// Collects entity schemas before validation.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntitySchema>
}

impl RegistryBuilder {
    /// Register an entity type.
    #[must_use]
    pub fn register<E: Entity>(self) -> Self {
        self.schema(E::schema())
    }

    /// Register a hand-built schema.
    #[must_use]
    pub fn schema(mut self, schema: EntitySchema) -> Self {
        self.entities.push(schema);
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found.
    pub fn build(self) -> Result<Arc<Registry>, SchemaError> {
        let mut entities = IndexMap::with_capacity(self.entities.len());
        for schema in self.entities {
            let name = schema.name();
            if entities.insert(name, schema).is_some() {
                return Err(SchemaError::DuplicateEntity(name.to_string()));
            }
        }
        for schema in entities.values() {
            validate(schema, &entities)?;
        }
        tracing::debug!(entities = entities.len(), "entity registry built");
        Ok(Arc::new(Registry {
            entities,
            views: RwLock::new(HashMap::new())
        }))
    }
}

fn validate(
    schema: &EntitySchema,
    entities: &IndexMap<&'static str, EntitySchema>
) -> Result<(), SchemaError> {
    let entity = schema.name().to_string();

    match schema.fields().iter().filter(|f| f.primary_key).count() {
        0 => return Err(SchemaError::MissingPrimaryKey(entity)),
        1 => {}
        _ => return Err(SchemaError::DuplicatePrimaryKey(entity))
    }

    let mut seen: Vec<&str> = Vec::new();
    for field in schema.fields() {
        let storage = field.storage_name().filter(|s| *s != field.name);
        for name in std::iter::once(field.name.as_str()).chain(storage) {
            if seen.contains(&name) {
                return Err(SchemaError::DuplicateField {
                    entity,
                    field: name.to_string()
                });
            }
            seen.push(name);
        }

        let Some(relation) = &field.relation else {
            continue;
        };
        let Some(target) = entities.get(relation.related) else {
            return Err(SchemaError::UnknownRelationTarget {
                entity,
                field: field.name.clone(),
                target: relation.related.to_string()
            });
        };
        if relation.kind == RelationKind::ReverseToMany {
            let via = relation.via.clone().unwrap_or_default();
            let valid = target
                .relation(&via)
                .is_some_and(|(_, back)| back.kind == RelationKind::ToOne && back.related == schema.name());
            if !valid {
                return Err(SchemaError::InvalidBackReference {
                    entity,
                    field: field.name.clone(),
                    target: relation.related.to_string(),
                    via
                });
            }
        }
    }

    for computed in schema.computed_list() {
        if seen.contains(&computed.name()) {
            return Err(SchemaError::ComputedCollision {
                entity,
                field: computed.name().to_string()
            });
        }
    }
    Ok(())
}

/// Validated set of entity schemas plus the memoized view cache.
#[derive(Debug)]
pub struct Registry {
    entities:         IndexMap<&'static str, EntitySchema>,
    pub(crate) views: RwLock<HashMap<ViewKey, Arc<ViewType>>>
}

impl Registry {
    /// Start collecting schemas.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Schema by entity name.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownEntity`] when `name` is not registered.
    pub fn entity(&self, name: &str) -> Result<&EntitySchema, SchemaError> {
        self.entities
            .get(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    /// Schema by entity name, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    /// All schemas in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    /// Number of memoized views.
    #[must_use]
    pub fn cached_views(&self) -> usize {
        self.views.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> EntitySchema {
        EntitySchema::new("User")
            .field(FieldDescriptor::column::<i64>("id").primary_key())
            .field(FieldDescriptor::column::<String>("name"))
            .field(FieldDescriptor::reverse("posts", "Post", "author"))
    }

    fn post() -> EntitySchema {
        EntitySchema::new("Post")
            .field(FieldDescriptor::column::<i64>("id").primary_key())
            .field(FieldDescriptor::to_one::<i64>("author", "User"))
    }

    #[test]
    fn builds_valid_registry() {
        let registry = Registry::builder().schema(user()).schema(post()).build().unwrap();
        assert_eq!(registry.entities().count(), 2);
        assert!(registry.entity("Post").is_ok());
        assert_eq!(
            registry.entity("Nope").unwrap_err(),
            SchemaError::UnknownEntity("Nope".into())
        );
    }

    #[test]
    fn rejects_unknown_target() {
        let err = Registry::builder().schema(post()).build().unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRelationTarget { .. }));
    }

    #[test]
    fn rejects_bad_back_reference() {
        let user = EntitySchema::new("User")
            .field(FieldDescriptor::column::<i64>("id").primary_key())
            .field(FieldDescriptor::reverse("posts", "Post", "writer"));
        let err = Registry::builder().schema(user).schema(post()).build().unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBackReference { .. }));
    }

    #[test]
    fn rejects_missing_and_duplicate_keys() {
        let none = EntitySchema::new("A").field(FieldDescriptor::column::<i64>("x"));
        assert_eq!(
            Registry::builder().schema(none).build().unwrap_err(),
            SchemaError::MissingPrimaryKey("A".into())
        );
        let two = EntitySchema::new("B")
            .field(FieldDescriptor::column::<i64>("x").primary_key())
            .field(FieldDescriptor::column::<i64>("y").primary_key());
        assert_eq!(
            Registry::builder().schema(two).build().unwrap_err(),
            SchemaError::DuplicatePrimaryKey("B".into())
        );
    }

    #[test]
    fn rejects_computed_collision() {
        let schema = EntitySchema::new("C")
            .field(FieldDescriptor::column::<i64>("id").primary_key())
            .computed(ComputedField::new("id").getter(|_| Ok(serde_json::Value::Null)));
        assert!(matches!(
            Registry::builder().schema(schema).build().unwrap_err(),
            SchemaError::ComputedCollision { .. }
        ));
    }

    #[test]
    fn rejects_shadow_key_clash() {
        let schema = EntitySchema::new("D")
            .field(FieldDescriptor::column::<i64>("id").primary_key())
            .field(FieldDescriptor::column::<i64>("owner_id"))
            .field(FieldDescriptor::to_one::<i64>("owner", "D"));
        assert!(matches!(
            Registry::builder().schema(schema).build().unwrap_err(),
            SchemaError::DuplicateField { .. }
        ));
    }

    #[test]
    fn rejects_duplicate_entity() {
        let err = Registry::builder().schema(post()).schema(post()).build().unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEntity("Post".into()));
    }
}
