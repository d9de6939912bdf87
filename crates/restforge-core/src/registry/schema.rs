// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Per-entity schema: the ordered field table plus projection metadata.

use super::{
    computed::ComputedField,
    field::{FieldDescriptor, RelationDescriptor}
};

/// Soft-delete flag column on recoverable entities.
pub const DELETED_FLAG: &str = "is_deleted";

/// Timestamp of the last delete or recover on recoverable entities.
pub const DELETED_AT: &str = "delete_or_recover_at";

/// Projection knobs read by the projector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionMeta {
    /// When non-empty, only these fields are projected.
    pub include:       Vec<String>,
    /// Fields removed from every view.
    pub exclude:       Vec<String>,
    /// Fields removed from list views.
    pub list_exclude:  Vec<String>,
    /// Fields removed from forms.
    pub form_exclude:  Vec<String>,
    /// Nesting depth after which relations stop being expanded.
    pub max_recursion: usize
}

impl Default for ProjectionMeta {
    fn default() -> Self {
        Self {
            include:       Vec::new(),
            exclude:       Vec::new(),
            list_exclude:  Vec::new(),
            form_exclude:  Vec::new(),
            max_recursion: 1
        }
    }
}

/// Schema of one entity.
///
/// Built with chained setters, usually from generated code:
///
/// ```rust
/// use restforge_core::{EntitySchema, FieldDescriptor};
///
/// let schema = EntitySchema::new("Tag")
///     .field(FieldDescriptor::column::<i64>("id").primary_key())
///     .field(FieldDescriptor::column::<String>("label").max_length(32).unique())
///     .list_exclude(["label"]);
/// assert_eq!(schema.pk_name(), "id");
/// ```
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name:        &'static str,
    fields:      Vec<FieldDescriptor>,
    computed:    Vec<ComputedField>,
    meta:        ProjectionMeta,
    recoverable: bool,
    description: Option<String>
}

fn names<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>
{
    items.into_iter().map(Into::into).collect()
}

impl EntitySchema {
    /// Empty schema for `name`.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            computed: Vec::new(),
            meta: ProjectionMeta::default(),
            recoverable: false,
            description: None
        }
    }

    /// Append a field; declaration order is projection order.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a computed field.
    #[must_use]
    pub fn computed(mut self, field: ComputedField) -> Self {
        self.computed.push(field);
        self
    }

    /// Append several computed fields.
    #[must_use]
    pub fn computed_fields(mut self, fields: impl IntoIterator<Item = ComputedField>) -> Self {
        self.computed.extend(fields);
        self
    }

    #[must_use]
    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.meta.include = names(fields);
        self
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.meta.exclude = names(fields);
        self
    }

    #[must_use]
    pub fn list_exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.meta.list_exclude = names(fields);
        self
    }

    #[must_use]
    pub fn form_exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.meta.form_exclude = names(fields);
        self
    }

    #[must_use]
    pub fn max_recursion(mut self, depth: usize) -> Self {
        self.meta.max_recursion = depth;
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Enable soft delete.
    ///
    /// Adds the `is_deleted` flag and `delete_or_recover_at` timestamp
    /// columns unless the entity already declares them.
    #[must_use]
    pub fn recoverable(mut self) -> Self {
        self.recoverable = true;
        if self.field_named(DELETED_FLAG).is_none() {
            self.fields
                .push(FieldDescriptor::column::<bool>(DELETED_FLAG).default_value(false));
        }
        if self.field_named(DELETED_AT).is_none() {
            self.fields.push(FieldDescriptor::column::<
                Option<chrono::DateTime<chrono::Utc>>
            >(DELETED_AT));
        }
        self
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn computed_list(&self) -> &[ComputedField] {
        &self.computed
    }

    #[must_use]
    pub const fn meta(&self) -> &ProjectionMeta {
        &self.meta
    }

    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Field by its declared name.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field by its stored column name (resolves `<relation>_id`).
    #[must_use]
    pub fn storage_field(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.storage_name() == Some(column))
    }

    /// Relation by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<(&FieldDescriptor, &RelationDescriptor)> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.relation.as_ref().map(|r| (f, r)))
    }

    /// Computed field by name.
    #[must_use]
    pub fn computed_field(&self, name: &str) -> Option<&ComputedField> {
        self.computed.iter().find(|c| c.name() == name)
    }

    /// The primary key field.
    #[must_use]
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Name of the primary key column, `"id"` when none is declared.
    #[must_use]
    pub fn pk_name(&self) -> &str {
        self.primary_key().map_or("id", |f| f.name.as_str())
    }

    /// Stored column names in declaration order, shadow keys included.
    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().filter_map(FieldDescriptor::storage_name)
    }

    /// Whether `name` is a stored column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns().any(|c| c == name)
    }
}
