// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Schema projection.
//!
//! The projector turns an [`EntitySchema`](crate::EntitySchema) into
//! [`ViewType`]s: concrete field lists used to shape responses and validate
//! payloads. Three kinds exist:
//!
//! | Kind | Default mode | Excludes |
//! |------|--------------|----------|
//! | `List` | optional | `exclude` + `list_exclude` |
//! | `Detail` | required | `exclude` |
//! | `Form` | natural | `exclude` + `form_exclude`, auto timestamps, top-level primary key |
//!
//! Views are memoized per [`ViewKey`]; asking twice returns the same `Arc`.
//!
//! # Recursion
//!
//! Relations expand into nested views (detail views for output, forms for
//! input). Each nesting level appends the entity to the view's from-path;
//! once the path grows past `max_recursion` relations are skipped. This
//! keeps cyclic schemas (`User -> Post -> User`) finite.
//!
//! ```text
//! Post.detail.required
//! ├── id, title, author_id
//! ├── author: User.detail.in.Post.required
//! │   └── id, name           (relations skipped at depth 2)
//! └── tags: [Tag.detail.in.Post.required]
//! ```

mod openapi;
mod validate;

use std::{collections::BTreeSet, fmt, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;
pub(crate) use validate::coerce;
pub use validate::{FieldError, FieldErrorKind, ValidationErrors};

use crate::registry::{
    ComputedField, EntitySchema, FieldDefault, FieldDescriptor, FieldType, Registry, RelationKind,
    SchemaError, Validator
};

/// Which projection to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Row in a list response.
    List,
    /// Single-object response.
    Detail,
    /// Create or update payload.
    Form
}

impl ViewKind {
    const fn label(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Detail => "detail",
            Self::Form => "form"
        }
    }
}

/// How presence requirements are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredMode {
    /// From the column: nullable or defaulted fields are optional.
    Natural,
    /// Every non-nullable field must be present.
    Required,
    /// Every field may be absent or null.
    Optional
}

/// Projection request; half of the memo key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewSpec {
    kind:          ViewKind,
    include:       Option<BTreeSet<String>>,
    exclude:       Option<BTreeSet<String>>,
    required:      RequiredMode,
    from_path:     Vec<&'static str>,
    max_recursion: Option<usize>
}

impl ViewSpec {
    fn of(kind: ViewKind, required: RequiredMode) -> Self {
        Self {
            kind,
            include: None,
            exclude: None,
            required,
            from_path: Vec::new(),
            max_recursion: None
        }
    }

    /// List view, every field optional.
    #[must_use]
    pub fn list() -> Self {
        Self::of(ViewKind::List, RequiredMode::Optional)
    }

    /// Detail view, fields required.
    #[must_use]
    pub fn detail() -> Self {
        Self::of(ViewKind::Detail, RequiredMode::Required)
    }

    /// Form view with natural requirements.
    #[must_use]
    pub fn form() -> Self {
        Self::of(ViewKind::Form, RequiredMode::Natural)
    }

    /// Restrict to these fields, replacing the entity's own include list.
    #[must_use]
    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Drop these fields, replacing the entity's own exclude list.
    #[must_use]
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.exclude = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn required(mut self, mode: RequiredMode) -> Self {
        self.required = mode;
        self
    }

    /// Nest under the given chain of entities.
    #[must_use]
    pub fn within(mut self, path: Vec<&'static str>) -> Self {
        self.from_path = path;
        self
    }

    #[must_use]
    pub const fn max_recursion(mut self, depth: usize) -> Self {
        self.max_recursion = Some(depth);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> ViewKind {
        self.kind
    }

    #[must_use]
    pub const fn mode(&self) -> RequiredMode {
        self.required
    }
}

/// Memo key: entity plus projection request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    entity: String,
    spec:   ViewSpec
}

/// Default of a projected field.
#[derive(Clone)]
pub enum ViewDefault {
    /// Must be present.
    Required,
    /// Defaults to `null`.
    Null,
    /// Constant default.
    Value(Value),
    /// Produced on demand.
    Factory(fn() -> Value)
}

impl ViewDefault {
    /// Materialize the default; `None` when the field is required.
    #[must_use]
    pub fn produce(&self) -> Option<Value> {
        match self {
            Self::Required => None,
            Self::Null => Some(Value::Null),
            Self::Value(v) => Some(v.clone()),
            Self::Factory(f) => Some(f())
        }
    }
}

impl fmt::Debug for ViewDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "Required"),
            Self::Null => write!(f, "Null"),
            Self::Value(v) => write!(f, "Value({v})"),
            Self::Factory(_) => write!(f, "Factory(..)")
        }
    }
}

/// Structural shape of a projected field.
#[derive(Debug, Clone)]
pub enum FieldShape {
    /// Scalar of the given type.
    Scalar(FieldType),
    /// Nested object.
    Object(Arc<ViewType>),
    /// List of nested objects.
    List(Arc<ViewType>)
}

/// Where the value of a projected field comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Stored column.
    Column,
    /// Key column of a to-one relation.
    ShadowKey {
        /// Relation name.
        relation: String
    },
    /// Loaded relation.
    Relation(RelationKind),
    /// Computed field.
    Computed {
        /// Whether the accessor must be awaited.
        is_async: bool
    }
}

/// One field of a [`ViewType`].
#[derive(Debug, Clone)]
pub struct ViewField {
    /// Output key.
    pub name:        String,
    /// Structure.
    pub shape:       FieldShape,
    /// Whether `null` is accepted.
    pub optional:    bool,
    /// Default when absent.
    pub default:     ViewDefault,
    /// Value source.
    pub source:      FieldSource,
    /// Maximum string length.
    pub max_length:  Option<usize>,
    /// Schema description.
    pub description: Option<String>,
    /// Inbound constraints.
    pub validators:  Vec<Validator>
}

impl ViewField {
    /// Whether a payload must carry this field.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.default, ViewDefault::Required)
    }
}

/// A projected view of an entity.
#[derive(Debug, Clone)]
pub struct ViewType {
    name:   String,
    entity: &'static str,
    kind:   ViewKind,
    fields: IndexMap<String, ViewField>
}

impl ViewType {
    /// Dotted name, e.g. `Post.detail.in.User.optional`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    #[must_use]
    pub const fn kind(&self) -> ViewKind {
        self.kind
    }

    #[must_use]
    pub const fn fields(&self) -> &IndexMap<String, ViewField> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ViewField> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of stored columns projected by this view.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.fields
            .values()
            .filter(|f| matches!(f.source, FieldSource::Column | FieldSource::ShadowKey { .. }))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Copy with an extra validator on `field`. Unknown fields are ignored.
    #[must_use]
    pub fn with_validator(&self, field: &str, validator: Validator) -> Self {
        let mut view = self.clone();
        if let Some(target) = view.fields.get_mut(field) {
            target.validators.push(validator);
        }
        view.name.push_str(".custom");
        view
    }

    /// Copy where every field may be absent. Used for partial updates.
    #[must_use]
    pub fn partial(&self) -> Self {
        let mut view = self.clone();
        for field in view.fields.values_mut() {
            if field.is_required() {
                field.default = ViewDefault::Null;
            }
        }
        view.name.push_str(".partial");
        view
    }
}

impl Registry {
    /// Project `entity` according to `spec`, memoized.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownEntity`] when `entity` (or a related entity) is
    /// not registered.
    pub fn project(&self, entity: &str, spec: &ViewSpec) -> Result<Arc<ViewType>, SchemaError> {
        let key = ViewKey {
            entity: entity.to_string(),
            spec:   spec.clone()
        };
        if let Some(view) = self.views.read().get(&key) {
            return Ok(Arc::clone(view));
        }

        let built = Arc::new(self.build_view(entity, spec)?);
        let mut views = self.views.write();
        let view = views.entry(key).or_insert(built);
        Ok(Arc::clone(view))
    }

    /// Default list view.
    ///
    /// # Errors
    ///
    /// See [`Registry::project`].
    pub fn list_view(&self, entity: &str) -> Result<Arc<ViewType>, SchemaError> {
        self.project(entity, &ViewSpec::list())
    }

    /// Default detail view.
    ///
    /// # Errors
    ///
    /// See [`Registry::project`].
    pub fn detail_view(&self, entity: &str) -> Result<Arc<ViewType>, SchemaError> {
        self.project(entity, &ViewSpec::detail())
    }

    /// Form view in the given mode.
    ///
    /// # Errors
    ///
    /// See [`Registry::project`].
    pub fn form_view(&self, entity: &str, mode: RequiredMode) -> Result<Arc<ViewType>, SchemaError> {
        self.project(entity, &ViewSpec::form().required(mode))
    }

    fn build_view(&self, entity: &str, spec: &ViewSpec) -> Result<ViewType, SchemaError> {
        let schema = self.entity(entity)?;
        let meta = schema.meta();
        let is_form = spec.kind == ViewKind::Form;

        let include: Option<BTreeSet<String>> = spec
            .include
            .clone()
            .or_else(|| (!meta.include.is_empty()).then(|| meta.include.iter().cloned().collect()));
        let mut exclude: BTreeSet<String> = spec
            .exclude
            .clone()
            .unwrap_or_else(|| meta.exclude.iter().cloned().collect());
        match spec.kind {
            ViewKind::List => exclude.extend(meta.list_exclude.iter().cloned()),
            ViewKind::Detail => {}
            ViewKind::Form => {
                exclude.extend(meta.form_exclude.iter().cloned());
                for field in schema.fields() {
                    if field.auto_now_add || (field.auto_now && spec.required == RequiredMode::Natural) {
                        exclude.insert(field.name.clone());
                    }
                }
                if spec.from_path.is_empty() {
                    exclude.insert(schema.pk_name().to_string());
                }
            }
        }
        let visible = |names: &[&str]| {
            include
                .as_ref()
                .is_none_or(|inc| names.iter().any(|n| inc.contains(*n)))
                && !names.iter().any(|n| exclude.contains(*n))
        };

        let max_recursion = spec.max_recursion.unwrap_or(meta.max_recursion);
        let mut from_path = spec.from_path.clone();
        from_path.push(schema.name());
        let expand = from_path.len() <= max_recursion;

        let mut fields = IndexMap::new();
        for field in schema.fields() {
            let Some(relation) = &field.relation else {
                if visible(&[&field.name]) {
                    fields.insert(field.name.clone(), column_field(field, spec.required));
                }
                continue;
            };
            let shadow = relation.source_field.as_deref();
            let names: Vec<&str> = std::iter::once(field.name.as_str()).chain(shadow).collect();
            if !visible(&names) || !expand {
                continue;
            }
            if relation.kind == RelationKind::ReverseToMany && is_form {
                continue;
            }
            if let Some(shadow) = shadow {
                fields.insert(shadow.to_string(), shadow_field(field, shadow, spec.required));
                if is_form {
                    continue;
                }
            }

            let nested_spec = if is_form {
                ViewSpec::form().required(RequiredMode::Optional)
            } else if spec.required == RequiredMode::Required {
                ViewSpec::detail()
            } else {
                ViewSpec::detail().required(RequiredMode::Optional)
            }
            .within(from_path.clone());
            let nested = self.project(relation.related, &nested_spec)?;
            let shape = if relation.kind.is_many() {
                FieldShape::List(nested)
            } else {
                FieldShape::Object(nested)
            };
            fields.insert(field.name.clone(), ViewField {
                name: field.name.clone(),
                shape,
                optional: true,
                default: ViewDefault::Null,
                source: FieldSource::Relation(relation.kind),
                max_length: None,
                description: field.description.clone(),
                validators: Vec::new()
            });
        }

        for computed in schema.computed_list() {
            let exposed = if is_form { computed.is_writable() } else { computed.is_readable() };
            if exposed && visible(&[computed.name()]) {
                fields.insert(computed.name().to_string(), computed_field(computed));
            }
        }

        Ok(ViewType {
            name: view_name(schema, spec),
            entity: schema.name(),
            kind: spec.kind,
            fields
        })
    }
}

fn view_name(schema: &EntitySchema, spec: &ViewSpec) -> String {
    let mut parts = vec![schema.name(), spec.kind.label()];
    if !spec.from_path.is_empty() {
        parts.push("in");
        parts.extend(spec.from_path.iter().copied());
    }
    match spec.required {
        RequiredMode::Natural => {}
        RequiredMode::Required => parts.push("required"),
        RequiredMode::Optional => parts.push("optional")
    }
    parts.join(".")
}

fn column_default(field: &FieldDescriptor, mode: RequiredMode) -> ViewDefault {
    let declared = match &field.default {
        FieldDefault::None => None,
        FieldDefault::Value(v) => Some(ViewDefault::Value(v.clone())),
        FieldDefault::Factory(f) => Some(ViewDefault::Factory(*f))
    };
    match mode {
        RequiredMode::Required if field.nullable => ViewDefault::Null,
        RequiredMode::Required => ViewDefault::Required,
        RequiredMode::Optional => declared.unwrap_or(ViewDefault::Null),
        RequiredMode::Natural => match declared {
            Some(default) => default,
            None if field.nullable => ViewDefault::Null,
            None if field.is_auto_timestamp() => ViewDefault::Factory(crate::value::now),
            None => ViewDefault::Required
        }
    }
}

fn column_field(field: &FieldDescriptor, mode: RequiredMode) -> ViewField {
    let max_length = match field.field_type {
        FieldType::Str => field.max_length,
        _ => None
    };
    ViewField {
        name: field.name.clone(),
        shape: FieldShape::Scalar(field.field_type.clone()),
        optional: field.nullable || mode == RequiredMode::Optional,
        default: column_default(field, mode),
        source: FieldSource::Column,
        max_length,
        description: field.description.clone(),
        validators: field.validators.clone()
    }
}

fn shadow_field(field: &FieldDescriptor, shadow: &str, mode: RequiredMode) -> ViewField {
    let default = if field.nullable {
        ViewDefault::Null
    } else {
        match (mode, field.default.produce()) {
            (RequiredMode::Optional, value) => value.map_or(ViewDefault::Null, ViewDefault::Value),
            (_, Some(value)) => ViewDefault::Value(value),
            (_, None) => ViewDefault::Required
        }
    };
    ViewField {
        name: shadow.to_string(),
        shape: FieldShape::Scalar(field.field_type.clone()),
        optional: field.nullable || mode == RequiredMode::Optional,
        default,
        source: FieldSource::ShadowKey {
            relation: field.name.clone()
        },
        max_length: None,
        description: field.description.clone(),
        validators: Vec::new()
    }
}

fn computed_field(computed: &ComputedField) -> ViewField {
    ViewField {
        name:        computed.name().to_string(),
        shape:       FieldShape::Scalar(computed.field_type()),
        optional:    true,
        default:     ViewDefault::Null,
        source:      FieldSource::Computed {
            is_async: computed.is_async()
        },
        max_length:  None,
        description: computed.description_text().map(str::to_string),
        validators:  Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::blog;

    #[test]
    fn projection_is_memoized() {
        let registry = blog();
        let a = registry.detail_view("Post").unwrap();
        let b = registry.detail_view("Post").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let other = registry.list_view("Post").unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn list_view_applies_list_exclude() {
        let registry = blog();
        let list = registry.list_view("Post").unwrap();
        assert!(!list.contains("body"));
        assert!(list.contains("title"));
        assert!(list.fields().values().all(|f| f.optional));
        assert_eq!(list.name(), "Post.list.optional");
    }

    #[test]
    fn detail_view_expands_relations_once() {
        let registry = blog();
        let detail = registry.detail_view("Post").unwrap();
        assert!(detail.contains("author_id"));
        let Some(FieldShape::Object(author)) = detail.field("author").map(|f| f.shape.clone()) else {
            panic!("author should be a nested object");
        };
        assert_eq!(author.name(), "User.detail.in.Post.required");
        assert!(!author.contains("posts"));
        assert!(author.contains("name"));
        assert!(matches!(detail.field("tags").unwrap().shape, FieldShape::List(_)));
    }

    #[test]
    fn detail_view_requires_non_nullable_columns() {
        let registry = blog();
        let detail = registry.detail_view("Post").unwrap();
        assert!(detail.field("title").unwrap().is_required());
        assert!(!detail.field("author_id").unwrap().is_required());
        assert!(detail.field("summary").unwrap().optional);
        assert!(!detail.contains("secret"));
    }

    #[test]
    fn form_view_excludes_keys_and_timestamps() {
        let registry = blog();
        let form = registry.form_view("Post", RequiredMode::Natural).unwrap();
        assert!(!form.contains("id"));
        assert!(!form.contains("created_at"));
        assert!(!form.contains("updated_at"));
        assert!(form.contains("author_id"));
        assert!(!form.contains("author"));
        assert!(form.contains("secret"));
        assert!(!form.contains("summary"));
        assert!(form.field("title").unwrap().is_required());
        assert!(!form.field("views").unwrap().is_required());
        let Some(FieldShape::List(tags)) = form.field("tags").map(|f| f.shape.clone()) else {
            panic!("tags should be a list of forms");
        };
        assert!(tags.contains("id"));
        assert_eq!(tags.name(), "Tag.form.in.Post.optional");
    }

    #[test]
    fn form_view_keeps_watermark_outside_natural_mode() {
        let registry = blog();
        let form = registry.form_view("Post", RequiredMode::Optional).unwrap();
        assert!(form.contains("updated_at"));
        assert!(!form.contains("created_at"));
    }

    #[test]
    fn reverse_relations_are_not_in_forms() {
        let registry = blog();
        let form = registry.form_view("User", RequiredMode::Natural).unwrap();
        assert!(!form.contains("posts"));
        let detail = registry.detail_view("User").unwrap();
        assert!(detail.contains("posts"));
    }

    #[test]
    fn include_overrides_meta() {
        let registry = blog();
        let view = registry.project("Post", &ViewSpec::detail().include(["id", "title"])).unwrap();
        let names: Vec<_> = view.fields().keys().cloned().collect();
        assert_eq!(names, vec!["id", "title"]);
    }

    #[test]
    fn recursion_bound_is_configurable() {
        let registry = blog();
        let flat = registry.project("Post", &ViewSpec::detail().max_recursion(0)).unwrap();
        assert!(!flat.contains("author"));
        assert!(!flat.contains("author_id"));
        let deep = registry.project("Post", &ViewSpec::detail().max_recursion(2)).unwrap();
        assert!(deep.contains("author"));
    }

    #[test]
    fn partial_view_drops_requirements() {
        let registry = blog();
        let form = registry.form_view("Post", RequiredMode::Natural).unwrap();
        let partial = form.partial();
        assert!(partial.fields().values().all(|f| !f.is_required()));
        assert!(partial.name().ends_with(".partial"));
        assert!(registry.cached_views() >= 2);
    }
}
