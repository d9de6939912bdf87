// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Field descriptors: the per-field half of an entity schema.
//!
//! A [`FieldDescriptor`] is either a plain column or a relation. Columns
//! carry a [`FieldType`] derived from the Rust type through [`FieldTyped`];
//! relations carry a [`RelationDescriptor`] naming the related entity.
//!
//! | Relation kind | Stored as | Appears in forms as |
//! |---------------|-----------|---------------------|
//! | `ToOne` | shadow column `<name>_id` | `<name>_id` only |
//! | `ToMany` | link table | list of nested forms |
//! | `ReverseToMany` | foreign key on the other side | never |

use std::{collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Scalar type of a column, as seen by validation and schema rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Signed or unsigned integer.
    Int,
    /// Floating point (also used for decimals and currency).
    Float,
    /// Boolean.
    Bool,
    /// Text.
    Str,
    /// Timestamp, stored as RFC 3339 in UTC.
    Datetime,
    /// Calendar date.
    Date,
    /// UUID in hyphenated form.
    Uuid,
    /// Arbitrary JSON.
    Json,
    /// Homogeneous list.
    List(Box<FieldType>),
    /// Closed set of members.
    Enum(EnumType)
}

impl FieldType {
    /// Name used in OpenAPI output and error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Str | Self::Datetime | Self::Date | Self::Uuid => "string",
            Self::Json => "object",
            Self::List(_) => "array",
            Self::Enum(_) => "enum"
        }
    }
}

/// One member of an [`EnumType`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    /// Stored value.
    pub value: Value,
    /// Human label.
    pub label: String
}

/// Enumerated field type with a title used in error messages.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    title:   String,
    members: Vec<EnumMember>
}

impl EnumType {
    /// Start an empty enum titled `title`.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title:   title.into(),
            members: Vec::new()
        }
    }

    /// Add a member.
    #[must_use]
    pub fn member(mut self, value: impl Into<Value>, label: impl Into<String>) -> Self {
        self.members.push(EnumMember {
            value: value.into(),
            label: label.into()
        });
        self
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn members(&self) -> &[EnumMember] {
        &self.members
    }

    /// Whether `value` is one of the members.
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.members.iter().any(|m| &m.value == value)
    }
}

/// Maps a Rust type onto a [`FieldType`].
///
/// Implemented for the usual scalar types; `Option<T>` marks the column
/// nullable. Implement it for your own enums to get membership validation:
///
/// ```rust
/// use restforge_core::{EnumType, FieldType, FieldTyped};
///
/// enum Level {
///     Low,
///     High
/// }
///
/// impl FieldTyped for Level {
///     fn field_type() -> FieldType {
///         FieldType::Enum(EnumType::new("Level").member("low", "Low").member("high", "High"))
///     }
/// }
/// ```
pub trait FieldTyped {
    /// Column type.
    fn field_type() -> FieldType;

    /// Whether `null` is a legal stored value.
    const NULLABLE: bool = false;
}

macro_rules! field_typed {
    ($variant:ident => $($ty:ty),+) => {
        $(
            impl FieldTyped for $ty {
                fn field_type() -> FieldType {
                    FieldType::$variant
                }
            }
        )+
    };
}

field_typed!(Int => i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
field_typed!(Float => f32, f64);
field_typed!(Bool => bool);
field_typed!(Str => String, &str);
field_typed!(Datetime => DateTime<Utc>, DateTime<FixedOffset>, NaiveDateTime);
field_typed!(Date => NaiveDate);
field_typed!(Uuid => Uuid);
field_typed!(Json => Value, serde_json::Map<String, Value>);

impl<T: FieldTyped> FieldTyped for Option<T> {
    const NULLABLE: bool = true;

    fn field_type() -> FieldType {
        T::field_type()
    }
}

impl<T: FieldTyped> FieldTyped for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::List(Box::new(T::field_type()))
    }
}

impl<V> FieldTyped for HashMap<String, V> {
    fn field_type() -> FieldType {
        FieldType::Json
    }
}

/// Default applied when a column is absent at construction time.
#[derive(Clone, Default)]
pub enum FieldDefault {
    /// No default: the column is required unless nullable.
    #[default]
    None,
    /// Constant default.
    Value(Value),
    /// Default computed on every construction.
    Factory(fn() -> Value)
}

impl FieldDefault {
    /// Produce the default value, if any.
    #[must_use]
    pub fn produce(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Value(v) => Some(v.clone()),
            Self::Factory(f) => Some(f())
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Value(v) => write!(f, "Value({v})"),
            Self::Factory(_) => write!(f, "Factory(..)")
        }
    }
}

/// Shape of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Foreign key held on this entity.
    ToOne,
    /// Many-to-many through a link table.
    ToMany,
    /// The other side of someone else's `ToOne`.
    ReverseToMany
}

impl RelationKind {
    /// Whether the relation can yield more than one row.
    #[must_use]
    pub const fn is_many(self) -> bool {
        matches!(self, Self::ToMany | Self::ReverseToMany)
    }
}

/// Relation metadata attached to a [`FieldDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Relation shape.
    pub kind:         RelationKind,
    /// Name of the related entity.
    pub related:      &'static str,
    /// Shadow key column for `ToOne`.
    pub source_field: Option<String>,
    /// Name of the `ToOne` relation on the related entity, for
    /// `ReverseToMany`.
    pub via:          Option<String>
}

/// Custom validation closure. Returns the failure message.
pub type ValidateFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Constraint checked on inbound values.
#[derive(Clone)]
pub enum Validator {
    /// RFC 5322-ish email address.
    Email,
    /// Absolute URL.
    Url,
    /// Application supplied check.
    Custom {
        /// Label used in debug output.
        name:  String,
        /// The check itself.
        check: ValidateFn
    }
}

impl Validator {
    /// Build a custom validator.
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static
    {
        Self::Custom {
            name:  name.into(),
            check: Arc::new(check)
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "Email"),
            Self::Url => write!(f, "Url"),
            Self::Custom {
                name, ..
            } => write!(f, "Custom({name})")
        }
    }
}

/// Everything the framework knows about one field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name. For `ToOne` relations this is the relation name; the
    /// stored key lives under [`RelationDescriptor::source_field`].
    pub name:         String,
    /// Column type (key type for `ToOne`).
    pub field_type:   FieldType,
    /// Whether `null` is legal.
    pub nullable:     bool,
    /// Construction default.
    pub default:      FieldDefault,
    /// Relation metadata; `None` for plain columns.
    pub relation:     Option<RelationDescriptor>,
    /// Primary key flag.
    pub primary_key:  bool,
    /// Unique constraint flag.
    pub unique:       bool,
    /// Maximum string length.
    pub max_length:   Option<usize>,
    /// Description for generated schemas.
    pub description:  Option<String>,
    /// Refreshed to now on every write.
    pub auto_now:     bool,
    /// Set to now on insert.
    pub auto_now_add: bool,
    /// Inbound constraints.
    pub validators:   Vec<Validator>
}

impl FieldDescriptor {
    fn base(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
            default: FieldDefault::None,
            relation: None,
            primary_key: false,
            unique: false,
            max_length: None,
            description: None,
            auto_now: false,
            auto_now_add: false,
            validators: Vec::new()
        }
    }

    /// Plain column typed after `T`.
    pub fn column<T: FieldTyped + ?Sized>(name: impl Into<String>) -> Self {
        Self::base(name, T::field_type(), T::NULLABLE)
    }

    /// Plain column with an explicit type.
    pub fn typed(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::base(name, field_type, false)
    }

    /// Foreign key relation `name` to `related`, keyed by `K`.
    ///
    /// The key is stored under `<name>_id`.
    pub fn to_one<K: FieldTyped + ?Sized>(name: impl Into<String>, related: &'static str) -> Self {
        let name = name.into();
        let source = format!("{name}_id");
        let mut field = Self::base(name, K::field_type(), K::NULLABLE);
        field.relation = Some(RelationDescriptor {
            kind: RelationKind::ToOne,
            related,
            source_field: Some(source),
            via: None
        });
        field
    }

    /// Many-to-many relation.
    pub fn to_many(name: impl Into<String>, related: &'static str) -> Self {
        let mut field = Self::base(name, FieldType::Json, true);
        field.relation = Some(RelationDescriptor {
            kind: RelationKind::ToMany,
            related,
            source_field: None,
            via: None
        });
        field
    }

    /// Reverse side of `related`'s `via` relation.
    pub fn reverse(name: impl Into<String>, related: &'static str, via: impl Into<String>) -> Self {
        let mut field = Self::base(name, FieldType::Json, true);
        field.relation = Some(RelationDescriptor {
            kind: RelationKind::ReverseToMany,
            related,
            source_field: None,
            via: Some(via.into())
        });
        field
    }

    /// Mark as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Constant default.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Default produced per construction.
    #[must_use]
    pub fn default_fn(mut self, factory: fn() -> Value) -> Self {
        self.default = FieldDefault::Factory(factory);
        self
    }

    #[must_use]
    pub fn auto_now(mut self) -> Self {
        self.auto_now = true;
        self
    }

    #[must_use]
    pub fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Whether this is a relation.
    #[must_use]
    pub const fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    /// Relation kind, if any.
    #[must_use]
    pub fn relation_kind(&self) -> Option<RelationKind> {
        self.relation.as_ref().map(|r| r.kind)
    }

    /// Name of the stored column, if the field has one.
    ///
    /// Plain columns store under their own name, `ToOne` relations under
    /// the shadow key, to-many relations not at all.
    #[must_use]
    pub fn storage_name(&self) -> Option<&str> {
        match &self.relation {
            None => Some(&self.name),
            Some(rel) => rel.source_field.as_deref()
        }
    }

    /// Whether the timestamp is filled in automatically.
    #[must_use]
    pub const fn is_auto_timestamp(&self) -> bool {
        self.auto_now || self.auto_now_add
    }
}
