// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Computed fields: read-only accessors and write-only setters that live
//! next to the stored columns.
//!
//! A computed field with an accessor shows up in list and detail views; one
//! with a setter shows up in forms. Both halves may be synchronous or
//! asynchronous:
//!
//! ```rust
//! use restforge_core::{ComputedField, FieldType};
//! use serde_json::json;
//!
//! let display = ComputedField::new("display_name")
//!     .of_type(FieldType::Str)
//!     .getter(|record| Ok(json!(format!("@{}", record.get_str("name").unwrap_or_default()))));
//! assert!(display.is_readable());
//! assert!(!display.is_writable());
//! ```

use std::{fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;
use serde_json::Value;

use super::field::FieldType;
use crate::{entity::Record, error::ApiError};

/// Synchronous accessor.
pub type SyncAccessor = Arc<dyn Fn(&Record) -> Result<Value, ApiError> + Send + Sync>;

/// Asynchronous accessor. Receives an owned snapshot of the record.
pub type AsyncAccessor =
    Arc<dyn Fn(Record) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync>;

/// Synchronous setter, mutating the record in place.
pub type SyncSetter = Arc<dyn Fn(&mut Record, Value) -> Result<(), ApiError> + Send + Sync>;

/// Asynchronous setter, returning the updated record.
pub type AsyncSetter =
    Arc<dyn Fn(Record, Value) -> BoxFuture<'static, Result<Record, ApiError>> + Send + Sync>;

/// Read half of a computed field.
#[derive(Clone)]
pub enum Accessor {
    Sync(SyncAccessor),
    Async(AsyncAccessor)
}

/// Write half of a computed field.
#[derive(Clone)]
pub enum Setter {
    Sync(SyncSetter),
    Async(AsyncSetter)
}

/// A named virtual field.
#[derive(Clone)]
pub struct ComputedField {
    name:        String,
    field_type:  Option<FieldType>,
    description: Option<String>,
    accessor:    Option<Accessor>,
    setter:      Option<Setter>
}

impl ComputedField {
    /// Start a computed field with neither accessor nor setter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:        name.into(),
            field_type:  None,
            description: None,
            accessor:    None,
            setter:      None
        }
    }

    /// Declare the value type, used for schema rendering and inbound
    /// validation of setter input.
    #[must_use]
    pub fn of_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Attach a synchronous accessor.
    #[must_use]
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> Result<Value, ApiError> + Send + Sync + 'static
    {
        self.accessor = Some(Accessor::Sync(Arc::new(f)));
        self
    }

    /// Attach an asynchronous accessor.
    #[must_use]
    pub fn async_getter<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Record) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static
    {
        self.accessor = Some(Accessor::Async(Arc::new(move |record| Box::pin(f(record)))));
        self
    }

    /// Attach a synchronous setter.
    #[must_use]
    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Record, Value) -> Result<(), ApiError> + Send + Sync + 'static
    {
        self.setter = Some(Setter::Sync(Arc::new(f)));
        self
    }

    /// Attach an asynchronous setter.
    #[must_use]
    pub fn async_setter<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Record, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Record, ApiError>> + Send + 'static
    {
        self.setter = Some(Setter::Async(Arc::new(move |record, value| {
            Box::pin(f(record, value))
        })));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type, `Json` when undeclared.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type.clone().unwrap_or(FieldType::Json)
    }

    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn accessor(&self) -> Option<&Accessor> {
        self.accessor.as_ref()
    }

    #[must_use]
    pub fn setter_fn(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    /// Exposed in list and detail views.
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.accessor.is_some()
    }

    /// Exposed in forms.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    /// Whether reading requires an await.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self.accessor, Some(Accessor::Async(_)))
    }

    /// Evaluate the accessor. `Ok(None)` when the field is write-only.
    pub async fn resolve(&self, record: &Record) -> Result<Option<Value>, ApiError> {
        match &self.accessor {
            None => Ok(None),
            Some(Accessor::Sync(f)) => f(record).map(Some),
            Some(Accessor::Async(f)) => f(record.clone()).await.map(Some)
        }
    }

    /// Evaluate a synchronous accessor without awaiting. `None` for async or
    /// write-only fields.
    pub fn resolve_now(&self, record: &Record) -> Option<Result<Value, ApiError>> {
        match &self.accessor {
            Some(Accessor::Sync(f)) => Some(f(record)),
            _ => None
        }
    }

    /// Run the setter. Fields without a setter leave the record untouched.
    pub async fn assign(&self, mut record: Record, value: Value) -> Result<Record, ApiError> {
        match &self.setter {
            None => Ok(record),
            Some(Setter::Sync(f)) => {
                f(&mut record, value)?;
                Ok(record)
            }
            Some(Setter::Async(f)) => f(record, value).await
        }
    }
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .field("async", &self.is_async())
            .finish()
    }
}
