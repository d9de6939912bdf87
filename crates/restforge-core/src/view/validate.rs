// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Inbound payload validation against a [`ViewType`].
//!
//! Validation coerces scalars leniently (numeric strings become numbers,
//! timestamps are normalized to UTC), checks presence, length, validators
//! and enum membership, and recurses into nested views. Unknown keys are
//! dropped. Absent optional keys stay absent, so the result only carries
//! what the client actually sent.
//!
//! Failures are collected, not short-circuited, and rendered as
//! `"{value} {message}: {path}"`.

use std::fmt;

use serde_json::{Map, Number, Value};
use uuid::Uuid;
use validator::{ValidateEmail, ValidateUrl};

use super::{FieldShape, ViewField, ViewType};
use crate::{
    registry::{FieldType, Validator},
    value
};

/// Category of a [`FieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Required field absent.
    Missing,
    /// Wrong type or failed constraint.
    Invalid,
    /// Value outside an enum's members.
    EnumMember
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted location, e.g. `tags.0.label`.
    pub path:    String,
    /// Rendered offending value; empty when absent.
    pub value:   String,
    /// What went wrong.
    pub message: String,
    /// Category.
    pub kind:    FieldErrorKind
}

impl FieldError {
    /// Client-facing rendering.
    #[must_use]
    pub fn render(&self) -> String {
        match self.kind {
            FieldErrorKind::EnumMember => self.message.clone(),
            _ => format!("{} {}: {}", self.value, self.message, self.path)
                .trim_start()
                .to_string()
        }
    }
}

/// Collected validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>
}

impl ValidationErrors {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding one invalid-value error.
    pub fn single(path: impl Into<String>, value: &Value, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.invalid(path, value, message);
        errors
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Record an invalid value.
    pub fn invalid(&mut self, path: impl Into<String>, value: &Value, message: impl Into<String>) {
        self.push(FieldError {
            path:    path.into(),
            value:   value::display(value),
            message: message.into(),
            kind:    FieldErrorKind::Invalid
        });
    }

    fn missing(&mut self, path: String) {
        self.push(FieldError {
            path,
            value: String::new(),
            message: "is required".to_string(),
            kind: FieldErrorKind::Missing
        });
    }

    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Rendered, de-duplicated messages in first-seen order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.errors.len());
        for rendered in self.errors.iter().map(FieldError::render) {
            if !out.contains(&rendered) {
                out.push(rendered);
            }
        }
        out
    }

    /// Whether every failure is an enum membership failure.
    #[must_use]
    pub fn is_enum_only(&self) -> bool {
        !self.errors.is_empty()
            && self.errors.iter().all(|e| e.kind == FieldErrorKind::EnumMember)
    }

    /// `Ok(())` when empty.
    ///
    /// # Errors
    ///
    /// Returns `self` when any failure was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ViewType {
    /// Validate and coerce an inbound payload.
    ///
    /// # Errors
    ///
    /// Every failure found, rendered per field.
    pub fn validate(&self, payload: &Value) -> Result<Map<String, Value>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let out = validate_object(self, payload, "", &mut errors);
        errors.into_result().map(|()| out)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") }
}

fn validate_object(
    view: &ViewType,
    payload: &Value,
    prefix: &str,
    errors: &mut ValidationErrors
) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(map) = payload.as_object() else {
        let path = if prefix.is_empty() { "body" } else { prefix };
        errors.invalid(path, payload, "is not a valid mapping");
        return out;
    };
    for (name, field) in view.fields() {
        let path = join(prefix, name);
        match map.get(name) {
            None => {
                if field.is_required() {
                    errors.missing(path);
                }
            }
            Some(Value::Null) => {
                if field.optional {
                    out.insert(name.clone(), Value::Null);
                } else {
                    errors.invalid(path, &Value::Null, "may not be null");
                }
            }
            Some(raw) => {
                if let Some(v) = validate_field(field, raw, &path, errors) {
                    out.insert(name.clone(), v);
                }
            }
        }
    }
    out
}

fn validate_field(
    field: &ViewField,
    raw: &Value,
    path: &str,
    errors: &mut ValidationErrors
) -> Option<Value> {
    match &field.shape {
        FieldShape::Scalar(ty) => {
            let coerced = coerce(ty, raw, path, errors)?;
            check_constraints(field, &coerced, path, errors);
            Some(coerced)
        }
        FieldShape::Object(nested) => {
            Some(Value::Object(validate_object(nested, raw, path, errors)))
        }
        FieldShape::List(nested) => {
            let Some(items) = raw.as_array() else {
                errors.invalid(path, raw, "is not a valid list");
                return None;
            };
            let out = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    Value::Object(validate_object(nested, item, &format!("{path}.{i}"), errors))
                })
                .collect();
            Some(Value::Array(out))
        }
    }
}

/// Coerce a raw scalar into the canonical stored form of `ty`.
pub(crate) fn coerce(
    ty: &FieldType,
    raw: &Value,
    path: &str,
    errors: &mut ValidationErrors
) -> Option<Value> {
    let result = match ty {
        FieldType::Json => Ok(raw.clone()),
        FieldType::Int => coerce_int(raw).ok_or("is not a valid integer"),
        FieldType::Float => coerce_float(raw).ok_or("is not a valid float"),
        FieldType::Bool => coerce_bool(raw).ok_or("is not a valid boolean"),
        FieldType::Str => match raw {
            Value::String(_) => Ok(raw.clone()),
            _ => Err("is not a valid string")
        },
        FieldType::Datetime => value::as_datetime(raw)
            .map(|dt| Value::String(value::format_datetime(dt)))
            .ok_or("is not a valid datetime"),
        FieldType::Date => raw
            .as_str()
            .and_then(value::parse_date)
            .map(|d| Value::String(d.to_string()))
            .ok_or("is not a valid date"),
        FieldType::Uuid => raw
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(|u| Value::String(u.hyphenated().to_string()))
            .ok_or("is not a valid UUID"),
        FieldType::List(inner) => {
            let Some(items) = raw.as_array() else {
                errors.invalid(path, raw, "is not a valid list");
                return None;
            };
            let before = errors.len();
            let out: Vec<Value> = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| coerce(inner, item, &format!("{path}.{i}"), errors))
                .collect();
            return (errors.len() == before).then_some(Value::Array(out));
        }
        FieldType::Enum(members) => {
            if members.contains(raw) {
                Ok(raw.clone())
            } else {
                errors.push(FieldError {
                    path:    path.to_string(),
                    value:   value::display(raw),
                    message: format!(
                        "{} has no enum value {}",
                        members.title(),
                        value::display(raw)
                    ),
                    kind:    FieldErrorKind::EnumMember
                });
                return None;
            }
        }
    };
    match result {
        Ok(v) => Some(v),
        Err(message) => {
            errors.invalid(path, raw, message);
            None
        }
    }
}

fn coerce_int(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(raw.clone()),
        Value::Number(n) => {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f.abs() < 9.0e15).then(|| Value::from(f as i64))
        }
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None
    }
}

fn coerce_float(raw: &Value) -> Option<Value> {
    let f = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None
    };
    Number::from_f64(f).map(Value::Number)
}

fn coerce_bool(raw: &Value) -> Option<Value> {
    match raw {
        Value::Bool(_) => Some(raw.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
            _ => None
        },
        _ => None
    }
}

fn check_constraints(field: &ViewField, v: &Value, path: &str, errors: &mut ValidationErrors) {
    if let (Some(max), Some(s)) = (field.max_length, v.as_str())
        && s.chars().count() > max
    {
        errors.invalid(path, v, format!("is longer than {max} characters"));
    }
    for validator in &field.validators {
        let outcome = match validator {
            Validator::Email => match v.as_str() {
                Some(s) if s.to_string().validate_email() => Ok(()),
                _ => Err("is not a valid email".to_string())
            },
            Validator::Url => match v.as_str() {
                Some(s) if s.to_string().validate_url() => Ok(()),
                _ => Err("is not a valid url".to_string())
            },
            Validator::Custom {
                check, ..
            } => check(v)
        };
        if let Err(message) = outcome {
            errors.invalid(path, v, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{fixtures::blog, view::RequiredMode};

    #[test]
    fn accepts_valid_payload_and_drops_unknown_keys() {
        let registry = blog();
        let form = registry.form_view("Post", RequiredMode::Natural).unwrap();
        let out = form
            .validate(&json!({"title": "t", "body": "b", "views": "3", "bogus": 1}))
            .unwrap();
        assert_eq!(out.get("views"), Some(&json!(3)));
        assert!(!out.contains_key("bogus"));
        assert!(!out.contains_key("author_id"));
    }

    #[test]
    fn reports_missing_and_invalid_fields() {
        let registry = blog();
        let form = registry.form_view("Post", RequiredMode::Natural).unwrap();
        let err = form.validate(&json!({"title": 5, "views": "many"})).unwrap_err();
        let messages = err.messages();
        assert!(messages.contains(&"5 is not a valid string: title".to_string()));
        assert!(messages.contains(&"many is not a valid integer: views".to_string()));
        assert!(messages.contains(&"is required: body".to_string()));
    }

    #[test]
    fn non_mapping_payload_is_rejected() {
        let registry = blog();
        let form = registry.form_view("Tag", RequiredMode::Natural).unwrap();
        let err = form.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.messages(), vec!["[1,2] is not a valid mapping: body".to_string()]);
    }

    #[test]
    fn nested_list_items_are_validated() {
        let registry = blog();
        let form = registry.form_view("Post", RequiredMode::Natural).unwrap();
        let err = form
            .validate(&json!({"title": "t", "body": "b", "tags": [{"label": 1}]}))
            .unwrap_err();
        assert_eq!(err.messages(), vec!["1 is not a valid string: tags.0.label".to_string()]);

        let err = form.validate(&json!({"title": "t", "body": "b", "tags": {"id": 1}})).unwrap_err();
        assert!(err.messages()[0].ends_with("is not a valid list: tags"));
    }

    #[test]
    fn enum_and_validators() {
        let registry = blog();
        let form = registry.form_view("User", RequiredMode::Natural).unwrap();
        let err = form.validate(&json!({"name": "ann", "level": "mid"})).unwrap_err();
        assert!(err.is_enum_only());
        assert_eq!(err.messages(), vec!["Level has no enum value mid".to_string()]);

        let err = form.validate(&json!({"name": "ann", "email": "nope"})).unwrap_err();
        assert!(!err.is_enum_only());
        assert_eq!(err.messages(), vec!["nope is not a valid email: email".to_string()]);

        assert!(form.validate(&json!({"name": "ann", "email": "ann@example.com"})).is_ok());
    }

    #[test]
    fn max_length_is_enforced() {
        let registry = blog();
        let form = registry.form_view("User", RequiredMode::Natural).unwrap();
        let err = form.validate(&json!({"name": "x".repeat(17)})).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn null_only_for_optional_fields() {
        let registry = blog();
        let form = registry.form_view("User", RequiredMode::Natural).unwrap();
        let out = form.validate(&json!({"name": "ann", "email": null})).unwrap();
        assert_eq!(out.get("email"), Some(&Value::Null));
        let err = form.validate(&json!({"name": null})).unwrap_err();
        assert_eq!(err.messages(), vec!["null may not be null: name".to_string()]);
    }

    #[test]
    fn datetimes_are_normalized() {
        let mut errors = ValidationErrors::new();
        let v = coerce(&FieldType::Datetime, &json!("2024-01-02T03:04:05+01:00"), "at", &mut errors);
        assert_eq!(v, Some(json!("2024-01-02T02:04:05.000000Z")));
        assert!(errors.is_empty());
    }

    #[test]
    fn messages_are_deduplicated() {
        let mut errors = ValidationErrors::new();
        errors.invalid("a", &json!(1), "bad");
        errors.invalid("a", &json!(1), "bad");
        assert_eq!(errors.messages().len(), 1);
    }
}
