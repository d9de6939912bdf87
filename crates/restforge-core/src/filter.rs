// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Condition compiler.
//!
//! Clients filter lists with JSON condition objects:
//!
//! ```json
//! {
//!     "name.contains": "ann",
//!     "author.email": "a@example.com",
//!     ".or": [{"views.gt": 10}, {"title.startswith": "Re"}],
//!     ".not": {"status": "draft", "author.name": "bot"}
//! }
//! ```
//!
//! Plain keys become [`Lookup`] leaves (dots rewritten to `__`). The logic
//! keys `.and`, `.or`, `.not` and `.not_or` open a child group:
//!
//! | Key | Connector | Negated |
//! |-----|-----------|---------|
//! | `.and` | AND | no |
//! | `.or` | OR | no |
//! | `.not` | AND | yes |
//! | `.not_or` | OR | yes |
//!
//! The value of a logic key is one object (its entries joined by the
//! connector) or a list of objects (each ANDed internally, then joined by
//! the connector). Negation wraps the combined group; it is never pushed
//! into the children. The leading dot may be omitted.
//!
//! Blank operands (`null`, `""`, `[]`, `{}`) are dropped. `"$empty"` stands
//! for the empty string.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::{
    error::ApiResult,
    query::{Connector, Lookup, Q, Query, normalize_field},
    value::{EMPTY_SENTINEL, is_blank}
};

/// Malformed condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// Raw condition text is not JSON.
    #[error("condition is not valid JSON: {0}")]
    InvalidJson(String),

    /// Condition parsed, but not to an object.
    #[error("condition must be a JSON object, got {0}")]
    NotAnObject(String),

    /// Logic key holding something other than an object or list of objects.
    #[error("logic key `{key}` expects an object or a list of objects, got {value}")]
    MalformedGroup {
        /// Offending key.
        key:   String,
        /// Rendered value.
        value: String
    }
}

/// Outcome of translating one condition entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Translated {
    /// Operand to fold in as a lookup.
    Value(Value),
    /// Replacement base query, e.g. with an extra join filter.
    Query(Query),
    /// Ready-made predicate, added next to the group's child groups.
    Predicate(Q)
}

/// Per-field rewrite applied before an entry becomes a lookup.
#[async_trait]
pub trait ConditionHook: Send + Sync {
    /// Translate the entry `key` (already `__`-separated).
    ///
    /// # Errors
    ///
    /// Any error aborts compilation and reaches the client.
    async fn translate(&self, query: &Query, key: &str, value: Value) -> ApiResult<Translated> {
        let _ = (query, key);
        Ok(Translated::Value(value))
    }
}

/// Hook that folds every entry in unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ConditionHook for PassThrough {}

/// Parse one raw `condition` parameter.
///
/// # Errors
///
/// [`FilterError::InvalidJson`] or [`FilterError::NotAnObject`].
pub fn parse_condition(raw: &str) -> Result<Map<String, Value>, FilterError> {
    match serde_json::from_str(raw).map_err(|e| FilterError::InvalidJson(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(FilterError::NotAnObject(other.to_string()))
    }
}

fn logic_key(key: &str) -> Option<(Connector, bool)> {
    match key.strip_prefix('.').unwrap_or(key) {
        "and" => Some((Connector::And, false)),
        "or" => Some((Connector::Or, false)),
        "not" => Some((Connector::And, true)),
        "not_or" => Some((Connector::Or, true)),
        _ => None
    }
}

/// Compile a condition object against `query`.
///
/// Returns the possibly rewritten base query and the predicate to AND
/// into it.
///
/// # Errors
///
/// Malformed logic groups are internal errors; hook failures pass through.
pub async fn compile<H>(hook: &H, query: Query, condition: &Map<String, Value>) -> ApiResult<(Query, Q)>
where
    H: ConditionHook + ?Sized
{
    compile_group(hook, query, condition).await
}

fn compile_group<'a, H>(
    hook: &'a H,
    mut query: Query,
    condition: &'a Map<String, Value>
) -> BoxFuture<'a, ApiResult<(Query, Q)>>
where
    H: ConditionHook + ?Sized
{
    Box::pin(async move {
        let mut leaves = Vec::new();
        let mut groups = Vec::new();

        for (key, value) in condition {
            if let Some((connector, negated)) = logic_key(key) {
                let child = match value {
                    Value::Object(inner) => {
                        let (next, child) = compile_group(hook, query, inner).await?;
                        query = next;
                        child
                    }
                    Value::Array(items) => {
                        let mut parts = Vec::with_capacity(items.len());
                        for item in items {
                            let Value::Object(inner) = item else {
                                return Err(malformed(key, item).into());
                            };
                            let (next, part) = compile_group(hook, query, inner).await?;
                            query = next;
                            parts.push(part);
                        }
                        Q::and(parts)
                    }
                    other => return Err(malformed(key, other).into())
                };
                let child = child.with_connector(connector);
                groups.push(if negated { child.negate() } else { child });
                continue;
            }

            let field = normalize_field(key);
            match hook.translate(&query, &field, value.clone()).await? {
                Translated::Query(next) => query = next,
                Translated::Predicate(predicate) => groups.push(predicate),
                Translated::Value(operand) => {
                    if operand.as_str() == Some(EMPTY_SENTINEL) {
                        leaves.push(Lookup::parse(&field, Value::String(String::new())));
                    } else if is_blank(&operand) {
                        tracing::debug!(field = %field, "blank condition operand dropped");
                    } else {
                        leaves.push(Lookup::parse(&field, operand));
                    }
                }
            }
        }

        Ok((query, Q::group(Connector::And, leaves, groups)))
    })
}

fn malformed(key: &str, value: &Value) -> FilterError {
    FilterError::MalformedGroup {
        key:   key.to_string(),
        value: value.to_string()
    }
}
