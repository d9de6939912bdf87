// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Predicate evaluation over in-memory tables.
//!
//! Relation paths are resolved the way a SQL backend joins: a to-one hop
//! follows the foreign key, while every to-many hop used by a query fans the
//! base row out into one [`Joined`] row per related row (a row with no
//! related rows still yields one joined row, as with a left join). Counting
//! joined rows therefore over-counts exactly like `COUNT(*)` over a join.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{StoreError, memory::MemoryState};
use crate::{
    query::{Connector, Lookup, LookupOp, Q},
    registry::{Registry, RelationKind},
    value
};

pub(super) type Row = Map<String, Value>;

/// How a to-many hop finds its rows.
enum ManyVia<'s> {
    /// Link table of a declared many-to-many relation.
    Link(&'s str),
    /// Foreign key column on the related entity.
    Reverse(&'s str)
}

enum Step<'s> {
    Column(&'s str),
    ToOne {
        related: &'static str,
        source:  &'s str
    },
    Many {
        related: &'static str,
        via:     ManyVia<'s>
    }
}

/// A base row plus one chosen related row per to-many join.
#[derive(Debug, Clone)]
pub(super) struct Joined<'s> {
    pub(super) base: &'s Row,
    picks:           Vec<(String, Option<&'s Row>)>
}

impl<'s> Joined<'s> {
    fn pick(&self, prefix: &str) -> Option<&'s Row> {
        self.picks
            .iter()
            .find(|(p, _)| p == prefix)
            .and_then(|(_, row)| *row)
    }

    fn with(&self, prefix: &str, row: Option<&'s Row>) -> Self {
        let mut next = self.clone();
        next.picks.push((prefix.to_string(), row));
        next
    }
}

/// Read-only view of the tables.
pub(super) struct Tables<'s> {
    pub(super) registry: &'s Registry,
    pub(super) state:    &'s MemoryState
}

/// Split an ordering key into direction and path.
pub(super) fn order_key(key: &str) -> (bool, Vec<String>) {
    let (descending, field) = match key.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, key)
    };
    (descending, segments(field))
}

/// Split a `__`-separated field into segments.
pub(super) fn segments(field: &str) -> Vec<String> {
    crate::query::normalize_field(field)
        .split("__")
        .map(str::to_string)
        .collect()
}

impl<'s> Tables<'s> {
    fn unknown(entity: &str, field: &str) -> StoreError {
        StoreError::UnknownField {
            entity: entity.to_string(),
            field:  field.to_string()
        }
    }

    fn step(&self, entity: &str, name: &str) -> Result<Step<'s>, StoreError> {
        let schema = self.registry.entity(entity)?;
        let Some((field, relation)) = schema.relation(name) else {
            return schema
                .storage_field(name)
                .and_then(|f| f.storage_name())
                .map(Step::Column)
                .ok_or_else(|| Self::unknown(entity, name));
        };
        Ok(match relation.kind {
            RelationKind::ToOne => Step::ToOne {
                related: relation.related,
                source:  relation
                    .source_field
                    .as_deref()
                    .ok_or_else(|| Self::unknown(entity, name))?
            },
            RelationKind::ToMany => Step::Many {
                related: relation.related,
                via:     ManyVia::Link(&field.name)
            },
            RelationKind::ReverseToMany => {
                let target = self.registry.entity(relation.related)?;
                let column = relation
                    .via
                    .as_deref()
                    .and_then(|via| target.relation(via))
                    .and_then(|(_, back)| back.source_field.as_deref())
                    .ok_or_else(|| Self::unknown(entity, name))?;
                Step::Many {
                    related: relation.related,
                    via:     ManyVia::Reverse(column)
                }
            }
        })
    }

    /// Stored row by primary key.
    pub(super) fn row(&self, entity: &str, id: &Value) -> Option<&'s Row> {
        self.state.tables.get(entity)?.rows.get(&value::id_key(id))
    }

    /// Every stored row of `entity`.
    pub(super) fn rows(&self, entity: &str) -> Vec<&'s Row> {
        self.state
            .tables
            .get(entity)
            .map(|table| table.rows.values().collect())
            .unwrap_or_default()
    }

    fn pk_of(&self, entity: &str, row: &'s Row) -> Result<Option<&'s Value>, StoreError> {
        let schema = self.registry.entity(entity)?;
        Ok(row.get(schema.pk_name()))
    }

    fn many(
        &self,
        owner: &str,
        row: &'s Row,
        related: &'static str,
        via: &ManyVia<'s>
    ) -> Result<Vec<&'s Row>, StoreError> {
        let Some(pk) = self.pk_of(owner, row)? else {
            return Ok(Vec::new());
        };
        Ok(match via {
            ManyVia::Link(relation) => self
                .state
                .links
                .get(&(owner.to_string(), (*relation).to_string()))
                .and_then(|links| links.get(&value::id_key(pk)))
                .map(|ids| ids.iter().filter_map(|id| self.row(related, id)).collect())
                .unwrap_or_default(),
            ManyVia::Reverse(column) => self
                .rows(related)
                .into_iter()
                .filter(|r| r.get(*column).is_some_and(|v| value::equals(v, pk)))
                .collect()
        })
    }

    /// Rows reached through relation `name` of a stored row.
    pub(super) fn related(
        &self,
        entity: &str,
        row: &'s Row,
        name: &str
    ) -> Result<Vec<&'s Row>, StoreError> {
        match self.step(entity, name)? {
            Step::Column(_) => Err(Self::unknown(entity, name)),
            Step::ToOne {
                related,
                source
            } => Ok(row
                .get(source)
                .filter(|v| !v.is_null())
                .and_then(|fk| self.row(related, fk))
                .into_iter()
                .collect()),
            Step::Many {
                related,
                via
            } => self.many(entity, row, related, &via)
        }
    }

    /// To-many join prefixes used by a path.
    pub(super) fn joins(&self, entity: &str, path: &[String]) -> Result<Vec<String>, StoreError> {
        let mut current: &str = entity;
        let mut out = Vec::new();
        for (i, segment) in path.iter().enumerate() {
            match self.step(current, segment)? {
                Step::Column(_) if i + 1 != path.len() => {
                    return Err(Self::unknown(entity, &path.join("__")));
                }
                Step::Column(_) => {}
                Step::ToOne {
                    related, ..
                } => current = related,
                Step::Many {
                    related, ..
                } => {
                    out.push(path[..=i].join("__"));
                    current = related;
                }
            }
        }
        Ok(out)
    }

    fn follow(
        &self,
        entity: &'static str,
        joined: &Joined<'s>,
        hops: &[String]
    ) -> Result<(&'static str, Option<&'s Row>), StoreError> {
        let mut current = entity;
        let mut row = Some(joined.base);
        for (i, segment) in hops.iter().enumerate() {
            match self.step(current, segment)? {
                Step::Column(_) => return Err(Self::unknown(entity, &hops.join("__"))),
                Step::ToOne {
                    related,
                    source
                } => {
                    row = row
                        .and_then(|r| r.get(source))
                        .filter(|v| !v.is_null())
                        .and_then(|fk| self.row(related, fk));
                    current = related;
                }
                Step::Many {
                    related, ..
                } => {
                    row = joined.pick(&hops[..=i].join("__"));
                    current = related;
                }
            }
        }
        Ok((current, row))
    }

    /// Value of `path` on a joined row; `null` through missing links.
    pub(super) fn value(
        &self,
        entity: &'static str,
        joined: &Joined<'s>,
        path: &[String]
    ) -> Result<Value, StoreError> {
        let Some((last, hops)) = path.split_last() else {
            return Ok(Value::Null);
        };
        let (owner, row) = self.follow(entity, joined, hops)?;
        let found = match self.step(owner, last)? {
            Step::Column(column) => row.and_then(|r| r.get(column)),
            Step::ToOne {
                source, ..
            } => row.and_then(|r| r.get(source)),
            Step::Many {
                related, ..
            } => match joined.pick(&path.join("__")) {
                Some(picked) => self.pk_of(related, picked)?,
                None => None
            }
        };
        Ok(found.cloned().unwrap_or(Value::Null))
    }

    /// Fan a base row out over the given join prefixes.
    pub(super) fn expand(
        &self,
        entity: &'static str,
        base: &'s Row,
        prefixes: &[String]
    ) -> Result<Vec<Joined<'s>>, StoreError> {
        let mut joined = vec![Joined {
            base,
            picks: Vec::new()
        }];
        for prefix in prefixes {
            let path = segments(prefix);
            let Some((last, hops)) = path.split_last() else {
                continue;
            };
            let mut next = Vec::with_capacity(joined.len());
            for current in &joined {
                let (owner, row) = self.follow(entity, current, hops)?;
                let candidates = match (row, self.step(owner, last)?) {
                    (
                        Some(row),
                        Step::Many {
                            related,
                            via
                        }
                    ) => self.many(owner, row, related, &via)?,
                    _ => Vec::new()
                };
                if candidates.is_empty() {
                    next.push(current.with(prefix, None));
                } else {
                    next.extend(candidates.into_iter().map(|c| current.with(prefix, Some(c))));
                }
            }
            joined = next;
        }
        Ok(joined)
    }

    /// Evaluate a predicate on a joined row.
    pub(super) fn test(
        &self,
        entity: &'static str,
        joined: &Joined<'s>,
        predicate: &Q
    ) -> Result<bool, StoreError> {
        match predicate {
            Q::Leaf(lookup) => {
                let stored = self.value(entity, joined, &lookup.path)?;
                matches(lookup, &stored)
            }
            Q::Group {
                connector,
                negated,
                children
            } => {
                if predicate.is_empty() {
                    return Ok(true);
                }
                let mut outcome = *connector == Connector::And;
                for child in children.iter().filter(|c| !c.is_empty()) {
                    let hit = self.test(entity, joined, child)?;
                    match connector {
                        Connector::And if !hit => {
                            outcome = false;
                            break;
                        }
                        Connector::Or if hit => {
                            outcome = true;
                            break;
                        }
                        _ => {}
                    }
                }
                Ok(outcome != *negated)
            }
        }
    }
}

fn truthy(operand: &Value) -> bool {
    match operand {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false
    }
}

fn text_match(stored: &Value, operand: &Value, fold: bool, test: fn(&str, &str) -> bool) -> bool {
    let needle = value::display(operand);
    let check = |hay: &Value| {
        let hay = value::display(hay);
        if fold {
            test(&hay.to_lowercase(), &needle.to_lowercase())
        } else {
            test(&hay, &needle)
        }
    };
    match stored {
        Value::Null => false,
        Value::Array(items) => items.iter().any(check),
        other => check(other)
    }
}

fn is_member(lookup: &Lookup, stored: &Value) -> bool {
    if stored.is_null() {
        return false;
    }
    match &lookup.value {
        Value::Array(items) => items.iter().any(|m| value::equals(stored, m)),
        Value::String(list) => list
            .split(',')
            .any(|m| value::equals(stored, &Value::String(m.trim().to_string()))),
        other => value::equals(stored, other)
    }
}

fn ordered(stored: &Value, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    value::compare(stored, operand).is_some_and(accept)
}

/// Whether a stored value satisfies a lookup.
pub(super) fn matches(lookup: &Lookup, stored: &Value) -> Result<bool, StoreError> {
    let operand = &lookup.value;
    Ok(match lookup.op {
        LookupOp::Exact if operand.is_null() => stored.is_null(),
        LookupOp::Exact => value::equals(stored, operand),
        LookupOp::Not if operand.is_null() => !stored.is_null(),
        LookupOp::Not => stored.is_null() || !value::equals(stored, operand),
        LookupOp::In => is_member(lookup, stored),
        LookupOp::NotIn => stored.is_null() || !is_member(lookup, stored),
        LookupOp::IsNull => truthy(operand) == stored.is_null(),
        LookupOp::NotIsNull => truthy(operand) != stored.is_null(),
        LookupOp::Gt => ordered(stored, operand, Ordering::is_gt),
        LookupOp::Gte => ordered(stored, operand, Ordering::is_ge),
        LookupOp::Lt => ordered(stored, operand, Ordering::is_lt),
        LookupOp::Lte => ordered(stored, operand, Ordering::is_le),
        LookupOp::Range => {
            let Some(bounds) = operand.as_array().filter(|b| b.len() == 2) else {
                return Err(StoreError::InvalidLookup {
                    lookup: lookup.key(),
                    reason: "range expects [low, high]".to_string()
                });
            };
            ordered(stored, &bounds[0], Ordering::is_ge) && ordered(stored, &bounds[1], Ordering::is_le)
        }
        LookupOp::Contains => text_match(stored, operand, false, |h, n| h.contains(n)),
        LookupOp::IContains => text_match(stored, operand, true, |h, n| h.contains(n)),
        LookupOp::StartsWith => text_match(stored, operand, false, |h, n| h.starts_with(n)),
        LookupOp::IStartsWith => text_match(stored, operand, true, |h, n| h.starts_with(n)),
        LookupOp::EndsWith => text_match(stored, operand, false, |h, n| h.ends_with(n)),
        LookupOp::IEndsWith => text_match(stored, operand, true, |h, n| h.ends_with(n)),
        LookupOp::IExact => text_match(stored, operand, true, |h, n| h == n)
    })
}
