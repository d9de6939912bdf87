// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Backend-neutral query model.
//!
//! A [`Query`] targets one entity and carries filters, a column projection,
//! ordering, a window, distinctness and grouping. Filters are [`Q`] trees
//! whose leaves are [`Lookup`]s: a field path plus an operator parsed from a
//! `__`-separated key.
//!
//! | Key | Path | Operator |
//! |-----|------|----------|
//! | `name` | `name` | exact |
//! | `name__icontains` | `name` | icontains |
//! | `author__name__startswith` | `author.name` | startswith |
//! | `tags__label__in` | `tags.label` | in |

use indexmap::IndexMap;
use serde_json::Value;

/// Replace `.` path separators with `__`.
#[must_use]
pub fn normalize_field(field: &str) -> String {
    field.replace('.', "__")
}

/// How the children of a [`Q`] group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connector {
    And,
    Or
}

/// Comparison operator of a [`Lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupOp {
    Exact,
    Not,
    In,
    NotIn,
    IsNull,
    NotIsNull,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IExact
}

impl LookupOp {
    const ALL: [(&'static str, Self); 18] = [
        ("exact", Self::Exact),
        ("not", Self::Not),
        ("in", Self::In),
        ("not_in", Self::NotIn),
        ("isnull", Self::IsNull),
        ("not_isnull", Self::NotIsNull),
        ("gt", Self::Gt),
        ("gte", Self::Gte),
        ("lt", Self::Lt),
        ("lte", Self::Lte),
        ("range", Self::Range),
        ("contains", Self::Contains),
        ("icontains", Self::IContains),
        ("startswith", Self::StartsWith),
        ("istartswith", Self::IStartsWith),
        ("endswith", Self::EndsWith),
        ("iendswith", Self::IEndsWith),
        ("iexact", Self::IExact)
    ];

    /// Operator for a key suffix.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.iter().find(|(s, _)| *s == suffix).map(|(_, op)| *op)
    }

    /// Key suffix of this operator.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, op)| *op == self)
            .map_or("exact", |(s, _)| s)
    }
}

/// Leaf condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// Relation hops followed by the column.
    pub path:  Vec<String>,
    /// Operator.
    pub op:    LookupOp,
    /// Operand.
    pub value: Value
}

impl Lookup {
    /// Parse `a__b__op` (or `a.b.op`) into a lookup.
    #[must_use]
    pub fn parse(key: &str, value: Value) -> Self {
        let key = normalize_field(key);
        let mut path: Vec<String> = key.split("__").map(str::to_string).collect();
        let op = match path.last().and_then(|s| LookupOp::from_suffix(s)) {
            Some(op) if path.len() > 1 => {
                path.pop();
                op
            }
            _ => LookupOp::Exact
        };
        Self {
            path,
            op,
            value
        }
    }

    /// Key form, e.g. `author__name__icontains`.
    #[must_use]
    pub fn key(&self) -> String {
        let path = self.path.join("__");
        match self.op {
            LookupOp::Exact => path,
            op => format!("{path}__{}", op.suffix())
        }
    }
}

/// Boolean filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Q {
    Leaf(Lookup),
    Group {
        connector: Connector,
        negated:   bool,
        children:  Vec<Q>
    }
}

impl Default for Q {
    fn default() -> Self {
        Self::and(Vec::new())
    }
}

impl Q {
    /// Single lookup from a key and operand.
    #[must_use]
    pub fn lookup(key: &str, value: Value) -> Self {
        Self::Leaf(Lookup::parse(key, value))
    }

    #[must_use]
    pub fn and(children: Vec<Self>) -> Self {
        Self::Group {
            connector: Connector::And,
            negated: false,
            children
        }
    }

    #[must_use]
    pub fn or(children: Vec<Self>) -> Self {
        Self::Group {
            connector: Connector::Or,
            negated: false,
            children
        }
    }

    /// Combine leaf lookups and sub-groups under `connector`.
    ///
    /// With both present the leaves are first ANDed into one block, and the
    /// connector joins that block with the sub-groups. With only one kind
    /// present the connector joins them directly.
    #[must_use]
    pub fn group(connector: Connector, leaves: Vec<Lookup>, groups: Vec<Self>) -> Self {
        let mut leaves: Vec<Self> = leaves.into_iter().map(Self::Leaf).collect();
        let children = match (leaves.len(), groups.is_empty()) {
            (0, _) => groups,
            (_, true) => leaves,
            (1, false) => {
                leaves.extend(groups);
                leaves
            }
            (_, false) => std::iter::once(Self::and(leaves)).chain(groups).collect()
        };
        Self::Group {
            connector,
            negated: false,
            children
        }
    }

    /// Replace how the top-level children combine.
    #[must_use]
    pub fn with_connector(self, connector: Connector) -> Self {
        match self {
            Self::Group {
                negated,
                children,
                ..
            } => Self::Group {
                connector,
                negated,
                children
            },
            leaf @ Self::Leaf(_) => Self::Group {
                connector,
                negated: false,
                children: vec![leaf]
            }
        }
    }

    /// Logical negation of the whole tree.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Group {
                connector,
                negated,
                children
            } => Self::Group {
                connector,
                negated: !negated,
                children
            },
            leaf @ Self::Leaf(_) => Self::Group {
                connector: Connector::And,
                negated:   true,
                children:  vec![leaf]
            }
        }
    }

    /// Whether the tree imposes no condition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::Group {
                children, ..
            } => children.iter().all(Self::is_empty)
        }
    }

    /// Every leaf lookup in the tree.
    #[must_use]
    pub fn lookups(&self) -> Vec<&Lookup> {
        match self {
            Self::Leaf(lookup) => vec![lookup],
            Self::Group {
                children, ..
            } => children.iter().flat_map(Self::lookups).collect()
        }
    }
}

/// Aggregate function used by grouped queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Max,
    Min,
    Sum,
    Avg,
    Count
}

/// An aggregate applied to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Function.
    pub aggregate: Aggregate,
    /// Source field path (`__`-separated).
    pub field:     String
}

/// Alias under which an aggregated field is annotated.
#[must_use]
pub fn aggregate_alias(field: &str) -> String {
    format!("_{field}_")
}

/// Original field name of an aggregate alias.
#[must_use]
pub fn unalias(key: &str) -> Option<&str> {
    key.strip_prefix('_')
        .and_then(|k| k.strip_suffix('_'))
        .filter(|k| !k.is_empty())
}

/// Query against one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    entity:      &'static str,
    filters:     Vec<Q>,
    only:        Option<Vec<String>>,
    order_by:    Vec<String>,
    offset:      Option<usize>,
    limit:       Option<usize>,
    distinct:    bool,
    group_by:    Vec<String>,
    annotations: IndexMap<String, Annotation>
}

impl Query {
    /// Unfiltered query over `entity`.
    #[must_use]
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            filters: Vec::new(),
            only: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            distinct: false,
            group_by: Vec::new(),
            annotations: IndexMap::new()
        }
    }

    /// AND another predicate into the query.
    #[must_use]
    pub fn filter(mut self, q: Q) -> Self {
        if !q.is_empty() {
            self.filters.push(q);
        }
        self
    }

    /// Restrict loaded columns.
    #[must_use]
    pub fn only(mut self, columns: Vec<String>) -> Self {
        self.only = Some(columns);
        self
    }

    /// Append ordering keys; `-` prefix for descending.
    #[must_use]
    pub fn order_by(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.order_by.extend(keys);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Collapse join fan-out to one row per primary key.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn group_by(mut self, fields: Vec<String>) -> Self {
        self.group_by = fields;
        self
    }

    #[must_use]
    pub fn annotate(mut self, alias: impl Into<String>, annotation: Annotation) -> Self {
        self.annotations.insert(alias.into(), annotation);
        self
    }

    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    #[must_use]
    pub fn filters(&self) -> &[Q] {
        &self.filters
    }

    /// All filters ANDed into one tree.
    #[must_use]
    pub fn predicate(&self) -> Q {
        Q::and(self.filters.clone())
    }

    #[must_use]
    pub fn only_columns(&self) -> Option<&[String]> {
        self.only.as_deref()
    }

    #[must_use]
    pub fn ordering(&self) -> &[String] {
        &self.order_by
    }

    #[must_use]
    pub const fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    #[must_use]
    pub const fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    #[must_use]
    pub fn grouping(&self) -> &[String] {
        &self.group_by
    }

    #[must_use]
    pub const fn annotations(&self) -> &IndexMap<String, Annotation> {
        &self.annotations
    }

    /// Copy without ordering and window, for counting.
    #[must_use]
    pub fn unwindowed(&self) -> Self {
        let mut query = self.clone();
        query.order_by.clear();
        query.offset = None;
        query.limit = None;
        query
    }
}
