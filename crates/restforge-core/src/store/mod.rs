// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Persistence abstraction.
//!
//! The orchestrator talks to storage through three traits:
//!
//! - [`Executor`]: reads and writes, usable inside or outside a transaction
//! - [`Store`]: an executor that can open transactions
//! - [`Transaction`]: an executor that commits explicitly
//!
//! Dropping a [`Transaction`] without calling
//! [`commit`](Transaction::commit) rolls it back.
//!
//! [`MemoryStore`] implements all three in-process and is what the tests
//! run against.
//!
//! # Example
//!
//! ```rust,ignore
//! let tx = store.begin().await?;
//! let mut record = Record::construct(schema, columns);
//! tx.insert(&mut record).await?;
//! tx.commit().await?;
//! ```

mod eval;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
pub use memory::{MemoryStore, MemoryTransaction};
use serde_json::{Map, Value};

use crate::{
    entity::{Record, Relation},
    query::{Q, Query},
    registry::{Registry, SchemaError}
};

/// Persistence failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No row with the given primary key.
    #[error("{entity} {id} does not exist")]
    NotFound {
        /// Entity name.
        entity: String,
        /// Rendered primary key.
        id:     String
    },

    /// Unique constraint violated.
    #[error("duplicate value {value} for {entity}.{field}")]
    Unique {
        /// Entity name.
        entity: String,
        /// Column name.
        field:  String,
        /// Rendered duplicate value.
        value:  String
    },

    /// Other constraint violation, in the backend's own words.
    #[error("{0}")]
    Integrity(String),

    /// Value rejected by the backend.
    #[error("{0}")]
    Validation(String),

    /// Column or relation path that does not exist.
    #[error("unknown field `{field}` on {entity}")]
    UnknownField {
        /// Entity name.
        entity: String,
        /// Offending field or path.
        field:  String
    },

    /// Lookup operand of the wrong shape.
    #[error("invalid operand for `{lookup}`: {reason}")]
    InvalidLookup {
        /// Lookup key.
        lookup: String,
        /// What was wrong.
        reason: String
    },

    /// Entity missing from the registry.
    #[error(transparent)]
    Schema(#[from] SchemaError)
}

/// What [`Executor::count`] counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountTarget {
    /// Matching rows after join fan-out.
    Rows,
    /// Distinct primary keys of matching rows.
    DistinctIds,
    /// Distinct tuples of the given fields.
    DistinctTuple(Vec<String>)
}

/// Read and write access to stored rows.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Registry the rows conform to.
    fn registry(&self) -> &Arc<Registry>;

    /// Rows matching `query`, ordered and windowed.
    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Count matching rows.
    async fn count(&self, query: &Query, target: CountTarget) -> Result<usize, StoreError>;

    /// Grouped rows: one map per group with the grouping fields and every
    /// annotation alias.
    async fn aggregate(&self, query: &Query) -> Result<Vec<Map<String, Value>>, StoreError>;

    /// Persist a new row. Generated values (id, defaults, timestamps) are
    /// written back into `record`.
    async fn insert(&self, record: &mut Record) -> Result<(), StoreError>;

    /// Persist `fields` of an existing row. Auto-now timestamps are stamped
    /// and written back.
    async fn update(&self, record: &mut Record, fields: &[String]) -> Result<(), StoreError>;

    /// Remove a row, cascading along foreign keys.
    async fn delete(&self, record: &Record) -> Result<(), StoreError>;

    /// Load one relation of `record`.
    async fn fetch_relation(&self, record: &Record, relation: &str) -> Result<Relation, StoreError>;

    /// Replace the link set of a many-to-many relation.
    async fn set_many_to_many(
        &self,
        record: &Record,
        relation: &str,
        ids: Vec<Value>
    ) -> Result<(), StoreError>;
}

/// Executor that can open transactions.
#[async_trait]
pub trait Store: Executor {
    /// Start a transaction. It holds exclusive access until committed or
    /// dropped.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// Executor scoped to one transaction.
#[async_trait]
pub trait Transaction: Executor {
    /// Make every write visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Fetch one row by primary key.
///
/// # Errors
///
/// [`StoreError::NotFound`] when no row matches.
pub async fn fetch_one(exec: &dyn Executor, entity: &'static str, id: &Value) -> Result<Record, StoreError> {
    let schema = exec.registry().entity(entity)?;
    let query = Query::new(entity).filter(Q::lookup(schema.pk_name(), id.clone())).limit(1);
    exec.fetch(&query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound {
            entity: entity.to_string(),
            id:     crate::value::display(id)
        })
}
