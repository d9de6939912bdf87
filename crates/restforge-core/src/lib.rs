// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Runtime engine for restforge.
//!
//! Declare entities once, register them, and serve them over HTTP with
//! filtering, projection, batch writes and deferred updates. Most users
//! depend on `restforge`, which re-exports this crate together with the
//! `#[derive(Resource)]` macro.
//!
//! # Overview
//!
//! - [`Registry`]: validated entity schemas and the view cache
//! - [`view`]: projection of schemas into list, detail and form views
//! - [`normalize`]: record to response and payload to record conversion
//! - [`filter`]: JSON conditions compiled into [`query::Q`] trees
//! - [`store`]: persistence traits and the in-memory [`MemoryStore`]
//! - [`Resource`]: list, get, create, update and delete with [`Hooks`]
//! - [`http`]: the axum router over a resource
//! - [`scheduler`]: updates queued for a later time
//!
//! # Usage
//!
//! ```rust,ignore
//! use restforge_core::prelude::*;
//!
//! let registry = Registry::builder().register::<User>().register::<Post>().build()?;
//! let store = Arc::new(MemoryStore::new(registry));
//! let posts = Arc::new(Resource::new(store, "Post", PublicHooks)?);
//! let app = axum::Router::new().nest("/posts", restforge_core::http::router(posts));
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod http;
pub mod normalize;
pub mod prelude;
pub mod query;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod store;
pub mod value;
pub mod view;

#[cfg(test)]
mod fixtures;

/// Re-export async_trait for hook implementations.
pub use async_trait::async_trait;
pub use config::{ResourceConfig, SchedulerConfig};
pub use entity::{Entity, Record, Relation};
pub use error::{ApiError, ApiResult};
pub use registry::{
    ComputedField, EntitySchema, EnumType, FieldDefault, FieldDescriptor, FieldType, FieldTyped,
    Registry, RelationKind, SchemaError, Validator
};
pub use resource::{
    DeleteEcho, Hooks, ListParams, ListResponse, Operation, Output, PublicHooks, RequestContext,
    Resource, Returned
};
pub use scheduler::{MemoryWorker, Scheduler, Worker};
/// Re-export serde_json for generated code.
pub use serde_json;
pub use store::{Executor, MemoryStore, Store, Transaction};
pub use view::{RequiredMode, ViewSpec, ViewType};
