// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Convenient re-exports for common usage.
//!
//! # Usage
//!
//! ```rust,ignore
//! use restforge_core::prelude::*;
//! ```

pub use crate::{
    ApiError, ApiResult, ComputedField, Entity, EntitySchema, Hooks, MemoryStore, MemoryWorker,
    Operation, Output, PublicHooks, Record, Registry, RequestContext, Resource, ResourceConfig,
    Scheduler, SchedulerConfig, Store, async_trait,
    query::{Aggregate, Query},
    resource::ListParams,
    scheduler::Worker
};
