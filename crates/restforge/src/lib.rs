// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

#![cfg_attr(docsrs, feature(doc_cfg))]

//! # restforge
//!
//! Declare an entity once and serve it as a REST resource. Re-exports:
//! - the [`Resource`](macro@Resource) derive macro from
//!   `restforge-derive-impl`
//! - everything from `restforge-core` ([`Registry`], [`Resource`],
//!   [`Hooks`], [`MemoryStore`], [`Scheduler`], ...)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use restforge::{MemoryStore, PublicHooks, Registry, Resource};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, restforge::Resource)]
//! pub struct Tag {
//!     #[field(id)]
//!     pub id: i64,
//!     #[field(unique, max_length = 32)]
//!     pub label: String
//! }
//!
//! let registry = Registry::builder().register::<Tag>().build()?;
//! let store = Arc::new(MemoryStore::new(registry));
//! let tags = Arc::new(Resource::new(store, "Tag", PublicHooks)?);
//! let app = axum::Router::new().nest("/tags", restforge::http::router(tags));
//! ```
//!
//! # Requests
//!
//! | Request | Meaning |
//! |---------|---------|
//! | `GET /tags?condition={"label__icontains":"ru"}` | filter |
//! | `GET /tags?order_by=-id&offset=20&limit=10` | order and window |
//! | `GET /tags?include=label&include_summary=true` | columns and aggregates |
//! | `POST /tags` with an object or array | create one or a batch |
//! | `PUT /tags/1,2` | update several |
//! | `DELETE /tags/3` | delete |

pub use restforge_core::*;
pub use restforge_derive_impl::Resource;

/// Convenient re-exports for common usage, including the derive macro.
pub mod prelude {
    pub use restforge_core::prelude::*;
    pub use restforge_derive_impl::Resource;
}
