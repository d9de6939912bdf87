// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Runtime settings for resources and the scheduler.
//!
//! Both types deserialize with every field defaulted, so they can be read
//! from any serde source and only override what the file mentions:
//!
//! ```rust
//! use restforge_core::ResourceConfig;
//!
//! let config: ResourceConfig =
//!     serde_json::from_str(r#"{"enable_delete": false, "max_limit": 100}"#).unwrap();
//! assert!(!config.enable_delete);
//! assert!(config.enable_create);
//! assert_eq!(config.default_limit, 20);
//! ```

use serde::Deserialize;

fn enabled() -> bool {
    true
}

fn default_limit() -> usize {
    20
}

fn watermark_field() -> String {
    "updated_at".to_string()
}

fn schedule_update_at_key() -> String {
    "schedule_update_at".to_string()
}

/// Which operations a resource serves and how it pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceConfig {
    /// Mount `POST /`.
    #[serde(default = "enabled")]
    pub enable_create:   bool,
    /// Mount `PUT /{ids}`.
    #[serde(default = "enabled")]
    pub enable_update:   bool,
    /// Mount `DELETE /{ids}`.
    #[serde(default = "enabled")]
    pub enable_delete:   bool,
    /// Mount `GET /` and `GET /{id}`.
    #[serde(default = "enabled")]
    pub enable_get:      bool,
    /// Honor `include_summary` on lists.
    #[serde(default)]
    pub enable_summary:  bool,
    /// Page size when the request names none.
    #[serde(default = "default_limit")]
    pub default_limit:   usize,
    /// Upper bound on requested page sizes.
    #[serde(default)]
    pub max_limit:       Option<usize>,
    /// Timestamp column used for optimistic concurrency.
    #[serde(default = "watermark_field")]
    pub watermark_field: String
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            enable_create:   true,
            enable_update:   true,
            enable_delete:   true,
            enable_get:      true,
            enable_summary:  false,
            default_limit:   default_limit(),
            max_limit:       None,
            watermark_field: watermark_field()
        }
    }
}

impl ResourceConfig {
    #[must_use]
    pub const fn enable_create(mut self, on: bool) -> Self {
        self.enable_create = on;
        self
    }

    #[must_use]
    pub const fn enable_update(mut self, on: bool) -> Self {
        self.enable_update = on;
        self
    }

    #[must_use]
    pub const fn enable_delete(mut self, on: bool) -> Self {
        self.enable_delete = on;
        self
    }

    #[must_use]
    pub const fn enable_get(mut self, on: bool) -> Self {
        self.enable_get = on;
        self
    }

    #[must_use]
    pub const fn enable_summary(mut self, on: bool) -> Self {
        self.enable_summary = on;
        self
    }

    #[must_use]
    pub const fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    #[must_use]
    pub const fn max_limit(mut self, limit: usize) -> Self {
        self.max_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn watermark_field(mut self, field: impl Into<String>) -> Self {
        self.watermark_field = field.into();
        self
    }

    /// Page size for a request, capped by `max_limit`.
    #[must_use]
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        let size = requested.unwrap_or(self.default_limit);
        self.max_limit.map_or(size, |max| size.min(max))
    }
}

/// Deferred update settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Query parameter carrying the time an update should run at.
    #[serde(default = "schedule_update_at_key")]
    pub schedule_update_at_key: String,
    /// Request query parameters copied into each job's context.
    #[serde(default)]
    pub context_query_keys:     Vec<String>,
    /// Record attributes copied into each job's context.
    #[serde(default = "context_keys")]
    pub context_keys:           Vec<String>
}

fn context_keys() -> Vec<String> {
    vec!["name".to_string()]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_update_at_key: schedule_update_at_key(),
            context_query_keys:     Vec::new(),
            context_keys:           context_keys()
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn schedule_update_at_key(mut self, key: impl Into<String>) -> Self {
        self.schedule_update_at_key = key.into();
        self
    }

    #[must_use]
    pub fn context_query_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.context_query_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn context_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.context_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config: ResourceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ResourceConfig::default());
        let scheduler: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(scheduler, SchedulerConfig::default());
        assert_eq!(scheduler.context_keys, vec!["name"]);
    }

    #[test]
    fn page_size_is_capped() {
        let config = ResourceConfig::default().max_limit(50);
        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.page_size(Some(10)), 10);
        assert_eq!(config.page_size(Some(500)), 50);
    }

    #[test]
    fn builder_setters() {
        let config = ResourceConfig::default()
            .enable_summary(true)
            .enable_delete(false)
            .watermark_field("modified");
        assert!(config.enable_summary);
        assert!(!config.enable_delete);
        assert_eq!(config.watermark_field, "modified");
    }
}
