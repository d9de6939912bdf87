// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Read operations.
//!
//! # List pipeline
//!
//! ```text
//! scope ─> conditions ─> include ─> summary ─> total ─> window ─> group ─> order ─> fetch ─> prefetch
//! ```
//!
//! The total is taken before the window and counts distinct primary keys,
//! so joins through to-many relations never inflate it. Grouped lists
//! count distinct group tuples instead, and annotate every other included
//! column with the aggregate chosen by
//! [`Hooks::group_by_aggregate`](super::Hooks::group_by_aggregate). Those
//! columns are annotated under `_{name}_`; ordering by the column orders
//! by the aggregate.

use serde_json::{Map, Value};

use super::{
    Hooks, ListParams, ListResponse, Operation, RequestContext, Resource, hooks::ConditionAdapter
};
use crate::{
    entity::Record,
    error::{ApiError, ApiResult},
    filter::{self, parse_condition},
    normalize::{prefetch, to_view},
    query::{Annotation, Query, aggregate_alias, normalize_field, unalias},
    registry::EntitySchema,
    store::CountTarget
};

impl<H: Hooks> Resource<H> {
    /// One page of rows matching every condition.
    ///
    /// # Errors
    ///
    /// - [`ApiError::BadRequest`] for conditions that are not JSON objects
    /// - [`ApiError::Forbidden`] when the scope leaves nothing readable
    /// - store failures
    #[tracing::instrument(skip_all, fields(entity = self.entity))]
    pub async fn list(&self, ctx: &RequestContext, params: ListParams) -> ApiResult<ListResponse> {
        let user = self.hooks.current_user(ctx).await?;
        let schema = self.schema()?;
        let mut query = self.scoped(&user, ctx, Operation::List).await?;

        let adapter = ConditionAdapter {
            hooks: &self.hooks,
            user:  &user,
            ctx
        };
        for raw in &params.condition {
            let condition = parse_condition(raw)?;
            let (next, predicate) = filter::compile(&adapter, query, &condition).await?;
            query = next.filter(predicate);
        }

        let include = list_columns(schema, &params.include, query.only_columns())?;
        if !include.is_empty() {
            query = query.only(include.clone());
        }

        let mut summary = if self.config.enable_summary && params.include_summary {
            let grouped = self.annotate(schema, query.clone(), &include, &[], &mut []);
            self.grouped_records(&grouped).await?.into_iter().next()
        } else {
            None
        };

        let group_by: Vec<String> = params.group_by.iter().map(|f| normalize_field(f)).collect();
        let total = if group_by.is_empty() {
            let total = self
                .store
                .count(&query, CountTarget::DistinctIds)
                .await?;
            query = query.distinct();
            total
        } else {
            self.store
                .count(&query, CountTarget::DistinctTuple(group_by.clone()))
                .await?
        };

        query = query
            .offset(params.offset.unwrap_or(0))
            .limit(self.config.page_size(params.limit));
        let mut order_by = params.order_by.clone();
        if !group_by.is_empty() {
            query = self.annotate(schema, query, &include, &group_by, &mut order_by);
        }
        let ordering: Vec<String> = order_by
            .iter()
            .flat_map(|item| self.hooks.translate_order_by(&user, item, ctx))
            .collect();
        query = query.order_by(ordering);

        let mut records = if group_by.is_empty() {
            self.store.fetch(&query).await?
        } else {
            self.grouped_records(&query).await?
        };

        if !params.prefetch.is_empty() {
            for record in &mut records {
                prefetch(self.executor(), record, &params.prefetch).await?;
            }
            if let Some(summary) = summary.as_mut() {
                prefetch(self.executor(), summary, &params.prefetch).await?;
            }
        }

        tracing::debug!(total, rows = records.len(), "list served");
        Ok(ListResponse {
            total,
            summary: summary
                .map(|s| to_view(&self.registry, &self.list_view, &s))
                .transpose()?,
            data: records
                .iter()
                .map(|r| to_view(&self.registry, &self.list_view, r))
                .collect::<ApiResult<_>>()?
        })
    }

    /// One row by id, rendered through the detail view.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] when the id does not resolve to a visible row.
    #[tracing::instrument(skip(self, ctx, prefetch_paths), fields(entity = self.entity))]
    pub async fn get(&self, ctx: &RequestContext, id: &str, prefetch_paths: &[String]) -> ApiResult<Value> {
        let user = self.hooks.current_user(ctx).await?;
        let ids = self.resolve_ids(&user, ctx, id).await?;
        if ids.len() != 1 {
            return Err(ApiError::NotFound);
        }
        let query = self.scoped(&user, ctx, Operation::Get).await?;
        let mut record = self
            .fetch_targets(self.executor(), query, &ids)
            .await?
            .pop()
            .ok_or(ApiError::NotFound)?;
        prefetch(self.executor(), &mut record, prefetch_paths).await?;
        Ok(Value::Object(to_view(&self.registry, &self.detail_view, &record)?))
    }

    /// Annotate non-grouped columns and group by `group_by`.
    ///
    /// Ordering items naming an annotated column are redirected to its
    /// alias.
    fn annotate(
        &self,
        schema: &EntitySchema,
        mut query: Query,
        include: &[String],
        group_by: &[String],
        order_by: &mut [String]
    ) -> Query {
        let columns: Vec<&str> = if include.is_empty() {
            schema.columns().collect()
        } else {
            include.iter().map(String::as_str).collect()
        };
        for name in columns {
            if group_by.iter().any(|g| g == name) {
                continue;
            }
            let Some(descriptor) = schema.storage_field(name) else {
                continue;
            };
            let Some(aggregate) = self.hooks.group_by_aggregate(name, descriptor) else {
                continue;
            };
            let alias = aggregate_alias(name);
            for item in order_by.iter_mut() {
                if item == name {
                    item.clone_from(&alias);
                } else if item.strip_prefix('-') == Some(name) {
                    *item = format!("-{alias}");
                }
            }
            query = query.annotate(
                alias,
                Annotation {
                    aggregate,
                    field: name.to_string()
                }
            );
        }
        query.group_by(group_by.to_vec())
    }

    /// Run a grouped query and turn each group into a record.
    ///
    /// Null aggregates are dropped and aliases mapped back to column names.
    async fn grouped_records(&self, query: &Query) -> ApiResult<Vec<Record>> {
        let rows = self.store.aggregate(query).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let values: Map<String, Value> = row
                    .into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (unalias(&k).map_or_else(|| k.clone(), str::to_string), v))
                    .collect();
                Record::with_values(self.entity, values)
            })
            .collect())
    }
}

/// Columns a list loads.
///
/// Requested columns win; otherwise list exclusions apply. A scope
/// restriction intersects either, and an empty intersection is forbidden.
fn list_columns(
    schema: &EntitySchema,
    requested: &[String],
    allowed: Option<&[String]>
) -> ApiResult<Vec<String>> {
    let mut include: Vec<String> = requested.iter().map(|f| normalize_field(f)).collect();
    let excluded = &schema.meta().list_exclude;
    if include.is_empty() && !excluded.is_empty() {
        include = schema
            .fields()
            .iter()
            .filter(|f| !excluded.contains(&f.name))
            .filter_map(|f| f.storage_name())
            .filter(|c| !excluded.iter().any(|e| e == c))
            .map(str::to_string)
            .collect();
    }
    let Some(allowed) = allowed else {
        return Ok(include);
    };
    if include.is_empty() {
        return Ok(allowed.to_vec());
    }
    include.retain(|f| allowed.contains(f));
    if include.is_empty() {
        tracing::debug!(entity = schema.name(), "no requested column is visible");
        return Err(ApiError::Forbidden);
    }
    Ok(include)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        config::ResourceConfig,
        fixtures,
        query::{Aggregate, Q},
        registry::FieldDescriptor,
        resource::PublicHooks,
        store::{Executor, MemoryStore}
    };

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(fixtures::blog()));
        for (name, level) in [("ann", "high"), ("bob", "low")] {
            let mut user = Record::with_values(
                "User",
                json!({"name": name, "level": level}).as_object().cloned().unwrap_or_default()
            );
            store.insert(&mut user).await.unwrap();
        }
        for (title, views, author) in [("alpha", 10, 1), ("beta", 5, 1), ("gamma", 7, 2)] {
            let mut post = Record::construct(
                store.registry().entity("Post").unwrap(),
                json!({"title": title, "body": "one two three", "views": views, "author_id": author})
                    .as_object()
                    .cloned()
                    .unwrap_or_default()
            );
            store.insert(&mut post).await.unwrap();
        }
        for text in ["a", "b", "c"] {
            let mut comment = Record::with_values(
                "Comment",
                json!({"text": text, "post_id": 1}).as_object().cloned().unwrap_or_default()
            );
            store.insert(&mut comment).await.unwrap();
        }
        store
    }

    fn posts(store: Arc<MemoryStore>) -> Resource<PublicHooks> {
        Resource::new(store, "Post", PublicHooks).unwrap()
    }

    fn params(condition: &[&str]) -> ListParams {
        ListParams {
            condition: condition.iter().map(|c| (*c).to_string()).collect(),
            ..ListParams::default()
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::GET)
    }

    #[tokio::test]
    async fn total_counts_distinct_parents_across_fan_out() {
        let resource = posts(seeded().await);
        let page = resource
            .list(&ctx(), params(&[r#"{"comments.text.in": ["a", "b", "c"]}"#]))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0]["title"], "alpha");
    }

    #[tokio::test]
    async fn list_excludes_columns_by_default() {
        let resource = posts(seeded().await);
        let page = resource.list(&ctx(), ListParams::default()).await.unwrap();
        assert_eq!(page.total, 3);
        assert!(page.data.iter().all(|row| !row.contains_key("body")));
        assert!(page.data[0].contains_key("title"));
    }

    #[tokio::test]
    async fn ordering_and_window() {
        let resource = posts(seeded().await);
        let page = resource
            .list(
                &ctx(),
                ListParams {
                    order_by: vec!["-views".to_string()],
                    offset: Some(1),
                    limit: Some(1),
                    ..ListParams::default()
                }
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0]["title"], "gamma");
    }

    #[tokio::test]
    async fn limit_is_capped_by_config() {
        let resource = posts(seeded().await).with_config(ResourceConfig::default().max_limit(2));
        let page = resource
            .list(
                &ctx(),
                ListParams {
                    limit: Some(100),
                    ..ListParams::default()
                }
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
    }

    #[tokio::test]
    async fn several_conditions_are_anded() {
        let resource = posts(seeded().await);
        let page = resource
            .list(&ctx(), params(&[r#"{"views.gte": 7}"#, r#"{"author.name": "ann"}"#]))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0]["title"], "alpha");
    }

    #[tokio::test]
    async fn condition_that_is_not_json_is_rejected() {
        let resource = posts(seeded().await);
        let err = resource.list(&ctx(), params(&["{oops"])).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn grouped_list_aggregates_other_columns() {
        let resource = posts(seeded().await);
        let page = resource
            .list(
                &ctx(),
                ListParams {
                    group_by: vec!["author_id".to_string()],
                    include: vec!["author_id".to_string(), "views".to_string()],
                    order_by: vec!["-views".to_string()],
                    ..ListParams::default()
                }
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0]["author_id"], 1);
        assert_eq!(page.data[0]["views"], 10);
        assert_eq!(page.data[1]["views"], 7);
    }

    #[tokio::test]
    async fn summary_only_when_enabled() {
        let store = seeded().await;
        let request = ListParams {
            include_summary: true,
            include: vec!["views".to_string()],
            ..ListParams::default()
        };

        let disabled = posts(Arc::clone(&store));
        assert_eq!(disabled.list(&ctx(), request.clone()).await.unwrap().summary, None);

        let enabled = posts(store).with_config(ResourceConfig::default().enable_summary(true));
        let summary = enabled.list(&ctx(), request).await.unwrap().summary.unwrap();
        assert_eq!(summary["views"], 10);
    }

    #[tokio::test]
    async fn prefetch_loads_relations_and_async_fields() {
        let resource = posts(seeded().await);
        let page = resource
            .list(
                &ctx(),
                ListParams {
                    prefetch: vec!["author".to_string(), "word_count".to_string()],
                    include: ["id", "title", "body", "author_id"].map(String::from).to_vec(),
                    order_by: vec!["id".to_string()],
                    ..ListParams::default()
                }
            )
            .await
            .unwrap();
        assert_eq!(page.data[0]["author"]["name"], "ann");
        assert_eq!(page.data[0]["word_count"], 3);
    }

    #[tokio::test]
    async fn get_renders_detail_or_not_found() {
        let resource = posts(seeded().await);
        let post = resource.get(&ctx(), "2", &[]).await.unwrap();
        assert_eq!(post["title"], "beta");
        assert_eq!(post["body"], "one two three");
        assert_eq!(post["summary"], "bet");

        assert_eq!(resource.get(&ctx(), "99", &[]).await.unwrap_err(), ApiError::NotFound);
        assert_eq!(resource.get(&ctx(), "abc", &[]).await.unwrap_err(), ApiError::NotFound);
        assert_eq!(resource.get(&ctx(), "1,2", &[]).await.unwrap_err(), ApiError::NotFound);
    }

    struct AuthorScoped;

    #[async_trait]
    impl Hooks for AuthorScoped {
        type User = i64;

        async fn current_user(&self, ctx: &RequestContext) -> ApiResult<i64> {
            ctx.header("x-user")
                .and_then(|v| v.parse().ok())
                .ok_or(ApiError::Unauthorized)
        }

        async fn scope(&self, user: &i64, _: &RequestContext, query: Query, _: Operation) -> ApiResult<Query> {
            if *user == 0 {
                return Ok(query.only(Vec::new()));
            }
            Ok(query.filter(Q::lookup("author_id", json!(user))))
        }

        fn group_by_aggregate(&self, field: &str, _: &FieldDescriptor) -> Option<Aggregate> {
            (field == "views").then_some(Aggregate::Sum)
        }
    }

    fn as_user(id: &str) -> RequestContext {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-user", id.parse().unwrap());
        RequestContext::new(Method::GET).with_headers(headers)
    }

    #[tokio::test]
    async fn scope_narrows_and_denies() {
        let store = seeded().await;
        let resource = Resource::new(store, "Post", AuthorScoped).unwrap();

        let page = resource.list(&as_user("1"), ListParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(resource.get(&as_user("2"), "1", &[]).await.unwrap_err(), ApiError::NotFound);

        assert_eq!(
            resource.list(&as_user("0"), ListParams::default()).await.unwrap_err(),
            ApiError::Forbidden
        );
        assert_eq!(
            resource.list(&ctx(), ListParams::default()).await.unwrap_err(),
            ApiError::Unauthorized
        );
    }

    #[tokio::test]
    async fn custom_aggregate_in_summary() {
        let resource = Resource::new(seeded().await, "Post", AuthorScoped)
            .unwrap()
            .with_config(ResourceConfig::default().enable_summary(true));
        let page = resource
            .list(
                &as_user("1"),
                ListParams {
                    include_summary: true,
                    ..ListParams::default()
                }
            )
            .await
            .unwrap();
        let summary = page.summary.unwrap();
        assert_eq!(summary["views"], 15);
        assert!(!summary.contains_key("title"));
    }

    #[test]
    fn list_columns_intersect_scope() {
        let registry = fixtures::blog();
        let schema = registry.entity("Post").unwrap();
        let all = list_columns(schema, &[], None).unwrap();
        assert!(all.contains(&"author_id".to_string()));
        assert!(!all.contains(&"body".to_string()));

        let allowed = vec!["id".to_string(), "title".to_string()];
        assert_eq!(list_columns(schema, &[], Some(&allowed)).unwrap(), allowed);
        assert_eq!(
            list_columns(schema, &["title".to_string(), "views".to_string()], Some(&allowed)).unwrap(),
            vec!["title"]
        );
        assert_eq!(
            list_columns(schema, &["views".to_string()], Some(&allowed)).unwrap_err(),
            ApiError::Forbidden
        );
    }
}
