// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Shared schemas for unit tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::registry::{
    ComputedField, EntitySchema, EnumType, FieldDescriptor, FieldType, Registry, Validator
};

/// `User`, `Post`, `Comment` and `Tag` with every relation kind.
pub(crate) fn blog() -> Arc<Registry> {
    let user = EntitySchema::new("User")
        .field(FieldDescriptor::column::<i64>("id").primary_key())
        .field(FieldDescriptor::column::<String>("name").max_length(16).unique())
        .field(FieldDescriptor::column::<Option<String>>("email").validator(Validator::Email))
        .field(
            FieldDescriptor::typed(
                "level",
                FieldType::Enum(EnumType::new("Level").member("low", "Low").member("high", "High"))
            )
            .default_value("low")
        )
        .field(FieldDescriptor::reverse("posts", "Post", "author"));
    let post = EntitySchema::new("Post")
        .field(FieldDescriptor::column::<i64>("id").primary_key())
        .field(FieldDescriptor::column::<String>("title"))
        .field(FieldDescriptor::column::<String>("body"))
        .field(FieldDescriptor::column::<i64>("views").default_value(0))
        .field(FieldDescriptor::column::<DateTime<Utc>>("created_at").auto_now_add())
        .field(FieldDescriptor::column::<DateTime<Utc>>("updated_at").auto_now())
        .field(FieldDescriptor::to_one::<Option<i64>>("author", "User"))
        .field(FieldDescriptor::reverse("comments", "Comment", "post"))
        .field(FieldDescriptor::to_many("tags", "Tag"))
        .list_exclude(["body"])
        .computed(ComputedField::new("summary").of_type(FieldType::Str).getter(|r| {
            Ok(json!(r.get_str("title").unwrap_or_default().chars().take(3).collect::<String>()))
        }))
        .computed(
            ComputedField::new("word_count")
                .of_type(FieldType::Int)
                .async_getter(|r: crate::Record| async move {
                    Ok(json!(r.get_str("body").unwrap_or_default().split_whitespace().count()))
                })
        )
        .computed(ComputedField::new("secret").of_type(FieldType::Str).setter(|r, v| {
            let text = crate::value::display(&v);
            r.set("body", json!(format!("[{text}]")));
            Ok(())
        }));
    let comment = EntitySchema::new("Comment")
        .field(FieldDescriptor::column::<i64>("id").primary_key())
        .field(FieldDescriptor::column::<String>("text"))
        .field(FieldDescriptor::to_one::<i64>("post", "Post"));
    let tag = EntitySchema::new("Tag")
        .field(FieldDescriptor::column::<i64>("id").primary_key())
        .field(FieldDescriptor::column::<String>("label").unique());
    Registry::builder()
        .schema(user)
        .schema(post)
        .schema(comment)
        .schema(tag)
        .build()
        .expect("fixture schema is valid")
}
