// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! OpenAPI rendering of projected views.

use utoipa::openapi::{
    RefOr,
    schema::{ArrayBuilder, KnownFormat, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type}
};

use super::{FieldShape, ViewField, ViewType};
use crate::registry::FieldType;

impl ViewType {
    /// Object schema of this view, nested views inlined.
    #[must_use]
    pub fn openapi_schema(&self) -> Schema {
        let mut object = ObjectBuilder::new().title(Some(self.name()));
        for (name, field) in self.fields() {
            object = object.property(name, field_schema(field));
            if field.is_required() {
                object = object.required(name);
            }
        }
        Schema::Object(object.build())
    }
}

fn nullable(ty: Type, optional: bool) -> SchemaType {
    if optional { SchemaType::Array(vec![ty, Type::Null]) } else { SchemaType::Type(ty) }
}

fn field_schema(field: &ViewField) -> RefOr<Schema> {
    let schema = match &field.shape {
        FieldShape::Scalar(ty) => {
            scalar_schema(ty, field.optional, field.max_length, field.description.as_deref())
        }
        FieldShape::Object(view) => view.openapi_schema(),
        FieldShape::List(view) => {
            Schema::Array(ArrayBuilder::new().items(RefOr::T(view.openapi_schema())).build())
        }
    };
    RefOr::T(schema)
}

fn scalar_schema(
    ty: &FieldType,
    optional: bool,
    max_length: Option<usize>,
    description: Option<&str>
) -> Schema {
    let object = ObjectBuilder::new().description(description);
    let object = match ty {
        FieldType::Int => object
            .schema_type(nullable(Type::Integer, optional))
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Int64))),
        FieldType::Float => object
            .schema_type(nullable(Type::Number, optional))
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Double))),
        FieldType::Bool => object.schema_type(nullable(Type::Boolean, optional)),
        FieldType::Str => object
            .schema_type(nullable(Type::String, optional))
            .max_length(max_length),
        FieldType::Datetime => object
            .schema_type(nullable(Type::String, optional))
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
        FieldType::Date => object
            .schema_type(nullable(Type::String, optional))
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Date))),
        FieldType::Uuid => object
            .schema_type(nullable(Type::String, optional))
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid))),
        FieldType::Json => object.schema_type(SchemaType::AnyValue),
        FieldType::Enum(members) => object
            .title(Some(members.title()))
            .enum_values(Some(members.members().iter().map(|m| m.value.clone()))),
        FieldType::List(inner) => {
            return Schema::Array(
                ArrayBuilder::new()
                    .items(RefOr::T(scalar_schema(inner, false, None, None)))
                    .description(description)
                    .build()
            );
        }
    };
    Schema::Object(object.build())
}
