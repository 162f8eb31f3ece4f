//! Argument schema derivation
//!
//! Tool argument types describe their public fields through [`ToolArguments`];
//! [`generate_schema`] turns that description into a JSON Schema object.
//! Structured fields get one level of nested `properties` and no deeper.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Integer,
    Number,
    Boolean,
    String,
    Array(Box<FieldKind>),
    Object(Vec<FieldSchema>),
}

impl FieldKind {
    pub fn array_of(items: FieldKind) -> Self {
        Self::Array(Box::new(items))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: Option<&'static str>,
    pub enum_values: Vec<&'static str>,
    pub required: bool,
}

impl FieldSchema {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            description: None,
            enum_values: Vec::new(),
            required: false,
        }
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn one_of(mut self, values: &[&'static str]) -> Self {
        self.enum_values = values.to_vec();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Implemented by tool argument types, listing fields in declaration order.
pub trait ToolArguments {
    fn fields() -> Vec<FieldSchema>;
}

/// Builds the input schema for a tool; `None` yields an empty object schema.
pub fn generate_schema(fields: Option<&[FieldSchema]>) -> Value {
    let fields = fields.unwrap_or_default();
    let (properties, required) = object_parts(fields, true);

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn object_parts(fields: &[FieldSchema], nest: bool) -> (Map<String, Value>, Vec<Value>) {
    let properties = fields
        .iter()
        .map(|field| (field.name.to_string(), field_schema(field, nest)))
        .collect();
    let required = fields
        .iter()
        .filter(|field| field.required)
        .map(|field| Value::String(field.name.to_string()))
        .collect();
    (properties, required)
}

fn field_schema(field: &FieldSchema, nest: bool) -> Value {
    let mut schema = kind_schema(&field.kind, nest);
    if let Some(description) = field.description {
        schema.insert("description".to_string(), json!(description));
    }
    if !field.enum_values.is_empty() {
        schema.insert("enum".to_string(), json!(field.enum_values));
    }
    Value::Object(schema)
}

fn kind_schema(kind: &FieldKind, nest: bool) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(kind.type_name()));

    match kind {
        FieldKind::Array(items) => {
            schema.insert(
                "items".to_string(),
                Value::Object(kind_schema(items, nest)),
            );
        }
        FieldKind::Object(fields) if nest => {
            let (properties, required) = object_parts(fields, false);
            schema.insert("properties".to_string(), Value::Object(properties));
            if !required.is_empty() {
                schema.insert("required".to_string(), Value::Array(required));
            }
        }
        _ => {}
    }
    schema
}
