//! Cleaning and validation of serialized data against field schemas.
//!
//! Cleaning fills defaults and performs light coercion; it never fails.
//! Validation walks the cleaned value and collects every failure instead of
//! stopping at the first one.

use serde_json::{Map, Number, Value};

use crate::error::{ValidationError, ValidationErrors};

use super::field::{FieldKind, FieldSchema, SchemaFields};

const MAX_DEPTH: usize = 64;

// ============================================================================
// Cleaning
// ============================================================================

/// Fill missing fields with their defaults and coerce obvious mismatches.
pub fn clean_fields(fields: &SchemaFields, data: &mut Map<String, Value>) {
    for (name, schema) in fields {
        match data.get_mut(name) {
            Some(value) => clean_value(schema, value),
            None => {
                if let Some(default) = default_for(schema) {
                    data.insert(name.clone(), default);
                }
            }
        }
    }
}

fn clean_value(schema: &FieldSchema, value: &mut Value) {
    match (&schema.kind, &mut *value) {
        (FieldKind::Object(fields), Value::Object(map)) => clean_fields(fields, map),
        (FieldKind::Array(inner), Value::Array(items)) => {
            for item in items.iter_mut() {
                clean_value(inner, item);
            }
        }
        (FieldKind::Number { .. }, Value::String(raw)) => {
            let parsed = raw.trim().parse::<f64>().ok().and_then(Number::from_f64);
            if let Some(number) = parsed {
                *value = Value::Number(number);
            }
        }
        (FieldKind::Boolean, Value::String(raw)) => {
            let parsed = match raw.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            };
            if let Some(flag) = parsed {
                *value = Value::Bool(flag);
            }
        }
        (FieldKind::Object(_) | FieldKind::Array(_) | FieldKind::Collection(_), Value::Null)
            if !schema.nullable =>
        {
            if let Some(default) = default_for(schema) {
                *value = default;
            }
        }
        _ => {}
    }
}

/// Default written for an absent field, if any.
pub fn default_for(schema: &FieldSchema) -> Option<Value> {
    if let Some(initial) = &schema.initial {
        return Some(initial.clone());
    }
    match &schema.kind {
        FieldKind::Object(fields) => {
            let mut map = Map::new();
            clean_fields(fields, &mut map);
            Some(Value::Object(map))
        }
        FieldKind::Array(_) | FieldKind::Collection(_) => Some(Value::Array(Vec::new())),
        FieldKind::Boolean => Some(Value::Bool(false)),
        _ if schema.nullable => Some(Value::Null),
        FieldKind::String { blank: true, .. } if !schema.required => {
            Some(Value::String(String::new()))
        }
        _ => None,
    }
}

// ============================================================================
// Validation
// ============================================================================

struct ValidationContext {
    errors: Vec<ValidationError>,
    path: Vec<String>,
}

impl ValidationContext {
    fn new(prefix: &[&str]) -> Self {
        Self {
            errors: vec![],
            path: prefix.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn push_key(&mut self, key: impl Into<String>) {
        self.path.push(key.into());
    }

    fn push_index(&mut self, idx: usize) {
        self.path.push(format!("[{idx}]"));
    }

    fn pop(&mut self) {
        self.path.pop();
    }

    /// Join path segments, collapsing `".[0]"` → `"[0]"`.
    fn current_path(&self) -> String {
        self.path.join(".").replace(".[", "[")
    }

    fn add_error(&mut self, expected: impl Into<String>, received: impl Into<String>) {
        self.errors.push(ValidationError {
            path: self.current_path(),
            expected: expected.into(),
            received: received.into(),
        });
    }
}

/// JSON type name of `value`, as used in validation messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate an object against `fields`. `prefix` is prepended to error paths.
pub fn validate_fields(
    fields: &SchemaFields,
    data: &Map<String, Value>,
    prefix: &[&str],
) -> Result<(), ValidationErrors> {
    let mut ctx = ValidationContext::new(prefix);
    walk_fields(fields, data, &mut ctx, 0);
    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(ctx.errors))
    }
}

/// Validate a single value against one field schema.
pub fn validate_value(schema: &FieldSchema, value: &Value) -> Result<(), ValidationErrors> {
    let mut ctx = ValidationContext::new(&[]);
    walk(schema, value, &mut ctx, 0);
    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(ctx.errors))
    }
}

fn walk_fields(
    fields: &SchemaFields,
    data: &Map<String, Value>,
    ctx: &mut ValidationContext,
    depth: usize,
) {
    for (name, schema) in fields {
        ctx.push_key(name.as_str());
        match data.get(name) {
            Some(value) => walk(schema, value, ctx, depth + 1),
            None if schema.required => ctx.add_error(schema.describe(), "undefined"),
            None => {}
        }
        ctx.pop();
    }
}

fn walk(schema: &FieldSchema, value: &Value, ctx: &mut ValidationContext, depth: usize) {
    if depth > MAX_DEPTH {
        ctx.add_error(format!("nesting depth <= {MAX_DEPTH}"), "deeper value");
        return;
    }

    if value.is_null() {
        if !schema.nullable && !matches!(schema.kind, FieldKind::Any) {
            ctx.add_error(schema.describe(), "null");
        }
        return;
    }

    match &schema.kind {
        FieldKind::String { choices, blank } => {
            let Some(s) = value.as_str() else {
                ctx.add_error("string", type_name(value));
                return;
            };
            if s.is_empty() && (!*blank || schema.required) {
                ctx.add_error("non-blank string", "empty string");
            } else if let Some(choices) = choices {
                if !choices.iter().any(|c| c == s) {
                    ctx.add_error(schema.describe(), format!("\"{s}\""));
                }
            }
        }

        FieldKind::Number { integer, min, max } => {
            let Some(n) = value.as_f64() else {
                ctx.add_error(schema.describe(), type_name(value));
                return;
            };
            if *integer && n.fract() != 0.0 {
                ctx.add_error("integer", n.to_string());
            }
            if let Some(min) = min {
                if n < *min {
                    ctx.add_error(format!("number >= {min}"), n.to_string());
                }
            }
            if let Some(max) = max {
                if n > *max {
                    ctx.add_error(format!("number <= {max}"), n.to_string());
                }
            }
        }

        FieldKind::Boolean => {
            if !value.is_boolean() {
                ctx.add_error("boolean", type_name(value));
            }
        }

        FieldKind::Object(fields) => match value.as_object() {
            Some(map) => walk_fields(fields, map, ctx, depth),
            None => ctx.add_error("object", type_name(value)),
        },

        FieldKind::Array(inner) => match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    ctx.push_index(idx);
                    walk(inner, item, ctx, depth + 1);
                    ctx.pop();
                }
            }
            None => ctx.add_error("array", type_name(value)),
        },

        FieldKind::Any => {}

        // Elements are validated individually when their records are built,
        // so one bad entry never fails the owner.
        FieldKind::Collection(field) => match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        ctx.push_index(idx);
                        ctx.add_error(format!("{} object", field.element()), type_name(item));
                        ctx.pop();
                    }
                }
            }
            None => ctx.add_error(schema.describe(), type_name(value)),
        },
    }
}
