use std::collections::BTreeMap;

use serde_json::Value;

use super::collection::CollectionField;

/// Named fields of an object schema, in key order.
pub type SchemaFields = BTreeMap<String, FieldSchema>;

/// Schema of a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub kind: FieldKind,
    /// Missing values fail validation.
    pub required: bool,
    /// `null` is an accepted value.
    pub nullable: bool,
    /// Value written by cleaning when the field is absent.
    pub initial: Option<Value>,
}

/// Shape of a field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String {
        choices: Option<Vec<String>>,
        /// Whether the empty string is accepted
        blank: bool,
    },
    Number {
        integer: bool,
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Object(SchemaFields),
    Array(Box<FieldSchema>),
    /// Arbitrary JSON, never validated
    Any,
    /// An embedded collection of records
    Collection(CollectionField),
}

impl FieldSchema {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            initial: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Restrict a string field to a fixed set of values.
    pub fn choices<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let FieldKind::String { choices, .. } = &mut self.kind {
            *choices = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Reject the empty string.
    pub fn non_blank(mut self) -> Self {
        if let FieldKind::String { blank, .. } = &mut self.kind {
            *blank = false;
        }
        self
    }

    pub fn min(mut self, value: f64) -> Self {
        if let FieldKind::Number { min, .. } = &mut self.kind {
            *min = Some(value);
        }
        self
    }

    pub fn max(mut self, value: f64) -> Self {
        if let FieldKind::Number { max, .. } = &mut self.kind {
            *max = Some(value);
        }
        self
    }

    pub fn as_collection(&self) -> Option<&CollectionField> {
        match &self.kind {
            FieldKind::Collection(field) => Some(field),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SchemaFields> {
        match &self.kind {
            FieldKind::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short type name used in validation messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            FieldKind::String { choices: Some(c), .. } => format!("one of [{}]", c.join(", ")),
            FieldKind::String { .. } => "string".to_string(),
            FieldKind::Number { integer: true, .. } => "integer".to_string(),
            FieldKind::Number { .. } => "number".to_string(),
            FieldKind::Boolean => "boolean".to_string(),
            FieldKind::Object(_) => "object".to_string(),
            FieldKind::Array(_) => "array".to_string(),
            FieldKind::Any => "any".to_string(),
            FieldKind::Collection(field) => format!("collection of {}", field.element()),
        }
    }
}

/// Field schema builders. Usage: `f::string().required()`, `f::collection("Item")`.
pub mod f {
    use super::{FieldKind, FieldSchema, SchemaFields};
    use crate::schema::collection::CollectionField;

    pub fn string() -> FieldSchema {
        FieldSchema::of(FieldKind::String {
            choices: None,
            blank: true,
        })
    }

    pub fn number() -> FieldSchema {
        FieldSchema::of(FieldKind::Number {
            integer: false,
            min: None,
            max: None,
        })
    }

    pub fn integer() -> FieldSchema {
        FieldSchema::of(FieldKind::Number {
            integer: true,
            min: None,
            max: None,
        })
    }

    pub fn boolean() -> FieldSchema {
        FieldSchema::of(FieldKind::Boolean)
    }

    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, FieldSchema)>) -> FieldSchema {
        let fields: SchemaFields = fields
            .into_iter()
            .map(|(name, schema)| (name.to_string(), schema))
            .collect();
        FieldSchema::of(FieldKind::Object(fields))
    }

    pub fn array(element: FieldSchema) -> FieldSchema {
        FieldSchema::of(FieldKind::Array(Box::new(element)))
    }

    pub fn any() -> FieldSchema {
        FieldSchema::of(FieldKind::Any)
    }

    /// An embedded collection whose elements are records of kind `element`.
    pub fn collection(element: impl Into<String>) -> FieldSchema {
        FieldSchema::of(FieldKind::Collection(CollectionField::new(element)))
    }
}
