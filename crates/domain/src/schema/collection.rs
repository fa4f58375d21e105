//! Schema descriptor for a field that holds an embedded record collection.

use serde_json::Value;

use crate::error::DomainError;
use crate::kinds::{CompositeSchema, KindFlavor, KindRegistry};
use crate::path::FieldPath;

/// Marks a field as "a collection of records of kind `element`".
///
/// The descriptor is static; live collections are built by the engine when
/// the owning record is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionField {
    element: String,
}

impl CollectionField {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
        }
    }

    /// Kind name of the elements.
    pub fn element(&self) -> &str {
        &self.element
    }

    /// Check that the element kind is a registered record kind.
    ///
    /// Native host documents cannot be embedded; this is a definition-time
    /// error, not a data error.
    pub fn validate_element(
        &self,
        lookup: impl Fn(&str) -> Option<KindFlavor>,
    ) -> Result<(), DomainError> {
        match lookup(&self.element) {
            Some(KindFlavor::Pseudo) => Ok(()),
            Some(KindFlavor::Native) => Err(DomainError::definition(format!(
                "collection element \"{}\" is a native document kind, not a record kind",
                self.element
            ))),
            None => Err(DomainError::definition(format!(
                "collection element \"{}\" is not a registered record kind",
                self.element
            ))),
        }
    }

    /// Apply a schema operation to every element, recursing into the
    /// element's own collections through the registry.
    pub fn apply<F>(
        &self,
        registry: &KindRegistry,
        value: &mut Value,
        op: &mut F,
    ) -> Result<(), DomainError>
    where
        F: FnMut(&CompositeSchema, &mut Value) -> Result<(), DomainError>,
    {
        let Some(entries) = value.as_array_mut() else {
            return Ok(());
        };
        for entry in entries.iter_mut().filter(|e| e.is_object()) {
            registry.apply(&self.element, entry, op)?;
        }
        Ok(())
    }

    /// Run element migrations over raw entries before any record is built.
    pub fn migrate_source(
        &self,
        registry: &KindRegistry,
        source: &mut Value,
    ) -> Result<(), DomainError> {
        self.apply(registry, source, &mut |schema: &CompositeSchema, entry: &mut Value| {
            schema.migrate_entry(entry)
        })
    }
}

/// A collection field found in a schema, with its location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionDecl {
    /// Lookup name (the field key).
    pub name: String,
    /// Location relative to the owner's data.
    pub path: FieldPath,
    pub field: CollectionField,
}

impl CollectionDecl {
    pub fn new(path: FieldPath, field: CollectionField) -> Self {
        Self {
            name: path.last().unwrap_or_default().to_string(),
            path,
            field,
        }
    }

    pub fn element(&self) -> &str {
        self.field.element()
    }
}
