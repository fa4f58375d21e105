//! Unified error types for the domain layer
//!
//! Covers schema-definition failures (raised while building a
//! [`KindRegistry`](crate::kinds::KindRegistry)), per-entry data failures
//! (validation, unknown types) and path failures.

use std::fmt;

use thiserror::Error;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (`system.weight`, `items[2]`).
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { &self.path };
        write!(f, "{}: expected {}, received {}", path, self.expected, self.received)
    }
}

/// All validation failures collected for one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn single(
        path: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self(vec![ValidationError {
            path: path.into(),
            expected: expected.into(),
            received: received.into(),
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.path.as_str()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Unified error type for domain operations
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Record data failed its schema
    #[error("Validation failed for {document}: {errors}")]
    Validation {
        document: String,
        errors: ValidationErrors,
    },

    /// Discriminator is not one of the registered subtypes
    #[error("Unknown {document_name} type \"{type_name}\"")]
    UnknownType {
        document_name: String,
        type_name: String,
    },

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Misconfigured schema, raised while definitions are being registered
    #[error("Schema definition error: {0}")]
    Definition(String),

    /// A dotted path or pointer does not resolve
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A migration routine could not be applied
    #[error("Migration failed for {document}: {message}")]
    Migration { document: String, message: String },
}

impl DomainError {
    /// Creates a validation error from collected field failures.
    ///
    /// # Example
    /// ```ignore
    /// if !errors.is_empty() {
    ///     return Err(DomainError::validation("Item", errors));
    /// }
    /// ```
    pub fn validation(document: impl Into<String>, errors: ValidationErrors) -> Self {
        Self::Validation {
            document: document.into(),
            errors,
        }
    }

    pub fn unknown_type(document_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            document_name: document_name.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create a schema definition error.
    ///
    /// These surface while a [`KindRegistry`](crate::kinds::KindRegistry) is
    /// being built, before any record data flows through the schema.
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::Definition(msg.into())
    }

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    pub fn migration(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            document: document.into(),
            message: message.into(),
        }
    }

    /// True for per-entry data problems (as opposed to structural errors).
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnknownType { .. } | Self::Migration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation(
            "Item",
            ValidationErrors::single("name", "string", "number"),
        );
        assert!(matches!(err, DomainError::Validation { .. }));
        assert_eq!(
            err.to_string(),
            "Validation failed for Item: name: expected string, received number"
        );
        assert!(err.is_data_error());
    }

    #[test]
    fn test_unknown_type_error() {
        let err = DomainError::unknown_type("Item", "laser");
        assert_eq!(err.to_string(), "Unknown Item type \"laser\"");
        assert!(err.is_data_error());
    }

    #[test]
    fn test_not_found_error() {
        let err = DomainError::not_found("Item", "abc123");
        assert!(err.to_string().contains("Item"));
        assert!(err.to_string().contains("abc123"));
        assert!(!err.is_data_error());
    }

    #[test]
    fn test_definition_error() {
        let err = DomainError::definition("duplicate collection \"items\"");
        assert!(matches!(err, DomainError::Definition(_)));
        assert!(!err.is_data_error());
    }

    #[test]
    fn test_root_path_display() {
        let errors = ValidationErrors::single("", "object", "array");
        assert_eq!(errors.to_string(), "<root>: expected object, received array");
    }
}
