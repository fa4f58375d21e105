//! Field schemas for record data.
//!
//! Leaf fields (string, number, boolean) are deliberately small; the
//! interesting part is [`CollectionField`], which marks a field as holding an
//! embedded record collection.

mod collection;
mod field;
mod validate;

pub use collection::{CollectionDecl, CollectionField};
pub use field::{f, FieldKind, FieldSchema, SchemaFields};
pub use validate::{clean_fields, default_for, type_name, validate_fields, validate_value};

